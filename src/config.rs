//! Live moderation configuration: the typed policy model and the pipeline
//! that turns a moderator-edited chat message into it.
//!
//! Pipeline, leaf first:
//! `normalize` (line classification) → `sections` (closed heading set) →
//! `bullets` (`key = value` split) → `parser` (typed policies, mention
//! resolution) → `validation` (business rules). `channel` owns the active
//! configuration and performs the startup scan and hot reloads.

pub mod bullets;
pub mod channel;
pub mod normalize;
pub mod parser;
pub mod sections;
pub mod validation;

pub use channel::{ConfigChannel, ConfigState, ConfigSubscriber, ReloadOutcome, SUCCESS_MARKER};
pub use parser::ConfigParser;
pub use sections::SectionKind;
pub use validation::validate_config;

use crate::{ChannelId, RoleId};

/// A validated moderation configuration. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// One entry per channel mention, in document order.
    pub channel_pruning_policies: Vec<ChannelPruningPolicy>,
    pub member_activity_policy: MemberActivityPolicy,
}

/// Delete messages in one channel once they reach a certain age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPruningPolicy {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub delete_older_than_days: i64,
}

/// Move members from the active role to the inactive role after a quiet period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberActivityPolicy {
    pub active_role_id: RoleId,
    pub active_role_name: String,
    pub inactive_role_id: RoleId,
    pub inactive_role_name: String,
    pub days_until_inactive: i64,
}
