//! Services built from the active configuration.
//!
//! A [`ServiceGraph`] is rebuilt from scratch on every successful reload and
//! swapped in whole. Only the [`ActivityTracker`] outlives a rebuild.

pub mod activity;
pub mod inactivity;
pub mod pruning;

pub use activity::ActivityTracker;
pub use inactivity::{InactivityReport, MemberActivityJob};
pub use pruning::{ChannelPruningJob, PruningReport};

use crate::config::Config;
use crate::messaging::traits::ModerationOps;

use std::sync::Arc;

#[derive(Debug)]
pub struct ServiceGraph {
    pub config: Arc<Config>,
    pub pruning: ChannelPruningJob,
    pub inactivity: MemberActivityJob,
}

impl ServiceGraph {
    pub fn build(
        config: Arc<Config>,
        ops: Arc<dyn ModerationOps>,
        activity: Arc<ActivityTracker>,
        dry_run: bool,
    ) -> Self {
        let pruning =
            ChannelPruningJob::new(config.channel_pruning_policies.clone(), ops.clone(), dry_run);
        let inactivity = MemberActivityJob::new(
            config.member_activity_policy.clone(),
            ops,
            activity,
            dry_run,
        );
        Self {
            config,
            pruning,
            inactivity,
        }
    }
}
