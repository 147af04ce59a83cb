//! Modbot: a Discord moderation bot configured by posting a Markdown message
//! in a dedicated channel.

pub mod bot;
pub mod config;
pub mod error;
pub mod jobs;
pub mod messaging;
pub mod processing;
pub mod scheduler;
pub mod settings;

pub use error::{Error, Result};

/// Discord snowflake of a guild.
pub type GuildId = u64;
/// Discord snowflake of a channel.
pub type ChannelId = u64;
/// Discord snowflake of a role.
pub type RoleId = u64;
/// Discord snowflake of a message.
pub type MessageId = u64;
/// Discord snowflake of a user.
pub type UserId = u64;
