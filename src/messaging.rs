//! Chat platform boundary: collaborator traits, mention syntax, and the Discord adapter.

pub mod discord;
pub mod mention;
#[cfg(test)]
pub(crate) mod testing;
pub mod traits;

pub use discord::{DiscordAdapter, DiscordHandler};
pub use traits::{
    ChannelMessage, MentionResolver, MessageHistory, ModerationOps, ReplySink, ResolvedEntity,
};
