//! Collaborator traits the core talks to instead of a live chat client.
//!
//! The configuration pipeline, the reload controller, and the sweep jobs only
//! see these seams. The Discord adapter implements all of them; tests use the
//! in-memory fakes in `messaging::testing`.

use crate::error::MessagingError;
use crate::{ChannelId, MessageId, RoleId, UserId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A chat message as the core needs to see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub author_is_bot: bool,
    pub text: String,
    /// The message this one replies to, if any.
    pub linked_message_id: Option<MessageId>,
    pub timestamp: DateTime<Utc>,
    /// Roles the author held when the message was sent. Empty when unknown.
    pub author_role_ids: Vec<RoleId>,
}

/// A mention resolved to its stable identifier and current display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub id: u64,
    pub name: String,
}

/// Turns mention text (`<#123>`, `<@&456>`) into ids and names.
///
/// `Ok(None)` means the mention does not refer to anything in the server.
#[async_trait]
pub trait MentionResolver: Send + Sync + 'static {
    async fn resolve_channel_mention(
        &self,
        mention: &str,
    ) -> Result<Option<ResolvedEntity>, MessagingError>;

    async fn resolve_role_mention(
        &self,
        mention: &str,
    ) -> Result<Option<ResolvedEntity>, MessagingError>;
}

/// Read access to a channel's message history.
#[async_trait]
pub trait MessageHistory: Send + Sync + 'static {
    /// Fetch up to `limit` messages older than `before` (or the newest ones),
    /// newest first.
    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
        before: Option<MessageId>,
    ) -> Result<Vec<ChannelMessage>, MessagingError>;
}

/// Posts replies to moderator messages.
#[async_trait]
pub trait ReplySink: Send + Sync + 'static {
    async fn post_reply(
        &self,
        channel_id: ChannelId,
        original_message_id: MessageId,
        text: &str,
    ) -> Result<(), MessagingError>;
}

/// Mutating moderation calls used by the sweep jobs.
#[async_trait]
pub trait ModerationOps: Send + Sync + 'static {
    /// Ids of non-pinned messages in `channel_id` sent before `cutoff`.
    async fn messages_older_than(
        &self,
        channel_id: ChannelId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, MessagingError>;

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), MessagingError>;

    /// Non-bot members currently holding `role_id`.
    async fn members_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>, MessagingError>;

    /// Remove `remove_role_id` from a member and grant `add_role_id`.
    async fn swap_role(
        &self,
        user_id: UserId,
        remove_role_id: RoleId,
        add_role_id: RoleId,
    ) -> Result<(), MessagingError>;
}
