//! In-memory fakes of the collaborator traits for unit tests.

use crate::error::MessagingError;
use crate::messaging::mention::{parse_channel_mention, parse_role_mention};
use crate::messaging::traits::{
    ChannelMessage, MentionResolver, MessageHistory, ModerationOps, ReplySink, ResolvedEntity,
};
use crate::{ChannelId, MessageId, RoleId, UserId};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone as _, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// The configuration message moderators are shown as the template.
pub(crate) const CANONICAL_DOCUMENT: &str = indoc::indoc! {"
    # Bot Config
    Please read the pinned guide before updating the bot's config.

    ━━━━━━━━━━━━━━━━

    ## Channel Pruning

    - <#101> = 30 days
    - <#102> = 7 days

    ━━━━━━━━━━━━━━━━

    ## Member Inactivity

    - Active role = <@&201>
    - Inactive role = <@&202>
    - Days until inactive = 30 days
"};

/// Knows the channels and roles referenced by [`CANONICAL_DOCUMENT`].
pub(crate) fn canonical_resolver() -> FakeResolver {
    FakeResolver::new()
        .with_channel(101, "introductions")
        .with_channel(102, "chat")
        .with_role(201, "Active")
        .with_role(202, "Inactive")
}

pub(crate) fn timestamp(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
}

pub(crate) fn moderator_message(id: MessageId, channel_id: ChannelId, text: &str) -> ChannelMessage {
    ChannelMessage {
        id,
        channel_id,
        author_id: 1000,
        author_is_bot: false,
        text: text.to_string(),
        linked_message_id: None,
        timestamp: timestamp(id as i64),
        author_role_ids: Vec::new(),
    }
}

pub(crate) fn bot_reply(
    id: MessageId,
    channel_id: ChannelId,
    text: &str,
    linked_message_id: MessageId,
) -> ChannelMessage {
    ChannelMessage {
        id,
        channel_id,
        author_id: 1,
        author_is_bot: true,
        text: text.to_string(),
        linked_message_id: Some(linked_message_id),
        timestamp: timestamp(id as i64),
        author_role_ids: Vec::new(),
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeResolver {
    channels: HashMap<u64, String>,
    roles: HashMap<u64, String>,
    failing: bool,
}

impl FakeResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_channel(mut self, id: u64, name: &str) -> Self {
        self.channels.insert(id, name.to_string());
        self
    }

    pub(crate) fn with_role(mut self, id: u64, name: &str) -> Self {
        self.roles.insert(id, name.to_string());
        self
    }

    /// Every lookup fails as if the chat API timed out.
    pub(crate) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MentionResolver for FakeResolver {
    async fn resolve_channel_mention(
        &self,
        mention: &str,
    ) -> Result<Option<ResolvedEntity>, MessagingError> {
        if self.failing {
            return Err(anyhow::anyhow!("request timed out").into());
        }
        Ok(parse_channel_mention(mention).and_then(|id| {
            self.channels.get(&id).map(|name| ResolvedEntity {
                id,
                name: name.clone(),
            })
        }))
    }

    async fn resolve_role_mention(
        &self,
        mention: &str,
    ) -> Result<Option<ResolvedEntity>, MessagingError> {
        if self.failing {
            return Err(anyhow::anyhow!("request timed out").into());
        }
        Ok(parse_role_mention(mention).and_then(|id| {
            self.roles.get(&id).map(|name| ResolvedEntity {
                id,
                name: name.clone(),
            })
        }))
    }
}

/// Channel history held newest first.
#[derive(Debug, Default)]
pub(crate) struct FakeHistory {
    messages: Mutex<Vec<ChannelMessage>>,
    requests: Mutex<usize>,
}

impl FakeHistory {
    /// `messages` in chronological order (oldest first), as a moderator would read them.
    pub(crate) fn new(mut messages: Vec<ChannelMessage>) -> Self {
        messages.reverse();
        Self {
            messages: Mutex::new(messages),
            requests: Mutex::new(0),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        *self.requests.lock().expect("lock")
    }
}

#[async_trait]
impl MessageHistory for FakeHistory {
    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
        before: Option<MessageId>,
    ) -> Result<Vec<ChannelMessage>, MessagingError> {
        *self.requests.lock().expect("lock") += 1;
        let messages = self.messages.lock().expect("lock");
        Ok(messages
            .iter()
            .filter(|message| message.channel_id == channel_id)
            .filter(|message| before.is_none_or(|before| message.id < before))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub(crate) struct RecordingReplies {
    replies: Mutex<Vec<(ChannelId, MessageId, String)>>,
}

impl RecordingReplies {
    pub(crate) fn replies(&self) -> Vec<(ChannelId, MessageId, String)> {
        self.replies.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ReplySink for RecordingReplies {
    async fn post_reply(
        &self,
        channel_id: ChannelId,
        original_message_id: MessageId,
        text: &str,
    ) -> Result<(), MessagingError> {
        self.replies
            .lock()
            .expect("lock")
            .push((channel_id, original_message_id, text.to_string()));
        Ok(())
    }
}

/// Moderation calls against an in-memory guild.
#[derive(Debug, Default)]
pub(crate) struct FakeModeration {
    /// channel -> (message id, sent at)
    pub(crate) messages: Mutex<HashMap<ChannelId, Vec<(MessageId, DateTime<Utc>)>>>,
    /// member -> roles
    pub(crate) members: Mutex<HashMap<UserId, Vec<RoleId>>>,
    pub(crate) deleted: Mutex<Vec<(ChannelId, MessageId)>>,
    pub(crate) swaps: Mutex<Vec<(UserId, RoleId, RoleId)>>,
    pub(crate) failing_channels: Mutex<Vec<ChannelId>>,
}

impl FakeModeration {
    pub(crate) fn with_message(self, channel_id: ChannelId, message_id: MessageId, at: DateTime<Utc>) -> Self {
        self.messages
            .lock()
            .expect("lock")
            .entry(channel_id)
            .or_default()
            .push((message_id, at));
        self
    }

    pub(crate) fn with_member(self, user_id: UserId, roles: &[RoleId]) -> Self {
        self.members
            .lock()
            .expect("lock")
            .insert(user_id, roles.to_vec());
        self
    }

    pub(crate) fn failing_channel(self, channel_id: ChannelId) -> Self {
        self.failing_channels.lock().expect("lock").push(channel_id);
        self
    }

    pub(crate) fn deleted(&self) -> Vec<(ChannelId, MessageId)> {
        self.deleted.lock().expect("lock").clone()
    }

    pub(crate) fn swaps(&self) -> Vec<(UserId, RoleId, RoleId)> {
        self.swaps.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ModerationOps for FakeModeration {
    async fn messages_older_than(
        &self,
        channel_id: ChannelId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, MessagingError> {
        if self.failing_channels.lock().expect("lock").contains(&channel_id) {
            return Err(anyhow::anyhow!("missing access to channel {channel_id}").into());
        }
        Ok(self
            .messages
            .lock()
            .expect("lock")
            .get(&channel_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|(_, at)| *at < cutoff)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), MessagingError> {
        self.deleted
            .lock()
            .expect("lock")
            .push((channel_id, message_id));
        Ok(())
    }

    async fn members_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>, MessagingError> {
        let mut members: Vec<UserId> = self
            .members
            .lock()
            .expect("lock")
            .iter()
            .filter(|(_, roles)| roles.contains(&role_id))
            .map(|(user_id, _)| *user_id)
            .collect();
        members.sort_unstable();
        Ok(members)
    }

    async fn swap_role(
        &self,
        user_id: UserId,
        remove_role_id: RoleId,
        add_role_id: RoleId,
    ) -> Result<(), MessagingError> {
        if let Some(roles) = self.members.lock().expect("lock").get_mut(&user_id) {
            roles.retain(|role| *role != remove_role_id);
            roles.push(add_role_id);
        }
        self.swaps
            .lock()
            .expect("lock")
            .push((user_id, remove_role_id, add_role_id));
        Ok(())
    }
}
