//! Discord adapter: serenity implementations of the collaborator traits and
//! the gateway event handler that drives the bot.

use crate::bot::Bot;
use crate::config::{ConfigChannel, ConfigParser};
use crate::error::MessagingError;
use crate::jobs::ActivityTracker;
use crate::messaging::mention::{parse_channel_mention, parse_role_mention};
use crate::messaging::traits::{
    ChannelMessage, MentionResolver, MessageHistory, ModerationOps, ReplySink, ResolvedEntity,
};
use crate::settings::Settings;
use crate::{ChannelId, GuildId, MessageId, RoleId, UserId};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    self as discord, Context, CreateAllowedMentions, CreateMessage, EventHandler, GetMessages,
    Http, Message, Ready,
};
use std::sync::Arc;

/// Discord rejects message content longer than this many characters.
const MAX_MESSAGE_LENGTH: usize = 2000;
const MESSAGE_PAGE_SIZE: u8 = 100;
const MEMBER_PAGE_SIZE: u64 = 1000;
/// Milliseconds between the Unix epoch and the first second of 2015.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;
const AUDIT_LOG_REASON: &str = "member activity policy";

/// Talks to one guild over the Discord REST API.
#[derive(Clone)]
pub struct DiscordAdapter {
    http: Arc<Http>,
    guild_id: GuildId,
}

impl std::fmt::Debug for DiscordAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordAdapter")
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}

impl DiscordAdapter {
    pub fn new(http: Arc<Http>, guild_id: GuildId) -> Self {
        Self { http, guild_id }
    }

    fn http(&self) -> &Http {
        &self.http
    }

    fn guild(&self) -> Result<discord::GuildId, MessagingError> {
        non_zero(self.guild_id).map(discord::GuildId::new)
    }
}

fn non_zero(id: u64) -> Result<u64, MessagingError> {
    if id == 0 {
        Err(MessagingError::InvalidId(id))
    } else {
        Ok(id)
    }
}

fn discord_channel(id: ChannelId) -> Result<discord::ChannelId, MessagingError> {
    non_zero(id).map(discord::ChannelId::new)
}

fn discord_message(id: MessageId) -> Result<discord::MessageId, MessagingError> {
    non_zero(id).map(discord::MessageId::new)
}

fn discord_user(id: UserId) -> Result<discord::UserId, MessagingError> {
    non_zero(id).map(discord::UserId::new)
}

fn discord_role(id: RoleId) -> Result<discord::RoleId, MessagingError> {
    non_zero(id).map(discord::RoleId::new)
}

/// The smallest snowflake that could have been created at `at`.
fn snowflake_at(at: DateTime<Utc>) -> Option<u64> {
    let elapsed = at.timestamp_millis().checked_sub(DISCORD_EPOCH_MS)?;
    u64::try_from(elapsed).ok().map(|elapsed| elapsed << 22)
}

fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(MAX_MESSAGE_LENGTH - 1).collect();
    truncated.push('…');
    truncated
}

/// Convert a serenity message into the platform-neutral form the core uses.
pub fn to_channel_message(message: &Message) -> ChannelMessage {
    ChannelMessage {
        id: message.id.get(),
        channel_id: message.channel_id.get(),
        author_id: message.author.id.get(),
        author_is_bot: message.author.bot,
        text: message.content.clone(),
        linked_message_id: message
            .message_reference
            .as_ref()
            .and_then(|reference| reference.message_id)
            .map(|id| id.get()),
        timestamp: DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
            .unwrap_or_default(),
        author_role_ids: message
            .member
            .as_ref()
            .map(|member| member.roles.iter().map(|role| role.get()).collect())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl MentionResolver for DiscordAdapter {
    async fn resolve_channel_mention(
        &self,
        mention: &str,
    ) -> Result<Option<ResolvedEntity>, MessagingError> {
        let Some(id) = parse_channel_mention(mention).filter(|id| *id != 0) else {
            return Ok(None);
        };
        let channels = self.guild()?.channels(self.http()).await?;
        Ok(channels
            .get(&discord::ChannelId::new(id))
            .map(|channel| ResolvedEntity {
                id,
                name: channel.name.clone(),
            }))
    }

    async fn resolve_role_mention(
        &self,
        mention: &str,
    ) -> Result<Option<ResolvedEntity>, MessagingError> {
        let Some(id) = parse_role_mention(mention).filter(|id| *id != 0) else {
            return Ok(None);
        };
        let roles = self.guild()?.roles(self.http()).await?;
        Ok(roles.get(&discord::RoleId::new(id)).map(|role| ResolvedEntity {
            id,
            name: role.name.clone(),
        }))
    }
}

#[async_trait]
impl MessageHistory for DiscordAdapter {
    async fn fetch_recent_messages(
        &self,
        channel_id: ChannelId,
        limit: usize,
        before: Option<MessageId>,
    ) -> Result<Vec<ChannelMessage>, MessagingError> {
        let limit = u8::try_from(limit.min(usize::from(MESSAGE_PAGE_SIZE))).unwrap_or(MESSAGE_PAGE_SIZE);
        let mut request = GetMessages::new().limit(limit);
        if let Some(before) = before {
            request = request.before(discord_message(before)?);
        }

        let messages = discord_channel(channel_id)?.messages(self.http(), request).await?;
        Ok(messages.iter().map(to_channel_message).collect())
    }
}

#[async_trait]
impl ReplySink for DiscordAdapter {
    async fn post_reply(
        &self,
        channel_id: ChannelId,
        original_message_id: MessageId,
        text: &str,
    ) -> Result<(), MessagingError> {
        let channel_id = discord_channel(channel_id)?;
        let builder = CreateMessage::new()
            .content(truncate_message(text))
            .reference_message((channel_id, discord_message(original_message_id)?))
            .allowed_mentions(CreateAllowedMentions::new());

        channel_id.send_message(self.http(), builder).await?;
        Ok(())
    }
}

#[async_trait]
impl ModerationOps for DiscordAdapter {
    async fn messages_older_than(
        &self,
        channel_id: ChannelId,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MessageId>, MessagingError> {
        let channel_id = discord_channel(channel_id)?;
        let Some(mut cursor) = snowflake_at(cutoff).filter(|cursor| *cursor != 0) else {
            return Ok(Vec::new());
        };

        let mut expired = Vec::new();
        loop {
            let page = channel_id
                .messages(
                    self.http(),
                    GetMessages::new()
                        .before(discord::MessageId::new(cursor))
                        .limit(MESSAGE_PAGE_SIZE),
                )
                .await?;

            expired.extend(
                page.iter()
                    .filter(|message| !message.pinned)
                    .map(|message| message.id.get()),
            );

            match page.last() {
                Some(oldest) if page.len() == usize::from(MESSAGE_PAGE_SIZE) => {
                    cursor = oldest.id.get();
                }
                _ => break,
            }
        }

        Ok(expired)
    }

    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), MessagingError> {
        discord_channel(channel_id)?
            .delete_message(self.http(), discord_message(message_id)?)
            .await?;
        Ok(())
    }

    async fn members_with_role(&self, role_id: RoleId) -> Result<Vec<UserId>, MessagingError> {
        let guild_id = self.guild()?;
        let role_id = discord_role(role_id)?;
        let mut holders = Vec::new();
        let mut after = None;

        loop {
            let page = guild_id
                .members(self.http(), Some(MEMBER_PAGE_SIZE), after)
                .await?;

            holders.extend(
                page.iter()
                    .filter(|member| !member.user.bot && member.roles.contains(&role_id))
                    .map(|member| member.user.id.get()),
            );

            match page.last() {
                Some(last) if page.len() as u64 == MEMBER_PAGE_SIZE => after = Some(last.user.id),
                _ => break,
            }
        }

        Ok(holders)
    }

    async fn swap_role(
        &self,
        user_id: UserId,
        remove_role_id: RoleId,
        add_role_id: RoleId,
    ) -> Result<(), MessagingError> {
        let guild_id = self.guild()?;
        let user_id = discord_user(user_id)?;

        self.http()
            .add_member_role(guild_id, user_id, discord_role(add_role_id)?, Some(AUDIT_LOG_REASON))
            .await?;
        self.http()
            .remove_member_role(guild_id, user_id, discord_role(remove_role_id)?, Some(AUDIT_LOG_REASON))
            .await?;
        Ok(())
    }
}

/// Build the bot core over a Discord adapter.
pub fn build_bot(settings: &Settings, adapter: Arc<DiscordAdapter>) -> Bot {
    let config_channel = ConfigChannel::new(
        settings.config_channel_id,
        settings.history_scan_limit,
        ConfigParser::new(adapter.clone()),
        adapter.clone(),
        adapter.clone(),
    );
    Bot::new(
        config_channel,
        adapter,
        Arc::new(ActivityTracker::new(Utc::now())),
        settings.dry_run,
    )
}

/// Gateway event handler. Starts the bot on the first `Ready` and feeds it
/// guild messages afterwards.
pub struct DiscordHandler {
    settings: Settings,
    bot: tokio::sync::OnceCell<Arc<Bot>>,
    fatal_tx: tokio::sync::mpsc::Sender<crate::Error>,
}

impl DiscordHandler {
    pub fn new(settings: Settings, fatal_tx: tokio::sync::mpsc::Sender<crate::Error>) -> Self {
        Self {
            settings,
            bot: tokio::sync::OnceCell::new(),
            fatal_tx,
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, "connected to discord");
        if self.bot.initialized() {
            tracing::debug!("gateway reconnected, bot already running");
            return;
        }

        let adapter = Arc::new(DiscordAdapter::new(ctx.http.clone(), self.settings.guild_id));
        let bot = Arc::new(build_bot(&self.settings, adapter));

        if let Err(error) = bot.start().await {
            tracing::error!(%error, "failed to load configuration");
            if self.fatal_tx.send(error.into()).await.is_err() {
                tracing::error!("shutdown channel closed");
            }
            return;
        }

        if self.bot.set(bot.clone()).is_ok() {
            crate::scheduler::spawn(bot, self.settings.sweep_interval());
        }
    }

    async fn message(&self, _ctx: Context, message: Message) {
        let Some(bot) = self.bot.get() else {
            return;
        };
        if message.guild_id.map(|id| id.get()) != Some(self.settings.guild_id) {
            return;
        }

        bot.process_message(&to_channel_message(&message)).await;
    }
}
