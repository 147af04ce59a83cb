//! Config cache and reload controller for the configuration channel.
//!
//! Moderators edit the bot's configuration by posting a new message in a
//! dedicated channel. The newest message is parsed; if it is valid the bot
//! swaps it in and acknowledges with a reply, otherwise it replies with what
//! went wrong and keeps the previous configuration.
//!
//! Reads of the active config are lock-free. Every write (the startup scan
//! and each reload) requires a [`ProcessingGuard`], which is the same lock
//! the periodic sweeps hold, so a sweep never sees a half-applied reload.

use crate::config::parser::ConfigParser;
use crate::config::Config;
use crate::error::{ConfigError, StartupError};
use crate::messaging::mention::{format_channel_mention, format_role_mention};
use crate::messaging::traits::{ChannelMessage, MessageHistory, ReplySink};
use crate::processing::ProcessingGuard;
use crate::{ChannelId, MessageId};

use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix of the bot's acknowledgement reply. The startup scan looks for it.
pub const SUCCESS_MARKER: &str = "✅ Configuration updated";

/// Discord caps a single history request at 100 messages.
const HISTORY_PAGE_SIZE: usize = 100;

/// Lifecycle of the process-wide configuration slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigState {
    Uninitialized,
    /// The startup history scan is in progress.
    Loading,
    Active(Arc<Config>),
}

/// What happened to a message seen in the configuration channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Not a moderator message in the configuration channel.
    Ignored,
    /// Older than the message the active configuration came from.
    Stale,
    Applied(Arc<Config>),
    /// The previous configuration is still active.
    Rejected(ConfigError),
}

/// Rebuilds whatever depends on the configuration. Called once per successful swap.
pub trait ConfigSubscriber: Send + Sync {
    fn on_config_replaced(&self, config: Arc<Config>);
}

pub struct ConfigChannel {
    channel_id: ChannelId,
    history_scan_limit: usize,
    parser: ConfigParser,
    history: Arc<dyn MessageHistory>,
    replies: Arc<dyn ReplySink>,
    state: ArcSwap<ConfigState>,
    /// Id of the message the active configuration came from; 0 before startup.
    /// Snowflakes grow over time, so a smaller id is an older edit.
    last_applied_message_id: AtomicU64,
}

impl std::fmt::Debug for ConfigChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigChannel")
            .field("channel_id", &self.channel_id)
            .field("history_scan_limit", &self.history_scan_limit)
            .finish_non_exhaustive()
    }
}

impl ConfigChannel {
    pub fn new(
        channel_id: ChannelId,
        history_scan_limit: usize,
        parser: ConfigParser,
        history: Arc<dyn MessageHistory>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            channel_id,
            history_scan_limit,
            parser,
            history,
            replies,
            state: ArcSwap::from_pointee(ConfigState::Uninitialized),
            last_applied_message_id: AtomicU64::new(0),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn state(&self) -> Arc<ConfigState> {
        self.state.load_full()
    }

    /// The active configuration, if one has been loaded. Never blocks.
    pub fn current(&self) -> Option<Arc<Config>> {
        match &**self.state.load() {
            ConfigState::Active(config) => Some(config.clone()),
            ConfigState::Uninitialized | ConfigState::Loading => None,
        }
    }

    /// Return the active configuration.
    ///
    /// On first use this scans the configuration channel's history:
    /// - messages the bot acknowledged as successful configs, newest first
    /// - then any other moderator message, newest first
    ///
    /// The first candidate that parses and validates becomes active. Once a
    /// configuration is active this is a plain read.
    pub async fn get_config(&self, _guard: &ProcessingGuard) -> Result<Arc<Config>, StartupError> {
        if let Some(config) = self.current() {
            return Ok(config);
        }

        self.state.store(Arc::new(ConfigState::Loading));
        match self.scan_history().await {
            Ok((config, message_id)) => {
                let config = Arc::new(config);
                self.last_applied_message_id
                    .store(message_id, Ordering::Release);
                self.state
                    .store(Arc::new(ConfigState::Active(config.clone())));
                Ok(config)
            }
            Err(error) => {
                self.state.store(Arc::new(ConfigState::Uninitialized));
                Err(error)
            }
        }
    }

    /// Whether a message should be treated as a configuration edit.
    pub fn is_config_update(&self, message: &ChannelMessage) -> bool {
        message.channel_id == self.channel_id && !message.author_is_bot
    }

    /// Try to replace the active configuration with the one in `message`.
    ///
    /// Only this message is considered; history is not scanned. On success the
    /// new config is stored, `subscriber` rebuilds its services, and the
    /// moderator gets an acknowledgement. On failure the moderator gets an
    /// error reply and nothing else changes.
    ///
    /// Gateway events may reach the lock out of order, so a message older than
    /// the one the active configuration came from is dropped as stale.
    #[tracing::instrument(skip_all, fields(channel_id = self.channel_id, message_id = message.id))]
    pub async fn apply_update(
        &self,
        _guard: &ProcessingGuard,
        message: &ChannelMessage,
        subscriber: &dyn ConfigSubscriber,
    ) -> ReloadOutcome {
        if !self.is_config_update(message) {
            return ReloadOutcome::Ignored;
        }

        let last_applied = self.last_applied_message_id.load(Ordering::Acquire);
        if message.id <= last_applied {
            tracing::info!(last_applied, "skipping configuration edit older than the active one");
            return ReloadOutcome::Stale;
        }

        match self.parser.parse_and_validate(&message.text).await {
            Ok(config) => {
                let config = Arc::new(config);
                self.last_applied_message_id
                    .store(message.id, Ordering::Release);
                self.state
                    .store(Arc::new(ConfigState::Active(config.clone())));
                subscriber.on_config_replaced(config.clone());

                tracing::info!(
                    channel_pruning_policies = config.channel_pruning_policies.len(),
                    days_until_inactive = config.member_activity_policy.days_until_inactive,
                    "configuration replaced"
                );
                self.reply(message.id, &success_message(&config)).await;
                ReloadOutcome::Applied(config)
            }
            Err(error) => {
                tracing::warn!(%error, "configuration update rejected");
                self.reply(message.id, &error.moderator_message()).await;
                ReloadOutcome::Rejected(error)
            }
        }
    }

    async fn reply(&self, message_id: MessageId, text: &str) {
        if let Err(error) = self
            .replies
            .post_reply(self.channel_id, message_id, text)
            .await
        {
            tracing::error!(%error, message_id, "failed to reply in configuration channel");
        }
    }

    /// The first valid candidate and the id of the message it came from.
    async fn scan_history(&self) -> Result<(Config, MessageId), StartupError> {
        let messages = self.fetch_history().await?;
        let candidates = startup_candidates(&messages);

        tracing::info!(
            channel_id = self.channel_id,
            scanned = messages.len(),
            candidates = candidates.len(),
            "scanning configuration channel history"
        );

        for candidate in candidates {
            match self.parser.parse_and_validate(&candidate.text).await {
                Ok(config) => {
                    tracing::info!(message_id = candidate.id, "loaded configuration from history");
                    return Ok((config, candidate.id));
                }
                Err(error) => {
                    tracing::warn!(message_id = candidate.id, %error, "skipping configuration candidate");
                }
            }
        }

        Err(StartupError::NoValidConfig {
            channel_id: self.channel_id,
            scanned: messages.len(),
        })
    }

    /// Up to `history_scan_limit` messages, newest first.
    async fn fetch_history(&self) -> Result<Vec<ChannelMessage>, StartupError> {
        let mut messages: Vec<ChannelMessage> = Vec::new();
        let mut before = None;

        while messages.len() < self.history_scan_limit {
            let limit = HISTORY_PAGE_SIZE.min(self.history_scan_limit - messages.len());
            let page = self
                .history
                .fetch_recent_messages(self.channel_id, limit, before)
                .await
                .map_err(StartupError::History)?;

            let page_len = page.len();
            before = page.last().map(|message| message.id);
            messages.extend(page);

            if page_len < limit {
                break;
            }
        }

        Ok(messages)
    }
}

fn is_success_acknowledgement(message: &ChannelMessage) -> bool {
    message.author_is_bot
        && message.linked_message_id.is_some()
        && message.text.starts_with(SUCCESS_MARKER)
}

/// Messages worth parsing at startup, in the order they should be tried.
fn startup_candidates(messages: &[ChannelMessage]) -> Vec<&ChannelMessage> {
    let by_id: HashMap<MessageId, &ChannelMessage> =
        messages.iter().map(|message| (message.id, message)).collect();
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for acknowledgement in messages.iter().filter(|message| is_success_acknowledgement(message)) {
        let linked = acknowledgement
            .linked_message_id
            .and_then(|id| by_id.get(&id).copied());
        match linked {
            Some(linked) if !linked.author_is_bot => {
                if seen.insert(linked.id) {
                    candidates.push(linked);
                }
            }
            _ => {
                tracing::debug!(
                    acknowledgement_id = acknowledgement.id,
                    linked_message_id = ?acknowledgement.linked_message_id,
                    "acknowledged message is outside the scanned history"
                );
            }
        }
    }

    for message in messages.iter().filter(|message| !message.author_is_bot) {
        if seen.insert(message.id) {
            candidates.push(message);
        }
    }

    candidates
}

/// The acknowledgement posted after a successful reload.
pub fn success_message(config: &Config) -> String {
    let mut message = format!("{SUCCESS_MARKER}. The bot is now using this configuration.\n");

    if config.channel_pruning_policies.is_empty() {
        message.push_str("• No channels are pruned.\n");
    } else {
        let channels = config
            .channel_pruning_policies
            .iter()
            .map(|policy| {
                format!(
                    "{} after {} day(s)",
                    format_channel_mention(policy.channel_id),
                    policy.delete_older_than_days
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        message.push_str(&format!("• Pruning messages in {channels}\n"));
    }

    let policy = &config.member_activity_policy;
    message.push_str(&format!(
        "• Members with {} move to {} after {} day(s) without a message",
        format_role_mention(policy.active_role_id),
        format_role_mention(policy.inactive_role_id),
        policy.days_until_inactive
    ));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::messaging::testing::{
        CANONICAL_DOCUMENT, FakeHistory, RecordingReplies, bot_reply, canonical_resolver,
        moderator_message,
    };
    use crate::processing::ProcessingLock;
    use std::sync::Mutex;

    const CONFIG_CHANNEL: ChannelId = 900;

    const CHAT_ONLY_DOCUMENT: &str = "# Bot Config\n## Channel Pruning\n- <#102> = 3 days\n\
        ## Member Inactivity\n- Active role = <@&201>\n- Inactive role = <@&202>\n\
        - Days until inactive = 10 days";

    const DUPLICATE_CHANNEL_DOCUMENT: &str = "# Bot Config\n## Channel Pruning\n- <#102> = 3 days\n\
        - <#102> = 5 days\n## Member Inactivity\n- Active role = <@&201>\n\
        - Inactive role = <@&202>\n- Days until inactive = 10 days";

    #[derive(Default)]
    struct RecordingSubscriber {
        configs: Mutex<Vec<Arc<Config>>>,
    }

    impl ConfigSubscriber for RecordingSubscriber {
        fn on_config_replaced(&self, config: Arc<Config>) {
            self.configs.lock().expect("lock").push(config);
        }
    }

    struct Fixture {
        channel: ConfigChannel,
        history: Arc<FakeHistory>,
        replies: Arc<RecordingReplies>,
        lock: ProcessingLock,
    }

    fn fixture(messages: Vec<ChannelMessage>, history_scan_limit: usize) -> Fixture {
        let history = Arc::new(FakeHistory::new(messages));
        let replies = Arc::new(RecordingReplies::default());
        let channel = ConfigChannel::new(
            CONFIG_CHANNEL,
            history_scan_limit,
            ConfigParser::new(Arc::new(canonical_resolver())),
            history.clone(),
            replies.clone(),
        );
        Fixture {
            channel,
            history,
            replies,
            lock: ProcessingLock::new(),
        }
    }

    async fn parse(text: &str) -> Config {
        ConfigParser::new(Arc::new(canonical_resolver()))
            .parse_and_validate(text)
            .await
            .expect("fixture parses")
    }

    #[tokio::test]
    async fn startup_prefers_acknowledged_message_over_newer_edits() {
        let f = fixture(
            vec![
                moderator_message(10, CONFIG_CHANNEL, CANONICAL_DOCUMENT),
                bot_reply(11, CONFIG_CHANNEL, SUCCESS_MARKER, 10),
                moderator_message(12, CONFIG_CHANNEL, CHAT_ONLY_DOCUMENT),
            ],
            500,
        );
        let guard = f.lock.acquire().await;

        let config = f.channel.get_config(&guard).await.expect("loads");

        assert_eq!(*config, parse(CANONICAL_DOCUMENT).await);
        assert_eq!(*f.channel.state(), ConfigState::Active(config));
    }

    #[tokio::test]
    async fn startup_falls_back_to_newest_valid_moderator_message() {
        let f = fixture(
            vec![
                moderator_message(10, CONFIG_CHANNEL, CANONICAL_DOCUMENT),
                bot_reply(11, CONFIG_CHANNEL, "❌ Configuration rejected.", 10),
                moderator_message(12, CONFIG_CHANNEL, DUPLICATE_CHANNEL_DOCUMENT),
            ],
            500,
        );
        let guard = f.lock.acquire().await;

        let config = f.channel.get_config(&guard).await.expect("loads");

        assert_eq!(*config, parse(CANONICAL_DOCUMENT).await);
        assert!(f.replies.replies().is_empty(), "startup never replies");
    }

    #[tokio::test]
    async fn acknowledgement_outside_window_falls_back() {
        let f = fixture(
            vec![
                moderator_message(10, CONFIG_CHANNEL, CHAT_ONLY_DOCUMENT),
                bot_reply(11, CONFIG_CHANNEL, SUCCESS_MARKER, 3),
            ],
            500,
        );
        let guard = f.lock.acquire().await;

        let config = f.channel.get_config(&guard).await.expect("loads");

        assert_eq!(*config, parse(CHAT_ONLY_DOCUMENT).await);
    }

    #[tokio::test]
    async fn startup_without_valid_message_fails() {
        let f = fixture(
            vec![
                moderator_message(10, CONFIG_CHANNEL, "hello"),
                moderator_message(11, CONFIG_CHANNEL, DUPLICATE_CHANNEL_DOCUMENT),
            ],
            500,
        );
        let guard = f.lock.acquire().await;

        let error = f.channel.get_config(&guard).await.expect_err("nothing valid");

        assert!(matches!(
            error,
            StartupError::NoValidConfig {
                channel_id: CONFIG_CHANNEL,
                scanned: 2
            }
        ));
        assert_eq!(*f.channel.state(), ConfigState::Uninitialized);
        assert!(f.channel.current().is_none());
    }

    #[tokio::test]
    async fn history_is_paged_up_to_the_scan_limit() {
        let mut messages = vec![moderator_message(1, CONFIG_CHANNEL, CANONICAL_DOCUMENT)];
        messages.extend((2..=151).map(|id| moderator_message(id, CONFIG_CHANNEL, "chatter")));

        let f = fixture(messages.clone(), 500);
        let guard = f.lock.acquire().await;
        f.channel.get_config(&guard).await.expect("found on second page");
        assert_eq!(f.history.request_count(), 2);

        let f = fixture(messages, 100);
        let guard = f.lock.acquire().await;
        let error = f.channel.get_config(&guard).await.expect_err("outside limit");
        assert!(matches!(error, StartupError::NoValidConfig { scanned: 100, .. }));
    }

    #[tokio::test]
    async fn active_config_is_read_without_rescanning() {
        let f = fixture(vec![moderator_message(10, CONFIG_CHANNEL, CANONICAL_DOCUMENT)], 500);
        let guard = f.lock.acquire().await;

        let first = f.channel.get_config(&guard).await.expect("loads");
        let requests = f.history.request_count();
        let second = f.channel.get_config(&guard).await.expect("cached");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.history.request_count(), requests);
    }

    #[tokio::test]
    async fn valid_update_replaces_config_and_acknowledges() {
        let f = fixture(vec![moderator_message(10, CONFIG_CHANNEL, CANONICAL_DOCUMENT)], 500);
        let subscriber = RecordingSubscriber::default();
        let guard = f.lock.acquire().await;
        f.channel.get_config(&guard).await.expect("loads");

        let edit = moderator_message(20, CONFIG_CHANNEL, CHAT_ONLY_DOCUMENT);
        let outcome = f.channel.apply_update(&guard, &edit, &subscriber).await;

        let expected = parse(CHAT_ONLY_DOCUMENT).await;
        assert!(matches!(outcome, ReloadOutcome::Applied(ref config) if **config == expected));
        assert_eq!(f.channel.current().as_deref(), Some(&expected));
        assert_eq!(subscriber.configs.lock().expect("lock").len(), 1);

        let replies = f.replies.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!((replies[0].0, replies[0].1), (CONFIG_CHANNEL, 20));
        assert!(replies[0].2.starts_with(SUCCESS_MARKER));
    }

    #[tokio::test]
    async fn rejected_update_keeps_previous_config() {
        let f = fixture(vec![moderator_message(10, CONFIG_CHANNEL, CANONICAL_DOCUMENT)], 500);
        let subscriber = RecordingSubscriber::default();
        let guard = f.lock.acquire().await;
        let before = f.channel.get_config(&guard).await.expect("loads");
        let snapshot = (*before).clone();

        let edit = moderator_message(20, CONFIG_CHANNEL, DUPLICATE_CHANNEL_DOCUMENT);
        let outcome = f.channel.apply_update(&guard, &edit, &subscriber).await;

        assert!(matches!(
            outcome,
            ReloadOutcome::Rejected(ConfigError::Validation {
                error: ValidationError::DuplicateChannel { channel_id: 102, .. },
                line: Some(_),
            })
        ));
        let after = f.channel.current().expect("still active");
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(*after, snapshot);
        assert!(subscriber.configs.lock().expect("lock").is_empty());

        let replies = f.replies.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].2.contains("channel_id=102"));
        assert!(replies[0].2.contains("previous configuration is still active"));
    }

    #[tokio::test]
    async fn reapplying_the_active_document_is_idempotent() {
        let f = fixture(vec![moderator_message(10, CONFIG_CHANNEL, CANONICAL_DOCUMENT)], 500);
        let subscriber = RecordingSubscriber::default();
        let guard = f.lock.acquire().await;
        let before = f.channel.get_config(&guard).await.expect("loads");

        let edit = moderator_message(20, CONFIG_CHANNEL, CANONICAL_DOCUMENT);
        f.channel.apply_update(&guard, &edit, &subscriber).await;

        assert_eq!(f.channel.current().as_deref(), Some(&*before));
    }

    #[tokio::test]
    async fn edits_arriving_out_of_order_keep_the_newest() {
        let f = fixture(vec![moderator_message(10, CONFIG_CHANNEL, CANONICAL_DOCUMENT)], 500);
        let subscriber = RecordingSubscriber::default();
        let guard = f.lock.acquire().await;
        f.channel.get_config(&guard).await.expect("loads");

        let newer = moderator_message(30, CONFIG_CHANNEL, CHAT_ONLY_DOCUMENT);
        let older = moderator_message(20, CONFIG_CHANNEL, CANONICAL_DOCUMENT);
        assert!(matches!(
            f.channel.apply_update(&guard, &newer, &subscriber).await,
            ReloadOutcome::Applied(_)
        ));

        let outcome = f.channel.apply_update(&guard, &older, &subscriber).await;

        assert_eq!(outcome, ReloadOutcome::Stale);
        assert_eq!(
            f.channel.current().as_deref(),
            Some(&parse(CHAT_ONLY_DOCUMENT).await)
        );
        assert_eq!(subscriber.configs.lock().expect("lock").len(), 1);
        assert_eq!(f.replies.replies().len(), 1);
    }

    #[tokio::test]
    async fn edits_older_than_the_startup_message_are_stale() {
        let f = fixture(vec![moderator_message(10, CONFIG_CHANNEL, CANONICAL_DOCUMENT)], 500);
        let subscriber = RecordingSubscriber::default();
        let guard = f.lock.acquire().await;
        f.channel.get_config(&guard).await.expect("loads");

        let edit = moderator_message(5, CONFIG_CHANNEL, CHAT_ONLY_DOCUMENT);

        assert_eq!(
            f.channel.apply_update(&guard, &edit, &subscriber).await,
            ReloadOutcome::Stale
        );
    }

    #[tokio::test]
    async fn bot_messages_and_other_channels_are_ignored() {
        let f = fixture(Vec::new(), 500);
        let subscriber = RecordingSubscriber::default();
        let guard = f.lock.acquire().await;

        let from_bot = bot_reply(20, CONFIG_CHANNEL, CANONICAL_DOCUMENT, 10);
        let elsewhere = moderator_message(21, 1234, CANONICAL_DOCUMENT);

        assert_eq!(
            f.channel.apply_update(&guard, &from_bot, &subscriber).await,
            ReloadOutcome::Ignored
        );
        assert_eq!(
            f.channel.apply_update(&guard, &elsewhere, &subscriber).await,
            ReloadOutcome::Ignored
        );
        assert!(f.replies.replies().is_empty());
    }

    #[test]
    fn success_message_starts_with_marker() {
        let config = tokio_test::block_on(parse(CANONICAL_DOCUMENT));

        let message = success_message(&config);

        assert!(message.starts_with(SUCCESS_MARKER));
        assert!(message.contains("<#101> after 30 day(s)"));
        assert!(message.contains("<@&201> move to <@&202>"));
    }
}
