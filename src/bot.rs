//! The bot core: config cache, processing lock, and the services built from
//! the active configuration.

use crate::config::{Config, ConfigChannel, ConfigSubscriber, ReloadOutcome};
use crate::error::StartupError;
use crate::jobs::{ActivityTracker, ServiceGraph};
use crate::messaging::traits::{ChannelMessage, ModerationOps};
use crate::processing::ProcessingLock;

use arc_swap::ArcSwapOption;
use std::sync::Arc;

pub struct Bot {
    config_channel: ConfigChannel,
    processing_lock: ProcessingLock,
    services: ArcSwapOption<ServiceGraph>,
    ops: Arc<dyn ModerationOps>,
    activity: Arc<ActivityTracker>,
    dry_run: bool,
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("config_channel", &self.config_channel)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl Bot {
    pub fn new(
        config_channel: ConfigChannel,
        ops: Arc<dyn ModerationOps>,
        activity: Arc<ActivityTracker>,
        dry_run: bool,
    ) -> Self {
        Self {
            config_channel,
            processing_lock: ProcessingLock::new(),
            services: ArcSwapOption::empty(),
            ops,
            activity,
            dry_run,
        }
    }

    pub fn config_channel(&self) -> &ConfigChannel {
        &self.config_channel
    }

    pub fn processing_lock(&self) -> &ProcessingLock {
        &self.processing_lock
    }

    pub fn activity(&self) -> &Arc<ActivityTracker> {
        &self.activity
    }

    /// The current service graph. `None` until [`Bot::start`] succeeds.
    pub fn services(&self) -> Option<Arc<ServiceGraph>> {
        self.services.load_full()
    }

    /// Load the configuration from channel history and build the services.
    pub async fn start(&self) -> Result<Arc<Config>, StartupError> {
        let guard = self.processing_lock.acquire().await;
        let config = self.config_channel.get_config(&guard).await?;
        self.request_hot_reload(config.clone());
        tracing::info!(
            channel_pruning_policies = config.channel_pruning_policies.len(),
            dry_run = self.dry_run,
            "bot started"
        );
        Ok(config)
    }

    /// Handle a guild message.
    ///
    /// Records activity for human authors, restores an inactive member who
    /// posts, and reloads the configuration when a moderator posts in the
    /// configuration channel.
    pub async fn process_message(&self, message: &ChannelMessage) -> ReloadOutcome {
        if message.author_is_bot {
            return ReloadOutcome::Ignored;
        }

        self.activity
            .record(message.author_id, message.timestamp)
            .await;

        if self
            .services()
            .is_some_and(|services| services.inactivity.needs_restore(message))
        {
            let guard = self.processing_lock.acquire().await;
            // Re-read under the lock; a reload may have swapped the graph meanwhile.
            if let Some(services) = self.services()
                && let Err(error) = services
                    .inactivity
                    .handle_member_message(&guard, message)
                    .await
            {
                tracing::warn!(user_id = message.author_id, %error, "failed to restore active role");
            }
        }

        if !self.config_channel.is_config_update(message) {
            return ReloadOutcome::Ignored;
        }

        let guard = self.processing_lock.acquire().await;
        self.config_channel
            .apply_update(&guard, message, self)
            .await
    }

    /// Rebuild every config-dependent service from `config` and swap it in.
    pub fn request_hot_reload(&self, config: Arc<Config>) {
        let graph = ServiceGraph::build(config, self.ops.clone(), self.activity.clone(), self.dry_run);
        self.services.store(Some(Arc::new(graph)));
        tracing::debug!("service graph rebuilt");
    }
}

impl ConfigSubscriber for Bot {
    fn on_config_replaced(&self, config: Arc<Config>) {
        self.request_hot_reload(config);
    }
}
