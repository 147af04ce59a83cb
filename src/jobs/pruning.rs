//! Deletes old messages from channels with a pruning policy.

use crate::ChannelId;
use crate::config::ChannelPruningPolicy;
use crate::messaging::traits::ModerationOps;
use crate::processing::ProcessingGuard;

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

/// What one pruning sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruningReport {
    /// Messages deleted, or that would have been in dry-run mode.
    pub deleted: usize,
    pub failed_deletions: usize,
    /// Channels whose history could not be read.
    pub failed_channels: Vec<ChannelId>,
}

pub struct ChannelPruningJob {
    policies: Vec<ChannelPruningPolicy>,
    ops: Arc<dyn ModerationOps>,
    dry_run: bool,
}

impl std::fmt::Debug for ChannelPruningJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPruningJob")
            .field("policies", &self.policies)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl ChannelPruningJob {
    pub fn new(
        policies: Vec<ChannelPruningPolicy>,
        ops: Arc<dyn ModerationOps>,
        dry_run: bool,
    ) -> Self {
        Self {
            policies,
            ops,
            dry_run,
        }
    }

    pub fn policies(&self) -> &[ChannelPruningPolicy] {
        &self.policies
    }

    /// Delete every non-pinned message older than each channel's retention.
    ///
    /// A channel that fails is reported and skipped; the rest still run.
    pub async fn run_pruning_sweep(
        &self,
        _guard: &ProcessingGuard,
        now: DateTime<Utc>,
    ) -> PruningReport {
        let mut report = PruningReport::default();

        for policy in &self.policies {
            let Some(cutoff) = cutoff(now, policy.delete_older_than_days) else {
                tracing::debug!(
                    channel_id = policy.channel_id,
                    days = policy.delete_older_than_days,
                    "retention reaches before the epoch, nothing to prune"
                );
                continue;
            };

            let expired = match self.ops.messages_older_than(policy.channel_id, cutoff).await {
                Ok(expired) => expired,
                Err(error) => {
                    tracing::warn!(
                        channel_id = policy.channel_id,
                        channel_name = %policy.channel_name,
                        %error,
                        "failed to list messages for pruning"
                    );
                    report.failed_channels.push(policy.channel_id);
                    continue;
                }
            };

            if expired.is_empty() {
                continue;
            }

            if self.dry_run {
                tracing::info!(
                    channel_id = policy.channel_id,
                    channel_name = %policy.channel_name,
                    count = expired.len(),
                    %cutoff,
                    "dry run: would delete messages"
                );
                report.deleted += expired.len();
                continue;
            }

            for message_id in expired {
                match self.ops.delete_message(policy.channel_id, message_id).await {
                    Ok(()) => report.deleted += 1,
                    Err(error) => {
                        tracing::warn!(
                            channel_id = policy.channel_id,
                            message_id,
                            %error,
                            "failed to delete message"
                        );
                        report.failed_deletions += 1;
                    }
                }
            }

            tracing::info!(
                channel_id = policy.channel_id,
                channel_name = %policy.channel_name,
                %cutoff,
                "pruned channel"
            );
        }

        report
    }
}

fn cutoff(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(TimeDelta::try_days(days)?)
}
