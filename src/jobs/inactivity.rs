//! Moves members between the active and inactive roles.

use crate::UserId;
use crate::config::MemberActivityPolicy;
use crate::error::MessagingError;
use crate::jobs::activity::ActivityTracker;
use crate::messaging::traits::{ChannelMessage, ModerationOps};
use crate::processing::ProcessingGuard;

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InactivityReport {
    /// Demoted members, or those that would have been in dry-run mode.
    pub demoted: Vec<UserId>,
    pub failed: Vec<UserId>,
}

pub struct MemberActivityJob {
    policy: MemberActivityPolicy,
    ops: Arc<dyn ModerationOps>,
    activity: Arc<ActivityTracker>,
    dry_run: bool,
}

impl std::fmt::Debug for MemberActivityJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberActivityJob")
            .field("policy", &self.policy)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl MemberActivityJob {
    pub fn new(
        policy: MemberActivityPolicy,
        ops: Arc<dyn ModerationOps>,
        activity: Arc<ActivityTracker>,
        dry_run: bool,
    ) -> Self {
        Self {
            policy,
            ops,
            activity,
            dry_run,
        }
    }

    pub fn policy(&self) -> &MemberActivityPolicy {
        &self.policy
    }

    /// Demote every active-role member who has been silent longer than the
    /// configured number of days.
    pub async fn run_inactivity_sweep(
        &self,
        _guard: &ProcessingGuard,
        now: DateTime<Utc>,
    ) -> Result<InactivityReport, MessagingError> {
        let mut report = InactivityReport::default();
        let Some(threshold) = TimeDelta::try_days(self.policy.days_until_inactive) else {
            return Ok(report);
        };

        let members = self.ops.members_with_role(self.policy.active_role_id).await?;
        for user_id in members {
            let last_active = self.activity.last_active(user_id).await;
            if now.signed_duration_since(last_active) <= threshold {
                continue;
            }

            if self.dry_run {
                tracing::info!(
                    user_id,
                    %last_active,
                    inactive_role = %self.policy.inactive_role_name,
                    "dry run: would mark member inactive"
                );
                report.demoted.push(user_id);
                continue;
            }

            match self
                .ops
                .swap_role(user_id, self.policy.active_role_id, self.policy.inactive_role_id)
                .await
            {
                Ok(()) => {
                    tracing::info!(user_id, %last_active, "marked member inactive");
                    report.demoted.push(user_id);
                }
                Err(error) => {
                    tracing::warn!(user_id, %error, "failed to mark member inactive");
                    report.failed.push(user_id);
                }
            }
        }

        Ok(report)
    }

    /// Whether the author of `message` holds the inactive role and should be restored.
    pub fn needs_restore(&self, message: &ChannelMessage) -> bool {
        !message.author_is_bot && message.author_role_ids.contains(&self.policy.inactive_role_id)
    }

    /// Restore an inactive member who just posted. Returns whether a swap was made.
    pub async fn handle_member_message(
        &self,
        _guard: &ProcessingGuard,
        message: &ChannelMessage,
    ) -> Result<bool, MessagingError> {
        if !self.needs_restore(message) {
            return Ok(false);
        }

        if self.dry_run {
            tracing::info!(
                user_id = message.author_id,
                active_role = %self.policy.active_role_name,
                "dry run: would restore member to active"
            );
            return Ok(false);
        }

        self.ops
            .swap_role(
                message.author_id,
                self.policy.inactive_role_id,
                self.policy.active_role_id,
            )
            .await?;
        tracing::info!(user_id = message.author_id, "restored member to active");
        Ok(true)
    }
}
