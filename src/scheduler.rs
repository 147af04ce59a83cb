//! Periodic sweeps over the active service graph.
//!
//! One tokio task ticks on a fixed interval. Each tick takes the processing
//! lock, so a sweep never overlaps a configuration reload.

use crate::bot::Bot;
use crate::jobs::{InactivityReport, PruningReport};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// `None` when the member list could not be fetched.
    pub inactivity: Option<InactivityReport>,
    pub pruning: PruningReport,
}

/// Start the sweep loop. The first sweep runs one interval from now.
pub fn spawn(bot: Arc<Bot>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        // A slow sweep delays the next one instead of bursting to catch up.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(interval_secs = interval.as_secs(), "sweep loop started");
        loop {
            ticker.tick().await;
            run_sweep_cycle(&bot, Utc::now()).await;
        }
    })
}

/// Run the inactivity sweep then the pruning sweep under the processing lock.
///
/// Job failures are logged and never end the loop.
#[tracing::instrument(skip(bot))]
pub async fn run_sweep_cycle(bot: &Bot, now: DateTime<Utc>) -> Option<SweepReport> {
    let guard = bot.processing_lock().acquire().await;
    let Some(services) = bot.services() else {
        tracing::debug!("no active configuration, skipping sweep");
        return None;
    };

    let inactivity = match services.inactivity.run_inactivity_sweep(&guard, now).await {
        Ok(report) => Some(report),
        Err(error) => {
            tracing::error!(%error, "inactivity sweep failed");
            None
        }
    };

    let pruning = services.pruning.run_pruning_sweep(&guard, now).await;
    if !pruning.failed_channels.is_empty() {
        tracing::error!(failed_channels = ?pruning.failed_channels, "pruning sweep failed for some channels");
    }

    tracing::info!(
        demoted = inactivity.as_ref().map_or(0, |report| report.demoted.len()),
        deleted = pruning.deleted,
        "sweep finished"
    );

    Some(SweepReport { inactivity, pruning })
}
