//! Last-seen times for guild members.

use crate::UserId;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory record of when each member last posted.
///
/// Lives for the whole process and is shared by every service graph, so a
/// config reload never forgets activity. Nothing is persisted: after a
/// restart every member counts as last seen at process start.
#[derive(Debug)]
pub struct ActivityTracker {
    started_at: DateTime<Utc>,
    last_seen: RwLock<HashMap<UserId, DateTime<Utc>>>,
}

impl ActivityTracker {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            last_seen: RwLock::new(HashMap::new()),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Record a message. Out-of-order events never move a member backwards.
    pub async fn record(&self, user_id: UserId, at: DateTime<Utc>) {
        let mut last_seen = self.last_seen.write().await;
        let entry = last_seen.entry(user_id).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    /// When the member was last seen, or when tracking began if never.
    pub async fn last_active(&self, user_id: UserId) -> DateTime<Utc> {
        self.last_seen
            .read()
            .await
            .get(&user_id)
            .copied()
            .unwrap_or(self.started_at)
    }

    pub async fn tracked_members(&self) -> usize {
        self.last_seen.read().await.len()
    }
}
