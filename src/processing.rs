//! The processing lock serializing periodic sweeps and configuration reloads.
//!
//! Entry points that touch the active configuration or the services built
//! from it take a `&ProcessingGuard`, so they cannot be called without some
//! lock having been acquired first. The type does not say *which* lock: every
//! guard must come from the one `ProcessingLock` owned by the `Bot`. The guard
//! releases on drop, including on early returns and error paths.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct ProcessingLock {
    inner: Arc<Mutex<()>>,
}

/// Proof that the holder has exclusive use of the configuration and its services.
#[derive(Debug)]
pub struct ProcessingGuard {
    _guard: OwnedMutexGuard<()>,
}

impl ProcessingLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access. Waiters are served in FIFO order.
    pub async fn acquire(&self) -> ProcessingGuard {
        ProcessingGuard {
            _guard: self.inner.clone().lock_owned().await,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
