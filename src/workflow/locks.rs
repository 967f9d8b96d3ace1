use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::types::TransientId;

/// Entries not held by anyone are dropped once the table grows past this
const PRUNE_THRESHOLD: usize = 1024;

/// One async lock per transient id, so read-validate-commit sequences on the
/// same transient never interleave while different transients run in parallel
#[derive(Debug, Default)]
pub struct TransientLocks {
    locks: Mutex<HashMap<TransientId, Arc<AsyncMutex<()>>>>,
}

impl TransientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, transient_id: TransientId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(transient_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}
