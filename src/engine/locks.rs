//! Per-key serialisation of message handling
//!
//! Two messages for the same `(rule, key)` must not interleave their
//! find-invoke-save cycles, while messages for different keys proceed in
//! parallel.

use crate::index::IndexKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the duration of one step cycle
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct KeyLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `(rule_name, key)`
    pub async fn acquire(&self, rule_name: &str, key: &IndexKey) -> KeyGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // Holders and waiters keep a clone, so a count of one means idle
            slots.retain(|_, lock| Arc::strong_count(lock) > 1);
            slots
                .entry(format!("{rule_name}\u{0}{}", key.canonical()))
                .or_default()
                .clone()
        };
        slot.lock_owned().await
    }

    /// Number of keys currently tracked
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
