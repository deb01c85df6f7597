//! Per-city critical sections.
//!
//! Lot consumption and the zero-lot purge are not atomic as a unit, so at
//! most one allocation may be in flight per city. Different cities never
//! share a lock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::trace;

#[derive(Default)]
pub struct CityLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl CityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `city`. Held until the guard drops.
    pub async fn lock(&self, city: &str) -> OwnedMutexGuard<()> {
        let existing = self.locks.read().await.get(city).cloned();
        let lock = match existing {
            Some(lock) => lock,
            None => self
                .locks
                .write()
                .await
                .entry(city.to_string())
                .or_default()
                .clone(),
        };
        trace!(city, "Acquiring city lock");
        lock.lock_owned().await
    }

    /// `true` while some task holds the city's lock.
    pub async fn is_locked(&self, city: &str) -> bool {
        match self.locks.read().await.get(city) {
            Some(lock) => lock.try_lock().is_err(),
            None => false,
        }
    }
}
