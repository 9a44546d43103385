//! Per-key busy flags with scoped release.
//!
//! `BusyMap::acquire` marks a key busy and hands back a guard; dropping the
//! guard clears the flag, so early returns, `?` and task aborts all release.
//! Readers subscribe to the whole map through a `watch` channel.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::watch;

pub struct BusyMap<K> {
    tx: Arc<watch::Sender<HashMap<K, bool>>>,
}

impl<K> Clone for BusyMap<K> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<K: Clone + Eq + Hash> Default for BusyMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash> BusyMap<K> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HashMap::new());
        Self { tx: Arc::new(tx) }
    }

    pub fn acquire(&self, key: K) -> BusyGuard<K> {
        self.set(&key, true);
        BusyGuard {
            map: self.clone(),
            key,
        }
    }

    pub fn is_busy(&self, key: &K) -> bool {
        self.tx.borrow().get(key).copied().unwrap_or(false)
    }

    /// Copy of the current map.  Released keys stay present as `false`.
    pub fn snapshot(&self) -> HashMap<K, bool> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HashMap<K, bool>> {
        self.tx.subscribe()
    }

    fn set(&self, key: &K, busy: bool) {
        self.tx.send_modify(|map| {
            map.insert(key.clone(), busy);
        });
    }
}

/// Clears its key on drop.
pub struct BusyGuard<K: Clone + Eq + Hash> {
    map: BusyMap<K>,
    key: K,
}

impl<K: Clone + Eq + Hash> Drop for BusyGuard<K> {
    fn drop(&mut self) {
        self.map.set(&self.key, false);
    }
}
