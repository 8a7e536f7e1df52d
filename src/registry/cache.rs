//! Lazily filled subscriber lookup cache.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::{Mutex, RwLock};

use crate::gateway::StoreError;
use crate::message::{EndpointAddress, MessageType};

/// Per-process cache of message type -> subscribed endpoints.
///
/// Entries are filled on first lookup and never re-fetched or
/// invalidated: the subscriber set is treated as ground truth as of
/// first read, for the lifetime of the process.
///
/// The miss path takes one fill lock shared across all keys, so loads
/// for different message types serialize against each other. Each type
/// loads at most once, which makes that a warmup-only cost; the fast
/// path is a shared read of the stable map.
#[derive(Default)]
pub struct SubscriberCache {
    entries: RwLock<HashMap<MessageType, Vec<EndpointAddress>>>,
    fill: Mutex<()>,
}

impl SubscriberCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached entry for `key`, loading it through `load` on
    /// first access.
    ///
    /// Double-checked: the entry is re-probed under the fill lock, so
    /// concurrent misses for the same key issue exactly one load. A
    /// failed load is not cached; the error propagates and the next
    /// caller retries.
    pub async fn get_or_load<F, Fut>(
        &self,
        key: &MessageType,
        load: F,
    ) -> Result<Vec<EndpointAddress>, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<EndpointAddress>, StoreError>>,
    {
        if let Some(found) = self.entries.read().await.get(key) {
            return Ok(found.clone());
        }

        let _fill = self.fill.lock().await;
        if let Some(found) = self.entries.read().await.get(key) {
            return Ok(found.clone());
        }

        let loaded = load().await?;
        self.entries
            .write()
            .await
            .insert(key.clone(), loaded.clone());
        Ok(loaded)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
