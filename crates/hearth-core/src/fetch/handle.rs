// ── Consumer handle for one fetch key ──

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use super::coordinator::{FetchCoordinator, Fetcher};
use super::status::{FetchState, FetchStatus};
use crate::error::CoreError;

/// `{data, status, error, refetch}` for one key (`useCachedFetch`).
///
/// Holding a handle keeps the key's slot alive; dropping the last handle
/// aborts its in-flight fetch and releases the slot.
pub struct FetchHandle {
    coordinator: FetchCoordinator,
    key: String,
    receiver: watch::Receiver<FetchState>,
}

impl FetchHandle {
    pub(crate) fn new(
        coordinator: FetchCoordinator,
        key: String,
        receiver: watch::Receiver<FetchState>,
    ) -> Self {
        Self {
            coordinator,
            key,
            receiver,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> FetchState {
        self.receiver.borrow().clone()
    }

    pub fn data(&self) -> Option<Arc<Value>> {
        self.receiver.borrow().data.clone()
    }

    /// Current data decoded as `T`; `None` if absent or of another shape.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        let data = self.data()?;
        T::deserialize(data.as_ref()).ok()
    }

    pub fn status(&self) -> FetchStatus {
        self.receiver.borrow().status()
    }

    pub fn error(&self) -> Option<Arc<CoreError>> {
        self.receiver.borrow().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.status() == FetchStatus::Loading
    }

    /// Issue a new fetch, superseding any in flight. Returns its generation.
    pub fn refetch(&self) -> u64 {
        // The slot lives as long as this handle, so it is always registered.
        self.coordinator.refetch(&self.key).unwrap_or_default()
    }

    /// A receiver observing every state change of this key.
    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.receiver.clone()
    }

    /// Wait for the next state change.
    /// Returns `None` once the slot is gone.
    pub async fn changed(&mut self) -> Option<FetchState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until no fetch is in flight and return the settled state.
    pub async fn settled(&mut self) -> FetchState {
        let settled = self
            .receiver
            .wait_for(|s| !s.in_flight)
            .await
            .map(|state| FetchState::clone(&state));
        settled.unwrap_or_else(|_| self.state())
    }

    /// Switch this handle to another key (the consumer's parameters changed).
    ///
    /// The new key is seeded from cache like any first registration; the
    /// old key is released.
    pub fn rekey(&mut self, key: impl Into<String>, fetcher: Fetcher) {
        let key = key.into();
        if key == self.key {
            return;
        }
        let replacement = self.coordinator.register(key, fetcher);
        // Swapping routes the old key through `Drop` for release.
        drop(std::mem::replace(self, replacement));
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        self.coordinator.release(&self.key);
    }
}

impl std::fmt::Debug for FetchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchHandle")
            .field("key", &self.key)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
