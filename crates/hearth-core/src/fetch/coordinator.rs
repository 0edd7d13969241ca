// ── Fetch coordinator ──
//
// Owns one slot per fetch key: the latest issued generation, the fetcher,
// the observable state, and the in-flight task. A result commits only if
// its generation is still the latest issued one for the key, checked and
// applied under the slot's map guard (last-issued-wins).

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use super::handle::FetchHandle;
use super::status::FetchState;
use crate::cache::CacheStore;
use crate::error::CoreError;

/// Produces the value for one fetch key.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, CoreError>> + Send + Sync>;

/// Wrap a typed async closure as a [`Fetcher`], serializing its output.
pub fn fetcher<F, Fut, T>(f: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
    T: Serialize,
{
    Arc::new(move || {
        let fut = f();
        async move {
            let value = fut.await?;
            serde_json::to_value(value)
                .map_err(|e| CoreError::Internal(format!("fetch result not serializable: {e}")))
        }
        .boxed()
    })
}

/// Outcome of applying a finished fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The result became the key's current value (or error).
    Applied,
    /// A newer fetch was issued meanwhile; the result was discarded.
    Superseded,
    /// Every handle for the key was dropped; nothing to apply to.
    Released,
}

struct FetchSlot {
    generation: u64,
    fetcher: Fetcher,
    state: watch::Sender<FetchState>,
    task: Option<AbortHandle>,
    handles: usize,
}

pub(crate) struct CoordinatorInner {
    cache: Arc<CacheStore>,
    slots: DashMap<String, FetchSlot>,
}

/// Tracks every keyed fetch of a session.
///
/// Cheaply cloneable; clones share all slots.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl FetchCoordinator {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                cache,
                slots: DashMap::new(),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.inner.cache
    }

    /// Observe `key`, fetching it with `fetcher`.
    ///
    /// The first registration of a key seeds its data synchronously from
    /// the cache store. Later registrations share the slot and replace its
    /// fetcher. No fetch is issued; call [`FetchHandle::refetch`].
    pub fn register(&self, key: impl Into<String>, fetcher: Fetcher) -> FetchHandle {
        let key = key.into();
        let receiver = match self.inner.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.handles += 1;
                slot.fetcher = fetcher;
                slot.state.subscribe()
            }
            Entry::Vacant(vacant) => {
                let seeded = self.inner.cache.load(&key);
                debug!(key = %key, cache_hit = seeded.is_some(), "fetch key registered");
                let (state, receiver) = watch::channel(FetchState {
                    data: seeded.map(Arc::new),
                    ..FetchState::default()
                });
                vacant.insert(FetchSlot {
                    generation: 0,
                    fetcher,
                    state,
                    task: None,
                    handles: 1,
                });
                receiver
            }
        };
        FetchHandle::new(self.clone(), key, receiver)
    }

    /// Issue a new fetch for `key`, superseding any in flight.
    ///
    /// Returns the generation issued, or `None` for an unregistered key.
    /// Must be called from within a tokio runtime.
    pub fn refetch(&self, key: &str) -> Option<u64> {
        let (generation, fetcher, previous) = {
            let mut slot = self.inner.slots.get_mut(key)?;
            slot.generation += 1;
            let generation = slot.generation;
            slot.state.send_modify(|s| {
                s.in_flight = true;
                s.generation = generation;
            });
            (generation, Arc::clone(&slot.fetcher), slot.task.take())
        };
        if let Some(previous) = previous {
            previous.abort();
        }
        debug!(key, generation, "fetch issued");

        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_owned();
        let task = tokio::spawn(async move {
            let result = fetcher().await;
            inner.commit(&owned_key, generation, result);
        });

        if let Some(mut slot) = self.inner.slots.get_mut(key) {
            if slot.generation == generation {
                slot.task = Some(task.abort_handle());
            }
        }
        Some(generation)
    }

    /// Issue a fetch for every key the coordinator tracks.
    pub fn refetch_all(&self) -> usize {
        self.keys().iter().filter(|k| self.refetch(k).is_some()).count()
    }

    /// Drop the persisted record for `key`; live data is left in place.
    pub fn invalidate(&self, key: &str) {
        self.inner.cache.invalidate(key);
    }

    pub fn state(&self, key: &str) -> Option<FetchState> {
        self.inner.slots.get(key).map(|s| s.state.borrow().clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.slots.iter().map(|r| r.key().clone()).collect()
    }

    /// Apply a finished fetch of `generation` to `key`.
    pub fn commit(&self, key: &str, generation: u64, result: Result<Value, CoreError>) -> Commit {
        self.inner.commit(key, generation, result)
    }

    /// Abort every in-flight fetch. Slots and their data stay readable.
    pub fn abort_all(&self) {
        for mut slot in self.inner.slots.iter_mut() {
            if let Some(task) = slot.task.take() {
                task.abort();
            }
            slot.state.send_if_modified(|s| std::mem::take(&mut s.in_flight));
        }
    }

    pub(crate) fn release(&self, key: &str) {
        if let Entry::Occupied(mut occupied) = self.inner.slots.entry(key.to_owned()) {
            let slot = occupied.get_mut();
            slot.handles = slot.handles.saturating_sub(1);
            if slot.handles == 0 {
                let slot = occupied.remove();
                if let Some(task) = slot.task {
                    task.abort();
                }
                debug!(key, "fetch key released");
            }
        }
    }
}

impl CoordinatorInner {
    fn commit(&self, key: &str, generation: u64, result: Result<Value, CoreError>) -> Commit {
        let Some(mut slot) = self.slots.get_mut(key) else {
            return Commit::Released;
        };
        if slot.generation != generation {
            debug!(key, generation, latest = slot.generation, "discarding superseded fetch result");
            return Commit::Superseded;
        }
        slot.task = None;

        match result {
            Ok(value) => {
                // Persist under the guard so cache order matches commit order.
                self.cache.save(key, &value);
                slot.state.send_modify(|s| {
                    s.data = Some(Arc::new(value));
                    s.fresh = true;
                    s.in_flight = false;
                    s.error = None;
                    s.committed_generation = generation;
                });
                debug!(key, generation, "fetch committed");
            }
            Err(err) => {
                warn!(key, generation, error = %err, "fetch failed");
                slot.state.send_modify(|s| {
                    s.in_flight = false;
                    s.error = Some(Arc::new(err));
                });
            }
        }
        Commit::Applied
    }
}
