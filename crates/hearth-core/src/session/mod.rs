// ── Dashboard session ──
//
// One coordination context per dashboard: cache store, subscription
// registry, entity store, and fetch coordinator, plus the backend they
// are attached to. Constructed explicitly and torn down with `shutdown()`.

mod connection;
mod consumers;

use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{Backend, PushEvent, ServiceCall};
use crate::cache::{CacheStorage, CacheStore};
use crate::clock::{self, SharedClock};
use crate::config::SessionConfig;
use crate::debounce::Debouncer;
use crate::error::CoreError;
use crate::fetch::{FetchCoordinator, FetchHandle, Fetcher, fetcher};
use crate::model::{DateRange, Entity, EntityId, ForecastKind, events_key, forecast_key};
use crate::registry::SubscriptionRegistry;
use crate::schedule::HourlyRefresh;
use crate::store::EntityStore;
use crate::stream::EntityWatch;

use self::connection::Connection;
use self::consumers::{fetch_events, fetch_forecast, invalidate_and_refetch, subscribe_group};
pub use self::consumers::{CalendarEvents, ScheduledForecast};

struct SessionInner {
    config: SessionConfig,
    clock: SharedClock,
    cache: Arc<CacheStore>,
    registry: SubscriptionRegistry,
    store: EntityStore,
    fetches: FetchCoordinator,
    connection: Arc<Connection>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// The coordination context of one dashboard.
///
/// Cheaply cloneable; clones share all state. Nothing here is global: two
/// sessions over the same storage coordinate independently.
#[derive(Clone)]
pub struct DashboardSession {
    inner: Arc<SessionInner>,
}

impl DashboardSession {
    /// Create a session on the system clock.
    pub fn new(config: SessionConfig, storage: Arc<dyn CacheStorage>) -> Self {
        Self::with_clock(config, storage, clock::system())
    }

    pub fn with_clock(
        config: SessionConfig,
        storage: Arc<dyn CacheStorage>,
        clock: SharedClock,
    ) -> Self {
        let cache = Arc::new(CacheStore::new(
            storage,
            config.cache_prefix.clone(),
            config.cache_ttl,
            Arc::clone(&clock),
        ));
        debug!(
            ttl_s = config.cache_ttl.as_secs(),
            prefix = %config.cache_prefix,
            "dashboard session created"
        );
        Self {
            inner: Arc::new(SessionInner {
                fetches: FetchCoordinator::new(Arc::clone(&cache)),
                cache,
                clock,
                config,
                registry: SubscriptionRegistry::new(),
                store: EntityStore::new(),
                connection: Arc::new(Connection::default()),
                cancel: CancellationToken::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.inner.cache
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &EntityStore {
        &self.inner.store
    }

    pub fn fetches(&self) -> &FetchCoordinator {
        &self.inner.fetches
    }

    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    // ── Backend lifecycle ────────────────────────────────────────────

    /// Attach `backend` and seed the entity store from its snapshot.
    ///
    /// Watched entities are notified with their seeded value.
    pub fn attach_backend(&self, backend: Arc<dyn Backend>) {
        self.inner.connection.attach(backend);
        let entities = self.inner.connection.entities().unwrap_or_default();
        info!(entities = entities.len(), "backend attached");
        self.inner.store.apply_snapshot(entities);
        for id in self.inner.registry.watched_ids() {
            let current = self.inner.store.get(&id);
            self.inner.registry.notify(&id, current.as_ref());
        }
    }

    /// Detach the current backend. Entity values and cached data stay readable;
    /// fetches issued from now on fail with [`CoreError::ConnectionUnavailable`].
    pub fn detach_backend(&self) {
        if self.inner.connection.detach() {
            info!("backend detached");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_attached()
    }

    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.inner.connection.attached_since()
    }

    /// Issue one request against the attached backend.
    pub async fn call_service(&self, call: ServiceCall) -> Result<Value, CoreError> {
        self.inner.connection.call(call).await
    }

    // ── Push events ──────────────────────────────────────────────────

    /// Apply one push event: update the entity store, then deliver the
    /// change to that entity's listeners.
    pub fn apply_push(&self, event: PushEvent) {
        self.inner.apply_push(event);
    }

    /// Consume push events from `rx` until it closes or the session shuts down.
    pub fn spawn_push_bridge(&self, mut rx: mpsc::Receiver<PushEvent>) {
        let session: Weak<SessionInner> = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.child_token();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        let Some(session) = session.upgrade() else { break };
                        session.apply_push(event);
                    }
                }
            }
            debug!("push bridge stopped");
        });
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Open a push channel sized per [`SessionConfig::push_channel_size`]
    /// and bridge it into the session.
    pub fn push_channel(&self) -> mpsc::Sender<PushEvent> {
        let (tx, rx) = mpsc::channel(self.inner.config.push_channel_size.max(1));
        self.spawn_push_bridge(rx);
        tx
    }

    // ── Consumer API ─────────────────────────────────────────────────

    /// Observe one entity (`useEntity`).
    pub fn entity(&self, entity_id: impl Into<EntityId>) -> EntityWatch {
        let entity_id = entity_id.into();
        let (tx, rx) = watch::channel(None);
        let tx = Arc::new(tx);

        let listener_tx = Arc::clone(&tx);
        let subscription = self
            .inner
            .registry
            .subscribe(entity_id.clone(), move |entity: Option<&Arc<Entity>>| {
                listener_tx.send_replace(entity.cloned());
            });

        // Seed after subscribing so no change slips between the two; a value
        // already delivered by the listener is newer than the store read.
        let store = &self.inner.store;
        tx.send_if_modified(|current| {
            if current.is_none() {
                *current = store.get(&entity_id);
            }
            false
        });

        EntityWatch::new(entity_id, rx, subscription)
    }

    /// Keyed stale-while-revalidate fetch (`useCachedFetch`).
    ///
    /// Seeds from cache, then issues the first fetch immediately. Changing
    /// parameters means a new key: use [`FetchHandle::rekey`].
    pub fn cached_fetch(&self, key: impl Into<String>, fetcher: Fetcher) -> FetchHandle {
        let handle = self.inner.fetches.register(key, fetcher);
        handle.refetch();
        handle
    }

    /// Merged events of `calendar_ids` over `range` (`useMultiSourceEvents`).
    pub fn multi_source_events(
        &self,
        calendar_ids: impl IntoIterator<Item = impl Into<EntityId>>,
        range: DateRange,
    ) -> CalendarEvents {
        let ids: Arc<[EntityId]> = calendar_ids.into_iter().map(Into::into).collect();
        let key = events_key(&ids, &range);

        let connection = Arc::clone(&self.inner.connection);
        let fetch_ids = Arc::clone(&ids);
        let handle = self.cached_fetch(
            key.clone(),
            fetcher(move || fetch_events(Arc::clone(&connection), Arc::clone(&fetch_ids), range)),
        );

        // Any member change invalidates the whole range.
        let debouncer = Arc::new(Debouncer::spawn(
            self.inner.config.debounce_delay,
            &self.inner.cancel,
            invalidate_and_refetch(self.inner.fetches.clone(), key),
        ));
        let subscriptions = subscribe_group(&self.inner.registry, &ids, &debouncer);

        CalendarEvents::new(handle, ids, range, subscriptions, debouncer)
    }

    /// Forecast of a weather entity (`useScheduledForecast`).
    pub fn scheduled_forecast(
        &self,
        entity_id: impl Into<EntityId>,
        kind: ForecastKind,
    ) -> ScheduledForecast {
        let entity_id = entity_id.into();
        let key = forecast_key(&entity_id, kind);

        let connection = Arc::clone(&self.inner.connection);
        let fetch_id = entity_id.clone();
        let handle = self.cached_fetch(
            key.clone(),
            fetcher(move || fetch_forecast(Arc::clone(&connection), fetch_id.clone(), kind)),
        );

        let debouncer = Arc::new(Debouncer::spawn(
            self.inner.config.debounce_delay,
            &self.inner.cancel,
            invalidate_and_refetch(self.inner.fetches.clone(), key.clone()),
        ));
        let subscriptions =
            subscribe_group(&self.inner.registry, std::slice::from_ref(&entity_id), &debouncer);

        let hourly = self.inner.config.hourly_refresh.then(|| {
            let fetches = self.inner.fetches.clone();
            HourlyRefresh::spawn(Arc::clone(&self.inner.clock), &self.inner.cancel, move || {
                fetches.refetch(&key);
            })
        });

        ScheduledForecast::new(handle, entity_id, kind, subscriptions, debouncer, hourly)
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Stop every timer and background task and abort in-flight fetches.
    ///
    /// Cached data and entity values stay readable afterwards.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.fetches.abort_all();
        self.detach_backend();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            let _ = task.await;
        }
        info!("dashboard session shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl SessionInner {
    fn apply_push(&self, event: PushEvent) {
        let entity_id = event.entity_id.clone();
        let current = self.store.apply_push(event);
        let delivered = self.registry.notify(&entity_id, current.as_ref());
        debug!(entity = %entity_id, removed = current.is_none(), delivered, "push applied");
    }
}

impl std::fmt::Debug for DashboardSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardSession")
            .field("connected", &self.is_connected())
            .field("entities", &self.inner.store.len())
            .field("fetch_keys", &self.inner.fetches.keys().len())
            .finish_non_exhaustive()
    }
}
