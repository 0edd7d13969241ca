// ── Composite consumers ──
//
// Bundles of fetch handle + registry subscriptions + timers that back the
// calendar and forecast widgets. Every resource is released on drop.

use std::sync::{Arc, Weak};

use serde_json::json;

use super::connection::Connection;
use crate::aggregate;
use crate::backend::ServiceCall;
use crate::debounce::Debouncer;
use crate::error::CoreError;
use crate::fetch::{FetchCoordinator, FetchHandle, FetchState, FetchStatus};
use crate::model::calendar::sort_by_start;
use crate::model::{
    CalendarEvent, DateRange, Entity, EntityId, Forecast, ForecastKind, parse_events_response,
    parse_forecast_response,
};
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::schedule::HourlyRefresh;

// ── Group wiring ──

/// Invalidate `key`'s persisted record, then refetch it.
pub(crate) fn invalidate_and_refetch(
    fetches: FetchCoordinator,
    key: String,
) -> impl Fn() + Send + Sync + 'static {
    move || {
        fetches.invalidate(&key);
        fetches.refetch(&key);
    }
}

/// Subscribe every id of a group so that any change re-arms `debouncer`.
pub(crate) fn subscribe_group(
    registry: &SubscriptionRegistry,
    ids: &[EntityId],
    debouncer: &Arc<Debouncer>,
) -> Vec<Subscription> {
    ids.iter()
        .map(|id| {
            let debouncer: Weak<Debouncer> = Arc::downgrade(debouncer);
            registry.subscribe(id.clone(), move |_: Option<&Arc<Entity>>| {
                if let Some(debouncer) = debouncer.upgrade() {
                    debouncer.trigger();
                }
            })
        })
        .collect()
}

// ── Fetchers ──

pub(crate) async fn fetch_events(
    connection: Arc<Connection>,
    ids: Arc<[EntityId]>,
    range: DateRange,
) -> Result<Vec<CalendarEvent>, CoreError> {
    if !ids.is_empty() && !connection.is_attached() {
        return Err(CoreError::ConnectionUnavailable);
    }
    let sourced = aggregate::fetch_all(&ids, |calendar_id| {
        let connection = Arc::clone(&connection);
        async move {
            let call = ServiceCall::new(
                "calendar",
                "get_events",
                range.service_data(),
                calendar_id.clone(),
            );
            let response = connection.call(call).await?;
            parse_events_response(&calendar_id, &response)
        }
    })
    .await;

    let mut events: Vec<CalendarEvent> = sourced
        .into_iter()
        .map(|s| CalendarEvent::from_raw(s.source_id, s.item))
        .collect();
    sort_by_start(&mut events);
    Ok(events)
}

pub(crate) async fn fetch_forecast(
    connection: Arc<Connection>,
    entity_id: EntityId,
    kind: ForecastKind,
) -> Result<Vec<Forecast>, CoreError> {
    let call = ServiceCall::new(
        "weather",
        "get_forecasts",
        json!({ "type": kind }),
        entity_id.clone(),
    );
    let response = connection.call(call).await?;
    parse_forecast_response(&entity_id, &response)
}

// ── Calendar events ──

/// Merged, provenance-tagged events of several calendars over one range
/// (`useMultiSourceEvents`).
///
/// Any change of any member calendar invalidates and refetches the whole
/// range after the debounce delay.
pub struct CalendarEvents {
    handle: FetchHandle,
    ids: Arc<[EntityId]>,
    range: DateRange,
    _subscriptions: Vec<Subscription>,
    _debouncer: Arc<Debouncer>,
}

impl CalendarEvents {
    pub(crate) fn new(
        handle: FetchHandle,
        ids: Arc<[EntityId]>,
        range: DateRange,
        subscriptions: Vec<Subscription>,
        debouncer: Arc<Debouncer>,
    ) -> Self {
        Self {
            handle,
            ids,
            range,
            _subscriptions: subscriptions,
            _debouncer: debouncer,
        }
    }

    pub fn calendar_ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    /// Events ordered by start time; empty while nothing has loaded.
    pub fn events(&self) -> Vec<CalendarEvent> {
        self.handle.data_as().unwrap_or_default()
    }

    pub fn status(&self) -> FetchStatus {
        self.handle.status()
    }

    pub fn is_loading(&self) -> bool {
        self.handle.is_loading()
    }

    pub fn error(&self) -> Option<Arc<CoreError>> {
        self.handle.error()
    }

    pub fn refetch(&self) -> u64 {
        self.handle.refetch()
    }

    pub fn handle(&self) -> &FetchHandle {
        &self.handle
    }

    pub async fn changed(&mut self) -> Option<FetchState> {
        self.handle.changed().await
    }

    pub async fn settled(&mut self) -> FetchState {
        self.handle.settled().await
    }
}

// ── Weather forecast ──

/// Forecast of one weather entity (`useScheduledForecast`).
///
/// Refetched after changes of the entity (debounced) and, unless disabled,
/// at every wall-clock hour.
pub struct ScheduledForecast {
    handle: FetchHandle,
    entity_id: EntityId,
    kind: ForecastKind,
    _subscriptions: Vec<Subscription>,
    _debouncer: Arc<Debouncer>,
    hourly: Option<HourlyRefresh>,
}

impl ScheduledForecast {
    pub(crate) fn new(
        handle: FetchHandle,
        entity_id: EntityId,
        kind: ForecastKind,
        subscriptions: Vec<Subscription>,
        debouncer: Arc<Debouncer>,
        hourly: Option<HourlyRefresh>,
    ) -> Self {
        Self {
            handle,
            entity_id,
            kind,
            _subscriptions: subscriptions,
            _debouncer: debouncer,
            hourly,
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn kind(&self) -> ForecastKind {
        self.kind
    }

    pub fn forecast(&self) -> Vec<Forecast> {
        self.handle.data_as().unwrap_or_default()
    }

    pub fn status(&self) -> FetchStatus {
        self.handle.status()
    }

    pub fn is_loading(&self) -> bool {
        self.handle.is_loading()
    }

    pub fn error(&self) -> Option<Arc<CoreError>> {
        self.handle.error()
    }

    pub fn refetch(&self) -> u64 {
        self.handle.refetch()
    }

    /// Hour boundaries fired so far; `None` when hourly refresh is off.
    pub fn hourly_refreshes(&self) -> Option<u64> {
        self.hourly.as_ref().map(HourlyRefresh::fired)
    }

    pub fn handle(&self) -> &FetchHandle {
        &self.handle
    }

    pub async fn changed(&mut self) -> Option<FetchState> {
        self.handle.changed().await
    }

    pub async fn settled(&mut self) -> FetchState {
        self.handle.settled().await
    }
}
