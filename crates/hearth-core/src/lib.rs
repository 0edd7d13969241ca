//! Reactive entity/fetch coordination for smart-home dashboards.
//!
//! This crate sits between a push-based backend connection (live entity
//! state) and dashboard widgets that also need pull-based data derived
//! from it (calendar events, weather forecasts):
//!
//! - **[`DashboardSession`]**: The coordination context of one dashboard.
//!   [`attach_backend()`](DashboardSession::attach_backend) seeds the entity
//!   store; push events flow in through
//!   [`push_channel()`](DashboardSession::push_channel). Consumers call
//!   [`entity()`](DashboardSession::entity),
//!   [`cached_fetch()`](DashboardSession::cached_fetch),
//!   [`multi_source_events()`](DashboardSession::multi_source_events) and
//!   [`scheduled_forecast()`](DashboardSession::scheduled_forecast).
//!
//! - **[`CacheStore`]**: TTL cache of JSON records over a synchronous
//!   [`CacheStorage`] backend; never fails its callers.
//!
//! - **[`SubscriptionRegistry`]**: Entity id → listeners, with RAII
//!   [`Subscription`] guards and targeted delivery.
//!
//! - **[`FetchCoordinator`]**: Stale-while-revalidate keyed fetches with
//!   per-key generation tokens (the last issued fetch wins).
//!
//! - **[`Debouncer`]**, **[`HourlyRefresh`]** and [`aggregate::fetch_all`]:
//!   the timers and fan-out the composite consumers are built from.

pub mod aggregate;
pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod fetch;
pub mod model;
pub mod registry;
pub mod schedule;
pub mod session;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregate::Sourced;
pub use backend::{Backend, PushEvent, ServiceCall};
pub use cache::{CacheEntryInfo, CacheRecord, CacheStorage, CacheStore, FileStorage, MemoryStorage};
pub use clock::{Clock, SharedClock, SystemClock, TokioClock};
pub use config::SessionConfig;
pub use debounce::Debouncer;
pub use error::{BackendError, CoreError, StorageError};
pub use fetch::{FetchCoordinator, FetchHandle, FetchState, FetchStatus, Fetcher, fetcher};
pub use registry::{Subscription, SubscriptionRegistry};
pub use schedule::HourlyRefresh;
pub use session::{CalendarEvents, DashboardSession, ScheduledForecast};
pub use store::EntityStore;
pub use stream::{EntityUpdate, EntityWatch, EntityWatchStream};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    CalendarAttributes, CalendarEvent, DateRange, Entity, EntityId, EntityKind, Forecast,
    ForecastKind, WeatherAttributes,
};
