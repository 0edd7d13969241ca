// ── Domain model ──
//
// Live entities pushed by the backend and the derived data (calendar
// events, weather forecasts) fetched on their behalf.

pub mod calendar;
pub mod entity;
pub mod entity_id;
pub mod weather;

pub use calendar::{CalendarEvent, DateRange, RawCalendarEvent, events_key, parse_events_response};
pub use entity::{CalendarAttributes, Entity, EntityKind, WeatherAttributes, weather_features};
pub use entity_id::EntityId;
pub use weather::{Forecast, ForecastKind, forecast_key, parse_forecast_response};
