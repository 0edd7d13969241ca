// ── Live entity domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity_id::EntityId;
use super::weather::ForecastKind;

/// A named piece of live state pushed by the backend.
///
/// At most one current value exists per id; a newer push replaces the
/// previous value wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: EntityId,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Entity {
    pub fn new(entity_id: impl Into<EntityId>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_changed: None,
            last_updated: None,
        }
    }

    /// Builder-style attribute insertion.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attribute("friendly_name").and_then(Value::as_str)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.state.as_str(), "unavailable" | "unknown")
    }

    /// Decode the attribute bag according to the entity's domain.
    ///
    /// Unknown domains, and known domains whose attributes do not decode,
    /// yield [`EntityKind::Generic`].
    pub fn kind(&self) -> EntityKind {
        let attrs = || Value::Object(self.attributes.clone());
        match self.entity_id.domain() {
            "weather" => serde_json::from_value(attrs())
                .map_or(EntityKind::Generic, EntityKind::Weather),
            "calendar" => serde_json::from_value(attrs())
                .map_or(EntityKind::Generic, EntityKind::Calendar),
            _ => EntityKind::Generic,
        }
    }
}

/// Typed view over an entity's attributes, selected by domain prefix.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum EntityKind {
    Weather(WeatherAttributes),
    Calendar(CalendarAttributes),
    Generic,
}

/// Weather entity feature bits, as advertised in `supported_features`.
pub mod weather_features {
    pub const FORECAST_DAILY: u32 = 1;
    pub const FORECAST_HOURLY: u32 = 2;
    pub const FORECAST_TWICE_DAILY: u32 = 4;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherAttributes {
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub temperature_unit: Option<String>,
    #[serde(default)]
    pub apparent_temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub pressure_unit: Option<String>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_speed_unit: Option<String>,
    #[serde(default)]
    pub wind_bearing: Option<f64>,
    #[serde(default)]
    pub visibility: Option<f64>,
    #[serde(default)]
    pub precipitation_unit: Option<String>,
    #[serde(default)]
    pub supported_features: u32,
}

impl WeatherAttributes {
    pub fn supports(&self, kind: ForecastKind) -> bool {
        self.supported_features & kind.feature_bit() != 0
    }
}

/// Attributes of a calendar entity: its next (or current) event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarAttributes {
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn weather_prefix_yields_weather_kind() {
        let entity = Entity::new("weather.home", "sunny")
            .with_attribute("temperature", json!(21.5))
            .with_attribute("supported_features", json!(3));

        let EntityKind::Weather(attrs) = entity.kind() else {
            panic!("expected weather kind");
        };
        assert_eq!(attrs.temperature, Some(21.5));
        assert!(attrs.supports(ForecastKind::Daily));
        assert!(attrs.supports(ForecastKind::Hourly));
        assert!(!attrs.supports(ForecastKind::TwiceDaily));
    }

    #[test]
    fn calendar_prefix_yields_calendar_kind() {
        let entity = Entity::new("calendar.family", "on")
            .with_attribute("message", json!("Dentist"))
            .with_attribute("all_day", json!(false));

        let EntityKind::Calendar(attrs) = entity.kind() else {
            panic!("expected calendar kind");
        };
        assert_eq!(attrs.message.as_deref(), Some("Dentist"));
    }

    #[test]
    fn unknown_prefix_falls_back_to_generic() {
        let entity = Entity::new("sensor.power", "412");
        assert_eq!(entity.kind(), EntityKind::Generic);
    }

    #[test]
    fn malformed_known_domain_falls_back_to_generic() {
        let entity = Entity::new("weather.home", "rainy")
            .with_attribute("temperature", json!("warm"));
        assert_eq!(entity.kind(), EntityKind::Generic);
    }

    #[test]
    fn unavailable_states() {
        assert!(Entity::new("weather.home", "unavailable").is_unavailable());
        assert!(!Entity::new("weather.home", "cloudy").is_unavailable());
    }
}
