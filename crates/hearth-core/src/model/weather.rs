// ── Weather forecast domain types ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::entity::weather_features;
use super::entity_id::EntityId;
use crate::error::CoreError;

/// Forecast granularity accepted by `weather.get_forecasts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastKind {
    Daily,
    Hourly,
    TwiceDaily,
}

impl ForecastKind {
    pub(crate) fn feature_bit(self) -> u32 {
        match self {
            Self::Daily => weather_features::FORECAST_DAILY,
            Self::Hourly => weather_features::FORECAST_HOURLY,
            Self::TwiceDaily => weather_features::FORECAST_TWICE_DAILY,
        }
    }
}

/// One forecast period.
///
/// Fields the dashboard does not interpret are kept in `extra` so a
/// cached forecast round-trips without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub datetime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templow: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precipitation_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_bearing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_daytime: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cache key for a forecast of one weather entity.
pub fn forecast_key(entity_id: &EntityId, kind: ForecastKind) -> String {
    format!("forecast:{entity_id}:{kind}")
}

/// Extract the forecast list for `entity_id` from a `get_forecasts` response.
///
/// Accepts both the bare `{ "<entity>": { "forecast": [...] } }` shape and
/// the same payload wrapped in a `response` object.
pub fn parse_forecast_response(
    entity_id: &EntityId,
    response: &Value,
) -> Result<Vec<Forecast>, CoreError> {
    let context = format!("reading forecast for {entity_id}");
    let body = response.get("response").unwrap_or(response);
    let Some(forecast) = body
        .get(entity_id.as_str())
        .and_then(|entry| entry.get("forecast"))
    else {
        return Err(CoreError::decode(context, "missing forecast list"));
    };
    serde_json::from_value(forecast.clone()).map_err(|e| CoreError::decode(context, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn forecast_kind_wire_names() {
        assert_eq!(ForecastKind::TwiceDaily.to_string(), "twice_daily");
        assert_eq!("hourly".parse::<ForecastKind>().unwrap(), ForecastKind::Hourly);
    }

    #[test]
    fn key_includes_entity_and_kind() {
        let key = forecast_key(&EntityId::from("weather.home"), ForecastKind::Daily);
        assert_eq!(key, "forecast:weather.home:daily");
    }

    #[test]
    fn parses_wrapped_response() {
        let response = json!({
            "response": {
                "weather.home": {
                    "forecast": [
                        { "datetime": "2026-10-14T10:00:00Z", "temperature": 70.0, "uv_index": 3 }
                    ]
                }
            }
        });
        let forecast = parse_forecast_response(&EntityId::from("weather.home"), &response).unwrap();
        assert_eq!(forecast.len(), 1);
        assert_eq!(forecast[0].temperature, Some(70.0));
        assert_eq!(forecast[0].extra.get("uv_index"), Some(&json!(3)));
    }

    #[test]
    fn missing_entity_is_decode_error() {
        let response = json!({ "weather.other": { "forecast": [] } });
        let err = parse_forecast_response(&EntityId::from("weather.home"), &response).unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }
}
