use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow};

#[derive(Debug, Clone, FromRow)]
pub struct WeatherAlert {
    pub id: i64,
    pub trip_id: i64,
    pub date: NaiveDate,
    pub severity: String,
    pub summary: String,
    pub provider_payload: Option<Json<Value>>,
}

/// Alert as served to clients, with the payload's factor list lifted out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertDetail {
    pub id: i64,
    pub trip_id: i64,
    pub date: NaiveDate,
    pub severity: String,
    pub summary: String,
    #[serde(default)]
    pub contributing_factors: Vec<String>,
    #[serde(default)]
    pub provider_payload: Option<Value>,
}

impl From<WeatherAlert> for AlertDetail {
    fn from(alert: WeatherAlert) -> Self {
        let payload = alert.provider_payload.map(|Json(value)| value);
        let contributing_factors = payload
            .as_ref()
            .and_then(|value| value.get("factors"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: alert.id,
            trip_id: alert.trip_id,
            date: alert.date,
            severity: alert.severity,
            summary: alert.summary,
            contributing_factors,
            provider_payload: payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripWeatherDay {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub precip_prob: i64,
    pub summary: String,
    pub advice: String,
    pub risk_score: u32,
    pub risk_category: String,
    pub contributing_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripWeather {
    pub city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: Vec<TripWeatherDay>,
    #[serde(default)]
    pub alerts: Vec<AlertDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpactedEvent {
    pub id: i64,
    pub title: String,
    pub date: NaiveDate,
    pub category_type: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleImpact {
    pub event: ImpactedEvent,
    pub reason: String,
    pub factors: Vec<String>,
    pub suggested_date: Option<NaiveDate>,
    pub risk_score: u32,
}
