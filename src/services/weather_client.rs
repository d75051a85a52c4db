//! Forecast lookups against Open-Meteo.
//!
//! A trip only stores a destination name, so every lookup is two calls: the
//! geocoding search resolves the name to coordinates and the forecast
//! endpoint returns the daily series for the trip's dates.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::AppError;

const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_probability_max,precipitation_sum,windgusts_10m_max,windspeed_10m_max,apparent_temperature_max,apparent_temperature_min,weathercode";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// One forecast day, with gaps in the provider's series already filled.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub precip_prob: i64,
    pub precip_sum: f64,
    pub wind_gust: f64,
    pub wind_speed: f64,
    pub apparent_max: f64,
    pub apparent_min: f64,
    pub weather_code: Option<i64>,
    pub summary: String,
    pub advice: String,
}

impl ForecastDay {
    /// A dry, mild day with no wind.
    pub fn calm(date: NaiveDate) -> Self {
        let (summary, advice) = describe(0, Some(22.0), Some(14.0));
        Self {
            date,
            temp_max: 22.0,
            temp_min: 14.0,
            precip_prob: 0,
            precip_sum: 0.0,
            wind_gust: 0.0,
            wind_speed: 0.0,
            apparent_max: 22.0,
            apparent_min: 14.0,
            weather_code: None,
            summary,
            advice,
        }
    }
}

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn geocode(&self, name: &str) -> Result<Option<Coordinates>, AppError>;

    async fn daily_forecast(
        &self,
        at: Coordinates,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ForecastDay>, AppError>;
}

#[derive(Clone)]
pub struct OpenMeteo {
    http: reqwest::Client,
    geocoding_url: Url,
    forecast_url: Url,
}

impl OpenMeteo {
    pub fn new(geocoding_url: Url, forecast_url: Url) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            geocoding_url,
            forecast_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    daily: DailySeries,
}

#[derive(Debug, Default, Deserialize)]
struct DailySeries {
    #[serde(default)]
    time: Vec<NaiveDate>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    windgusts_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    windspeed_10m_max: Vec<Option<f64>>,
    #[serde(default)]
    apparent_temperature_max: Vec<Option<f64>>,
    #[serde(default)]
    apparent_temperature_min: Vec<Option<f64>>,
    #[serde(default)]
    weathercode: Vec<Option<i64>>,
}

fn value_at<T: Copy>(series: &[Option<T>], idx: usize) -> Option<T> {
    series.get(idx).copied().flatten()
}

impl DailySeries {
    fn into_days(self) -> Vec<ForecastDay> {
        self.time
            .iter()
            .enumerate()
            .map(|(idx, &date)| {
                let hi = value_at(&self.temperature_2m_max, idx);
                let lo = value_at(&self.temperature_2m_min, idx);
                let prob = value_at(&self.precipitation_probability_max, idx).unwrap_or(0.0) as i64;
                let (summary, advice) = describe(prob, hi, lo);
                ForecastDay {
                    date,
                    temp_max: hi.unwrap_or(0.0),
                    temp_min: lo.unwrap_or(0.0),
                    precip_prob: prob,
                    precip_sum: value_at(&self.precipitation_sum, idx).unwrap_or(0.0),
                    wind_gust: value_at(&self.windgusts_10m_max, idx).unwrap_or(0.0),
                    wind_speed: value_at(&self.windspeed_10m_max, idx).unwrap_or(0.0),
                    apparent_max: value_at(&self.apparent_temperature_max, idx)
                        .or(hi)
                        .unwrap_or(0.0),
                    apparent_min: value_at(&self.apparent_temperature_min, idx)
                        .or(lo)
                        .unwrap_or(0.0),
                    weather_code: value_at(&self.weathercode, idx),
                    summary,
                    advice,
                }
            })
            .collect()
    }
}

/// Short summary and traveller advice for a day. Temperature advice wins
/// over precipitation advice; cold wins over heat.
pub fn describe(precip_prob: i64, temp_max: Option<f64>, temp_min: Option<f64>) -> (String, String) {
    let (summary, mut advice) = if precip_prob >= 70 {
        (
            "Rainy",
            "Heavy rain expected – plan indoor activities or rideshares.",
        )
    } else if precip_prob >= 40 {
        (
            "Cloudy",
            "Chance of showers – keep an umbrella handy and have a backup indoor option.",
        )
    } else {
        (
            "Clear",
            "Good weather – great day for walking and outdoor plans.",
        )
    };
    if temp_max.is_some_and(|hi| hi >= 32.0) {
        advice = "Very hot – schedule outdoor activities early and stay hydrated.";
    }
    if temp_min.is_some_and(|lo| lo <= 2.0) {
        advice = "Cold weather – bring layers and keep walks shorter.";
    }
    (summary.to_string(), advice.to_string())
}

#[async_trait]
impl ForecastProvider for OpenMeteo {
    async fn geocode(&self, name: &str) -> Result<Option<Coordinates>, AppError> {
        let response = self
            .http
            .get(self.geocoding_url.clone())
            .query(&[("name", name), ("count", "1")])
            .send()
            .await?
            .error_for_status()?;
        let body: GeocodingResponse = response.json().await?;
        let coords = body
            .results
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|first| Coordinates {
                latitude: first.latitude,
                longitude: first.longitude,
            });
        debug!(name, found = coords.is_some(), "geocoded destination");
        Ok(coords)
    }

    async fn daily_forecast(
        &self,
        at: Coordinates,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ForecastDay>, AppError> {
        let response = self
            .http
            .get(self.forecast_url.clone())
            .query(&[
                ("latitude", at.latitude.to_string()),
                ("longitude", at.longitude.to_string()),
                ("start_date", start.to_string()),
                ("end_date", end.to_string()),
                ("daily", DAILY_FIELDS.to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: ForecastResponse = response.json().await?;
        Ok(body.daily.into_days())
    }
}

/// Geocodes `name`; provider failures count as "not found".
pub async fn locate(provider: &dyn ForecastProvider, name: &str) -> Option<Coordinates> {
    match provider.geocode(name).await {
        Ok(coords) => coords,
        Err(err) => {
            warn!("geocoding '{name}' failed: {err}");
            None
        }
    }
}

/// Fetches the forecast; provider failures yield no days.
pub async fn forecast_or_empty(
    provider: &dyn ForecastProvider,
    at: Coordinates,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<ForecastDay> {
    match provider.daily_forecast(at, start, end).await {
        Ok(days) => days,
        Err(err) => {
            warn!("forecast lookup failed: {err}");
            Vec::new()
        }
    }
}
