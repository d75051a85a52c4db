//! Risk scoring for forecast days, and the alerts derived from it.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde_json::json;
use sqlx::types::Json;
use tracing::debug;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        event::Event,
        trip::Trip,
        weather::{AlertDetail, ImpactedEvent, ScheduleImpact, TripWeatherDay, WeatherAlert},
    },
    services::weather_client::ForecastDay,
};

pub const ALERT_THRESHOLD: u32 = 60;
const HIGH_SEVERITY_SCORE: u32 = 75;
const SAFE_SCORE: u32 = 30;
const RISKY_CATEGORIES: [&str; 3] = ["outdoor", "water", "hiking"];

const ALERT_COLUMNS: &str = "id, trip_id, date, severity, summary, provider_payload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
}

impl RiskCategory {
    pub fn from_score(score: u32) -> Self {
        if score >= 60 {
            RiskCategory::High
        } else if score >= 30 {
            RiskCategory::Moderate
        } else {
            RiskCategory::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "low",
            RiskCategory::Moderate => "moderate",
            RiskCategory::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub score: u32,
    pub category: RiskCategory,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDay {
    pub day: ForecastDay,
    pub risk: RiskAssessment,
}

impl From<&ScoredDay> for TripWeatherDay {
    fn from(scored: &ScoredDay) -> Self {
        Self {
            date: scored.day.date,
            temp_max: scored.day.temp_max,
            temp_min: scored.day.temp_min,
            precip_prob: scored.day.precip_prob,
            summary: scored.day.summary.clone(),
            advice: scored.day.advice.clone(),
            risk_score: scored.risk.score,
            risk_category: scored.risk.category.as_str().to_string(),
            contributing_factors: scored.risk.factors.clone(),
        }
    }
}

pub fn score_day(day: &ForecastDay) -> RiskAssessment {
    let mut score = 0u32;
    let mut factors = Vec::new();
    let mut add = |points: u32, factor: &str| {
        score += points;
        factors.push(factor.to_string());
    };

    if day.precip_prob >= 70 {
        add(25, "Heavy rain likely");
    } else if day.precip_prob >= 40 {
        add(15, "Chance of showers");
    }

    if day.precip_sum >= 10.0 {
        add(15, "Significant precipitation");
    } else if day.precip_sum >= 5.0 {
        add(8, "Moderate precipitation");
    }

    if day.wind_gust >= 50.0 || day.wind_speed >= 45.0 {
        add(25, "Severe wind gusts");
    } else if day.wind_gust >= 35.0 || day.wind_speed >= 30.0 {
        add(15, "Strong wind");
    } else if day.wind_gust >= 25.0 {
        add(8, "Breezy conditions");
    }

    if day.apparent_max >= 38.0 {
        add(20, "Extreme heat");
    } else if day.apparent_max >= 32.0 {
        add(12, "Hot temperatures");
    }

    if day.apparent_min <= -5.0 {
        add(20, "Extreme cold");
    } else if day.apparent_min <= 3.0 {
        add(10, "Cold temperatures");
    }

    let score = score.min(100);
    RiskAssessment {
        score,
        category: RiskCategory::from_score(score),
        factors,
    }
}

pub fn annotate(days: Vec<ForecastDay>) -> Vec<ScoredDay> {
    days.into_iter()
        .map(|day| {
            let risk = score_day(&day);
            ScoredDay { day, risk }
        })
        .collect()
}

/// A risky event and the reasoning behind flagging it.
#[derive(Debug, Clone, PartialEq)]
pub struct Impact {
    pub event: Event,
    pub reason: String,
    pub factors: Vec<String>,
    pub suggested_date: Option<NaiveDate>,
    pub risk_score: u32,
    pub category: String,
}

impl From<&Impact> for ScheduleImpact {
    fn from(impact: &Impact) -> Self {
        Self {
            event: ImpactedEvent {
                id: impact.event.id,
                title: impact.event.title.clone(),
                date: impact.event.date,
                category_type: impact.event.category_type.clone(),
                kind: impact.event.kind.clone(),
            },
            reason: impact.reason.clone(),
            factors: impact.factors.clone(),
            suggested_date: impact.suggested_date,
            risk_score: impact.risk_score,
        }
    }
}

fn is_weather_sensitive(event: &Event) -> bool {
    RISKY_CATEGORIES.contains(&event.category().as_str())
        || event.kind.to_ascii_lowercase().contains("activity")
}

/// Finds weather-sensitive events on high-risk days and proposes the closest
/// low-risk day within the trip, trying one day earlier, one day later, then
/// two days either way.
pub fn find_impacts(trip: &Trip, events: &[Event], days: &[ScoredDay]) -> Vec<Impact> {
    let by_date: HashMap<NaiveDate, &ScoredDay> = days.iter().map(|d| (d.day.date, d)).collect();

    events
        .iter()
        .filter_map(|event| {
            let weather = by_date.get(&event.date)?;
            if weather.risk.score < ALERT_THRESHOLD || !is_weather_sensitive(event) {
                return None;
            }

            let suggested_date = [-1, 1, -2, 2]
                .into_iter()
                .map(|offset| event.date + Duration::days(offset))
                .find(|candidate| {
                    trip.covers(*candidate)
                        && by_date
                            .get(candidate)
                            .is_some_and(|alt| alt.risk.score < SAFE_SCORE)
                });

            Some(Impact {
                event: event.clone(),
                reason: format!(
                    "High risk ({}) on {}",
                    weather.risk.category.as_str(),
                    event.date
                ),
                factors: weather.risk.factors.clone(),
                suggested_date,
                risk_score: weather.risk.score,
                category: event.category(),
            })
        })
        .collect()
}

pub async fn list_alerts(db: &DbPool, trip_id: i64) -> Result<Vec<WeatherAlert>, AppError> {
    let alerts = sqlx::query_as::<_, WeatherAlert>(&format!(
        "SELECT {ALERT_COLUMNS} FROM weather_alerts WHERE trip_id = ?1 ORDER BY date, id"
    ))
    .bind(trip_id)
    .fetch_all(db)
    .await?;
    Ok(alerts)
}

async fn upsert_alert(
    db: &DbPool,
    existing: Option<i64>,
    trip_id: i64,
    date: NaiveDate,
    severity: &str,
    summary: &str,
    payload: serde_json::Value,
) -> Result<WeatherAlert, AppError> {
    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE weather_alerts SET severity = ?1, summary = ?2, provider_payload = ?3 WHERE id = ?4",
            )
            .bind(severity)
            .bind(summary)
            .bind(Json(&payload))
            .bind(id)
            .execute(db)
            .await?;
            id
        }
        None => sqlx::query(
            "INSERT INTO weather_alerts (trip_id, date, severity, summary, provider_payload) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(trip_id)
        .bind(date)
        .bind(severity)
        .bind(summary)
        .bind(Json(&payload))
        .execute(db)
        .await?
        .last_insert_rowid(),
    };

    let alert = sqlx::query_as::<_, WeatherAlert>(&format!(
        "SELECT {ALERT_COLUMNS} FROM weather_alerts WHERE id = ?1"
    ))
    .bind(id)
    .fetch_one(db)
    .await?;
    Ok(alert)
}

/// Records one day-level alert per risky day, refreshing it when the
/// forecast changes. Event-level alerts on the same date are left alone.
pub async fn upsert_weather_alerts(
    db: &DbPool,
    trip: &Trip,
    days: &[ScoredDay],
    threshold: u32,
) -> Result<Vec<AlertDetail>, AppError> {
    let mut alerts = Vec::new();
    for scored in days.iter().filter(|d| d.risk.score >= threshold) {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM weather_alerts WHERE trip_id = ?1 AND date = ?2 AND summary LIKE 'High risk:%' ORDER BY id LIMIT 1",
        )
        .bind(trip.id)
        .bind(scored.day.date)
        .fetch_optional(db)
        .await?;

        let severity = if scored.risk.score >= HIGH_SEVERITY_SCORE {
            "high"
        } else {
            "medium"
        };
        let payload = json!({
            "risk_score": scored.risk.score,
            "risk_category": scored.risk.category.as_str(),
            "factors": scored.risk.factors,
        });
        let summary = format!("High risk: {}", scored.day.summary);
        let alert = upsert_alert(
            db,
            existing,
            trip.id,
            scored.day.date,
            severity,
            &summary,
            payload,
        )
        .await?;
        alerts.push(AlertDetail::from(alert));
    }
    debug!(trip_id = trip.id, alerts = alerts.len(), "weather alerts refreshed");
    Ok(alerts)
}

/// Flags impacted events and stores one alert per event and date.
pub async fn evaluate_schedule_impacts(
    db: &DbPool,
    trip: &Trip,
    events: &[Event],
    days: &[ScoredDay],
) -> Result<Vec<ScheduleImpact>, AppError> {
    let impacts = find_impacts(trip, events, days);
    for impact in &impacts {
        let summary = format!("Event impacted: {}", impact.event.title);
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM weather_alerts WHERE trip_id = ?1 AND date = ?2 AND summary = ?3 ORDER BY id LIMIT 1",
        )
        .bind(trip.id)
        .bind(impact.event.date)
        .bind(&summary)
        .fetch_optional(db)
        .await?;

        let payload = json!({
            "risk_score": impact.risk_score,
            "factors": impact.factors,
            "event_id": impact.event.id,
            "suggested_date": impact.suggested_date,
            "category": impact.category,
        });
        upsert_alert(
            db,
            existing,
            trip.id,
            impact.event.date,
            "high",
            &summary,
            payload,
        )
        .await?;
    }
    Ok(impacts.iter().map(ScheduleImpact::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::DEFAULT_CATEGORY;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, day).unwrap()
    }

    fn stormy(day: u32) -> ForecastDay {
        ForecastDay {
            precip_prob: 90,
            precip_sum: 12.0,
            wind_gust: 55.0,
            ..ForecastDay::calm(date(day))
        }
    }

    fn trip() -> Trip {
        Trip {
            id: 7,
            owner_id: 1,
            name: "Coast".into(),
            destination: "Porto".into(),
            start_date: date(1),
            end_date: date(4),
            total_budget: 0.0,
            currency: "EUR".into(),
            party_size: 2,
            price_sensitivity: "balanced".into(),
            trip_type: "balanced".into(),
        }
    }

    fn event(id: i64, day: u32, kind: &str, category: Option<&str>) -> Event {
        Event {
            id,
            trip_id: 7,
            location_id: None,
            date: date(day),
            start_time: None,
            end_time: None,
            title: format!("Event {id}"),
            kind: kind.into(),
            cost: None,
            notes: None,
            category_type: category.unwrap_or(DEFAULT_CATEGORY).to_string(),
            is_refundable: false,
            reservation_link: None,
        }
    }

    #[test]
    fn calm_day_is_low_risk() {
        let risk = score_day(&ForecastDay::calm(date(1)));
        assert_eq!(risk.score, 0);
        assert_eq!(risk.category, RiskCategory::Low);
        assert!(risk.factors.is_empty());
    }

    #[test]
    fn storm_scores_every_factor() {
        let risk = score_day(&stormy(1));
        assert_eq!(risk.score, 65);
        assert_eq!(risk.category, RiskCategory::High);
        assert_eq!(
            risk.factors,
            vec![
                "Heavy rain likely",
                "Significant precipitation",
                "Severe wind gusts"
            ]
        );
    }

    #[test]
    fn score_is_capped_at_one_hundred() {
        let day = ForecastDay {
            apparent_max: 40.0,
            apparent_min: -10.0,
            ..stormy(1)
        };
        let risk = score_day(&day);
        assert_eq!(risk.score, 100);
        assert_eq!(risk.factors.len(), 5);
    }

    #[test]
    fn moderate_band_starts_at_thirty() {
        let day = ForecastDay {
            precip_prob: 45,
            wind_speed: 31.0,
            ..ForecastDay::calm(date(1))
        };
        let risk = score_day(&day);
        assert_eq!(risk.score, 30);
        assert_eq!(risk.category, RiskCategory::Moderate);
    }

    #[test]
    fn outdoor_event_on_stormy_day_gets_earlier_suggestion() {
        let days = annotate(vec![
            ForecastDay::calm(date(1)),
            stormy(2),
            ForecastDay::calm(date(3)),
        ]);
        let impacts = find_impacts(&trip(), &[event(1, 2, "activity", Some("outdoor"))], &days);
        assert_eq!(impacts.len(), 1);
        assert_eq!(impacts[0].suggested_date, Some(date(1)));
        assert_eq!(impacts[0].reason, "High risk (high) on 2026-06-02");
        assert_eq!(impacts[0].risk_score, 65);
    }

    #[test]
    fn suggestions_stay_inside_the_trip() {
        let days = annotate(vec![
            stormy(1),
            ForecastDay::calm(date(2)),
            ForecastDay::calm(date(3)),
        ]);
        let mut out_of_range = trip();
        out_of_range.start_date = date(1);
        out_of_range.end_date = date(1);
        let impacts = find_impacts(&out_of_range, &[event(1, 1, "hike", Some("hiking"))], &days);
        assert_eq!(impacts[0].suggested_date, None);

        let impacts = find_impacts(&trip(), &[event(1, 1, "hike", Some("hiking"))], &days);
        assert_eq!(impacts[0].suggested_date, Some(date(2)));
    }

    #[test]
    fn indoor_events_are_not_flagged() {
        let days = annotate(vec![stormy(2)]);
        let events = [
            event(1, 2, "meal", Some("indoor")),
            event(2, 2, "museum", None),
            event(3, 2, "Activity", Some("indoor")),
        ];
        let impacts = find_impacts(&trip(), &events, &days);
        assert_eq!(impacts.len(), 1);
        assert_eq!(impacts[0].event.id, 3);
    }
}
