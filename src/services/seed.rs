//! Demo account and sample trip, loaded on startup when enabled.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde_json::json;
use sqlx::types::Json;
use tracing::info;

use crate::{auth, db::DbPool, error::AppError};

pub const DEMO_EMAIL: &str = "demo@example.com";
pub const DEMO_USERNAME: &str = "demo";
pub const DEMO_PASSWORD: &str = "demo123";
pub const DEMO_TRIP: &str = "Summer Trip to New York";

const LOCATIONS: [(&str, &str, &str, f64, f64); 5] = [
    ("New York City", "city", "NY, USA", 40.7128, -74.0060),
    ("Grand Hotel", "hotel", "123 Main St, NY", 40.756, -73.986),
    ("Joe's Pizza", "restaurant", "7 Carmine St, NY", 40.7309, -74.0020),
    ("Modern Art Museum", "attraction", "11 W 53rd St, NY", 40.7614, -73.9776),
    ("JFK Airport", "airport", "Queens, NY", 40.6413, -73.7781),
];

const STOPS: [&str; 3] = ["New York City", "Grand Hotel", "Modern Art Museum"];

struct DemoEvent {
    offset: i64,
    title: &'static str,
    kind: &'static str,
    place: &'static str,
    start: Option<(u32, u32)>,
    end: Option<(u32, u32)>,
    cost: Option<f64>,
}

const EVENTS: [DemoEvent; 8] = [
    DemoEvent { offset: 0, title: "Flight to JFK", kind: "flight", place: "JFK Airport", start: Some((9, 0)), end: Some((12, 0)), cost: None },
    DemoEvent { offset: 0, title: "Hotel Check-in", kind: "hotel", place: "Grand Hotel", start: Some((14, 0)), end: None, cost: None },
    DemoEvent { offset: 0, title: "Welcome Dinner", kind: "meal", place: "Joe's Pizza", start: Some((19, 0)), end: None, cost: Some(40.0) },
    DemoEvent { offset: 1, title: "Museum Visit", kind: "activity", place: "Modern Art Museum", start: Some((10, 0)), end: Some((13, 0)), cost: Some(25.0) },
    DemoEvent { offset: 1, title: "Lunch", kind: "meal", place: "Joe's Pizza", start: Some((13, 30)), end: None, cost: Some(20.0) },
    DemoEvent { offset: 2, title: "City Tour", kind: "activity", place: "New York City", start: Some((9, 0)), end: Some((15, 0)), cost: Some(60.0) },
    DemoEvent { offset: 3, title: "Free Day", kind: "activity", place: "New York City", start: None, end: None, cost: None },
    DemoEvent { offset: 4, title: "Flight Home", kind: "flight", place: "JFK Airport", start: Some((16, 0)), end: Some((19, 0)), cost: None },
];

const ENVELOPES: [(&str, f64); 4] = [
    ("lodging", 800.0),
    ("food", 300.0),
    ("transport", 400.0),
    ("activities", 300.0),
];

/// (description, envelope category, amount, index into `EVENTS`)
const EXPENSES: [(&str, &str, f64, Option<usize>); 4] = [
    ("Hotel deposit", "lodging", 200.0, Some(1)),
    ("Welcome Dinner", "food", 42.5, Some(2)),
    ("Museum Tickets", "activities", 50.0, Some(3)),
    ("Metro Card", "transport", 33.0, None),
];

fn time_of((hour, minute): (u32, u32)) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Creates the demo data. Running it again leaves existing rows in place.
pub async fn seed_demo(db: &DbPool, today: NaiveDate) -> Result<i64, AppError> {
    let user_id: i64 = match sqlx::query_scalar("SELECT id FROM users WHERE email = ?1")
        .bind(DEMO_EMAIL)
        .fetch_optional(db)
        .await?
    {
        Some(id) => id,
        None => auth::register_user(db, DEMO_EMAIL, DEMO_USERNAME, DEMO_PASSWORD).await?.id,
    };

    let start = today + Duration::days(7);
    let end = start + Duration::days(4);

    let mut tx = db.begin().await?;
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM trips WHERE owner_id = ?1 AND name = ?2")
            .bind(user_id)
            .bind(DEMO_TRIP)
            .fetch_optional(&mut *tx)
            .await?;
    let trip_id = match existing {
        Some(id) => id,
        None => sqlx::query(
            r#"INSERT INTO trips (owner_id, name, destination, start_date, end_date, total_budget, currency, party_size, price_sensitivity, trip_type)
               VALUES (?1, ?2, 'New York City', ?3, ?4, 2500.0, 'USD', 2, 'balanced', 'cultural')"#,
        )
        .bind(user_id)
        .bind(DEMO_TRIP)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid(),
    };
    let trip_start: NaiveDate = sqlx::query_scalar("SELECT start_date FROM trips WHERE id = ?1")
        .bind(trip_id)
        .fetch_one(&mut *tx)
        .await?;

    let mut locations = HashMap::new();
    for (name, kind, address, latitude, longitude) in LOCATIONS {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM locations WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        let id = match found {
            Some(id) => id,
            None => sqlx::query(
                "INSERT INTO locations (name, type, address, latitude, longitude) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(name)
            .bind(kind)
            .bind(address)
            .bind(latitude)
            .bind(longitude)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid(),
        };
        locations.insert(name, id);
    }

    for (order, name) in STOPS.into_iter().enumerate() {
        let location_id = locations[name];
        let linked: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM trip_destinations WHERE trip_id = ?1 AND location_id = ?2",
        )
        .bind(trip_id)
        .bind(location_id)
        .fetch_optional(&mut *tx)
        .await?;
        if linked.is_none() {
            sqlx::query(
                "INSERT INTO trip_destinations (trip_id, location_id, sort_order) VALUES (?1, ?2, ?3)",
            )
            .bind(trip_id)
            .bind(location_id)
            .bind(order as i64)
            .execute(&mut *tx)
            .await?;
        }
    }

    let mut event_ids = Vec::with_capacity(EVENTS.len());
    for event in &EVENTS {
        let date = trip_start + Duration::days(event.offset);
        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM events WHERE trip_id = ?1 AND title = ?2 AND date = ?3")
                .bind(trip_id)
                .bind(event.title)
                .bind(date)
                .fetch_optional(&mut *tx)
                .await?;
        let id = match found {
            Some(id) => id,
            None => {
                let category = if matches!(event.kind, "activity" | "flight") {
                    "outdoor"
                } else {
                    "indoor"
                };
                sqlx::query(
                    r#"INSERT INTO events (trip_id, location_id, date, start_time, end_time, title, type, cost, category_type, is_refundable)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)"#,
                )
                .bind(trip_id)
                .bind(locations[event.place])
                .bind(date)
                .bind(event.start.and_then(time_of))
                .bind(event.end.and_then(time_of))
                .bind(event.title)
                .bind(event.kind)
                .bind(event.cost)
                .bind(category)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid()
            }
        };
        event_ids.push((id, date));
    }

    let mut envelopes = HashMap::new();
    for (category, planned) in ENVELOPES {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM budget_envelopes WHERE trip_id = ?1 AND category = ?2",
        )
        .bind(trip_id)
        .bind(category)
        .fetch_optional(&mut *tx)
        .await?;
        let id = match found {
            Some(id) => id,
            None => sqlx::query(
                "INSERT INTO budget_envelopes (trip_id, category, planned_amount) VALUES (?1, ?2, ?3)",
            )
            .bind(trip_id)
            .bind(category)
            .bind(planned)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid(),
        };
        envelopes.insert(category, id);
    }

    for (description, category, amount, event) in EXPENSES {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM expenses WHERE trip_id = ?1 AND description = ?2 AND amount = ?3",
        )
        .bind(trip_id)
        .bind(description)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await?;
        if found.is_some() {
            continue;
        }
        let linked = event.map(|index| event_ids[index]);
        sqlx::query(
            r#"INSERT INTO expenses (trip_id, envelope_id, event_id, description, amount, currency, spent_at_date)
               VALUES (?1, ?2, ?3, ?4, ?5, 'USD', ?6)"#,
        )
        .bind(trip_id)
        .bind(envelopes.get(category).copied())
        .bind(linked.map(|(id, _)| id))
        .bind(description)
        .bind(amount)
        .bind(linked.map_or(trip_start, |(_, date)| date))
        .execute(&mut *tx)
        .await?;
    }

    let alert_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM weather_alerts WHERE trip_id = ?1")
        .bind(trip_id)
        .fetch_one(&mut *tx)
        .await?;
    if alert_count == 0 {
        let alerts = [
            (event_ids[3], "medium", "Rain expected during museum visit."),
            (event_ids[6], "high", "Severe storm possible."),
        ];
        for ((event_id, date), severity, summary) in alerts {
            sqlx::query(
                "INSERT INTO weather_alerts (trip_id, date, severity, summary, provider_payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(trip_id)
            .bind(date)
            .bind(severity)
            .bind(summary)
            .bind(Json(json!({ "event_ids": [event_id] })))
            .execute(&mut *tx)
            .await?;
        }
    }
    tx.commit().await?;

    info!(trip_id, email = DEMO_EMAIL, "demo data ready");
    Ok(trip_id)
}
