use chrono::NaiveDate;
use tracing::warn;

use super::ApiClient;
use crate::models::{trip::Trip, weather::AlertDetail};

/// Trips whose alerts the dashboard polls.
const ALERT_TRIPS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub total: usize,
    pub upcoming: usize,
    pub past: usize,
    pub next_trip: Option<Trip>,
}

impl DashboardSummary {
    /// A trip still counts as upcoming on its last day.
    pub fn from_trips(trips: &[Trip], today: NaiveDate) -> Self {
        let upcoming: Vec<&Trip> = trips.iter().filter(|trip| trip.end_date >= today).collect();
        let next_trip = upcoming
            .iter()
            .min_by_key(|trip| (trip.start_date, trip.id))
            .map(|trip| (*trip).clone());
        Self {
            total: trips.len(),
            upcoming: upcoming.len(),
            past: trips.len() - upcoming.len(),
            next_trip,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripAlert {
    pub trip_id: i64,
    pub trip_name: String,
    pub alert: AlertDetail,
}

/// Stored alerts of the first few trips, ordered by date. A trip whose
/// alerts cannot be loaded is skipped.
pub async fn collect_alerts(client: &ApiClient, trips: &[Trip]) -> Vec<TripAlert> {
    let mut collected = Vec::new();
    for trip in trips.iter().take(ALERT_TRIPS) {
        match client.trip_alerts(trip.id).await {
            Ok(alerts) => collected.extend(alerts.into_iter().map(|alert| TripAlert {
                trip_id: trip.id,
                trip_name: trip.name.clone(),
                alert,
            })),
            Err(err) => warn!(trip_id = trip.id, "skipping alerts: {err}"),
        }
    }
    collected.sort_by_key(|item| (item.alert.date, item.alert.id));
    collected
}
