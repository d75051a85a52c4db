//! Trip page data: the trip itself plus the sections loaded around it.

use chrono::NaiveDate;
use tracing::warn;

use super::{
    calendar::{self, DayBucket},
    ApiClient, ClientError,
};
use crate::models::{
    budget::BudgetSummary,
    destination::Destination,
    event::Event,
    trip::Trip,
    weather::{AlertDetail, ScheduleImpact, TripWeather},
};

pub const PARTIAL_LOAD_MESSAGE: &str = "Some sections failed to load. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Events,
    Budget,
    Destinations,
    Alerts,
}

impl Section {
    pub fn label(&self) -> &'static str {
        match self {
            Section::Events => "events",
            Section::Budget => "budget",
            Section::Destinations => "destinations",
            Section::Alerts => "alerts",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TripDetail {
    pub trip: Trip,
    pub days: Vec<NaiveDate>,
    pub events: Vec<Event>,
    pub budget: Option<BudgetSummary>,
    pub destinations: Vec<Destination>,
    pub alerts: Vec<AlertDetail>,
    failed: Vec<Section>,
}

impl TripDetail {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn failed_sections(&self) -> &[Section] {
        &self.failed
    }

    pub fn partial_message(&self) -> Option<&'static str> {
        self.is_partial().then_some(PARTIAL_LOAD_MESSAGE)
    }

    pub fn planned_total(&self) -> f64 {
        self.budget
            .as_ref()
            .map_or(0.0, |budget| budget.totals.planned_total_all)
    }

    pub fn actual_total(&self) -> f64 {
        self.budget
            .as_ref()
            .map_or(0.0, |budget| budget.totals.actual_total_all)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn itinerary(&self) -> Vec<DayBucket> {
        calendar::group_by_day(&self.events, &self.days)
    }
}

fn keep<T: Default>(
    section: Section,
    result: Result<T, ClientError>,
    failed: &mut Vec<Section>,
) -> T {
    result.unwrap_or_else(|err| {
        warn!(section = section.label(), "section failed to load: {err}");
        failed.push(section);
        T::default()
    })
}

/// Loads the trip, then its sections concurrently. Only a failure to load
/// the trip itself is an error; section failures are reported on the
/// result.
pub async fn load_trip_detail(client: &ApiClient, trip_id: i64) -> Result<TripDetail, ClientError> {
    let trip = client.get_trip(trip_id).await?;

    let (events, budget, destinations, alerts) = tokio::join!(
        client.list_events(trip_id),
        client.budget_summary(trip_id),
        client.list_destinations(trip_id),
        client.trip_alerts(trip_id),
    );

    let mut failed = Vec::new();
    let events = keep(Section::Events, events, &mut failed);
    let budget = keep(Section::Budget, budget.map(Some), &mut failed);
    let destinations = keep(Section::Destinations, destinations, &mut failed);
    let alerts = keep(Section::Alerts, alerts, &mut failed);

    Ok(TripDetail {
        days: calendar::day_range(trip.start_date, trip.end_date),
        trip,
        events,
        budget,
        destinations,
        alerts,
        failed,
    })
}

/// Live forecast for the trip, loaded on its own so a provider outage never
/// blanks the rest of the page.
pub async fn load_trip_weather(client: &ApiClient, trip_id: i64) -> Result<TripWeather, ClientError> {
    client.trip_weather(trip_id).await.map_err(|err| {
        warn!(trip_id, "weather failed to load: {err}");
        err
    })
}

pub async fn load_schedule_alerts(
    client: &ApiClient,
    trip_id: i64,
) -> Result<Vec<ScheduleImpact>, ClientError> {
    client.schedule_alerts(trip_id).await.map_err(|err| {
        warn!(trip_id, "schedule alerts failed to load: {err}");
        err
    })
}
