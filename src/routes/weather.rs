use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        trip::Trip,
        weather::{AlertDetail, ScheduleImpact, TripWeather, TripWeatherDay},
    },
    services::{
        itinerary,
        trips::{self, Access},
        weather_client,
        weather_risk::{self, ScoredDay},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips/:trip_id/weather", get(trip_weather))
        .route("/trips/:trip_id/alerts", get(trip_alerts))
        .route("/trips/:trip_id/schedule/alerts", get(schedule_alerts))
}

async fn scored_forecast(state: &AppState, trip: &Trip) -> Result<Vec<ScoredDay>, AppError> {
    let provider = state.forecast.as_ref();
    let coords = weather_client::locate(provider, &trip.destination)
        .await
        .ok_or(AppError::NotFound(
            "Could not find location for this trip's destination",
        ))?;
    let days =
        weather_client::forecast_or_empty(provider, coords, trip.start_date, trip.end_date).await;
    Ok(weather_risk::annotate(days))
}

async fn trip_weather(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<TripWeather>, AppError> {
    let user = current.require_user()?;
    let (trip, _) = trips::authorize(&state.db, trip_id, user.id, Access::View).await?;

    let scored = scored_forecast(&state, &trip).await?;
    let alerts = weather_risk::upsert_weather_alerts(
        &state.db,
        &trip,
        &scored,
        weather_risk::ALERT_THRESHOLD,
    )
    .await?;

    Ok(Json(TripWeather {
        city: trip.destination.clone(),
        start_date: trip.start_date,
        end_date: trip.end_date,
        days: scored.iter().map(TripWeatherDay::from).collect(),
        alerts,
    }))
}

async fn trip_alerts(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Vec<AlertDetail>>, AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::View).await?;
    let alerts = weather_risk::list_alerts(&state.db, trip_id).await?;
    Ok(Json(alerts.into_iter().map(AlertDetail::from).collect()))
}

async fn schedule_alerts(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Vec<ScheduleImpact>>, AppError> {
    let user = current.require_user()?;
    let (trip, _) = trips::authorize(&state.db, trip_id, user.id, Access::View).await?;

    let scored = scored_forecast(&state, &trip).await?;
    let events = itinerary::list_events(&state.db, trip.id).await?;
    let impacts =
        weather_risk::evaluate_schedule_impacts(&state.db, &trip, &events, &scored).await?;
    Ok(Json(impacts))
}
