use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::event::{Event, EventCreate, EventUpdate},
    services::{
        itinerary,
        trips::{self, Access},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips/:trip_id/events", get(list_events).post(create_event))
        .route("/events/:event_id", patch(update_event).delete(delete_event))
}

async fn list_events(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Vec<Event>>, AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::View).await?;
    Ok(Json(itinerary::list_events(&state.db, trip_id).await?))
}

async fn create_event(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
    Json(payload): Json<EventCreate>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Edit).await?;
    let event = itinerary::create_event(&state.db, trip_id, payload).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn update_event(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(event_id): Path<i64>,
    Json(payload): Json<EventUpdate>,
) -> Result<Json<Event>, AppError> {
    let user = current.require_user()?;
    let event = itinerary::get_event(&state.db, event_id).await?;
    trips::authorize(&state.db, event.trip_id, user.id, Access::Edit).await?;
    Ok(Json(itinerary::update_event(&state.db, event, payload).await?))
}

async fn delete_event(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(event_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    let event = itinerary::get_event(&state.db, event_id).await?;
    trips::authorize(&state.db, event.trip_id, user.id, Access::Edit).await?;
    itinerary::delete_event(&state.db, event_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
