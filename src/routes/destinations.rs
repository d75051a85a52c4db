use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::destination::{Destination, DestinationCreate, MoveQuery},
    services::{
        itinerary,
        trips::{self, Access},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/trips/:trip_id/destinations",
            get(list_destinations).post(add_destination),
        )
        .route(
            "/trips/:trip_id/destinations/:destination_id",
            patch(move_destination).delete(remove_destination),
        )
}

async fn list_destinations(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Vec<Destination>>, AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::View).await?;
    Ok(Json(itinerary::list_destinations(&state.db, trip_id).await?))
}

async fn add_destination(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
    Json(payload): Json<DestinationCreate>,
) -> Result<(StatusCode, Json<Destination>), AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Edit).await?;
    let destination = itinerary::add_destination(&state.db, trip_id, payload).await?;
    Ok((StatusCode::CREATED, Json(destination)))
}

async fn move_destination(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, destination_id)): Path<(i64, i64)>,
    Query(query): Query<MoveQuery>,
) -> Result<Json<Vec<Destination>>, AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Edit).await?;
    let reordered =
        itinerary::move_destination(&state.db, trip_id, destination_id, query.direction).await?;
    Ok(Json(reordered))
}

async fn remove_destination(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, destination_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Edit).await?;
    itinerary::remove_destination(&state.db, trip_id, destination_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
