use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{delete, get},
    Json, Router,
};
use chrono::Local;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        budget::BudgetSummary,
        event::Event,
        trip::{Trip, TripCreate, TripMember, TripMemberUpsert, TripUpdate},
        weather::WeatherAlert,
    },
    services::{
        budgeting, itinerary,
        trips::{self, Access},
        weather_risk,
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips", get(list_trips).post(create_trip))
        .route(
            "/trips/:trip_id",
            get(get_trip).patch(update_trip).delete(delete_trip),
        )
        .route("/trips/:trip_id/members", get(list_members).post(upsert_member))
        .route("/trips/:trip_id/members/:user_id", delete(remove_member))
        .route("/trips/:trip_id/export", get(export_trip))
}

async fn list_trips(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<Trip>>, AppError> {
    let user = current.require_user()?;
    Ok(Json(trips::list_for_user(&state.db, user.id).await?))
}

async fn create_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<TripCreate>,
) -> Result<(StatusCode, Json<Trip>), AppError> {
    let user = current.require_user()?;
    let trip = trips::create(&state.db, user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn get_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Trip>, AppError> {
    let user = current.require_user()?;
    let (trip, _) = trips::authorize(&state.db, trip_id, user.id, Access::View).await?;
    Ok(Json(trip))
}

async fn update_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
    Json(payload): Json<TripUpdate>,
) -> Result<Json<Trip>, AppError> {
    let user = current.require_user()?;
    let (trip, _) = trips::authorize(&state.db, trip_id, user.id, Access::Own).await?;
    Ok(Json(trips::update(&state.db, trip, payload).await?))
}

async fn delete_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Own).await?;
    trips::delete(&state.db, trip_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_members(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Vec<TripMember>>, AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::View).await?;
    Ok(Json(trips::list_members(&state.db, trip_id).await?))
}

async fn upsert_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
    Json(payload): Json<TripMemberUpsert>,
) -> Result<(StatusCode, Json<TripMember>), AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Own).await?;
    let role = payload.parsed_role().map_err(AppError::BadRequest)?;
    let member = trips::upsert_member(&state.db, trip_id, payload.user_id, role).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn remove_member(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((trip_id, member_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Own).await?;
    trips::remove_member(&state.db, trip_id, member_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

struct ExportEvent {
    title: String,
    kind: String,
    start: String,
    cost: String,
    notes: String,
}

struct ExportDay {
    date: String,
    events: Vec<ExportEvent>,
}

struct ExportEnvelope {
    category: String,
    planned: String,
    actual: String,
    percent_used: String,
}

struct ExportAlert {
    date: String,
    severity: String,
    summary: String,
}

#[derive(Template)]
#[template(path = "export/trip.html")]
struct TripExportTemplate {
    name: String,
    destination: String,
    start_date: String,
    end_date: String,
    currency: String,
    planned_total: String,
    actual_total: String,
    days: Vec<ExportDay>,
    envelopes: Vec<ExportEnvelope>,
    alerts: Vec<ExportAlert>,
}

fn money(amount: f64) -> String {
    format!("{amount:.2}")
}

impl TripExportTemplate {
    fn build(trip: &Trip, events: Vec<Event>, budget: &BudgetSummary, alerts: Vec<WeatherAlert>) -> Self {
        let mut days: Vec<ExportDay> = Vec::new();
        for event in events {
            let date = event.date.to_string();
            let entry = ExportEvent {
                title: event.title,
                kind: event.kind,
                start: event
                    .start_time
                    .map(|time| time.format("%H:%M").to_string())
                    .unwrap_or_default(),
                cost: event.cost.map(money).unwrap_or_default(),
                notes: event.notes.unwrap_or_default(),
            };
            match days.last_mut() {
                Some(day) if day.date == date => day.events.push(entry),
                _ => days.push(ExportDay {
                    date,
                    events: vec![entry],
                }),
            }
        }

        Self {
            name: trip.name.clone(),
            destination: trip.destination.clone(),
            start_date: trip.start_date.to_string(),
            end_date: trip.end_date.to_string(),
            currency: trip.currency.clone(),
            planned_total: money(budget.totals.planned_total_all),
            actual_total: money(budget.totals.actual_total_all),
            days,
            envelopes: budget
                .envelopes
                .iter()
                .map(|row| ExportEnvelope {
                    category: row.envelope.category.clone(),
                    planned: money(row.envelope.planned_amount),
                    actual: money(row.actual_spent),
                    percent_used: format!("{:.0}", row.percent_used),
                })
                .collect(),
            alerts: alerts
                .into_iter()
                .map(|alert| ExportAlert {
                    date: alert.date.to_string(),
                    severity: alert.severity,
                    summary: alert.summary,
                })
                .collect(),
        }
    }
}

async fn export_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let (trip, _) = trips::authorize(&state.db, trip_id, user.id, Access::View).await?;

    let events = itinerary::list_events(&state.db, trip.id).await?;
    let budget = budgeting::summary_for(&state.db, &trip, Local::now().date_naive()).await?;
    let alerts = weather_risk::list_alerts(&state.db, trip.id).await?;

    let page = TripExportTemplate::build(&trip, events, &budget, alerts);
    let mut response = AskamaTemplateResponse::into_response(page);
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"trip-{}.html\"", trip.id))
        .map_err(|err| AppError::Other(anyhow::anyhow!("bad export header: {err}")))?;
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
