use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Local;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::budget::{
        BudgetEnvelope, BudgetEnvelopeCreate, BudgetEnvelopeUpdate, BudgetSummary, Expense,
        ExpenseCreate, ExpenseUpdate,
    },
    services::{
        budgeting,
        trips::{self, Access},
    },
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trips/:trip_id/budget", get(budget_summary))
        .route("/trips/:trip_id/budget/recalculate", post(recalculate))
        .route("/trips/:trip_id/envelopes", post(create_envelope))
        .route(
            "/envelopes/:envelope_id",
            patch(update_envelope).delete(delete_envelope),
        )
        .route("/trips/:trip_id/expenses", post(create_expense))
        .route(
            "/expenses/:expense_id",
            patch(update_expense).delete(delete_expense),
        )
}

async fn budget_summary(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<BudgetSummary>, AppError> {
    let user = current.require_user()?;
    let (trip, _) = trips::authorize(&state.db, trip_id, user.id, Access::View).await?;
    let summary = budgeting::summary_for(&state.db, &trip, Local::now().date_naive()).await?;
    Ok(Json(summary))
}

async fn recalculate(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
) -> Result<Json<Vec<BudgetEnvelope>>, AppError> {
    let user = current.require_user()?;
    let (trip, _) = trips::authorize(&state.db, trip_id, user.id, Access::Edit).await?;
    Ok(Json(budgeting::recalculate(&state.db, &trip).await?))
}

async fn create_envelope(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
    Json(payload): Json<BudgetEnvelopeCreate>,
) -> Result<(StatusCode, Json<BudgetEnvelope>), AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Edit).await?;
    let envelope = budgeting::create_envelope(&state.db, trip_id, payload).await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

async fn update_envelope(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(envelope_id): Path<i64>,
    Json(payload): Json<BudgetEnvelopeUpdate>,
) -> Result<Json<BudgetEnvelope>, AppError> {
    let user = current.require_user()?;
    let envelope = budgeting::get_envelope(&state.db, envelope_id).await?;
    trips::authorize(&state.db, envelope.trip_id, user.id, Access::Edit).await?;
    Ok(Json(
        budgeting::update_envelope(&state.db, envelope, payload).await?,
    ))
}

async fn delete_envelope(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(envelope_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    let envelope = budgeting::get_envelope(&state.db, envelope_id).await?;
    trips::authorize(&state.db, envelope.trip_id, user.id, Access::Edit).await?;
    budgeting::delete_envelope(&state.db, envelope_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_expense(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<i64>,
    Json(payload): Json<ExpenseCreate>,
) -> Result<(StatusCode, Json<Expense>), AppError> {
    let user = current.require_user()?;
    trips::authorize(&state.db, trip_id, user.id, Access::Edit).await?;
    let expense = budgeting::create_expense(&state.db, trip_id, payload).await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn update_expense(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(expense_id): Path<i64>,
    Json(payload): Json<ExpenseUpdate>,
) -> Result<Json<Expense>, AppError> {
    let user = current.require_user()?;
    let expense = budgeting::get_expense(&state.db, expense_id).await?;
    trips::authorize(&state.db, expense.trip_id, user.id, Access::Edit).await?;
    Ok(Json(
        budgeting::update_expense(&state.db, expense, payload).await?,
    ))
}

async fn delete_expense(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(expense_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    let expense = budgeting::get_expense(&state.db, expense_id).await?;
    trips::authorize(&state.db, expense.trip_id, user.id, Access::Edit).await?;
    budgeting::delete_expense(&state.db, expense_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
