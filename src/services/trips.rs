use chrono::NaiveDate;
use tracing::info;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        trip::{Trip, TripCreate, TripMember, TripUpdate},
        user::TripRole,
    },
    services::budgeting,
};

const TRIP_COLUMNS: &str = "id, owner_id, name, destination, start_date, end_date, total_budget, currency, party_size, price_sensitivity, trip_type";

/// What a caller needs to be allowed to do with a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    View,
    Edit,
    Own,
}

pub async fn find(db: &DbPool, trip_id: i64) -> Result<Option<Trip>, AppError> {
    let trip = sqlx::query_as::<_, Trip>(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1"))
        .bind(trip_id)
        .fetch_optional(db)
        .await?;
    Ok(trip)
}

pub async fn get(db: &DbPool, trip_id: i64) -> Result<Trip, AppError> {
    find(db, trip_id)
        .await?
        .ok_or(AppError::NotFound("Trip not found"))
}

pub async fn role_for(db: &DbPool, trip: &Trip, user_id: i64) -> Result<Option<TripRole>, AppError> {
    if trip.owner_id == user_id {
        return Ok(Some(TripRole::Owner));
    }
    let role: Option<String> =
        sqlx::query_scalar("SELECT role FROM trip_members WHERE trip_id = ?1 AND user_id = ?2")
            .bind(trip.id)
            .bind(user_id)
            .fetch_optional(db)
            .await?;
    Ok(role.and_then(|raw| raw.parse().ok()))
}

/// Loads a trip and checks the user's role against `access`. Missing trips
/// are reported before missing permissions.
pub async fn authorize(
    db: &DbPool,
    trip_id: i64,
    user_id: i64,
    access: Access,
) -> Result<(Trip, TripRole), AppError> {
    let trip = get(db, trip_id).await?;
    let role = role_for(db, &trip, user_id)
        .await?
        .ok_or(AppError::Forbidden("Not authorized for this trip"))?;
    match access {
        Access::View => {}
        Access::Edit if !role.can_edit() => {
            return Err(AppError::Forbidden(
                "Only owner or editor can modify this trip",
            ))
        }
        Access::Own if trip.owner_id != user_id => {
            return Err(AppError::Forbidden("Only owner can perform this action"))
        }
        _ => {}
    }
    Ok((trip, role))
}

pub async fn list_for_user(db: &DbPool, user_id: i64) -> Result<Vec<Trip>, AppError> {
    let trips = sqlx::query_as::<_, Trip>(
        r#"SELECT DISTINCT t.id, t.owner_id, t.name, t.destination, t.start_date, t.end_date,
                  t.total_budget, t.currency, t.party_size, t.price_sensitivity, t.trip_type
           FROM trips t
           LEFT JOIN trip_members m ON m.trip_id = t.id
           WHERE t.owner_id = ?1 OR m.user_id = ?1
           ORDER BY t.start_date, t.id"#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(trips)
}

fn check_dates(start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
    if end < start {
        return Err(AppError::BadRequest(
            "end_date must not be before start_date".into(),
        ));
    }
    Ok(())
}

/// Inserts the trip for `owner_id` (any owner in the payload is ignored)
/// and allocates the default budget envelopes.
pub async fn create(db: &DbPool, owner_id: i64, payload: TripCreate) -> Result<Trip, AppError> {
    check_dates(payload.start_date, payload.end_date)?;
    if payload.name.trim().is_empty() || payload.destination.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Trip name and destination are required".into(),
        ));
    }

    let mut tx = db.begin().await?;
    let id = sqlx::query(
        r#"INSERT INTO trips (owner_id, name, destination, start_date, end_date, total_budget, currency, party_size, price_sensitivity, trip_type)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
    )
    .bind(owner_id)
    .bind(payload.name.trim())
    .bind(payload.destination.trim())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.total_budget)
    .bind(&payload.currency)
    .bind(payload.party_size)
    .bind(&payload.price_sensitivity)
    .bind(&payload.trip_type)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    let trip = sqlx::query_as::<_, Trip>(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1"))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    let planned = budgeting::allocate_default_envelopes(&trip);
    budgeting::ensure_envelopes(&mut *tx, trip.id, &planned).await?;
    tx.commit().await?;

    info!(trip_id = trip.id, owner_id, "trip created");
    Ok(trip)
}

pub async fn update(db: &DbPool, mut trip: Trip, payload: TripUpdate) -> Result<Trip, AppError> {
    payload.apply(&mut trip);
    check_dates(trip.start_date, trip.end_date)?;
    sqlx::query(
        r#"UPDATE trips SET name = ?1, destination = ?2, start_date = ?3, end_date = ?4, total_budget = ?5,
                  currency = ?6, party_size = ?7, price_sensitivity = ?8, trip_type = ?9
           WHERE id = ?10"#,
    )
    .bind(&trip.name)
    .bind(&trip.destination)
    .bind(trip.start_date)
    .bind(trip.end_date)
    .bind(trip.total_budget)
    .bind(&trip.currency)
    .bind(trip.party_size)
    .bind(&trip.price_sensitivity)
    .bind(&trip.trip_type)
    .bind(trip.id)
    .execute(db)
    .await?;
    Ok(trip)
}

pub async fn delete(db: &DbPool, trip_id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM trips WHERE id = ?1")
        .bind(trip_id)
        .execute(db)
        .await?;
    info!(trip_id, "trip deleted");
    Ok(())
}

pub async fn list_members(db: &DbPool, trip_id: i64) -> Result<Vec<TripMember>, AppError> {
    let members = sqlx::query_as::<_, TripMember>(
        "SELECT id, trip_id, user_id, role FROM trip_members WHERE trip_id = ?1 ORDER BY id",
    )
    .bind(trip_id)
    .fetch_all(db)
    .await?;
    Ok(members)
}

pub async fn upsert_member(
    db: &DbPool,
    trip_id: i64,
    user_id: i64,
    role: TripRole,
) -> Result<TripMember, AppError> {
    let user_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    if user_exists.is_none() {
        return Err(AppError::NotFound("User not found"));
    }

    sqlx::query(
        r#"INSERT INTO trip_members (trip_id, user_id, role) VALUES (?1, ?2, ?3)
           ON CONFLICT (trip_id, user_id) DO UPDATE SET role = excluded.role"#,
    )
    .bind(trip_id)
    .bind(user_id)
    .bind(role.as_str())
    .execute(db)
    .await?;

    let member = sqlx::query_as::<_, TripMember>(
        "SELECT id, trip_id, user_id, role FROM trip_members WHERE trip_id = ?1 AND user_id = ?2",
    )
    .bind(trip_id)
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(member)
}

pub async fn remove_member(db: &DbPool, trip_id: i64, user_id: i64) -> Result<(), AppError> {
    let removed = sqlx::query("DELETE FROM trip_members WHERE trip_id = ?1 AND user_id = ?2")
        .bind(trip_id)
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(AppError::NotFound("Member not found"));
    }
    Ok(())
}
