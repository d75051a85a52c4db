//! Events and ordered destination stops of a trip.

use sqlx::FromRow;
use tracing::debug;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        destination::{Destination, DestinationCreate, Location, MoveDirection},
        event::{Event, EventCreate, EventUpdate, DEFAULT_CATEGORY},
    },
    services::budgeting::require_trip_match,
};

const EVENT_COLUMNS: &str = "id, trip_id, location_id, date, start_time, end_time, title, type, cost, notes, category_type, is_refundable, reservation_link";

fn check_times(event: &Event) -> Result<(), AppError> {
    if let (Some(start), Some(end)) = (event.start_time, event.end_time) {
        if end < start {
            return Err(AppError::BadRequest(
                "end_time must not be before start_time".into(),
            ));
        }
    }
    Ok(())
}

pub async fn list_events(db: &DbPool, trip_id: i64) -> Result<Vec<Event>, AppError> {
    let events = sqlx::query_as::<_, Event>(&format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE trip_id = ?1 ORDER BY date, start_time, id"
    ))
    .bind(trip_id)
    .fetch_all(db)
    .await?;
    Ok(events)
}

pub async fn get_event(db: &DbPool, event_id: i64) -> Result<Event, AppError> {
    sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"))
        .bind(event_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Event not found"))
}

pub async fn create_event(db: &DbPool, trip_id: i64, payload: EventCreate) -> Result<Event, AppError> {
    require_trip_match(trip_id, payload.trip_id)?;
    if payload.title.trim().is_empty() {
        return Err(AppError::BadRequest("Event title is required".into()));
    }
    let event = Event {
        id: 0,
        trip_id,
        location_id: payload.location_id,
        date: payload.date,
        start_time: payload.start_time,
        end_time: payload.end_time,
        title: payload.title.trim().to_string(),
        kind: payload.kind,
        cost: payload.cost,
        notes: payload.notes,
        category_type: payload
            .category_type
            .unwrap_or_else(|| DEFAULT_CATEGORY.into()),
        is_refundable: payload.is_refundable.unwrap_or(false),
        reservation_link: payload.reservation_link,
    };
    check_times(&event)?;

    let id = sqlx::query(
        r#"INSERT INTO events (trip_id, location_id, date, start_time, end_time, title, type, cost, notes, category_type, is_refundable, reservation_link)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
    )
    .bind(event.trip_id)
    .bind(event.location_id)
    .bind(event.date)
    .bind(event.start_time)
    .bind(event.end_time)
    .bind(&event.title)
    .bind(&event.kind)
    .bind(event.cost)
    .bind(&event.notes)
    .bind(&event.category_type)
    .bind(event.is_refundable)
    .bind(&event.reservation_link)
    .execute(db)
    .await?
    .last_insert_rowid();

    debug!(trip_id, event_id = id, "event created");
    get_event(db, id).await
}

pub async fn update_event(db: &DbPool, mut event: Event, payload: EventUpdate) -> Result<Event, AppError> {
    payload.apply(&mut event);
    check_times(&event)?;
    sqlx::query(
        r#"UPDATE events SET location_id = ?1, date = ?2, start_time = ?3, end_time = ?4, title = ?5, type = ?6,
                  cost = ?7, notes = ?8, category_type = ?9, is_refundable = ?10, reservation_link = ?11
           WHERE id = ?12"#,
    )
    .bind(event.location_id)
    .bind(event.date)
    .bind(event.start_time)
    .bind(event.end_time)
    .bind(&event.title)
    .bind(&event.kind)
    .bind(event.cost)
    .bind(&event.notes)
    .bind(&event.category_type)
    .bind(event.is_refundable)
    .bind(&event.reservation_link)
    .bind(event.id)
    .execute(db)
    .await?;
    Ok(event)
}

pub async fn delete_event(db: &DbPool, event_id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM events WHERE id = ?1")
        .bind(event_id)
        .execute(db)
        .await?;
    Ok(())
}

#[derive(FromRow)]
struct DestinationRow {
    id: i64,
    sort_order: i64,
    location_id: i64,
    name: String,
    #[sqlx(rename = "type")]
    kind: String,
    address: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<DestinationRow> for Destination {
    fn from(row: DestinationRow) -> Self {
        Self {
            id: row.id,
            sort_order: row.sort_order,
            location: Location {
                id: row.location_id,
                name: row.name,
                kind: row.kind,
                address: row.address,
                latitude: row.latitude,
                longitude: row.longitude,
            },
        }
    }
}

pub async fn list_destinations(db: &DbPool, trip_id: i64) -> Result<Vec<Destination>, AppError> {
    let rows = sqlx::query_as::<_, DestinationRow>(
        r#"SELECT d.id, d.sort_order, l.id AS location_id, l.name, l.type, l.address, l.latitude, l.longitude
           FROM trip_destinations d
           JOIN locations l ON l.id = d.location_id
           WHERE d.trip_id = ?1
           ORDER BY d.sort_order, d.id"#,
    )
    .bind(trip_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Destination::from).collect())
}

/// Creates the location and appends it after the current last stop.
pub async fn add_destination(
    db: &DbPool,
    trip_id: i64,
    payload: DestinationCreate,
) -> Result<Destination, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Destination name is required".into()));
    }

    let mut tx = db.begin().await?;
    let location_id = sqlx::query("INSERT INTO locations (name, type, address) VALUES (?1, ?2, ?3)")
        .bind(name)
        .bind(&payload.kind)
        .bind(&payload.address)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    let last: Option<i64> =
        sqlx::query_scalar("SELECT MAX(sort_order) FROM trip_destinations WHERE trip_id = ?1")
            .bind(trip_id)
            .fetch_one(&mut *tx)
            .await?;
    let sort_order = last.map_or(0, |order| order + 1);

    let id = sqlx::query(
        "INSERT INTO trip_destinations (trip_id, location_id, sort_order) VALUES (?1, ?2, ?3)",
    )
    .bind(trip_id)
    .bind(location_id)
    .bind(sort_order)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();
    tx.commit().await?;

    Ok(Destination {
        id,
        sort_order,
        location: Location {
            id: location_id,
            name: name.to_string(),
            kind: payload.kind,
            address: payload.address,
            latitude: None,
            longitude: None,
        },
    })
}

/// Swaps a stop with its neighbour. Moving past either end leaves the order
/// unchanged.
pub async fn move_destination(
    db: &DbPool,
    trip_id: i64,
    destination_id: i64,
    direction: MoveDirection,
) -> Result<Vec<Destination>, AppError> {
    let mut tx = db.begin().await?;
    let current: Option<i64> = sqlx::query_scalar(
        "SELECT sort_order FROM trip_destinations WHERE id = ?1 AND trip_id = ?2",
    )
    .bind(destination_id)
    .bind(trip_id)
    .fetch_optional(&mut *tx)
    .await?;
    let current = current.ok_or(AppError::NotFound("Destination not found"))?;

    let neighbour_sql = match direction {
        MoveDirection::Up => {
            "SELECT id, sort_order FROM trip_destinations WHERE trip_id = ?1 AND (sort_order < ?2 OR (sort_order = ?2 AND id < ?3)) ORDER BY sort_order DESC, id DESC LIMIT 1"
        }
        MoveDirection::Down => {
            "SELECT id, sort_order FROM trip_destinations WHERE trip_id = ?1 AND (sort_order > ?2 OR (sort_order = ?2 AND id > ?3)) ORDER BY sort_order, id LIMIT 1"
        }
    };
    let neighbour: Option<(i64, i64)> = sqlx::query_as(neighbour_sql)
        .bind(trip_id)
        .bind(current)
        .bind(destination_id)
        .fetch_optional(&mut *tx)
        .await?;

    if let Some((neighbour_id, neighbour_order)) = neighbour {
        // Equal orders would make the swap a no-op, so nudge them apart.
        let (mine, theirs) = if neighbour_order == current {
            match direction {
                MoveDirection::Up => (current, current + 1),
                MoveDirection::Down => (current + 1, current),
            }
        } else {
            (neighbour_order, current)
        };
        for (id, order) in [(destination_id, mine), (neighbour_id, theirs)] {
            sqlx::query("UPDATE trip_destinations SET sort_order = ?1 WHERE id = ?2")
                .bind(order)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        debug!(trip_id, destination_id, direction = direction.as_str(), "destination moved");
    }
    tx.commit().await?;

    list_destinations(db, trip_id).await
}

pub async fn remove_destination(db: &DbPool, trip_id: i64, destination_id: i64) -> Result<(), AppError> {
    let removed = sqlx::query("DELETE FROM trip_destinations WHERE id = ?1 AND trip_id = ?2")
        .bind(destination_id)
        .bind(trip_id)
        .execute(db)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(AppError::NotFound("Destination not found"));
    }
    Ok(())
}
