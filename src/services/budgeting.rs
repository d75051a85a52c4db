//! Budget envelopes, expenses and the per-trip spending summary.
//!
//! Default envelopes split the trip's total budget across four categories.
//! The split starts from the traveller's price sensitivity and is then
//! nudged by the trip type before being normalised back to 1.0.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        budget::{
            BudgetEnvelope, BudgetEnvelopeCreate, BudgetEnvelopeUpdate, BudgetSummary,
            BudgetTotals, CategoryTotals, EnvelopeSummary, Expense, ExpenseCreate, ExpenseUpdate,
            UNCATEGORIZED,
        },
        trip::Trip,
    },
};

const ENVELOPE_COLUMNS: &str = "id, trip_id, category, planned_amount, notes";
const EXPENSE_COLUMNS: &str =
    "id, trip_id, envelope_id, event_id, description, amount, currency, spent_at_date";

pub fn allocation_ratios(price_sensitivity: &str, trip_type: &str) -> BTreeMap<String, f64> {
    let [mut food, mut activities, mut transport, mut flex] =
        match price_sensitivity.trim().to_ascii_lowercase().as_str() {
            "frugal" => [0.25, 0.25, 0.25, 0.25],
            "treat_yourself" => [0.32, 0.36, 0.16, 0.16],
            _ => [0.30, 0.30, 0.20, 0.20],
        };

    match trip_type.trim().to_ascii_lowercase().as_str() {
        "foodie" => {
            food += 0.08;
            activities -= 0.04;
            flex -= 0.04;
        }
        "hiking" | "adventurous" => {
            transport += 0.05;
            activities += 0.05;
            food -= 0.05;
            flex -= 0.05;
        }
        "chill" | "relaxing" => {
            flex += 0.05;
            food += 0.03;
            activities -= 0.08;
        }
        _ => {}
    }

    let total = food + activities + transport + flex;
    let normalise = |value: f64| if total > 0.0 { value / total } else { value };
    BTreeMap::from([
        ("food".to_string(), normalise(food)),
        ("activities".to_string(), normalise(activities)),
        ("transport".to_string(), normalise(transport)),
        ("flex".to_string(), normalise(flex)),
    ])
}

pub fn allocate_default_envelopes(trip: &Trip) -> BTreeMap<String, f64> {
    allocation_ratios(&trip.price_sensitivity, &trip.trip_type)
        .into_iter()
        .map(|(category, ratio)| (category, round_cents(trip.total_budget * ratio)))
        .collect()
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Creates missing categories and overwrites the planned amount of existing
/// ones. Envelopes in other categories are left alone.
pub async fn ensure_envelopes(
    conn: &mut SqliteConnection,
    trip_id: i64,
    planned: &BTreeMap<String, f64>,
) -> Result<(), AppError> {
    for (category, amount) in planned {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM budget_envelopes WHERE trip_id = ?1 AND category = ?2 ORDER BY id LIMIT 1",
        )
        .bind(trip_id)
        .bind(category)
        .fetch_optional(&mut *conn)
        .await?;

        match existing {
            Some(id) => {
                sqlx::query("UPDATE budget_envelopes SET planned_amount = ?1 WHERE id = ?2")
                    .bind(amount)
                    .bind(id)
                    .execute(&mut *conn)
                    .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO budget_envelopes (trip_id, category, planned_amount) VALUES (?1, ?2, ?3)",
                )
                .bind(trip_id)
                .bind(category)
                .bind(amount)
                .execute(&mut *conn)
                .await?;
            }
        }
    }
    debug!(trip_id, categories = planned.len(), "envelopes allocated");
    Ok(())
}

/// Builds the spending summary for `trip` as of `today`.
pub fn summarize(
    trip: &Trip,
    envelopes: Vec<BudgetEnvelope>,
    expenses: Vec<Expense>,
    today: NaiveDate,
) -> BudgetSummary {
    let mut categories: BTreeMap<String, CategoryTotals> = BTreeMap::new();
    let category_of: HashMap<i64, &str> = envelopes
        .iter()
        .map(|env| (env.id, env.category.as_str()))
        .collect();

    for env in &envelopes {
        categories
            .entry(env.category.clone())
            .or_default()
            .planned_total += env.planned_amount;
    }
    for exp in &expenses {
        let category = exp
            .envelope_id
            .and_then(|id| category_of.get(&id).copied())
            .unwrap_or(UNCATEGORIZED);
        categories
            .entry(category.to_string())
            .or_default()
            .actual_total += exp.amount;
    }

    let totals = BudgetTotals {
        planned_total_all: categories.values().map(|c| c.planned_total).sum(),
        actual_total_all: categories.values().map(|c| c.actual_total).sum(),
    };

    let remaining_total = (trip.total_budget - totals.actual_total_all).max(0.0);
    let days_left = ((trip.end_date - today).num_days() + 1).max(1);
    let recommended_daily_spend = remaining_total / days_left as f64;

    let envelope_summaries = envelopes
        .into_iter()
        .map(|envelope| {
            let actual_spent: f64 = expenses
                .iter()
                .filter(|exp| exp.envelope_id == Some(envelope.id))
                .map(|exp| exp.amount)
                .sum();
            let remaining = (envelope.planned_amount - actual_spent).max(0.0);
            let percent_used = if envelope.planned_amount != 0.0 {
                (actual_spent / envelope.planned_amount * 100.0).clamp(0.0, 100.0)
            } else {
                0.0
            };
            EnvelopeSummary {
                envelope,
                actual_spent,
                remaining,
                percent_used,
            }
        })
        .collect();

    BudgetSummary {
        envelopes: envelope_summaries,
        expenses,
        categories,
        totals,
        remaining_total,
        recommended_daily_spend,
    }
}

pub async fn list_envelopes(db: &DbPool, trip_id: i64) -> Result<Vec<BudgetEnvelope>, AppError> {
    let envelopes = sqlx::query_as::<_, BudgetEnvelope>(&format!(
        "SELECT {ENVELOPE_COLUMNS} FROM budget_envelopes WHERE trip_id = ?1 ORDER BY id"
    ))
    .bind(trip_id)
    .fetch_all(db)
    .await?;
    Ok(envelopes)
}

pub async fn list_expenses(db: &DbPool, trip_id: i64) -> Result<Vec<Expense>, AppError> {
    let expenses = sqlx::query_as::<_, Expense>(&format!(
        "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE trip_id = ?1 ORDER BY spent_at_date, id"
    ))
    .bind(trip_id)
    .fetch_all(db)
    .await?;
    Ok(expenses)
}

pub async fn summary_for(db: &DbPool, trip: &Trip, today: NaiveDate) -> Result<BudgetSummary, AppError> {
    let envelopes = list_envelopes(db, trip.id).await?;
    let expenses = list_expenses(db, trip.id).await?;
    Ok(summarize(trip, envelopes, expenses, today))
}

pub async fn recalculate(db: &DbPool, trip: &Trip) -> Result<Vec<BudgetEnvelope>, AppError> {
    let planned = allocate_default_envelopes(trip);
    let mut conn = db.acquire().await?;
    ensure_envelopes(&mut conn, trip.id, &planned).await?;
    drop(conn);
    list_envelopes(db, trip.id).await
}

pub(crate) fn require_trip_match(path_trip_id: i64, payload_trip_id: i64) -> Result<(), AppError> {
    if path_trip_id != payload_trip_id {
        return Err(AppError::BadRequest("Trip ID mismatch".into()));
    }
    Ok(())
}

pub async fn get_envelope(db: &DbPool, envelope_id: i64) -> Result<BudgetEnvelope, AppError> {
    sqlx::query_as::<_, BudgetEnvelope>(&format!(
        "SELECT {ENVELOPE_COLUMNS} FROM budget_envelopes WHERE id = ?1"
    ))
    .bind(envelope_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound("Budget envelope not found"))
}

pub async fn create_envelope(
    db: &DbPool,
    trip_id: i64,
    payload: BudgetEnvelopeCreate,
) -> Result<BudgetEnvelope, AppError> {
    require_trip_match(trip_id, payload.trip_id)?;
    let category = payload.category.trim();
    if category.is_empty() {
        return Err(AppError::BadRequest("Category is required".into()));
    }
    let id = sqlx::query(
        "INSERT INTO budget_envelopes (trip_id, category, planned_amount, notes) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(trip_id)
    .bind(category)
    .bind(payload.planned_amount)
    .bind(&payload.notes)
    .execute(db)
    .await?
    .last_insert_rowid();
    get_envelope(db, id).await
}

pub async fn update_envelope(
    db: &DbPool,
    mut envelope: BudgetEnvelope,
    payload: BudgetEnvelopeUpdate,
) -> Result<BudgetEnvelope, AppError> {
    if payload.trip_id.is_some_and(|id| id != envelope.trip_id) {
        return Err(AppError::BadRequest(
            "Cannot move envelope to another trip".into(),
        ));
    }
    if let Some(category) = payload.category {
        envelope.category = category;
    }
    if let Some(planned_amount) = payload.planned_amount {
        envelope.planned_amount = planned_amount;
    }
    if let Some(notes) = payload.notes {
        envelope.notes = notes;
    }
    sqlx::query(
        "UPDATE budget_envelopes SET category = ?1, planned_amount = ?2, notes = ?3 WHERE id = ?4",
    )
    .bind(&envelope.category)
    .bind(envelope.planned_amount)
    .bind(&envelope.notes)
    .bind(envelope.id)
    .execute(db)
    .await?;
    Ok(envelope)
}

pub async fn delete_envelope(db: &DbPool, envelope_id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM budget_envelopes WHERE id = ?1")
        .bind(envelope_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn get_expense(db: &DbPool, expense_id: i64) -> Result<Expense, AppError> {
    sqlx::query_as::<_, Expense>(&format!(
        "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1"
    ))
    .bind(expense_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound("Expense not found"))
}

/// Envelope and event references must point into the same trip.
async fn check_expense_links(
    db: &DbPool,
    trip_id: i64,
    envelope_id: Option<i64>,
    event_id: Option<i64>,
) -> Result<(), AppError> {
    if let Some(envelope_id) = envelope_id {
        let owner: Option<i64> =
            sqlx::query_scalar("SELECT trip_id FROM budget_envelopes WHERE id = ?1")
                .bind(envelope_id)
                .fetch_optional(db)
                .await?;
        if owner != Some(trip_id) {
            return Err(AppError::BadRequest(
                "Envelope does not belong to this trip".into(),
            ));
        }
    }
    if let Some(event_id) = event_id {
        let owner: Option<i64> = sqlx::query_scalar("SELECT trip_id FROM events WHERE id = ?1")
            .bind(event_id)
            .fetch_optional(db)
            .await?;
        if owner != Some(trip_id) {
            return Err(AppError::BadRequest(
                "Event does not belong to this trip".into(),
            ));
        }
    }
    Ok(())
}

pub async fn create_expense(
    db: &DbPool,
    trip_id: i64,
    payload: ExpenseCreate,
) -> Result<Expense, AppError> {
    require_trip_match(trip_id, payload.trip_id)?;
    check_expense_links(db, trip_id, payload.envelope_id, payload.event_id).await?;
    let id = sqlx::query(
        r#"INSERT INTO expenses (trip_id, envelope_id, event_id, description, amount, currency, spent_at_date)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
    )
    .bind(trip_id)
    .bind(payload.envelope_id)
    .bind(payload.event_id)
    .bind(payload.description.trim())
    .bind(payload.amount)
    .bind(&payload.currency)
    .bind(payload.spent_at_date)
    .execute(db)
    .await?
    .last_insert_rowid();
    get_expense(db, id).await
}

pub async fn update_expense(
    db: &DbPool,
    mut expense: Expense,
    payload: ExpenseUpdate,
) -> Result<Expense, AppError> {
    if payload.trip_id.is_some_and(|id| id != expense.trip_id) {
        return Err(AppError::BadRequest(
            "Cannot move expense to another trip".into(),
        ));
    }
    if let Some(envelope_id) = payload.envelope_id {
        expense.envelope_id = envelope_id;
    }
    if let Some(event_id) = payload.event_id {
        expense.event_id = event_id;
    }
    if let Some(description) = payload.description {
        expense.description = description;
    }
    if let Some(amount) = payload.amount {
        expense.amount = amount;
    }
    if let Some(currency) = payload.currency {
        expense.currency = currency;
    }
    if let Some(spent_at_date) = payload.spent_at_date {
        expense.spent_at_date = spent_at_date;
    }
    check_expense_links(db, expense.trip_id, expense.envelope_id, expense.event_id).await?;

    sqlx::query(
        r#"UPDATE expenses SET envelope_id = ?1, event_id = ?2, description = ?3, amount = ?4,
                  currency = ?5, spent_at_date = ?6
           WHERE id = ?7"#,
    )
    .bind(expense.envelope_id)
    .bind(expense.event_id)
    .bind(&expense.description)
    .bind(expense.amount)
    .bind(&expense.currency)
    .bind(expense.spent_at_date)
    .bind(expense.id)
    .execute(db)
    .await?;
    Ok(expense)
}

pub async fn delete_expense(db: &DbPool, expense_id: i64) -> Result<(), AppError> {
    sqlx::query("DELETE FROM expenses WHERE id = ?1")
        .bind(expense_id)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(total_budget: f64, sensitivity: &str, trip_type: &str) -> Trip {
        Trip {
            id: 1,
            owner_id: 1,
            name: "Test".into(),
            destination: "Lisbon".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 6, 5).unwrap(),
            total_budget,
            currency: "USD".into(),
            party_size: 1,
            price_sensitivity: sensitivity.into(),
            trip_type: trip_type.into(),
        }
    }

    fn envelope(id: i64, category: &str, planned: f64) -> BudgetEnvelope {
        BudgetEnvelope {
            id,
            trip_id: 1,
            category: category.into(),
            planned_amount: planned,
            notes: None,
        }
    }

    fn expense(id: i64, envelope_id: Option<i64>, amount: f64) -> Expense {
        Expense {
            id,
            trip_id: 1,
            envelope_id,
            event_id: None,
            description: format!("expense {id}"),
            amount,
            currency: "USD".into(),
            spent_at_date: NaiveDate::from_ymd_opt(2026, 6, 2).unwrap(),
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn balanced_ratios_are_the_base_split() {
        let ratios = allocation_ratios("balanced", "balanced");
        assert_close(ratios["food"], 0.30);
        assert_close(ratios["activities"], 0.30);
        assert_close(ratios["transport"], 0.20);
        assert_close(ratios["flex"], 0.20);
    }

    #[test]
    fn ratios_always_sum_to_one() {
        for sensitivity in ["frugal", "balanced", "treat_yourself", ""] {
            for trip_type in ["foodie", "hiking", "adventurous", "chill", "relaxing", "cultural"] {
                let sum: f64 = allocation_ratios(sensitivity, trip_type).values().sum();
                assert_close(sum, 1.0);
            }
        }
    }

    #[test]
    fn foodie_shifts_budget_towards_food() {
        let ratios = allocation_ratios("FRUGAL", "Foodie");
        assert_close(ratios["food"], 0.33);
        assert_close(ratios["activities"], 0.21);
        assert_close(ratios["flex"], 0.21);
        assert_close(ratios["transport"], 0.25);
    }

    #[test]
    fn default_envelopes_round_to_cents() {
        let planned = allocate_default_envelopes(&trip(1000.0, "treat_yourself", "chill"));
        assert_close(planned["food"], 350.0);
        assert_close(planned["activities"], 280.0);
        assert_close(planned["transport"], 160.0);
        assert_close(planned["flex"], 210.0);
    }

    #[test]
    fn summary_groups_unassigned_expenses() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 3).unwrap();
        let summary = summarize(
            &trip(1000.0, "balanced", "balanced"),
            vec![envelope(10, "food", 200.0), envelope(11, "transport", 0.0)],
            vec![
                expense(1, Some(10), 50.0),
                expense(2, None, 25.0),
                expense(3, Some(11), 40.0),
            ],
            today,
        );

        assert_close(summary.categories["food"].actual_total, 50.0);
        assert_close(summary.categories[UNCATEGORIZED].actual_total, 25.0);
        assert_close(summary.categories[UNCATEGORIZED].planned_total, 0.0);
        assert_close(summary.totals.planned_total_all, 200.0);
        assert_close(summary.totals.actual_total_all, 115.0);
        assert_close(summary.remaining_total, 885.0);
        // June 3rd to June 5th inclusive
        assert_close(summary.recommended_daily_spend, 295.0);

        let food = &summary.envelopes[0];
        assert_close(food.percent_used, 25.0);
        assert_close(food.remaining, 150.0);
        let transport = &summary.envelopes[1];
        assert_close(transport.percent_used, 0.0);
        assert_close(transport.remaining, 0.0);
    }

    #[test]
    fn overspent_envelopes_are_clamped() {
        let summary = summarize(
            &trip(100.0, "balanced", "balanced"),
            vec![envelope(10, "food", 50.0)],
            vec![expense(1, Some(10), 180.0)],
            NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        );
        assert_close(summary.envelopes[0].percent_used, 100.0);
        assert_close(summary.envelopes[0].remaining, 0.0);
        assert_close(summary.remaining_total, 0.0);
        assert_close(summary.recommended_daily_spend, 0.0);
    }

    #[test]
    fn finished_trips_spread_remaining_over_one_day() {
        let summary = summarize(
            &trip(300.0, "balanced", "balanced"),
            Vec::new(),
            Vec::new(),
            NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
        );
        assert_close(summary.recommended_daily_spend, 300.0);
    }
}
