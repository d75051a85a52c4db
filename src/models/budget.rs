use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct BudgetEnvelope {
    pub id: i64,
    pub trip_id: i64,
    pub category: String,
    pub planned_amount: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetEnvelopeCreate {
    pub trip_id: i64,
    pub category: String,
    pub planned_amount: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BudgetEnvelopeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planned_amount: Option<f64>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Expense {
    pub id: i64,
    pub trip_id: i64,
    pub envelope_id: Option<i64>,
    pub event_id: Option<i64>,
    pub description: String,
    pub amount: f64,
    pub currency: String,
    pub spent_at_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseCreate {
    pub trip_id: i64,
    #[serde(default)]
    pub envelope_id: Option<i64>,
    #[serde(default)]
    pub event_id: Option<i64>,
    pub description: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub spent_at_date: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpenseUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<i64>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub envelope_id: Option<Option<i64>>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spent_at_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvelopeSummary {
    pub envelope: BudgetEnvelope,
    pub actual_spent: f64,
    pub remaining: f64,
    pub percent_used: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryTotals {
    pub planned_total: f64,
    pub actual_total: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BudgetTotals {
    pub planned_total_all: f64,
    pub actual_total_all: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetSummary {
    pub envelopes: Vec<EnvelopeSummary>,
    pub expenses: Vec<Expense>,
    pub categories: BTreeMap<String, CategoryTotals>,
    pub totals: BudgetTotals,
    pub remaining_total: f64,
    pub recommended_daily_spend: f64,
}

fn default_currency() -> String {
    "USD".into()
}
