use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::user::TripRole;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Trip {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_budget: f64,
    pub currency: String,
    pub party_size: i64,
    pub price_sensitivity: String,
    pub trip_type: String,
}

impl Trip {
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    pub name: String,
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub total_budget: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_party_size")]
    pub party_size: i64,
    #[serde(default = "default_style")]
    pub price_sensitivity: String,
    #[serde(default = "default_style")]
    pub trip_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_sensitivity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_type: Option<String>,
}

impl TripUpdate {
    pub fn apply(self, trip: &mut Trip) {
        if let Some(name) = self.name {
            trip.name = name;
        }
        if let Some(destination) = self.destination {
            trip.destination = destination;
        }
        if let Some(start_date) = self.start_date {
            trip.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            trip.end_date = end_date;
        }
        if let Some(total_budget) = self.total_budget {
            trip.total_budget = total_budget;
        }
        if let Some(currency) = self.currency {
            trip.currency = currency;
        }
        if let Some(party_size) = self.party_size {
            trip.party_size = party_size;
        }
        if let Some(price_sensitivity) = self.price_sensitivity {
            trip.price_sensitivity = price_sensitivity;
        }
        if let Some(trip_type) = self.trip_type {
            trip.trip_type = trip_type;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TripMember {
    pub id: i64,
    pub trip_id: i64,
    pub user_id: i64,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripMemberUpsert {
    pub user_id: i64,
    pub role: String,
}

impl TripMemberUpsert {
    pub fn parsed_role(&self) -> Result<TripRole, String> {
        self.role.parse()
    }
}

fn default_currency() -> String {
    "USD".into()
}

fn default_party_size() -> i64 {
    1
}

fn default_style() -> String {
    "balanced".into()
}
