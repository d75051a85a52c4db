use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Itinerary item. `kind` travels as `type` on the wire and in the table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Event {
    pub id: i64,
    pub trip_id: i64,
    pub location_id: Option<i64>,
    pub date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub title: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub cost: Option<f64>,
    pub notes: Option<String>,
    pub category_type: String,
    pub is_refundable: bool,
    pub reservation_link: Option<String>,
}

pub const DEFAULT_CATEGORY: &str = "other";

impl Event {
    pub fn category(&self) -> String {
        self.category_type.to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCreate {
    pub trip_id: i64,
    #[serde(default)]
    pub location_id: Option<i64>,
    pub date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category_type: Option<String>,
    #[serde(default)]
    pub is_refundable: Option<bool>,
    #[serde(default)]
    pub reservation_link: Option<String>,
}

/// Partial update. For nullable columns the outer `Option` says whether the
/// field was sent, the inner one whether it was `null`. A `null`
/// `category_type` resets the category to `other`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventUpdate {
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub location_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<Option<NaiveTime>>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_time: Option<Option<NaiveTime>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cost: Option<Option<f64>>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub category_type: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_refundable: Option<bool>,
    #[serde(
        default,
        with = "::serde_with::rust::double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub reservation_link: Option<Option<String>>,
}

impl EventUpdate {
    pub fn reschedule(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    pub fn apply(self, event: &mut Event) {
        if let Some(location_id) = self.location_id {
            event.location_id = location_id;
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(start_time) = self.start_time {
            event.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            event.end_time = end_time;
        }
        if let Some(title) = self.title {
            event.title = title;
        }
        if let Some(kind) = self.kind {
            event.kind = kind;
        }
        if let Some(cost) = self.cost {
            event.cost = cost;
        }
        if let Some(notes) = self.notes {
            event.notes = notes;
        }
        if let Some(category_type) = self.category_type {
            event.category_type = category_type.unwrap_or_else(|| DEFAULT_CATEGORY.into());
        }
        if let Some(is_refundable) = self.is_refundable {
            event.is_refundable = is_refundable;
        }
        if let Some(reservation_link) = self.reservation_link {
            event.reservation_link = reservation_link;
        }
    }
}
