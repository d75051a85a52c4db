use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Location {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A trip stop together with the place it points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Destination {
    pub id: i64,
    pub sort_order: i64,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationCreate {
    pub name: String,
    #[serde(rename = "type", default = "default_location_kind")]
    pub kind: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
}

impl MoveDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveDirection::Up => "up",
            MoveDirection::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveQuery {
    pub direction: MoveDirection,
}

fn default_location_kind() -> String {
    "city".into()
}
