use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Stored session; `id` is the SHA-256 digest of the bearer token handed to
/// the client, never the token itself.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
