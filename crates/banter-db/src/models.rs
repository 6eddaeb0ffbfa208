//! Database row types — these map directly to SQLite rows.
//! Distinct from the banter-types API models to keep the DB layer independent.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub preferences: Option<String>,
    pub created_at: String,
}

pub struct SessionRow {
    pub token: String,
    pub user_id: String,
    pub created_at: String,
    pub expires_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub role: String,
    pub image_url: Option<String>,
    pub created_at: String,
}

/// Timestamps are written by the application as RFC3339 UTC with millisecond
/// precision, so read-time ordering and parsing are deterministic.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Tolerate SQLite's "YYYY-MM-DD HH:MM:SS" form from hand-edited rows.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
