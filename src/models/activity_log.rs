//! Activity log domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the action an activity entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    #[default]
    Success,
    Failed,
    Warning,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Success => "success",
            ActivityStatus::Failed => "failed",
            ActivityStatus::Warning => "warning",
        }
    }
}

/// A buffered activity event awaiting database persistence.
///
/// `created_at` is stamped once when the entry is constructed and travels
/// with the entry through the buffer file; the database insert timestamp is
/// recorded separately and never replaces it. Entries are immutable once
/// buffered: a flush either removes them or leaves them untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub user_id: Option<i32>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i32>,
    pub description: Option<String>,
    pub log_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub status: ActivityStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted activity log row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityLogRecord {
    pub id: i32,
    pub user_id: Option<i32>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i32>,
    pub description: Option<String>,
    pub log_data: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

/// Activity log query filters
#[derive(Debug, Default, Deserialize)]
pub struct ActivityLogFilters {
    pub user_id: Option<i32>,
    pub action: Option<String>,
    pub status: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}
