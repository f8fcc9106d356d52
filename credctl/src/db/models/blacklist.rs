//! Database models for the IP blacklist.

use crate::types::BlacklistEntryId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "blacklist_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BlacklistReason {
    Manual,
    Abuse,
    BruteForce,
    SuspiciousPattern,
    RateLimitExceeded,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BlacklistDBResponse {
    pub id: BlacklistEntryId,
    pub ip: String,
    pub reason: BlacklistReason,
    pub description: Option<String>,
    pub attempt_count: i32,
    pub attempt_context: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub active: bool,
    pub blocked_by: String,
    pub blocked_at: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
    /// None means the block is permanent
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct BlacklistCreateDBRequest {
    pub ip: String,
    pub reason: BlacklistReason,
    pub description: Option<String>,
    pub attempt_context: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub active: bool,
    pub blocked_by: String,
    pub expires_at: Option<DateTime<Utc>>,
}
