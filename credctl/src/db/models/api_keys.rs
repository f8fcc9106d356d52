//! Database models for API keys.

use crate::duration::DurationUnit;
use crate::types::{ApiKeyId, Endpoint, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKeyDBResponse {
    pub id: ApiKeyId,
    pub key: String,
    pub user_id: UserId,
    pub endpoint: Endpoint,
    pub duration_amount: Option<i32>,
    pub duration_unit: Option<DurationUnit>,
    /// None means the key never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub usage_count: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub can_renew: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyDBResponse {
    /// Whether the key's expiry instant has passed. Permanent keys never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

/// The key token itself is generated by the caller so collisions can be
/// retried without re-building the rest of the request.
#[derive(Debug, Clone)]
pub struct ApiKeyCreateDBRequest {
    pub key: String,
    pub user_id: UserId,
    pub endpoint: Endpoint,
    pub duration_amount: Option<i32>,
    pub duration_unit: Option<DurationUnit>,
    pub expires_at: Option<DateTime<Utc>>,
    pub can_renew: bool,
    pub created_by: String,
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeyUpdateDBRequest {
    pub active: Option<bool>,
    pub can_renew: Option<bool>,
}
