//! API request/response models for the security admin surface.

use crate::db::models::audit_logs::AuditLogDBResponse;
use crate::db::models::blacklist::{BlacklistDBResponse, BlacklistReason};
use crate::types::{AuditLogId, BlacklistEntryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: BlacklistEntryId,
    pub ip: String,
    pub reason: BlacklistReason,
    pub description: Option<String>,
    pub attempt_count: i32,
    #[schema(value_type = Object)]
    pub attempt_context: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub active: bool,
    pub blocked_by: String,
    pub blocked_at: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
    /// Absent for permanent blocks
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<BlacklistDBResponse> for BlacklistEntryResponse {
    fn from(db: BlacklistDBResponse) -> Self {
        Self {
            id: db.id,
            ip: db.ip,
            reason: db.reason,
            description: db.description,
            attempt_count: db.attempt_count,
            attempt_context: db.attempt_context,
            user_agent: db.user_agent,
            endpoint: db.endpoint,
            method: db.method,
            active: db.active,
            blocked_by: db.blocked_by,
            blocked_at: db.blocked_at,
            last_attempt: db.last_attempt,
            expires_at: db.expires_at,
        }
    }
}

/// Manual block request. Without `durationHours` the block is permanent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManualBlock {
    pub ip: String,
    pub description: Option<String>,
    pub duration_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AuditLogId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub action: String,
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub severity: String,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogDBResponse> for AuditLogResponse {
    fn from(db: AuditLogDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            username: db.username,
            action: db.action,
            details: db.details,
            ip: db.ip,
            user_agent: db.user_agent,
            status: db.status,
            severity: db.severity,
            created_at: db.created_at,
        }
    }
}

/// Query parameters for listing audit logs
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct AuditLogQuery {
    /// Filter to a single action name
    pub action: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
