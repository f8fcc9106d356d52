//! Database models for audit log entries.

use crate::types::{AuditLogId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLogDBResponse {
    pub id: AuditLogId,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub action: String,
    pub details: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub severity: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuditLogCreateDBRequest {
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub action: String,
    pub details: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub severity: String,
}

impl AuditLogCreateDBRequest {
    /// A warning-severity entry attributed to an IP rather than a user.
    pub fn security_warning(action: &str, ip: &str, details: serde_json::Value) -> Self {
        Self {
            user_id: None,
            username: None,
            action: action.to_string(),
            details: Some(details),
            ip: Some(ip.to_string()),
            user_agent: None,
            status: "blocked".to_string(),
            severity: "warning".to_string(),
        }
    }
}
