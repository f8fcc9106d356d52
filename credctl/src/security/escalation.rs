//! Blacklist escalation: the one path onto the blacklist.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use tracing::instrument;

use crate::db::errors::DbError;
use crate::db::handlers::{AuditLogs, Blacklists};
use crate::db::models::audit_logs::AuditLogCreateDBRequest;
use crate::db::models::blacklist::{BlacklistCreateDBRequest, BlacklistDBResponse, BlacklistReason};
use crate::errors::Result;

/// Everything needed to put (or re-activate) an IP on the blacklist.
#[derive(Debug, Clone)]
pub struct Escalation {
    pub ip: String,
    pub reason: BlacklistReason,
    pub description: Option<String>,
    pub attempt_context: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub blocked_by: String,
    /// None blocks permanently
    pub expires_at: Option<DateTime<Utc>>,
}

/// Upsert an active block for the IP and write the matching audit entry, in
/// one transaction. Used by the rate limiter, the pattern detector and manual
/// admin blocks alike, so there is exactly one row per IP no matter who
/// triggered it.
#[instrument(skip(pool, escalation), fields(ip = %escalation.ip, reason = ?escalation.reason), err)]
pub async fn escalate(pool: &PgPool, escalation: Escalation) -> Result<BlacklistDBResponse> {
    let mut tx = pool.begin().await.map_err(DbError::from)?;

    let entry = Blacklists::new(&mut tx)
        .upsert_block(&BlacklistCreateDBRequest {
            ip: escalation.ip.clone(),
            reason: escalation.reason,
            description: escalation.description.clone(),
            attempt_context: escalation.attempt_context,
            user_agent: escalation.user_agent,
            endpoint: escalation.endpoint,
            method: escalation.method,
            active: true,
            blocked_by: escalation.blocked_by.clone(),
            expires_at: escalation.expires_at,
        })
        .await?;

    AuditLogs::new(&mut tx)
        .create(&AuditLogCreateDBRequest {
            user_id: None,
            username: Some(escalation.blocked_by),
            action: "ip_blacklisted".to_string(),
            details: Some(json!({
                "reason": escalation.reason,
                "description": escalation.description,
                "expires_at": escalation.expires_at,
                "attempt_count": entry.attempt_count,
            })),
            ip: Some(escalation.ip),
            user_agent: None,
            status: "blocked".to_string(),
            severity: "warning".to_string(),
        })
        .await?;

    tx.commit().await.map_err(DbError::from)?;
    Ok(entry)
}
