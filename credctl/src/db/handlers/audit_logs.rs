use crate::db::errors::Result;
use crate::db::models::audit_logs::{AuditLogCreateDBRequest, AuditLogDBResponse};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogFilter {
    pub action: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditLogFilter {
    fn default() -> Self {
        Self {
            action: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Append-only audit trail.
pub struct AuditLogs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> AuditLogs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(action = %request.action), err)]
    pub async fn create(&mut self, request: &AuditLogCreateDBRequest) -> Result<AuditLogDBResponse> {
        let entry = sqlx::query_as::<_, AuditLogDBResponse>(
            r#"
            INSERT INTO audit_logs (user_id, username, action, details, ip, user_agent, status, severity)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.username)
        .bind(&request.action)
        .bind(&request.details)
        .bind(&request.ip)
        .bind(&request.user_agent)
        .bind(&request.status)
        .bind(&request.severity)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(entry)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, offset = filter.offset), err)]
    pub async fn list(&mut self, filter: &AuditLogFilter) -> Result<Vec<AuditLogDBResponse>> {
        let entries = sqlx::query_as::<_, AuditLogDBResponse>(
            r#"
            SELECT * FROM audit_logs
            WHERE ($1::text IS NULL OR action = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&filter.action)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(entries)
    }
}
