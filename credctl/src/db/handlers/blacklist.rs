use crate::db::errors::{DbError, Result};
use crate::db::models::blacklist::{BlacklistCreateDBRequest, BlacklistDBResponse};
use crate::types::{BlacklistEntryId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Blacklists<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Blacklists<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// The entry currently blocking `ip`, if any. Entries past their expiry
    /// do not block even while still marked active.
    #[instrument(skip(self), err)]
    pub async fn find_blocking(&mut self, ip: &str, now: DateTime<Utc>) -> Result<Option<BlacklistDBResponse>> {
        let entry = sqlx::query_as::<_, BlacklistDBResponse>(
            r#"
            SELECT * FROM blacklist
            WHERE ip = $1 AND active AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(ip)
        .bind(now)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(entry)
    }

    /// Any entry for `ip`, blocking or not. The detector uses this to find
    /// warning entries it should escalate.
    #[instrument(skip(self), err)]
    pub async fn find_by_ip(&mut self, ip: &str) -> Result<Option<BlacklistDBResponse>> {
        let entry = sqlx::query_as::<_, BlacklistDBResponse>("SELECT * FROM blacklist WHERE ip = $1")
            .bind(ip)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(entry)
    }

    #[instrument(skip(self, request), fields(ip = %request.ip, reason = ?request.reason), err)]
    pub async fn create(&mut self, request: &BlacklistCreateDBRequest) -> Result<BlacklistDBResponse> {
        let entry = sqlx::query_as::<_, BlacklistDBResponse>(
            r#"
            INSERT INTO blacklist
                (ip, reason, description, attempt_context, user_agent, endpoint, method, active, blocked_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&request.ip)
        .bind(request.reason)
        .bind(&request.description)
        .bind(&request.attempt_context)
        .bind(&request.user_agent)
        .bind(&request.endpoint)
        .bind(&request.method)
        .bind(request.active)
        .bind(&request.blocked_by)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(entry)
    }

    /// Upsert an active block for `ip`. A re-triggered IP keeps its single row:
    /// the attempt counter grows and the block window restarts from now.
    #[instrument(skip(self, request), fields(ip = %request.ip, reason = ?request.reason), err)]
    pub async fn upsert_block(&mut self, request: &BlacklistCreateDBRequest) -> Result<BlacklistDBResponse> {
        let entry = sqlx::query_as::<_, BlacklistDBResponse>(
            r#"
            INSERT INTO blacklist
                (ip, reason, description, attempt_context, user_agent, endpoint, method, active, blocked_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8, $9)
            ON CONFLICT (ip) DO UPDATE SET
                reason = EXCLUDED.reason,
                description = EXCLUDED.description,
                attempt_count = blacklist.attempt_count + 1,
                attempt_context = COALESCE(EXCLUDED.attempt_context, blacklist.attempt_context),
                user_agent = COALESCE(EXCLUDED.user_agent, blacklist.user_agent),
                endpoint = COALESCE(EXCLUDED.endpoint, blacklist.endpoint),
                method = COALESCE(EXCLUDED.method, blacklist.method),
                active = TRUE,
                blocked_by = EXCLUDED.blocked_by,
                blocked_at = NOW(),
                last_attempt = NOW(),
                expires_at = EXCLUDED.expires_at
            RETURNING *
            "#,
        )
        .bind(&request.ip)
        .bind(request.reason)
        .bind(&request.description)
        .bind(&request.attempt_context)
        .bind(&request.user_agent)
        .bind(&request.endpoint)
        .bind(&request.method)
        .bind(&request.blocked_by)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(entry)
    }

    /// Bump the attempt counter on an existing entry and stamp last_attempt.
    #[instrument(skip(self), fields(entry_id = %abbrev_uuid(&id)), err)]
    pub async fn record_attempt(&mut self, id: BlacklistEntryId) -> Result<BlacklistDBResponse> {
        let entry = sqlx::query_as::<_, BlacklistDBResponse>(
            r#"
            UPDATE blacklist
            SET attempt_count = attempt_count + 1, last_attempt = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(entry)
    }

    /// Deactivate an entry (admin unblock). Returns false if the entry does not exist.
    #[instrument(skip(self), fields(entry_id = %abbrev_uuid(&id)), err)]
    pub async fn deactivate(&mut self, id: BlacklistEntryId) -> Result<bool> {
        let result = sqlx::query("UPDATE blacklist SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All active entries, newest first.
    #[instrument(skip(self), err)]
    pub async fn list_active(&mut self) -> Result<Vec<BlacklistDBResponse>> {
        let entries = sqlx::query_as::<_, BlacklistDBResponse>("SELECT * FROM blacklist WHERE active ORDER BY blocked_at DESC")
            .fetch_all(&mut *self.db)
            .await?;

        Ok(entries)
    }
}
