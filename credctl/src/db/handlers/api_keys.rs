use std::collections::HashMap;

use crate::db::errors::{DbError, Result};
use crate::db::handlers::repository::Repository;
use crate::db::models::api_keys::{ApiKeyCreateDBRequest, ApiKeyDBResponse, ApiKeyUpdateDBRequest};
use crate::duration::DurationUnit;
use crate::types::{ApiKeyId, Endpoint, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;

/// Filter for listing API keys
#[derive(Debug, Clone, Default)]
pub struct ApiKeyFilter {
    pub user_id: Option<UserId>,
}

pub struct ApiKeys<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for ApiKeys<'c> {
    type CreateRequest = ApiKeyCreateDBRequest;
    type UpdateRequest = ApiKeyUpdateDBRequest;
    type Response = ApiKeyDBResponse;
    type Id = ApiKeyId;
    type Filter = ApiKeyFilter;

    #[instrument(skip(self, request), fields(endpoint = %request.endpoint), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let api_key = sqlx::query_as::<_, ApiKeyDBResponse>(
            r#"
            INSERT INTO api_keys (key, user_id, endpoint, duration_amount, duration_unit, expires_at, can_renew, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&request.key)
        .bind(request.user_id)
        .bind(request.endpoint)
        .bind(request.duration_amount)
        .bind(request.duration_unit)
        .bind(request.expires_at)
        .bind(request.can_renew)
        .bind(&request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(api_key)
    }

    #[instrument(skip(self), fields(api_key_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let api_key = sqlx::query_as::<_, ApiKeyDBResponse>("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(api_key)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        let api_keys = sqlx::query_as::<_, ApiKeyDBResponse>("SELECT * FROM api_keys WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(api_keys.into_iter().map(|k| (k.id, k)).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let api_keys = if let Some(user_id) = filter.user_id {
            sqlx::query_as::<_, ApiKeyDBResponse>("SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&mut *self.db)
                .await?
        } else {
            sqlx::query_as::<_, ApiKeyDBResponse>("SELECT * FROM api_keys ORDER BY created_at DESC")
                .fetch_all(&mut *self.db)
                .await?
        };

        Ok(api_keys)
    }

    #[instrument(skip(self), fields(api_key_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(api_key_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let api_key = sqlx::query_as::<_, ApiKeyDBResponse>(
            r#"
            UPDATE api_keys
            SET
                active = COALESCE($2, active),
                can_renew = COALESCE($3, can_renew)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.active)
        .bind(request.can_renew)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(api_key)
    }
}

impl<'c> ApiKeys<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Look up a key by its token, active or not.
    #[instrument(skip(self, key), err)]
    pub async fn get_by_key(&mut self, key: &str) -> Result<Option<ApiKeyDBResponse>> {
        let api_key = sqlx::query_as::<_, ApiKeyDBResponse>("SELECT * FROM api_keys WHERE key = $1")
            .bind(key)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(api_key)
    }

    /// Count active, unexpired keys a user holds for an endpoint. Used to
    /// enforce the one-key-per-endpoint rule for client accounts.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), endpoint = %endpoint), err)]
    pub async fn count_usable_for_endpoint(&mut self, user_id: UserId, endpoint: Endpoint, now: DateTime<Utc>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM api_keys
            WHERE user_id = $1 AND endpoint = $2 AND active
              AND (expires_at IS NULL OR expires_at > $3)
            "#,
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count)
    }

    /// Flip an expired key inactive. The conditional WHERE makes the flip
    /// idempotent under concurrent validations.
    #[instrument(skip(self), fields(api_key_id = %abbrev_uuid(&id)), err)]
    pub async fn deactivate_if_active(&mut self, id: ApiKeyId) -> Result<bool> {
        let result = sqlx::query("UPDATE api_keys SET active = FALSE WHERE id = $1 AND active")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a successful validation: bump the usage counter and stamp last_used.
    #[instrument(skip(self), fields(api_key_id = %abbrev_uuid(&id)), err)]
    pub async fn record_usage(&mut self, id: ApiKeyId, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET usage_count = usage_count + 1, last_used = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Renew a key: fresh lifetime from now, forcibly reactivated.
    #[instrument(skip(self), fields(api_key_id = %abbrev_uuid(&id)), err)]
    pub async fn renew(
        &mut self,
        id: ApiKeyId,
        duration_amount: Option<i32>,
        duration_unit: Option<DurationUnit>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ApiKeyDBResponse> {
        let api_key = sqlx::query_as::<_, ApiKeyDBResponse>(
            r#"
            UPDATE api_keys
            SET duration_amount = $2, duration_unit = $3, expires_at = $4, active = TRUE
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(duration_amount)
        .bind(duration_unit)
        .bind(expires_at)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(api_key)
    }
}
