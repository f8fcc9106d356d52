use crate::db::errors::Result;
use crate::db::models::key_requests::{
    GeneratedKey, KeyRequestCreateDBRequest, KeyRequestDBResponse, KeyRequestItem, RequestStatus,
};
use crate::types::{KeyRequestId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing access requests
#[derive(Debug, Clone, Default)]
pub struct KeyRequestFilter {
    pub user_id: Option<UserId>,
    /// Restrict to requests from users created by this username (reseller scoping)
    pub requester_created_by: Option<String>,
    pub status: Option<RequestStatus>,
}

// Database entity model; jsonb columns come back wrapped in Json
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
struct KeyRequest {
    pub id: KeyRequestId,
    pub user_id: UserId,
    pub username: String,
    pub items: Json<Vec<KeyRequestItem>>,
    pub status: RequestStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub generated_keys: Option<Json<Vec<GeneratedKey>>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<KeyRequest> for KeyRequestDBResponse {
    fn from(row: KeyRequest) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            items: row.items.0,
            status: row.status,
            approved_by: row.approved_by,
            approved_at: row.approved_at,
            generated_keys: row.generated_keys.map(|g| g.0),
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

pub struct KeyRequests<'c> {
    db: &'c mut PgConnection,
}

impl<'c> KeyRequests<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(username = %request.username, items = request.items.len()), err)]
    pub async fn create(&mut self, request: &KeyRequestCreateDBRequest) -> Result<KeyRequestDBResponse> {
        let row = sqlx::query_as::<_, KeyRequest>(
            r#"
            INSERT INTO key_requests (user_id, username, items, notes)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.username)
        .bind(Json(&request.items))
        .bind(&request.notes)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(request_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: KeyRequestId) -> Result<Option<KeyRequestDBResponse>> {
        let row = sqlx::query_as::<_, KeyRequest>("SELECT * FROM key_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, filter), err)]
    pub async fn list(&mut self, filter: &KeyRequestFilter) -> Result<Vec<KeyRequestDBResponse>> {
        let rows = sqlx::query_as::<_, KeyRequest>(
            r#"
            SELECT kr.* FROM key_requests kr
            JOIN users u ON u.id = kr.user_id
            WHERE ($1::uuid IS NULL OR kr.user_id = $1)
              AND ($2::text IS NULL OR u.created_by = $2)
              AND ($3::request_status IS NULL OR kr.status = $3)
            ORDER BY kr.created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(&filter.requester_created_by)
        .bind(filter.status)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Flip a pending request to approved and record the issued keys.
    ///
    /// Returns None when the request was not pending any more, which callers
    /// surface as a conflict. The conditional WHERE is what makes concurrent
    /// approvals safe: exactly one of them sees a row.
    #[instrument(skip(self, generated_keys), fields(request_id = %abbrev_uuid(&id), approved_by), err)]
    pub async fn approve_pending(
        &mut self,
        id: KeyRequestId,
        approved_by: &str,
        generated_keys: &[GeneratedKey],
    ) -> Result<Option<KeyRequestDBResponse>> {
        let row = sqlx::query_as::<_, KeyRequest>(
            r#"
            UPDATE key_requests
            SET status = 'approved', approved_by = $2, approved_at = NOW(), generated_keys = $3
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(approved_by)
        .bind(Json(generated_keys))
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Flip a pending request to rejected. Same conditional semantics as
    /// [`approve_pending`](Self::approve_pending).
    #[instrument(skip(self), fields(request_id = %abbrev_uuid(&id), rejected_by), err)]
    pub async fn reject_pending(
        &mut self,
        id: KeyRequestId,
        rejected_by: &str,
        notes: Option<&str>,
    ) -> Result<Option<KeyRequestDBResponse>> {
        let row = sqlx::query_as::<_, KeyRequest>(
            r#"
            UPDATE key_requests
            SET status = 'rejected', approved_by = $2, approved_at = NOW(),
                notes = COALESCE($3, notes)
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(rejected_by)
        .bind(notes)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(Into::into))
    }
}
