//! API request/response models for access requests.

use crate::db::models::key_requests::{GeneratedKey, KeyRequestDBResponse, KeyRequestItem, RequestStatus};
use crate::types::{KeyRequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyRequestCreate {
    /// Requested endpoints with symbolic durations ("1h", "7d", "permanent", ...)
    #[serde(rename = "endpoints")]
    pub items: Vec<KeyRequestItem>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KeyRequestReject {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequestResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: KeyRequestId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub username: String,
    #[serde(rename = "endpoints")]
    pub items: Vec<KeyRequestItem>,
    pub status: RequestStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    /// Keys issued at approval time, one per line item
    pub generated_keys: Option<Vec<GeneratedKey>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<KeyRequestDBResponse> for KeyRequestResponse {
    fn from(db: KeyRequestDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            username: db.username,
            items: db.items,
            status: db.status,
            approved_by: db.approved_by,
            approved_at: db.approved_at,
            generated_keys: db.generated_keys,
            notes: db.notes,
            created_at: db.created_at,
        }
    }
}
