//! API request/response models for API keys.

use crate::db::models::api_keys::ApiKeyDBResponse;
use crate::duration::DurationUnit;
use crate::types::{ApiKeyId, Endpoint, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// The wire contract predates this service and is camelCase throughout; the
// downstream data API and the dashboard both depend on it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyCreate {
    pub endpoint: Endpoint,
    pub duration_amount: i32,
    pub duration_unit: DurationUnit,
    /// Issue for another user (admins and resellers only); defaults to the caller
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    /// Whether the key may later be renewed (defaults to true)
    pub can_renew: Option<bool>,
}

/// Renewal grants a fresh lifetime; the new duration is explicit rather than
/// inherited from the original grant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRenew {
    pub duration_amount: i32,
    pub duration_unit: DurationUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ApiKeyId,
    pub key: String,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub endpoint: Endpoint,
    pub duration_amount: Option<i32>,
    pub duration_unit: Option<DurationUnit>,
    /// Absent for permanent keys
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub usage_count: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub can_renew: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<ApiKeyDBResponse> for ApiKeyResponse {
    fn from(db: ApiKeyDBResponse) -> Self {
        Self {
            id: db.id,
            key: db.key,
            user_id: db.user_id,
            endpoint: db.endpoint,
            duration_amount: db.duration_amount,
            duration_unit: db.duration_unit,
            expires_at: db.expires_at,
            active: db.active,
            usage_count: db.usage_count,
            last_used: db.last_used,
            can_renew: db.can_renew,
            created_by: db.created_by,
            created_at: db.created_at,
        }
    }
}

/// Validation request sent by the downstream data API on behalf of its caller.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidateRequest {
    pub key: String,
    pub endpoint: Endpoint,
}

/// Validation verdict. `valid` is always present so the downstream API can
/// branch on it without inspecting status codes; `endpoint` and `expiresAt`
/// only accompany a positive verdict.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub success: bool,
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidateResponse {
    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            success: false,
            valid: false,
            message: message.into(),
            endpoint: None,
            expires_at: None,
        }
    }
}
