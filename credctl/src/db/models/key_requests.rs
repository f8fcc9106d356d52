//! Database models for access requests.

use crate::types::{Endpoint, KeyRequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// One line item of an access request: which endpoint, for how long.
/// The duration is a symbolic token ("1h", "7d", "permanent", ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct KeyRequestItem {
    pub endpoint: Endpoint,
    pub duration: String,
}

/// Snapshot of a key issued during approval, stored on the request record.
/// Serialized in the wire contract's camelCase since it surfaces verbatim in
/// responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedKey {
    pub endpoint: Endpoint,
    pub key: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRequestDBResponse {
    pub id: KeyRequestId,
    pub user_id: UserId,
    pub username: String,
    pub items: Vec<KeyRequestItem>,
    pub status: RequestStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub generated_keys: Option<Vec<GeneratedKey>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct KeyRequestCreateDBRequest {
    pub user_id: UserId,
    pub username: String,
    pub items: Vec<KeyRequestItem>,
    pub notes: Option<String>,
}
