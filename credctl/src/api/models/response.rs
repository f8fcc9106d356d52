//! The response envelope shared by every endpoint.

use serde::Serialize;
use utoipa::ToSchema;

/// Uniform response body: `{ "success": bool, "message": string, "data"?: ... }`.
///
/// Error responses use the same shape with `success: false` (see
/// [`crate::errors::Error`]), so machine clients can parse one schema
/// regardless of outcome.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}
