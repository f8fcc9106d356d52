//! HTTP request handlers for all API endpoints.
//!
//! Handlers authenticate through the [`CurrentUser`] extractor, acquire a
//! connection (or transaction, for multi-statement operations) from the pool,
//! delegate to the repositories in [`crate::db::handlers`], and wrap results
//! in the [`ApiResponse`](crate::api::models::response::ApiResponse) envelope.

pub mod api_keys;
pub mod key_requests;
pub mod security;

use crate::api::models::users::CurrentUser;
use crate::errors::{Error, Result};

/// Reject non-admin callers on admin-only routes.
pub(crate) fn require_admin(user: &CurrentUser) -> Result<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden {
            message: "Admin access required".to_string(),
        })
    }
}
