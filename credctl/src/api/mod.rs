//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Keys** (`/api/keys/*`): credential issue, list, renew, revoke, validate
//! - **Access requests** (`/api/key-requests/*`): submit, list, approve, reject
//! - **Security** (`/api/security/*`): blacklist administration and audit logs
//!
//! All endpoints are documented with OpenAPI annotations using `utoipa`.
//! API documentation is available at `/docs` when the server is running.

pub mod handlers;
pub mod models;
