//! API request and response data models.
//!
//! These structures define the public API contract. They are distinct from
//! database models, converted via `From` impls, and annotated with `utoipa`
//! for automatic API docs.
//!
//! Every response body uses the [`response::ApiResponse`] envelope:
//! `{ "success": bool, "message": string, "data"?: ... }`.

pub mod api_keys;
pub mod key_requests;
pub mod response;
pub mod security;
pub mod users;
