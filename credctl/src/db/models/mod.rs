//! Database record models matching table schemas.
//!
//! Each model struct corresponds to a database table row and derives
//! `sqlx::FromRow` for query results. Database models are distinct from API
//! models so storage and API representations can evolve independently;
//! conversions live on the API side as `From` impls.

pub mod api_keys;
pub mod audit_logs;
pub mod blacklist;
pub mod key_requests;
pub mod users;
