//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection or transaction, provides
//! strongly-typed operations for one table, and returns domain models from
//! [`crate::db::models`].
//!
//! # Available Repositories
//!
//! - [`Users`]: account lookups and reseller scoping
//! - [`ApiKeys`]: credential storage, expiry flips and usage counters
//! - [`KeyRequests`]: access request lifecycle with conditional transitions
//! - [`Blacklists`]: per-IP block entries and escalation upserts
//! - [`AuditLogs`]: append-only audit trail
//!
//! [`Users`] and [`ApiKeys`] implement the shared [`Repository`] trait; the
//! remaining repositories have bespoke methods shaped by their state machines.

pub mod api_keys;
pub mod audit_logs;
pub mod blacklist;
pub mod key_requests;
pub mod repository;
pub mod users;

pub use api_keys::ApiKeys;
pub use audit_logs::AuditLogs;
pub use blacklist::Blacklists;
pub use key_requests::KeyRequests;
pub use repository::Repository;
pub use users::Users;
