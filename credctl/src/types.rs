//! Common type definitions shared across the crate.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, ApiKeyId, etc.)
//! - The [`Endpoint`] enum naming the data-lookup services a credential
//!   can be scoped to
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases for better type safety:
//!
//! - [`UserId`]: User account identifier
//! - [`ApiKeyId`]: API key identifier
//! - [`KeyRequestId`]: Access request identifier
//! - [`BlacklistEntryId`]: Blacklist entry identifier
//! - [`AuditLogId`]: Audit log entry identifier
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type ApiKeyId = Uuid;
pub type KeyRequestId = Uuid;
pub type BlacklistEntryId = Uuid;
pub type AuditLogId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Data-lookup services a credential can be scoped to.
///
/// `All` is a wildcard scope that passes validation against any endpoint
/// and may only be issued by admins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, ToSchema)]
#[sqlx(type_name = "api_endpoint", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Dni,
    Telp,
    Nom,
    Arg,
    Corr,
    Risk,
    Foto,
    Sunat,
    Meta,
    All,
}

impl Endpoint {
    /// Whether a credential with this scope authorizes a request for `requested`.
    pub fn covers(&self, requested: Endpoint) -> bool {
        *self == Endpoint::All || *self == requested
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::Dni => "dni",
            Endpoint::Telp => "telp",
            Endpoint::Nom => "nom",
            Endpoint::Arg => "arg",
            Endpoint::Corr => "corr",
            Endpoint::Risk => "risk",
            Endpoint::Foto => "foto",
            Endpoint::Sunat => "sunat",
            Endpoint::Meta => "meta",
            Endpoint::All => "all",
        };
        write!(f, "{name}")
    }
}
