//! OpenAPI documentation for the credential panel API.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::handlers;
use crate::api::models;

/// Bearer session token security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "bearer_auth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token authentication. Include your token in the `Authorization` header:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::api_keys::create_key,
        handlers::api_keys::list_keys,
        handlers::api_keys::renew_key,
        handlers::api_keys::delete_key,
        handlers::api_keys::validate_key,
        handlers::key_requests::create_request,
        handlers::key_requests::list_requests,
        handlers::key_requests::approve_request,
        handlers::key_requests::reject_request,
        handlers::security::list_blacklist,
        handlers::security::create_block,
        handlers::security::delete_block,
        handlers::security::list_audit_logs,
    ),
    components(schemas(
        models::api_keys::ApiKeyCreate,
        models::api_keys::ApiKeyRenew,
        models::api_keys::ApiKeyResponse,
        models::api_keys::ValidateRequest,
        models::api_keys::ValidateResponse,
        models::key_requests::KeyRequestCreate,
        models::key_requests::KeyRequestReject,
        models::key_requests::KeyRequestResponse,
        models::security::BlacklistEntryResponse,
        models::security::ManualBlock,
        models::security::AuditLogResponse,
        models::users::Role,
        crate::types::Endpoint,
        crate::duration::DurationUnit,
        crate::db::models::key_requests::RequestStatus,
        crate::db::models::key_requests::KeyRequestItem,
        crate::db::models::key_requests::GeneratedKey,
        crate::db::models::blacklist::BlacklistReason,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "api_keys", description = "API key lifecycle"),
        (name = "key_requests", description = "Access request workflow"),
        (name = "security", description = "Blacklist and audit administration"),
    ),
    info(
        title = "credctl API",
        description = "Credential and access control panel for the data-lookup API",
    )
)]
pub struct ApiDoc;
