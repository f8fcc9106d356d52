//! Security admin surface: blacklist management and audit log access.

use crate::{
    AppState,
    api::handlers::require_admin,
    api::models::{
        response::ApiResponse,
        security::{AuditLogQuery, AuditLogResponse, BlacklistEntryResponse, ManualBlock},
        users::CurrentUser,
    },
    db::errors::DbError,
    db::handlers::{AuditLogs, Blacklists, audit_logs::AuditLogFilter},
    db::models::audit_logs::AuditLogCreateDBRequest,
    db::models::blacklist::BlacklistReason,
    errors::{Error, Result},
    security::escalation::{self, Escalation},
    types::BlacklistEntryId,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{Duration, Utc};
use serde_json::json;

const MAX_AUDIT_PAGE: i64 = 500;

/// List active blacklist entries.
#[utoipa::path(
    get,
    path = "/api/security/blacklist",
    tag = "security",
    summary = "List blacklist",
    description = "Active blocks only, most recent first",
    responses(
        (status = 200, description = "Blacklist entries", body = ApiResponse<Vec<BlacklistEntryResponse>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_blacklist(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<BlacklistEntryResponse>>>> {
    require_admin(&current_user)?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let entries = Blacklists::new(&mut conn).list_active().await?;

    Ok(Json(ApiResponse::ok(
        "Blacklist entries",
        entries.into_iter().map(Into::into).collect(),
    )))
}

/// Manually block an IP.
#[utoipa::path(
    post,
    path = "/api/security/blacklist",
    tag = "security",
    summary = "Block IP",
    description = "Block an IP immediately. Without durationHours the block is permanent. Blocking an already-listed IP re-activates and updates the existing entry",
    responses(
        (status = 201, description = "IP blocked", body = ApiResponse<BlacklistEntryResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_block(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(data): Json<ManualBlock>,
) -> Result<(StatusCode, Json<ApiResponse<BlacklistEntryResponse>>)> {
    require_admin(&current_user)?;

    if data.ip.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "IP address cannot be empty".to_string(),
        });
    }

    let expires_at = data.duration_hours.map(|hours| Utc::now() + Duration::hours(hours));

    let entry = escalation::escalate(
        &state.db,
        Escalation {
            ip: data.ip.trim().to_string(),
            reason: BlacklistReason::Manual,
            description: data.description,
            attempt_context: None,
            user_agent: None,
            endpoint: None,
            method: None,
            blocked_by: current_user.username.clone(),
            expires_at,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok("IP blocked", entry.into()))))
}

/// Lift a block.
#[utoipa::path(
    delete,
    path = "/api/security/blacklist/{id}",
    tag = "security",
    summary = "Unblock IP",
    description = "Deactivate a blacklist entry. The row is kept so repeat offenses retain their attempt history",
    params(("id" = String, Path, description = "Blacklist entry ID")),
    responses(
        (status = 200, description = "Block lifted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Entry not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_block(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<BlacklistEntryId>,
) -> Result<Json<ApiResponse<()>>> {
    require_admin(&current_user)?;

    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let lifted = Blacklists::new(&mut tx).deactivate(id).await?;
    if !lifted {
        return Err(Error::NotFound {
            resource: "Blacklist entry".to_string(),
            id: id.to_string(),
        });
    }

    AuditLogs::new(&mut tx)
        .create(&AuditLogCreateDBRequest {
            user_id: Some(current_user.id),
            username: Some(current_user.username.clone()),
            action: "ip_unblocked".to_string(),
            details: Some(json!({ "entry_id": id })),
            ip: None,
            user_agent: None,
            status: "success".to_string(),
            severity: "info".to_string(),
        })
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(ApiResponse::message("Block lifted")))
}

/// Read the audit log.
#[utoipa::path(
    get,
    path = "/api/security/audit-logs",
    tag = "security",
    summary = "List audit logs",
    description = "Most recent first, optionally filtered to one action",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "Audit log entries", body = ApiResponse<Vec<AuditLogResponse>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<ApiResponse<Vec<AuditLogResponse>>>> {
    require_admin(&current_user)?;

    let filter = AuditLogFilter {
        action: query.action,
        limit: query.limit.unwrap_or(100).clamp(1, MAX_AUDIT_PAGE),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let logs = AuditLogs::new(&mut conn).list(&filter).await?;

    Ok(Json(ApiResponse::ok(
        "Audit log entries",
        logs.into_iter().map(Into::into).collect(),
    )))
}

#[cfg(test)]
mod tests {
    use crate::api::models::users::Role;
    use crate::test_utils::*;
    use serde_json::{Value, json};
    use sqlx::PgPool;

    fn bearer(user: &crate::api::models::users::CurrentUser) -> (String, String) {
        ("authorization".to_string(), format!("Bearer {}", bearer_token(user)))
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_security_surface_is_admin_only(pool: PgPool) {
        let app = create_test_app(pool.clone());

        for role in [Role::Reseller, Role::Client] {
            let user = create_test_user(&pool, role, None).await;
            let (name, value) = bearer(&user);

            app.get("/api/security/blacklist")
                .add_header(name.clone(), value.clone())
                .await
                .assert_status_forbidden();
            app.post("/api/security/blacklist")
                .add_header(name.clone(), value.clone())
                .json(&json!({ "ip": "203.0.113.7" }))
                .await
                .assert_status_forbidden();
            app.get("/api/security/audit-logs")
                .add_header(name, value)
                .await
                .assert_status_forbidden();
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_manual_block_and_unblock(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let (name, value) = bearer(&admin);

        let response = app
            .post("/api/security/blacklist")
            .add_header(name.clone(), value.clone())
            .json(&json!({
                "ip": "203.0.113.7",
                "description": "scanner seen in access logs",
                "durationHours": 48,
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        let entry_id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["ip"], json!("203.0.113.7"));
        assert_eq!(body["data"]["reason"], json!("manual"));
        assert_eq!(body["data"]["blockedBy"], json!(admin.username));
        assert!(body["data"]["expiresAt"].is_string());

        let response = app
            .get("/api/security/blacklist")
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        let entries = body["data"].as_array().unwrap();
        assert!(entries.iter().any(|e| e["ip"] == json!("203.0.113.7")));

        let response = app
            .delete(&format!("/api/security/blacklist/{entry_id}"))
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_ok();

        let response = app
            .get("/api/security/blacklist")
            .add_header(name.clone(), value.clone())
            .await;
        let body: Value = response.json();
        assert!(body["data"].as_array().unwrap().is_empty());

        // The row stays behind deactivated, so a second delete is a miss
        app.delete(&format!("/api/security/blacklist/{entry_id}"))
            .add_header(name, value)
            .await
            .assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_manual_block_without_duration_is_permanent(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let (name, value) = bearer(&admin);

        let response = app
            .post("/api/security/blacklist")
            .add_header(name, value)
            .json(&json!({ "ip": "198.51.100.9" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        assert!(body["data"]["expiresAt"].is_null());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_blank_ip_is_rejected(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let (name, value) = bearer(&admin);

        app.post("/api/security/blacklist")
            .add_header(name, value)
            .json(&json!({ "ip": "   " }))
            .await
            .assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_audit_log_listing_and_filter(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let client = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&admin);

        // Two different audited actions
        app.post("/api/keys")
            .add_header(name.clone(), value.clone())
            .json(&json!({
                "userId": client.id,
                "endpoint": "dni",
                "durationAmount": 7,
                "durationUnit": "days",
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
        app.post("/api/security/blacklist")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "ip": "203.0.113.50" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let response = app
            .get("/api/security/audit-logs")
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert!(body["data"].as_array().unwrap().len() >= 2);

        let response = app
            .get("/api/security/audit-logs")
            .add_query_param("action", "api_key_created")
            .add_header(name, value)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        let entries = body["data"].as_array().unwrap();
        assert!(!entries.is_empty());
        assert!(entries.iter().all(|e| e["action"] == json!("api_key_created")));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_detector_escalates_repeat_offenders(pool: PgPool) {
        let app = create_test_app(pool.clone());

        // Activation threshold is 3: the first two attempts only accrue a
        // warning entry and fail key validation, the third gets the IP blocked
        let payload = json!({ "key": "<script>alert(1)</script>", "endpoint": "dni" });
        for _ in 0..2 {
            let response = app.post("/api/keys/validate").json(&payload).await;
            assert_ne!(response.status_code(), axum::http::StatusCode::FORBIDDEN);
        }
        let response = app.post("/api/keys/validate").json(&payload).await;
        response.assert_status_forbidden();

        // The block is now on the blacklist, so even clean requests bounce
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let (name, value) = bearer(&admin);
        app.get("/api/keys").add_header(name, value).await.assert_status_forbidden();

        // The block went through the common escalation path: one active row
        // with the full attempt history and a matching audit entry
        let (reason, active, attempts): (String, bool, i32) =
            sqlx::query_as("SELECT reason::text, active, attempt_count FROM blacklist WHERE ip = 'unknown'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(reason, "suspicious_pattern");
        assert!(active);
        assert_eq!(attempts, 3);

        let audited: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE action = 'ip_blacklisted'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(audited, 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rate_limit_escalates_to_blacklist(pool: PgPool) {
        let mut config = create_test_config();
        config.rate_limit.window = std::time::Duration::from_secs(60);
        config.rate_limit.max_requests = 1;
        config.rate_limit.abuse_threshold = 2;
        let app = create_test_app_with_config(pool.clone(), config);

        let attempt = json!({ "key": "aB3xY9cD4eF5gH6i", "endpoint": "dni" });

        // One admitted request fills the window
        app.post("/api/keys/validate").json(&attempt).await.assert_status_unauthorized();

        // The first violation backs off with the window length
        let response = app.post("/api/keys/validate").json(&attempt).await;
        response.assert_status(axum::http::StatusCode::TOO_MANY_REQUESTS);
        let body: Value = response.json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["retryAfter"], json!(60));

        // The second violation in a row crosses the abuse threshold
        app.post("/api/keys/validate").json(&attempt).await.assert_status_forbidden();

        let (reason, active, expires_at): (String, bool, chrono::DateTime<chrono::Utc>) =
            sqlx::query_as("SELECT reason::text, active, expires_at FROM blacklist WHERE ip = 'unknown'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(reason, "rate_limit_exceeded");
        assert!(active);
        assert!(expires_at > chrono::Utc::now() + chrono::Duration::hours(23));

        // Every further request from the source short-circuits on the blacklist
        app.post("/api/keys/validate").json(&attempt).await.assert_status_forbidden();
    }
}
