//! API key lifecycle: issue, list, renew, revoke, validate.

use crate::{
    AppState,
    api::models::{
        api_keys::{ApiKeyCreate, ApiKeyRenew, ApiKeyResponse, ValidateRequest, ValidateResponse},
        response::ApiResponse,
        users::{CurrentUser, Role},
    },
    crypto::{MAX_KEY_GENERATION_ATTEMPTS, generate_key},
    db::errors::DbError,
    db::handlers::{ApiKeys, AuditLogs, Repository, Users, api_keys::ApiKeyFilter},
    db::models::api_keys::{ApiKeyCreateDBRequest, ApiKeyDBResponse},
    db::models::audit_logs::AuditLogCreateDBRequest,
    duration::KeyDuration,
    errors::{Error, Result},
    types::{ApiKeyId, Endpoint, UserId},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgConnection;

/// Insert a key, regenerating the token on collision.
///
/// The database unique constraint is the source of truth for uniqueness; a
/// collision shows up as a unique violation on `api_keys_key_key` and we try a
/// fresh token, up to [`MAX_KEY_GENERATION_ATTEMPTS`] times.
pub(crate) async fn issue_key(
    conn: &mut PgConnection,
    user_id: UserId,
    endpoint: Endpoint,
    duration: KeyDuration,
    can_renew: bool,
    created_by: &str,
) -> Result<ApiKeyDBResponse> {
    let (duration_amount, duration_unit) = duration.columns();
    let expires_at = duration.expires_at(Utc::now());

    for _ in 0..MAX_KEY_GENERATION_ATTEMPTS {
        let request = ApiKeyCreateDBRequest {
            key: generate_key(),
            user_id,
            endpoint,
            duration_amount,
            duration_unit,
            expires_at,
            can_renew,
            created_by: created_by.to_string(),
        };

        match ApiKeys::new(&mut *conn).create(&request).await {
            Ok(api_key) => return Ok(api_key),
            Err(e) if e.is_unique_violation_on("api_keys_key_key") => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::KeyGenerationExhausted {
        attempts: MAX_KEY_GENERATION_ATTEMPTS,
    })
}

/// Resolve who a key is being issued for and enforce the issuing rules.
///
/// Admins issue for anyone; resellers for themselves and their own clients;
/// clients only for themselves, within the client duration cap, one active
/// key per endpoint, never permanent and never the wildcard endpoint.
async fn resolve_issue_target(
    conn: &mut PgConnection,
    current_user: &CurrentUser,
    requested_user_id: Option<UserId>,
    endpoint: Endpoint,
    duration: KeyDuration,
) -> Result<UserId> {
    let target_user_id = requested_user_id.unwrap_or(current_user.id);

    if target_user_id != current_user.id {
        if !current_user.is_admin() && !current_user.is_reseller() {
            return Err(Error::Forbidden {
                message: "You may only issue keys for your own account".to_string(),
            });
        }
    }

    let target = Users::new(&mut *conn)
        .get_by_id(target_user_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: target_user_id.to_string(),
        })?;

    if !target.active {
        return Err(Error::BadRequest {
            message: "Cannot issue keys for a deactivated account".to_string(),
        });
    }

    // Resellers only reach accounts they created
    if target.id != current_user.id
        && current_user.is_reseller()
        && target.created_by.as_deref() != Some(current_user.username.as_str())
    {
        return Err(Error::Forbidden {
            message: "You may only issue keys for your own clients".to_string(),
        });
    }

    if endpoint == Endpoint::All && !current_user.is_admin() {
        return Err(Error::Forbidden {
            message: "Only admins may issue wildcard keys".to_string(),
        });
    }

    // The quota binds the issuer, not the recipient: clients provisioning
    // for themselves are capped, admins and resellers provisioning for a
    // client are not.
    if current_user.role == Role::Client {
        if !duration.within_client_cap() {
            return Err(Error::BadRequest {
                message: "Client keys are limited to two months".to_string(),
            });
        }

        let usable = ApiKeys::new(&mut *conn)
            .count_usable_for_endpoint(current_user.id, endpoint, Utc::now())
            .await?;
        if usable > 0 {
            return Err(Error::Conflict {
                message: "An active key for this endpoint already exists".to_string(),
            });
        }
    }

    Ok(target.id)
}

/// Issue a new API key.
#[utoipa::path(
    post,
    path = "/api/keys",
    tag = "api_keys",
    summary = "Issue API key",
    description = "Issue an API key for the caller, or for another user when the caller is an admin or a reseller issuing for one of their clients",
    responses(
        (status = 201, description = "Key issued", body = ApiResponse<ApiKeyResponse>),
        (status = 400, description = "Invalid duration or deactivated target account"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Target account or endpoint out of reach for this role"),
        (status = 409, description = "Client already holds an active key for this endpoint"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_key(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(data): Json<ApiKeyCreate>,
) -> Result<(StatusCode, Json<ApiResponse<ApiKeyResponse>>)> {
    let duration = KeyDuration::finite(data.duration_amount, data.duration_unit);
    duration.validate().map_err(|message| Error::BadRequest { message })?;

    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let target_user_id = resolve_issue_target(&mut tx, &current_user, data.user_id, data.endpoint, duration).await?;

    let api_key = issue_key(
        &mut tx,
        target_user_id,
        data.endpoint,
        duration,
        data.can_renew.unwrap_or(true),
        &current_user.username,
    )
    .await?;

    AuditLogs::new(&mut tx)
        .create(&AuditLogCreateDBRequest {
            user_id: Some(current_user.id),
            username: Some(current_user.username.clone()),
            action: "api_key_created".to_string(),
            details: Some(json!({
                "key_id": api_key.id,
                "user_id": target_user_id,
                "endpoint": data.endpoint,
                "expires_at": api_key.expires_at,
            })),
            ip: None,
            user_agent: None,
            status: "success".to_string(),
            severity: "info".to_string(),
        })
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("API key created", api_key.into())),
    ))
}

/// List API keys visible to the caller.
#[utoipa::path(
    get,
    path = "/api/keys",
    tag = "api_keys",
    summary = "List API keys",
    description = "Admins see every key; everyone else sees their own",
    responses(
        (status = 200, description = "Keys", body = ApiResponse<Vec<ApiKeyResponse>>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_keys(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<ApiKeyResponse>>>> {
    let filter = if current_user.is_admin() {
        ApiKeyFilter::default()
    } else {
        ApiKeyFilter {
            user_id: Some(current_user.id),
        }
    };

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let api_keys = ApiKeys::new(&mut conn).list(&filter).await?;

    Ok(Json(ApiResponse::ok(
        "API keys",
        api_keys.into_iter().map(Into::into).collect(),
    )))
}

/// Fetch a key the caller may manage, or fail with 404/403.
async fn get_managed_key(conn: &mut PgConnection, current_user: &CurrentUser, id: ApiKeyId) -> Result<ApiKeyDBResponse> {
    let api_key = ApiKeys::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "API key".to_string(),
        id: id.to_string(),
    })?;

    if api_key.user_id != current_user.id && !current_user.is_admin() {
        return Err(Error::Forbidden {
            message: "You may only manage your own keys".to_string(),
        });
    }

    Ok(api_key)
}

/// Renew an API key.
#[utoipa::path(
    post,
    path = "/api/keys/{id}/renew",
    tag = "api_keys",
    summary = "Renew API key",
    description = "Grant a fresh lifetime starting now with the given duration, reactivating the key if it had expired",
    params(("id" = String, Path, description = "API key ID")),
    responses(
        (status = 200, description = "Key renewed", body = ApiResponse<ApiKeyResponse>),
        (status = 400, description = "Invalid duration, or the key is permanent"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the key owner, or renewal disabled for this key"),
        (status = 404, description = "Key not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn renew_key(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<ApiKeyId>,
    Json(data): Json<ApiKeyRenew>,
) -> Result<Json<ApiResponse<ApiKeyResponse>>> {
    let duration = KeyDuration::finite(data.duration_amount, data.duration_unit);
    duration.validate().map_err(|message| Error::BadRequest { message })?;

    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let api_key = get_managed_key(&mut tx, &current_user, id).await?;

    if !api_key.can_renew {
        return Err(Error::Forbidden {
            message: "This key cannot be renewed".to_string(),
        });
    }

    // Permanent keys carry NULL duration columns; they never expire, so there
    // is nothing to renew
    if api_key.duration_amount.is_none() && api_key.expires_at.is_none() {
        return Err(Error::BadRequest {
            message: "Permanent keys do not need renewal".to_string(),
        });
    }

    let (duration_amount, duration_unit) = duration.columns();
    let expires_at = duration.expires_at(Utc::now());
    let renewed = ApiKeys::new(&mut tx).renew(id, duration_amount, duration_unit, expires_at).await?;

    AuditLogs::new(&mut tx)
        .create(&AuditLogCreateDBRequest {
            user_id: Some(current_user.id),
            username: Some(current_user.username.clone()),
            action: "api_key_renewed".to_string(),
            details: Some(json!({ "key_id": id, "expires_at": renewed.expires_at })),
            ip: None,
            user_agent: None,
            status: "success".to_string(),
            severity: "info".to_string(),
        })
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(ApiResponse::ok("API key renewed", renewed.into())))
}

/// Revoke an API key.
#[utoipa::path(
    delete,
    path = "/api/keys/{id}",
    tag = "api_keys",
    summary = "Revoke API key",
    description = "Delete a key. Owners can revoke their own keys; admins can revoke any",
    params(("id" = String, Path, description = "API key ID")),
    responses(
        (status = 200, description = "Key revoked", body = ApiResponse<ApiKeyResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the key owner"),
        (status = 404, description = "Key not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_key(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<ApiKeyId>,
) -> Result<Json<ApiResponse<ApiKeyResponse>>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let api_key = get_managed_key(&mut tx, &current_user, id).await?;
    ApiKeys::new(&mut tx).delete(id).await?;

    AuditLogs::new(&mut tx)
        .create(&AuditLogCreateDBRequest {
            user_id: Some(current_user.id),
            username: Some(current_user.username.clone()),
            action: "api_key_deleted".to_string(),
            details: Some(json!({ "key_id": id, "endpoint": api_key.endpoint })),
            ip: None,
            user_agent: None,
            status: "success".to_string(),
            severity: "info".to_string(),
        })
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(ApiResponse::ok("API key revoked", api_key.into())))
}

/// Validate a key on behalf of the downstream data API.
///
/// This endpoint is unauthenticated: the downstream API presents only the key
/// token. It fails closed; a store error is a 500, never a positive verdict.
#[utoipa::path(
    post,
    path = "/api/keys/validate",
    tag = "api_keys",
    summary = "Validate API key",
    description = "Check a key token against an endpoint. Expired keys are deactivated on first sight; scope mismatches are 403 while unknown or expired keys are 401",
    responses(
        (status = 200, description = "Key is valid", body = ValidateResponse),
        (status = 401, description = "Unknown, inactive or expired key", body = ValidateResponse),
        (status = 403, description = "Key not valid for this endpoint", body = ValidateResponse),
        (status = 500, description = "Internal server error"),
    )
)]
pub async fn validate_key(
    State(state): State<AppState>,
    Json(data): Json<ValidateRequest>,
) -> Result<(StatusCode, Json<ValidateResponse>)> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut api_keys = ApiKeys::new(&mut conn);

    let Some(api_key) = api_keys.get_by_key(&data.key).await? else {
        return Ok((StatusCode::UNAUTHORIZED, Json(ValidateResponse::denied("Invalid API key"))));
    };

    if !api_key.active {
        return Ok((StatusCode::UNAUTHORIZED, Json(ValidateResponse::denied("API key is inactive"))));
    }

    let now = Utc::now();
    if api_key.is_expired(now) {
        // First validation past the expiry flips the key off; concurrent
        // validations race benignly on the conditional update
        api_keys.deactivate_if_active(api_key.id).await?;
        return Ok((StatusCode::UNAUTHORIZED, Json(ValidateResponse::denied("API key expired"))));
    }

    if !api_key.endpoint.covers(data.endpoint) {
        return Ok((
            StatusCode::FORBIDDEN,
            Json(ValidateResponse::denied("API key not valid for this endpoint")),
        ));
    }

    api_keys.record_usage(api_key.id, now).await?;

    Ok((
        StatusCode::OK,
        Json(ValidateResponse {
            success: true,
            valid: true,
            message: "API key is valid".to_string(),
            endpoint: Some(api_key.endpoint),
            expires_at: api_key.expires_at,
        }),
    ))
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
    async fn test_client_issues_key_for_self(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&user);

        let response = app
            .post("/api/keys")
            .add_header(name, value)
            .json(&json!({ "endpoint": "dni", "durationAmount": 7, "durationUnit": "days" }))
            .await;

        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["key"].as_str().unwrap().len(), 16);
        assert_eq!(body["data"]["endpoint"], json!("dni"));
        assert_eq!(body["data"]["active"], json!(true));
        assert!(body["data"]["expiresAt"].is_string());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_client_duration_cap(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&user);

        let response = app
            .post("/api/keys")
            .add_header(name, value)
            .json(&json!({ "endpoint": "dni", "durationAmount": 3, "durationUnit": "months" }))
            .await;

        response.assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_client_holds_one_key_per_endpoint(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&user);
        let key_data = json!({ "endpoint": "telp", "durationAmount": 1, "durationUnit": "days" });

        app.post("/api/keys")
            .add_header(name.clone(), value.clone())
            .json(&key_data)
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        // Same endpoint again conflicts
        app.post("/api/keys")
            .add_header(name.clone(), value.clone())
            .json(&key_data)
            .await
            .assert_status(axum::http::StatusCode::CONFLICT);

        // A different endpoint is fine
        app.post("/api/keys")
            .add_header(name, value)
            .json(&json!({ "endpoint": "nom", "durationAmount": 1, "durationUnit": "days" }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_wildcard_is_admin_only(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let client = create_test_user(&pool, Role::Client, None).await;
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let key_data = json!({ "endpoint": "all", "durationAmount": 1, "durationUnit": "days" });

        let (name, value) = bearer(&client);
        app.post("/api/keys")
            .add_header(name, value)
            .json(&key_data)
            .await
            .assert_status_forbidden();

        let (name, value) = bearer(&admin);
        app.post("/api/keys")
            .add_header(name, value)
            .json(&key_data)
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reseller_issues_only_for_own_clients(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let reseller = create_test_user(&pool, Role::Reseller, None).await;
        let own_client = create_test_user(&pool, Role::Client, Some(&reseller.username)).await;
        let foreign_client = create_test_user(&pool, Role::Client, Some("someone_else")).await;
        let (name, value) = bearer(&reseller);

        let response = app
            .post("/api/keys")
            .add_header(name.clone(), value.clone())
            .json(&json!({
                "endpoint": "dni",
                "durationAmount": 7,
                "durationUnit": "days",
                "userId": own_client.id,
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        assert_eq!(body["data"]["userId"], json!(own_client.id));

        app.post("/api/keys")
            .add_header(name, value)
            .json(&json!({
                "endpoint": "dni",
                "durationAmount": 7,
                "durationUnit": "days",
                "userId": foreign_client.id,
            }))
            .await
            .assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_issuing_for_client_skips_client_quota(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let client = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&admin);

        // The per-endpoint quota and the two-month cap bind client issuers,
        // not client recipients
        for body in [
            json!({ "userId": client.id, "endpoint": "dni", "durationAmount": 7, "durationUnit": "days" }),
            json!({ "userId": client.id, "endpoint": "dni", "durationAmount": 7, "durationUnit": "days" }),
            json!({ "userId": client.id, "endpoint": "dni", "durationAmount": 6, "durationUnit": "months" }),
        ] {
            app.post("/api/keys")
                .add_header(name.clone(), value.clone())
                .json(&body)
                .await
                .assert_status(axum::http::StatusCode::CREATED);
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_scoping(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let user_a = create_test_user(&pool, Role::Client, None).await;
        let user_b = create_test_user(&pool, Role::Client, None).await;

        for user in [&user_a, &user_b] {
            let (name, value) = bearer(user);
            app.post("/api/keys")
                .add_header(name, value)
                .json(&json!({ "endpoint": "dni", "durationAmount": 1, "durationUnit": "days" }))
                .await
                .assert_status(axum::http::StatusCode::CREATED);
        }

        let (name, value) = bearer(&user_a);
        let response = app.get("/api/keys").add_header(name, value).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (name, value) = bearer(&admin);
        let response = app.get("/api/keys").add_header(name, value).await;
        let body: Value = response.json();
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_renew_reactivates_with_fresh_lifetime(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&user);

        let response = app
            .post("/api/keys")
            .add_header(name.clone(), value.clone())
            .json(&json!({ "endpoint": "dni", "durationAmount": 1, "durationUnit": "hours" }))
            .await;
        let body: Value = response.json();
        let key_id = body["data"]["id"].as_str().unwrap().to_string();

        // Force the key into an expired, inactive state
        sqlx::query("UPDATE api_keys SET expires_at = NOW() - INTERVAL '1 day', active = FALSE WHERE id = $1::uuid")
            .bind(&key_id)
            .execute(&pool)
            .await
            .unwrap();

        let response = app
            .post(&format!("/api/keys/{key_id}/renew"))
            .add_header(name, value)
            .json(&json!({ "durationAmount": 2, "durationUnit": "hours" }))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["active"], json!(true));
        let expires_at: chrono::DateTime<chrono::Utc> = body["data"]["expiresAt"].as_str().unwrap().parse().unwrap();
        assert!(expires_at > chrono::Utc::now());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_renew_forbidden_when_disabled(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&user);

        let response = app
            .post("/api/keys")
            .add_header(name.clone(), value.clone())
            .json(&json!({
                "endpoint": "dni",
                "durationAmount": 1,
                "durationUnit": "hours",
                "canRenew": false,
            }))
            .await;
        let body: Value = response.json();
        let key_id = body["data"]["id"].as_str().unwrap().to_string();

        app.post(&format!("/api/keys/{key_id}/renew"))
            .add_header(name, value)
            .json(&json!({ "durationAmount": 1, "durationUnit": "hours" }))
            .await
            .assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_requires_ownership(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let owner = create_test_user(&pool, Role::Client, None).await;
        let other = create_test_user(&pool, Role::Client, None).await;
        let (owner_name, owner_value) = bearer(&owner);

        let response = app
            .post("/api/keys")
            .add_header(owner_name.clone(), owner_value.clone())
            .json(&json!({ "endpoint": "dni", "durationAmount": 1, "durationUnit": "days" }))
            .await;
        let body: Value = response.json();
        let key_id = body["data"]["id"].as_str().unwrap().to_string();

        let (name, value) = bearer(&other);
        app.delete(&format!("/api/keys/{key_id}"))
            .add_header(name, value)
            .await
            .assert_status_forbidden();

        app.delete(&format!("/api/keys/{key_id}"))
            .add_header(owner_name.clone(), owner_value.clone())
            .await
            .assert_status_ok();

        app.delete(&format!("/api/keys/{key_id}"))
            .add_header(owner_name, owner_value)
            .await
            .assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_validate_verdicts(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&user);

        let response = app
            .post("/api/keys")
            .add_header(name, value)
            .json(&json!({ "endpoint": "dni", "durationAmount": 1, "durationUnit": "days" }))
            .await;
        let body: Value = response.json();
        let key = body["data"]["key"].as_str().unwrap().to_string();

        // Validation needs no authentication
        let response = app.post("/api/keys/validate").json(&json!({ "key": key, "endpoint": "dni" })).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["valid"], json!(true));
        assert_eq!(body["endpoint"], json!("dni"));

        // Scope mismatch is a 403, distinct from an unknown key
        let response = app.post("/api/keys/validate").json(&json!({ "key": key, "endpoint": "telp" })).await;
        response.assert_status_forbidden();
        let body: Value = response.json();
        assert_eq!(body["valid"], json!(false));

        let response = app
            .post("/api/keys/validate")
            .json(&json!({ "key": "nosuchkey12345678", "endpoint": "dni" }))
            .await;
        response.assert_status_unauthorized();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_validate_deactivates_expired_key(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&user);

        let response = app
            .post("/api/keys")
            .add_header(name, value)
            .json(&json!({ "endpoint": "dni", "durationAmount": 1, "durationUnit": "hours" }))
            .await;
        let body: Value = response.json();
        let key = body["data"]["key"].as_str().unwrap().to_string();

        sqlx::query("UPDATE api_keys SET expires_at = NOW() - INTERVAL '1 minute' WHERE key = $1")
            .bind(&key)
            .execute(&pool)
            .await
            .unwrap();

        let response = app.post("/api/keys/validate").json(&json!({ "key": key, "endpoint": "dni" })).await;
        response.assert_status_unauthorized();

        let active: bool = sqlx::query_scalar("SELECT active FROM api_keys WHERE key = $1")
            .bind(&key)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(!active);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_validate_wildcard_key_covers_any_endpoint(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let admin = create_test_user(&pool, Role::Admin, None).await;
        let (name, value) = bearer(&admin);

        let response = app
            .post("/api/keys")
            .add_header(name, value)
            .json(&json!({ "endpoint": "all", "durationAmount": 1, "durationUnit": "days" }))
            .await;
        let body: Value = response.json();
        let key = body["data"]["key"].as_str().unwrap().to_string();

        for endpoint in ["dni", "sunat", "meta"] {
            let response = app.post("/api/keys/validate").json(&json!({ "key": key, "endpoint": endpoint })).await;
            response.assert_status_ok();
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_validate_bumps_usage_counter(pool: PgPool) {
        let app = create_test_app(pool.clone());
        let user = create_test_user(&pool, Role::Client, None).await;
        let (name, value) = bearer(&user);

        let response = app
            .post("/api/keys")
            .add_header(name, value)
            .json(&json!({ "endpoint": "dni", "durationAmount": 1, "durationUnit": "days" }))
            .await;
        let body: Value = response.json();
        let key = body["data"]["key"].as_str().unwrap().to_string();

        for _ in 0..3 {
            app.post("/api/keys/validate")
                .json(&json!({ "key": key, "endpoint": "dni" }))
                .await
                .assert_status_ok();
        }

        let usage_count: i64 = sqlx::query_scalar("SELECT usage_count FROM api_keys WHERE key = $1")
            .bind(&key)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(usage_count, 3);
    }
}
