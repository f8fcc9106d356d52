//! Access request workflow: submit, list, approve, reject.

use crate::{
    AppState,
    api::handlers::api_keys::issue_key,
    api::models::{
        key_requests::{KeyRequestCreate, KeyRequestReject, KeyRequestResponse},
        response::ApiResponse,
        users::CurrentUser,
    },
    db::errors::DbError,
    db::handlers::{AuditLogs, KeyRequests, Repository, Users, key_requests::KeyRequestFilter},
    db::models::audit_logs::AuditLogCreateDBRequest,
    db::models::key_requests::{GeneratedKey, KeyRequestCreateDBRequest, KeyRequestDBResponse, RequestStatus},
    duration::KeyDuration,
    errors::{Error, Result},
    types::{Endpoint, KeyRequestId},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::json;
use sqlx::PgConnection;

/// Submit an access request.
#[utoipa::path(
    post,
    path = "/api/key-requests",
    tag = "key_requests",
    summary = "Submit access request",
    description = "Request keys for one or more endpoints with symbolic durations; an admin or the caller's reseller decides later",
    responses(
        (status = 201, description = "Request submitted", body = ApiResponse<KeyRequestResponse>),
        (status = 400, description = "Empty request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Wildcard line item from a non-admin"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(data): Json<KeyRequestCreate>,
) -> Result<(StatusCode, Json<ApiResponse<KeyRequestResponse>>)> {
    if data.items.is_empty() {
        return Err(Error::BadRequest {
            message: "An access request needs at least one endpoint".to_string(),
        });
    }

    // Approval issues every line item without a second endpoint check and may
    // be performed by a reseller, so wildcard items are rejected up front
    if data.items.iter().any(|item| item.endpoint == Endpoint::All) && !current_user.is_admin() {
        return Err(Error::Forbidden {
            message: "Only admins may request wildcard access".to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let request = KeyRequests::new(&mut tx)
        .create(&KeyRequestCreateDBRequest {
            user_id: current_user.id,
            username: current_user.username.clone(),
            items: data.items,
            notes: data.notes,
        })
        .await?;

    AuditLogs::new(&mut tx)
        .create(&AuditLogCreateDBRequest {
            user_id: Some(current_user.id),
            username: Some(current_user.username.clone()),
            action: "key_request_submitted".to_string(),
            details: Some(json!({ "request_id": request.id, "items": request.items })),
            ip: None,
            user_agent: None,
            status: "success".to_string(),
            severity: "info".to_string(),
        })
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Access request submitted", request.into())),
    ))
}

/// List access requests visible to the caller.
#[utoipa::path(
    get,
    path = "/api/key-requests",
    tag = "key_requests",
    summary = "List access requests",
    description = "Admins see every request, resellers those from their own clients, clients their own",
    responses(
        (status = 200, description = "Requests", body = ApiResponse<Vec<KeyRequestResponse>>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_requests(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<KeyRequestResponse>>>> {
    let filter = if current_user.is_admin() {
        KeyRequestFilter::default()
    } else if current_user.is_reseller() {
        KeyRequestFilter {
            requester_created_by: Some(current_user.username.clone()),
            ..Default::default()
        }
    } else {
        KeyRequestFilter {
            user_id: Some(current_user.id),
            ..Default::default()
        }
    };

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let requests = KeyRequests::new(&mut conn).list(&filter).await?;

    Ok(Json(ApiResponse::ok(
        "Access requests",
        requests.into_iter().map(Into::into).collect(),
    )))
}

/// Fetch a request the caller may decide on, or fail with 404/403.
///
/// Admins decide on everything; resellers only on requests whose requester
/// they created. Requesters cannot decide on their own requests.
async fn get_decidable_request(
    conn: &mut PgConnection,
    current_user: &CurrentUser,
    id: KeyRequestId,
) -> Result<KeyRequestDBResponse> {
    let request = KeyRequests::new(&mut *conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Access request".to_string(),
            id: id.to_string(),
        })?;

    if current_user.is_admin() {
        return Ok(request);
    }

    if current_user.is_reseller() {
        let requester = Users::new(&mut *conn)
            .get_by_id(request.user_id)
            .await?
            .ok_or_else(|| Error::NotFound {
                resource: "User".to_string(),
                id: request.user_id.to_string(),
            })?;

        if requester.created_by.as_deref() == Some(current_user.username.as_str()) {
            return Ok(request);
        }

        return Err(Error::Forbidden {
            message: "You may only decide on requests from your own clients".to_string(),
        });
    }

    Err(Error::Forbidden {
        message: "Only admins and resellers may decide on access requests".to_string(),
    })
}

/// Approve an access request, issuing one key per line item.
#[utoipa::path(
    post,
    path = "/api/key-requests/{id}/approve",
    tag = "key_requests",
    summary = "Approve access request",
    description = "Issue one key per requested endpoint and record them on the request. Approval is atomic: either every key exists and the request is approved, or nothing happened",
    params(("id" = String, Path, description = "Access request ID")),
    responses(
        (status = 200, description = "Request approved, keys issued", body = ApiResponse<KeyRequestResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to decide on this request"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request was already decided"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn approve_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<KeyRequestId>,
) -> Result<Json<ApiResponse<KeyRequestResponse>>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let request = get_decidable_request(&mut tx, &current_user, id).await?;

    if request.status != RequestStatus::Pending {
        return Err(Error::Conflict {
            message: "Request has already been decided".to_string(),
        });
    }

    // Issue every key inside the transaction, then flip the request with a
    // conditional update. If a concurrent decision wins the race the update
    // returns nothing and the rollback takes the freshly issued keys with it.
    let mut generated_keys = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let duration = KeyDuration::from_token(&item.duration);
        let api_key = issue_key(&mut tx, request.user_id, item.endpoint, duration, true, &current_user.username).await?;
        generated_keys.push(GeneratedKey {
            endpoint: api_key.endpoint,
            key: api_key.key,
            expires_at: api_key.expires_at,
        });
    }

    let approved = KeyRequests::new(&mut tx)
        .approve_pending(id, &current_user.username, &generated_keys)
        .await?
        .ok_or_else(|| Error::Conflict {
            message: "Request has already been decided".to_string(),
        })?;

    AuditLogs::new(&mut tx)
        .create(&AuditLogCreateDBRequest {
            user_id: Some(current_user.id),
            username: Some(current_user.username.clone()),
            action: "key_request_approved".to_string(),
            details: Some(json!({
                "request_id": id,
                "requester": approved.username,
                "keys_issued": generated_keys.len(),
            })),
            ip: None,
            user_agent: None,
            status: "success".to_string(),
            severity: "info".to_string(),
        })
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(ApiResponse::ok("Access request approved", approved.into())))
}

/// Reject an access request.
#[utoipa::path(
    post,
    path = "/api/key-requests/{id}/reject",
    tag = "key_requests",
    summary = "Reject access request",
    description = "Mark a pending request rejected, optionally replacing its notes with the decision rationale",
    params(("id" = String, Path, description = "Access request ID")),
    responses(
        (status = 200, description = "Request rejected", body = ApiResponse<KeyRequestResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to decide on this request"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request was already decided"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn reject_request(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<KeyRequestId>,
    Json(data): Json<KeyRequestReject>,
) -> Result<Json<ApiResponse<KeyRequestResponse>>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    get_decidable_request(&mut tx, &current_user, id).await?;

    let rejected = KeyRequests::new(&mut tx)
        .reject_pending(id, &current_user.username, data.notes.as_deref())
        .await?
        .ok_or_else(|| Error::Conflict {
            message: "Request has already been decided".to_string(),
        })?;

    AuditLogs::new(&mut tx)
        .create(&AuditLogCreateDBRequest {
            user_id: Some(current_user.id),
            username: Some(current_user.username.clone()),
            action: "key_request_rejected".to_string(),
            details: Some(json!({ "request_id": id, "requester": rejected.username })),
            ip: None,
            user_agent: None,
            status: "success".to_string(),
            severity: "info".to_string(),
        })
        .await?;

    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(ApiResponse::ok("Access request rejected", rejected.into())))
}
