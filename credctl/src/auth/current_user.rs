use crate::db::errors::DbError;
use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    db::handlers::{Repository, Users},
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

/// Extract user from a bearer JWT if present and valid
/// Returns:
/// - None: No Authorization header or not a Bearer token
/// - Some(Ok(user)): Valid token found and verified
/// - Some(Err(error)): Token present but invalid/malformed
#[instrument(skip(parts, config))]
fn try_bearer_session_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<CurrentUser>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }));
        }
    };

    let token = auth_str.strip_prefix("Bearer ")?;

    Some(session::verify_session_token(token, config))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = match try_bearer_session_auth(parts, &state.config) {
            Some(Ok(user)) => user,
            Some(Err(e)) => {
                trace!("Bearer token authentication failed: {:?}", e);
                return Err(Error::Unauthenticated { message: None });
            }
            None => {
                trace!("No authentication credentials found in request");
                return Err(Error::Unauthenticated { message: None });
            }
        };

        // The token only proves who the user was when it was issued; confirm
        // the account still exists and has not been deactivated since.
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        let mut users = Users::new(&mut conn);
        let db_user = users.get_by_id(user.id).await?.ok_or(Error::Unauthenticated {
            message: Some("Account no longer exists".to_string()),
        })?;

        if !db_user.active {
            return Err(Error::Unauthenticated {
                message: Some("Account is deactivated".to_string()),
            });
        }

        // Role changes take effect immediately, not at token refresh
        Ok(CurrentUser::from(db_user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_config, create_test_user};
    use axum::extract::FromRequestParts as _;
    use sqlx::PgPool;

    fn parts_with_token(token: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();

        let (parts, _body) = request.into_parts();
        parts
    }

    #[sqlx::test]
    async fn test_valid_token_extraction(pool: PgPool) {
        let config = create_test_config();
        let state = crate::test_utils::create_test_state(pool.clone());

        let user = create_test_user(&pool, Role::Client, None).await;
        let token = session::create_session_token(&user, &config).unwrap();

        let mut parts = parts_with_token(&token);
        let result = CurrentUser::from_request_parts(&mut parts, &state).await;
        assert!(result.is_ok());
        assert_eq!(result.unwrap().id, user.id);
    }

    #[sqlx::test]
    async fn test_missing_header_returns_unauthorized(pool: PgPool) {
        let state = crate::test_utils::create_test_state(pool);

        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();

        let result = CurrentUser::from_request_parts(&mut parts, &state).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_deactivated_account_is_rejected(pool: PgPool) {
        let config = create_test_config();
        let state = crate::test_utils::create_test_state(pool.clone());

        let user = create_test_user(&pool, Role::Client, None).await;
        let token = session::create_session_token(&user, &config).unwrap();

        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(user.id)
            .execute(&pool)
            .await
            .unwrap();

        let mut parts = parts_with_token(&token);
        let result = CurrentUser::from_request_parts(&mut parts, &state).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
