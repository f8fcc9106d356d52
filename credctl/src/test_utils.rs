//! Test utilities shared by unit and integration tests.

use crate::api::models::users::{CurrentUser, Role};
use crate::auth::session;
use crate::db::handlers::{Repository, Users};
use crate::db::models::users::UserCreateDBRequest;
use crate::security::rate_limit::RequestTracker;
use axum_test::TestServer;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub fn create_test_config() -> crate::config::Config {
    crate::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        ..Default::default()
    }
}

pub fn create_test_state(pool: PgPool) -> crate::AppState {
    let config = create_test_config();
    let tracker = Arc::new(RequestTracker::new(&config.rate_limit));
    crate::AppState::builder().db(pool).config(config).tracker(tracker).build()
}

/// Router-backed test server over the given pool.
pub fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_config(pool, create_test_config())
}

/// Same, with a caller-supplied config for tests that tune the security layer.
pub fn create_test_app_with_config(pool: PgPool, config: crate::config::Config) -> TestServer {
    let tracker = Arc::new(RequestTracker::new(&config.rate_limit));
    let state = crate::AppState::builder().db(pool).config(config).tracker(tracker).build();
    let router = crate::build_router(&state);
    TestServer::new(router).expect("Failed to create test server")
}

/// Insert a user with a unique username. `created_by` links clients to the
/// reseller that owns them.
pub async fn create_test_user(pool: &PgPool, role: Role, created_by: Option<&str>) -> CurrentUser {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let username = format!("testuser_{}", Uuid::new_v4().simple());

    let user = users_repo
        .create(&UserCreateDBRequest {
            username,
            role,
            created_by: created_by.map(str::to_string),
        })
        .await
        .expect("Failed to create test user");

    CurrentUser::from(user)
}

/// Bearer token for a test user, signed with the test secret.
pub fn bearer_token(user: &CurrentUser) -> String {
    session::create_session_token(user, &create_test_config()).expect("Failed to create session token")
}
