//! # credctl: Credential Control Panel
//!
//! `credctl` is the access-control panel for a data-lookup API reseller. It
//! manages the full lifecycle of time-bounded API keys (issue, validate,
//! renew, revoke), an approval workflow for access requests, and the abuse
//! protections that sit in front of both: a sliding-window rate limiter, a
//! suspicious-pattern detector and an IP blacklist, all backed by an audit
//! trail.
//!
//! ## Overview
//!
//! The downstream data API never stores credentials itself. On every request
//! it calls `POST /api/keys/validate` here with the presented key token and
//! the endpoint being accessed; `credctl` answers with a verdict and records
//! usage. Everything else in the panel exists to produce, constrain and
//! retire those keys.
//!
//! Accounts come in three tiers: admins run the panel, resellers manage the
//! client accounts they created, clients hold keys. Clients either receive
//! keys directly from their reseller or file an access request that an admin
//! or their reseller approves, which issues all requested keys atomically.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for
//! the HTTP layer and uses PostgreSQL for all persistence.
//!
//! ### Request Flow
//!
//! Every `/api` request passes through the security middleware first: the
//! pattern detector scans the URL and body for attack signatures, then the
//! rate limiter rejects blacklisted IPs and applies the sliding window. Both
//! fail open on store errors. Surviving requests reach the handlers, which
//! authenticate via bearer JWT (see [`auth`]), check role and ownership, and
//! talk to PostgreSQL through the repositories in [`db::handlers`].
//!
//! ### Core Components
//!
//! The **API layer** ([`api`]) exposes the key lifecycle under `/api/keys`,
//! the approval workflow under `/api/key-requests` and the admin-only
//! security surface under `/api/security`. Interactive docs are served at
//! `/docs`.
//!
//! The **security layer** ([`security`]) holds the in-memory request tracker,
//! the signature table and the single escalation path onto the blacklist.
//!
//! The **database layer** ([`db`]) uses the repository pattern over plain
//! `PgConnection` references, so the same code runs inside and outside
//! transactions.
//!
//! A **background sweep** evicts stale rate-limiter records on a fixed
//! interval so the tracker's memory stays bounded.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use credctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = credctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     credctl::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
mod crypto;
pub mod db;
pub mod duration;
pub mod errors;
mod openapi;
pub mod security;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    api::models::users::Role,
    db::handlers::{Repository, Users},
    db::models::users::UserCreateDBRequest,
    openapi::ApiDoc,
    security::rate_limit::RequestTracker,
};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{ApiKeyId, AuditLogId, BlacklistEntryId, KeyRequestId, UserId};

/// Application state shared across all request handlers.
///
/// # Fields
///
/// - `db`: PostgreSQL connection pool
/// - `config`: Application configuration loaded from environment/files
/// - `tracker`: In-memory sliding-window rate limiter state
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub tracker: Arc<RequestTracker>,
}

/// Get the credctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent; called during startup when `admin_username` is configured so a
/// fresh database always has an account that can reach the admin surface.
#[instrument(skip(db))]
pub async fn create_initial_admin_user(username: &str, db: &PgPool) -> Result<UserId, anyhow::Error> {
    let mut tx = db.begin().await?;
    let mut users = Users::new(&mut tx);

    if let Some(existing) = users.get_by_username(username).await? {
        tx.commit().await?;
        return Ok(existing.id);
    }

    let created = users
        .create(&UserCreateDBRequest {
            username: username.to_string(),
            role: Role::Admin,
            created_by: None,
        })
        .await?;

    tx.commit().await?;
    info!(username, "Created initial admin user");
    Ok(created.id)
}

/// Connect to the database and run migrations.
async fn setup_database(config: &Config) -> anyhow::Result<PgPool> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not configured"))?;

    let pool = PgPool::connect(database_url).await?;
    migrator().run(&pool).await?;

    if let Some(admin_username) = &config.admin_username {
        create_initial_admin_user(admin_username, &pool).await?;
    }

    Ok(pool)
}

/// Build the main application router with all endpoints and middleware.
///
/// Route surface:
/// - `/api/keys`: key lifecycle (issue, list, renew, revoke, validate)
/// - `/api/key-requests`: access request workflow
/// - `/api/security`: admin-only blacklist and audit surface
/// - `/healthz`: liveness probe, outside the security middleware
/// - `/docs`: interactive API documentation
///
/// The pattern detector and rate limiter wrap only the `/api` subtree, in
/// that order.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> Router {
    let api_routes = Router::new()
        // Key lifecycle
        .route("/keys", get(api::handlers::api_keys::list_keys))
        .route("/keys", post(api::handlers::api_keys::create_key))
        .route("/keys/validate", post(api::handlers::api_keys::validate_key))
        .route("/keys/{id}/renew", post(api::handlers::api_keys::renew_key))
        .route("/keys/{id}", delete(api::handlers::api_keys::delete_key))
        // Access request workflow
        .route("/key-requests", get(api::handlers::key_requests::list_requests))
        .route("/key-requests", post(api::handlers::key_requests::create_request))
        .route("/key-requests/{id}/approve", post(api::handlers::key_requests::approve_request))
        .route("/key-requests/{id}/reject", post(api::handlers::key_requests::reject_request))
        // Security admin surface
        .route("/security/blacklist", get(api::handlers::security::list_blacklist))
        .route("/security/blacklist", post(api::handlers::security::create_block))
        .route("/security/blacklist/{id}", delete(api::handlers::security::delete_block))
        .route("/security/audit-logs", get(api::handlers::security::list_audit_logs))
        // Layers run outermost-last: the detector sees the request first,
        // then the limiter, then the handler
        .layer(from_fn_with_state(state.clone(), security::rate_limit::rate_limit))
        .layer(from_fn_with_state(state.clone(), security::patterns::detect_suspicious_patterns))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Container for background tasks and their lifecycle management.
///
/// Holds the rate-limiter sweep task. The `drop_guard` cancels the shutdown
/// token when the struct is dropped, so tasks never outlive the application.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: tokio_util::sync::CancellationToken,
    pub drop_guard: Option<tokio_util::sync::DropGuard>,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Start the rate-limiter sweep loop.
fn setup_background_services(
    tracker: Arc<RequestTracker>,
    config: &Config,
    shutdown_token: tokio_util::sync::CancellationToken,
) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let mut background_tasks = Vec::new();

    let sweep_interval = config.rate_limit.sweep_interval;
    let idle_horizon = config.rate_limit.idle_horizon;
    let sweep_shutdown = shutdown_token.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        // The first tick fires immediately; skip it
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let dropped = tracker.sweep(idle_horizon);
                    if dropped > 0 {
                        debug!(dropped, tracked = tracker.tracked(), "Swept idle rate-limit records");
                    }
                }
                _ = sweep_shutdown.cancelled() => {
                    info!("Rate-limit sweep task shutting down");
                    break;
                }
            }
        }
    });
    background_tasks.push(handle);

    BackgroundServices {
        background_tasks,
        shutdown_token,
        drop_guard: Some(drop_guard),
    }
}

/// Main application struct that owns all resources and lifecycle.
///
/// # Lifecycle
///
/// 1. **Create**: [`Application::new`] connects to the database, runs
///    migrations and starts background tasks
/// 2. **Serve**: [`Application::serve`] binds a TCP port and handles requests
/// 3. **Shutdown**: the shutdown future resolves, the server drains and
///    background tasks are stopped
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting credential panel with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;

        let tracker = Arc::new(RequestTracker::new(&config.rate_limit));

        let shutdown_token = tokio_util::sync::CancellationToken::new();
        let bg_services = setup_background_services(tracker.clone(), &config, shutdown_token);

        let app_state = AppState::builder().db(pool.clone()).config(config.clone()).tracker(tracker).build();

        let router = build_router(&app_state);

        Ok(Self {
            router,
            config,
            pool,
            bg_services,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Credential panel listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        // Stop background tasks and wait for them to finish
        self.bg_services.shutdown().await;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
