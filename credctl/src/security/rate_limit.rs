//! Sliding-window rate limiter with abuse escalation.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::AppState;
use crate::auth::session;
use crate::config::RateLimitConfig;
use crate::db::handlers::Blacklists;
use crate::db::models::blacklist::BlacklistReason;
use crate::security::{client_ip_from_headers, escalation};

/// Per-identifier request history inside the current window.
#[derive(Debug)]
struct RateRecord {
    /// Admission timestamps, pruned to the window on every check
    timestamps: Vec<Instant>,
    /// When this identifier was first seen; drives sweep eviction
    first_request: Instant,
    /// Consecutive over-limit hits; reset by any admitted request
    abuse_count: u32,
}

/// Verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Over the limit; retry once the window has passed
    Limited { retry_after: Duration },
    /// Over the limit persistently; the source should be blacklisted
    Escalate { abuse_count: u32 },
}

/// In-memory sliding-window tracker, keyed by user id or source IP.
///
/// Owned by [`crate::AppState`] and shared across request tasks; the dashmap
/// shard locks serialize the read-modify-write per identifier.
pub struct RequestTracker {
    records: DashMap<String, RateRecord>,
    window: Duration,
    max_requests: usize,
    abuse_threshold: u32,
}

impl RequestTracker {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            records: DashMap::new(),
            window: config.window,
            max_requests: config.max_requests,
            abuse_threshold: config.abuse_threshold,
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Check one request at an explicit instant. Separated from [`check`](Self::check)
    /// so tests can drive the clock.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut entry = self.records.entry(key.to_string()).or_insert_with(|| RateRecord {
            timestamps: Vec::new(),
            first_request: now,
            abuse_count: 0,
        });
        let record = entry.value_mut();

        record.timestamps.retain(|t| now.duration_since(*t) < self.window);

        if record.timestamps.len() >= self.max_requests {
            // Violations do not consume window slots
            record.abuse_count += 1;
            if record.abuse_count >= self.abuse_threshold {
                RateDecision::Escalate {
                    abuse_count: record.abuse_count,
                }
            } else {
                RateDecision::Limited { retry_after: self.window }
            }
        } else {
            record.timestamps.push(now);
            // A well-behaved request after backing off forgives past violations
            record.abuse_count = 0;
            RateDecision::Allowed
        }
    }

    /// Evict identifiers whose first request is older than `idle_horizon`.
    /// Returns how many records were dropped.
    pub fn sweep_at(&self, now: Instant, idle_horizon: Duration) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| now.duration_since(record.first_request) < idle_horizon);
        before - self.records.len()
    }

    pub fn sweep(&self, idle_horizon: Duration) -> usize {
        self.sweep_at(Instant::now(), idle_horizon)
    }

    /// Number of identifiers currently tracked.
    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        axum::Json(json!({
            "success": false,
            "message": "Access denied",
        })),
    )
        .into_response()
}

fn too_many_requests(retry_after: Duration) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        axum::Json(json!({
            "success": false,
            "message": "Too many requests, please slow down",
            "retryAfter": retry_after.as_secs(),
        })),
    )
        .into_response()
}

/// Blacklist check plus sliding-window limit, applied to every `/api` request.
///
/// Store errors fail open: enforcement degrades before availability does.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0);
    let ip = client_ip_from_headers(req.headers(), peer, state.config.trusted_proxy_depth);

    // Blocked IPs are rejected before any counting happens
    match state.db.acquire().await {
        Ok(mut conn) => {
            let mut blacklists = Blacklists::new(&mut conn);
            match blacklists.find_blocking(&ip, Utc::now()).await {
                Ok(Some(_)) => return forbidden(),
                Ok(None) => {}
                Err(e) => warn!(ip, "Blacklist check failed, continuing without it: {e}"),
            }
        }
        Err(e) => warn!(ip, "Could not acquire connection for blacklist check: {e}"),
    }

    // Authenticated traffic is tracked per account so users behind one NAT
    // don't share a budget; anonymous traffic falls back to the IP.
    let identifier = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .and_then(|token| session::verify_session_token(token, &state.config).ok())
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| ip.clone());

    match state.tracker.check(&identifier) {
        RateDecision::Allowed => next.run(req).await,
        RateDecision::Limited { retry_after } => too_many_requests(retry_after),
        RateDecision::Escalate { abuse_count } => {
            let user_agent = req
                .headers()
                .get(axum::http::header::USER_AGENT)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string);
            let expires_at = Utc::now() + state.config.rate_limit.block_duration;

            let escalated = escalation::escalate(
                &state.db,
                escalation::Escalation {
                    ip: ip.clone(),
                    reason: BlacklistReason::RateLimitExceeded,
                    description: Some(format!("Rate limit exceeded {abuse_count} times in a row")),
                    attempt_context: None,
                    user_agent,
                    endpoint: Some(req.uri().path().to_string()),
                    method: Some(req.method().to_string()),
                    blocked_by: "system".to_string(),
                    expires_at: Some(expires_at),
                },
            )
            .await;

            match escalated {
                Ok(_) => forbidden(),
                Err(e) => {
                    // The write failed but the limit verdict stands
                    warn!(ip, "Abuse escalation failed: {e}");
                    too_many_requests(state.config.rate_limit.window)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max_requests: usize, window: Duration, abuse_threshold: u32) -> RequestTracker {
        RequestTracker::new(&RateLimitConfig {
            window,
            max_requests,
            abuse_threshold,
            ..Default::default()
        })
    }

    #[test]
    fn test_requests_under_limit_are_allowed() {
        let tracker = tracker(3, Duration::from_secs(60), 5);
        let now = Instant::now();

        for _ in 0..3 {
            assert_eq!(tracker.check_at("a", now), RateDecision::Allowed);
        }
        assert!(matches!(tracker.check_at("a", now), RateDecision::Limited { .. }));
    }

    #[test]
    fn test_window_slides() {
        let window = Duration::from_secs(60);
        let tracker = tracker(2, window, 5);
        let start = Instant::now();

        assert_eq!(tracker.check_at("a", start), RateDecision::Allowed);
        assert_eq!(tracker.check_at("a", start), RateDecision::Allowed);
        assert!(matches!(tracker.check_at("a", start), RateDecision::Limited { .. }));

        // Both admissions fall out of the window
        let later = start + window + Duration::from_secs(1);
        assert_eq!(tracker.check_at("a", later), RateDecision::Allowed);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let tracker = tracker(1, Duration::from_secs(60), 5);
        let now = Instant::now();

        assert_eq!(tracker.check_at("a", now), RateDecision::Allowed);
        assert_eq!(tracker.check_at("b", now), RateDecision::Allowed);
        assert!(matches!(tracker.check_at("a", now), RateDecision::Limited { .. }));
    }

    #[test]
    fn test_escalation_after_repeated_violations() {
        let tracker = tracker(1, Duration::from_secs(60), 3);
        let now = Instant::now();

        assert_eq!(tracker.check_at("a", now), RateDecision::Allowed);
        assert!(matches!(tracker.check_at("a", now), RateDecision::Limited { .. }));
        assert!(matches!(tracker.check_at("a", now), RateDecision::Limited { .. }));
        assert_eq!(tracker.check_at("a", now), RateDecision::Escalate { abuse_count: 3 });
        // Further violations keep escalating
        assert_eq!(tracker.check_at("a", now), RateDecision::Escalate { abuse_count: 4 });
    }

    #[test]
    fn test_admitted_request_resets_abuse_count() {
        let window = Duration::from_secs(60);
        let tracker = tracker(1, window, 3);
        let start = Instant::now();

        assert_eq!(tracker.check_at("a", start), RateDecision::Allowed);
        assert!(matches!(tracker.check_at("a", start), RateDecision::Limited { .. }));
        assert!(matches!(tracker.check_at("a", start), RateDecision::Limited { .. }));

        // Backing off past the window admits the request and forgives the streak
        let later = start + window + Duration::from_secs(1);
        assert_eq!(tracker.check_at("a", later), RateDecision::Allowed);
        assert!(matches!(tracker.check_at("a", later), RateDecision::Limited { .. }));
        assert!(matches!(tracker.check_at("a", later), RateDecision::Limited { .. }));
        // Still below the threshold: the old streak did not carry over
        assert_eq!(tracker.check_at("a", later), RateDecision::Escalate { abuse_count: 3 });
    }

    #[test]
    fn test_sweep_evicts_idle_records() {
        let tracker = tracker(10, Duration::from_secs(60), 5);
        let horizon = Duration::from_secs(3600);
        let start = Instant::now();

        tracker.check_at("old", start);
        tracker.check_at("fresh", start + horizon);
        assert_eq!(tracker.tracked(), 2);

        let dropped = tracker.sweep_at(start + horizon + Duration::from_secs(1), horizon);
        assert_eq!(dropped, 1);
        assert_eq!(tracker.tracked(), 1);
    }
}
