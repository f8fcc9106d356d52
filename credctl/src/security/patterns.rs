//! Suspicious-pattern detection over the request URL and body.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::warn;

use crate::AppState;
use crate::db::handlers::{AuditLogs, Blacklists};
use crate::db::models::audit_logs::AuditLogCreateDBRequest;
use crate::db::models::blacklist::{BlacklistCreateDBRequest, BlacklistReason};
use crate::security::client_ip;
use crate::security::escalation::{self, Escalation};

/// Largest body the detector will buffer and scan.
const MAX_SCAN_BYTES: usize = 1024 * 1024;

/// How much of the offending body is kept in the blacklist entry context.
const CONTEXT_BODY_BYTES: usize = 200;

/// Attack signatures, checked in order; the first match names the pattern.
static SIGNATURES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("path_traversal", r"\.\.[/\\]"),
        ("script_injection", r"(?i)<script"),
        ("sql_union_select", r"(?i)union.*select"),
        ("code_eval", r"(?i)eval\("),
        ("base64_decode", r"(?i)base64_decode"),
        ("sql_or_equals", r"(?i)\bor\b.*=.*\bor\b"),
    ]
    .into_iter()
    .map(|(name, pattern)| {
        // The signature table is fixed; a malformed entry is a programming error
        (name, Regex::new(pattern).unwrap_or_else(|e| panic!("invalid signature {name}: {e}")))
    })
    .collect()
});

/// First signature matching `text`, if any.
pub fn match_signature(text: &str) -> Option<&'static str> {
    SIGNATURES.iter().find(|(_, re)| re.is_match(text)).map(|(name, _)| *name)
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

/// Scan the URL and body against the signature table.
///
/// A match never blocks on its own: the first two matches from an IP create
/// and grow an inactive warning entry, the configured threshold activates it.
/// Already-blocked IPs are stopped here too, without waiting for the limiter.
/// Store errors fail open.
pub async fn detect_suspicious_patterns(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();

    let bytes = match to_bytes(body, MAX_SCAN_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                axum::Json(json!({
                    "success": false,
                    "message": "Request body too large",
                })),
            )
                .into_response();
        }
    };

    let url = parts.uri.to_string();
    let body_text = String::from_utf8_lossy(&bytes);

    let pattern = match_signature(&url).or_else(|| match_signature(&body_text));

    let Some(pattern) = pattern else {
        return next.run(Request::from_parts(parts, Body::from(bytes))).await;
    };

    let ip = client_ip(&parts, state.config.trusted_proxy_depth);
    let user_agent = parts
        .headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let path = parts.uri.path().to_string();
    let method = parts.method.to_string();
    let body_excerpt: String = body_text.chars().take(CONTEXT_BODY_BYTES).collect();

    warn!(ip, pattern, path, "Suspicious pattern detected");

    let blocked = match handle_match(&state, &ip, pattern, &path, &method, user_agent, &body_excerpt).await {
        Ok(blocked) => blocked,
        Err(e) => {
            warn!(ip, "Pattern bookkeeping failed, letting request through: {e}");
            false
        }
    };

    if blocked {
        forbidden()
    } else {
        next.run(Request::from_parts(parts, Body::from(bytes))).await
    }
}

/// Record the match and decide whether this request is blocked.
async fn handle_match(
    state: &AppState,
    ip: &str,
    pattern: &str,
    path: &str,
    method: &str,
    user_agent: Option<String>,
    body_excerpt: &str,
) -> crate::errors::Result<bool> {
    use crate::db::errors::DbError;

    let context = json!({
        "path": path,
        "method": method,
        "pattern": pattern,
        "body": body_excerpt,
    });

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;

    AuditLogs::new(&mut conn)
        .create(&AuditLogCreateDBRequest::security_warning(
            "suspicious_pattern_detected",
            ip,
            context.clone(),
        ))
        .await?;

    let existing = Blacklists::new(&mut conn).find_by_ip(ip).await?;
    match existing {
        // This match crosses the threshold: block through the shared
        // escalation path, which bumps the counter and writes the audit entry
        Some(entry) if entry.attempt_count + 1 >= state.config.detector.activation_threshold => {
            drop(conn);
            escalation::escalate(
                &state.db,
                Escalation {
                    ip: ip.to_string(),
                    reason: BlacklistReason::SuspiciousPattern,
                    description: Some(format!("Suspicious pattern: {pattern}")),
                    attempt_context: Some(context),
                    user_agent,
                    endpoint: Some(path.to_string()),
                    method: Some(method.to_string()),
                    blocked_by: "system".to_string(),
                    expires_at: Some(Utc::now() + state.config.detector.block_duration),
                },
            )
            .await?;
            Ok(true)
        }
        Some(entry) => {
            let updated = Blacklists::new(&mut conn).record_attempt(entry.id).await?;
            Ok(updated.active)
        }
        None => {
            // First offense: a warning entry that does not block yet
            Blacklists::new(&mut conn)
                .create(&BlacklistCreateDBRequest {
                    ip: ip.to_string(),
                    reason: BlacklistReason::SuspiciousPattern,
                    description: Some(format!("Suspicious pattern: {pattern}")),
                    attempt_context: Some(context),
                    user_agent,
                    endpoint: Some(path.to_string()),
                    method: Some(method.to_string()),
                    active: false,
                    blocked_by: "system".to_string(),
                    expires_at: None,
                })
                .await?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_traversal() {
        assert_eq!(match_signature("/api/keys/../../etc/passwd"), Some("path_traversal"));
        assert_eq!(match_signature(r"..\windows\system32"), Some("path_traversal"));
    }

    #[test]
    fn test_script_injection_is_case_insensitive() {
        assert_eq!(match_signature("<SCRIPT>alert(1)</SCRIPT>"), Some("script_injection"));
    }

    #[test]
    fn test_sql_signatures() {
        assert_eq!(match_signature("1 UNION SELECT password FROM users"), Some("sql_union_select"));
        assert_eq!(match_signature("' or 1=1 or ''='"), Some("sql_or_equals"));
    }

    #[test]
    fn test_eval_and_base64() {
        assert_eq!(match_signature("x=eval(atob(p))"), Some("code_eval"));
        assert_eq!(match_signature("base64_decode($_POST['c'])"), Some("base64_decode"));
    }

    #[test]
    fn test_first_match_wins() {
        // Contains both a traversal and a script tag; the table order decides
        assert_eq!(match_signature("/files/../x?q=<script>"), Some("path_traversal"));
    }

    #[test]
    fn test_clean_input() {
        assert_eq!(match_signature("/api/keys/validate"), None);
        assert_eq!(match_signature(r#"{"key":"aB3xY9","endpoint":"dni"}"#), None);
        // Plain prose mentioning "or" twice is not an injection
        assert_eq!(match_signature("one or another thing"), None);
    }
}
