use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::ApiError;
use crate::services::AppState;

const SUBMIT_WINDOW_SECONDS: u64 = 86400; // rolling day

/// Proxy-reported client address, preferred order: CF-Connecting-IP,
/// X-Forwarded-For, X-Real-IP.
pub(crate) fn client_ip_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(v) = headers.get("cf-connecting-ip") {
        if let Ok(s) = v.to_str() {
            return Some(s.trim().to_string());
        }
    }

    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // x-forwarded-for can be a comma separated list; take first
            return Some(s.split(',').next().unwrap_or(s).trim().to_string());
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return Some(s.trim().to_string());
        }
    }

    None
}

fn extract_client_ip(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    client_ip_from_headers(headers)
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Caps survey submissions per source IP per day. This is quota, not the
/// anti-abuse gate: a capped client gets an honest 429, while the gate's
/// rejections stay deliberately opaque.
pub async fn submit_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !state.config.security.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip(request.headers(), request.extensions());

    let limit = state.config.security.max_submissions_per_day;
    let allowed = check_submit_quota(&state.redis, &client_ip, limit)
        .await
        .map_err(|e| {
            tracing::error!("Submit rate limit check failed: {:#?}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if !allowed {
        tracing::warn!("Submission quota exhausted for ip={}", client_ip);
        crate::metrics::record_abuse_rejection("daily_quota");
        return Ok(ApiError::RateLimited.into_response());
    }

    Ok(next.run(request).await)
}

/// Atomic INCR + EXPIRE-on-first-hit so the counter and its window are
/// created together even under concurrent submits.
async fn check_submit_quota(
    redis: &ConnectionManager,
    client_ip: &str,
    limit: u32,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();
    let key = format!("ratelimit:submit:{}", client_ip);

    let lua_script = r#"
        local key = KEYS[1]
        local ttl = tonumber(ARGV[1])

        local hits = redis.call('INCR', key)
        if hits == 1 then
            redis.call('EXPIRE', key, ttl)
        end

        return hits
    "#;

    let hits: u32 = redis::Script::new(lua_script)
        .key(&key)
        .arg(SUBMIT_WINDOW_SECONDS)
        .invoke_async(&mut conn)
        .await?;

    Ok(hits <= limit)
}
