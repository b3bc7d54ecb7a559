//! Rate-limiting layer.
//!
//! Fixed-window counters in the key-value backend, one window per minute.
//! Authenticated requests are keyed by user id, anonymous ones by client IP.
//! An exhausted bucket returns resource-exhausted with a Retry-After hint
//! equal to the residue of the current window.
use crate::api::error::{ApiError, api_internal, api_resource_exhausted};
use crate::app::AppState;
use crate::auth::caller::Caller;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use std::net::SocketAddr;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(60);

pub async fn ratelimit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = req.extensions().get::<Caller>();
    let (bucket, limit) = match caller {
        Some(caller) => (caller.user_id.clone(), state.max_requests_per_minute),
        None => (
            client_ip(&req),
            state.max_requests_per_minute_unauthenticated,
        ),
    };

    let now = Utc::now().timestamp();
    let key = format!("ratelimit/{bucket}/{}", now / 60);
    let count = state
        .kv
        .incr(&key, WINDOW)
        .await
        .map_err(|err| api_internal("unable to update rate limit", &err))?;

    if count > i64::from(limit) {
        let residue = 60 - (now % 60) as u64;
        metrics::counter!("apiserver_requests_ratelimited_total").increment(1);
        return Err(api_resource_exhausted("rate limit exceeded", residue));
    }

    Ok(next.run(req).await)
}

/// Client address for the anonymous bucket: the last hop of X-Forwarded-For
/// when present, otherwise the peer address.
fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(last_hop) = forwarded.split(',').next_back() {
            let last_hop = last_hop.trim();
            if !last_hop.is_empty() {
                return last_hop.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
