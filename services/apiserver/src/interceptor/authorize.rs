//! Authentication + authorization layer.
//!
//! Hands the method name, the buffered request body, and the bearer header
//! to the policy engine. On allow the verified caller rides the request
//! extensions into the handler; every deny is an unauthenticated status
//! carrying the engine's reason.
use crate::api::error::{ApiError, api_unauthenticated};
use crate::app::AppState;
use crate::auth::policy::Decision;
use crate::interceptor::RpcBody;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;

pub async fn authorize(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let method = req.uri().path().to_string();
    let body = req
        .extensions()
        .get::<RpcBody>()
        .map(|body| body.json.clone())
        .unwrap_or(Value::Null);
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match state
        .policy
        .decide(&method, &body, authorization.as_deref())
        .await
    {
        Decision::Allow(Some(caller)) => {
            req.extensions_mut().insert(caller);
        }
        Decision::Allow(None) => {}
        Decision::Deny(reason) => {
            tracing::debug!(method, reason, "request denied");
            metrics::counter!("apiserver_requests_denied_total").increment(1);
            return Err(api_unauthenticated(&reason));
        }
    }

    Ok(next.run(req).await)
}
