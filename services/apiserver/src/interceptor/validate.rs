//! Request validation layer.
//!
//! Buffers the request body, parses it as JSON, and runs the per-method
//! validation before anything else sees the request. A failing validation is
//! a failed-precondition; the request never reaches authentication.
use crate::api::error::{ApiError, api_failed_precondition, api_internal_message};
use crate::api::types::{
    AdminTokenServiceRevokeRequest, IpServiceAllocateRequest, IpServiceDeleteRequest,
    IpServiceGetRequest, TenantServiceGetRequest, TokenServiceCreateRequest,
    TokenServiceRevokeRequest, Validate,
};
use crate::interceptor::RpcBody;
use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn validate(req: Request, next: Next) -> Result<Response, ApiError> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| api_internal_message("unable to read request body"))?;

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).map_err(|err| {
            api_failed_precondition(&format!("request validation failed: {err}"))
        })?
    };

    if let Err(message) = validate_method(parts.uri.path(), &json) {
        tracing::debug!(method = parts.uri.path(), message, "request validation failed");
        return Err(api_failed_precondition(&format!(
            "request validation failed: {message}"
        )));
    }

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(RpcBody { json });
    Ok(next.run(req).await)
}

fn check<T: DeserializeOwned + Validate>(body: &Value) -> Result<(), String> {
    let request: T = serde_json::from_value(body.clone()).map_err(|err| err.to_string())?;
    request.validate()
}

/// Per-method validation dispatch. Methods without a validatable body pass
/// through unchanged.
fn validate_method(method: &str, body: &Value) -> Result<(), String> {
    match method {
        "/api.v1.TokenService/Create" => check::<TokenServiceCreateRequest>(body),
        "/api.v1.TokenService/Revoke" => check::<TokenServiceRevokeRequest>(body),
        "/admin.v1.TokenService/Revoke" => check::<AdminTokenServiceRevokeRequest>(body),
        "/api.v1.IPService/Get" => check::<IpServiceGetRequest>(body),
        "/api.v1.IPService/Allocate" => check::<IpServiceAllocateRequest>(body),
        "/api.v1.IPService/Delete" => check::<IpServiceDeleteRequest>(body),
        "/api.v1.TenantService/Get" => check::<TenantServiceGetRequest>(body),
        _ => Ok(()),
    }
}
