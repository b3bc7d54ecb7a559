//! RPC error responses.
//!
//! # Purpose
//! Centralizes error construction so every handler and interceptor maps
//! failures onto the same external statuses. Authentication and
//! authorization failures are both surfaced as `unauthenticated` so a caller
//! cannot distinguish "bad credential" from "valid credential, wrong
//! subject".
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::IntoResponse;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
    pub retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(seconds) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

fn error(status: StatusCode, code: &str, message: &str) -> ApiError {
    ApiError {
        status,
        body: ErrorResponse {
            code: code.to_string(),
            message: message.to_string(),
        },
        retry_after: None,
    }
}

/// Missing, invalid, expired, or revoked credential. Also used for
/// authorization denials, on purpose.
pub fn api_unauthenticated(message: &str) -> ApiError {
    error(StatusCode::UNAUTHORIZED, "unauthenticated", message)
}

/// Token-issuance rule failures. Same external status as authentication
/// failures; the message names the rule because that aids the developer and
/// reveals no secret.
pub fn api_permission_denied(message: &str) -> ApiError {
    error(StatusCode::UNAUTHORIZED, "permission_denied", message)
}

pub fn api_failed_precondition(message: &str) -> ApiError {
    error(StatusCode::PRECONDITION_FAILED, "failed_precondition", message)
}

pub fn api_not_found(message: &str) -> ApiError {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn api_conflict(message: &str) -> ApiError {
    error(StatusCode::CONFLICT, "already_exists", message)
}

pub fn api_resource_exhausted(message: &str, retry_after_secs: u64) -> ApiError {
    let mut err = error(StatusCode::TOO_MANY_REQUESTS, "resource_exhausted", message);
    err.retry_after = Some(retry_after_secs);
    err
}

pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "apiserver storage error");
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

pub fn api_internal_message(message: &str) -> ApiError {
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authn_and_authz_share_a_status() {
        assert_eq!(
            api_unauthenticated("token is not valid").status,
            api_permission_denied("requested role is too strong").status
        );
    }

    #[test]
    fn resource_exhausted_carries_retry_after() {
        let err = api_resource_exhausted("rate limit exceeded", 42);
        assert_eq!(err.retry_after, Some(42));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            HeaderValue::from_static("42")
        );
    }
}
