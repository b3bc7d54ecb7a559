//! Operator endpoints under `admin.v1`. All of them carry ADMIN visibility;
//! the read-only ones are reachable with a VIEWER admin role, revocation
//! needs EDITOR.
use crate::api::error::{ApiError, api_internal, api_internal_message};
use crate::api::types::{
    AdminTenantServiceListResponse, AdminTokenServiceRevokeRequest, TokenServiceListResponse,
    TokenServiceRevokeResponse,
};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

pub async fn tenant_list(
    State(state): State<AppState>,
) -> Result<Json<AdminTenantServiceListResponse>, ApiError> {
    let tenants = state.masterdata.list_tenants().await.map_err(|err| {
        tracing::error!(error = %err, "tenant listing failed");
        api_internal_message("unable to list tenants")
    })?;
    Ok(Json(AdminTenantServiceListResponse { tenants }))
}

pub async fn token_list(
    State(state): State<AppState>,
) -> Result<Json<TokenServiceListResponse>, ApiError> {
    let tokens = state
        .tokens
        .list_all()
        .await
        .map_err(|err| api_internal("unable to list tokens", &err))?;
    Ok(Json(TokenServiceListResponse { tokens }))
}

pub async fn token_revoke(
    State(state): State<AppState>,
    Json(req): Json<AdminTokenServiceRevokeRequest>,
) -> Result<Json<TokenServiceRevokeResponse>, ApiError> {
    state
        .tokens
        .revoke(&req.user_id, &req.uuid)
        .await
        .map_err(|err| api_internal("unable to revoke token", &err))?;
    Ok(Json(TokenServiceRevokeResponse {}))
}
