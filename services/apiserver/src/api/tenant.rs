//! Tenant service, tenant-scoped reads.
use crate::api::error::{ApiError, api_internal_message, api_not_found};
use crate::api::types::{TenantServiceGetRequest, TenantServiceGetResponse};
use crate::app::AppState;
use crate::masterdata::MasterdataError;
use axum::Json;
use axum::extract::State;

pub async fn get(
    State(state): State<AppState>,
    Json(req): Json<TenantServiceGetRequest>,
) -> Result<Json<TenantServiceGetResponse>, ApiError> {
    let tenant = state
        .masterdata
        .get_tenant(&req.tenant)
        .await
        .map_err(|err| match err {
            MasterdataError::NotFound(_) => api_not_found("tenant not found"),
            MasterdataError::Backend(err) => {
                tracing::error!(error = %err, "tenant lookup failed");
                api_internal_message("unable to resolve tenant")
            }
        })?;
    Ok(Json(TenantServiceGetResponse { tenant }))
}
