//! Public health and version endpoints.
use crate::api::error::ApiError;
use crate::api::types::{HealthServiceGetResponse, VersionServiceGetResponse};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use std::collections::BTreeMap;

pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthServiceGetResponse>, ApiError> {
    let mut services = BTreeMap::new();
    services.insert(
        "key-value-store".to_string(),
        match state.kv.health_check().await {
            Ok(()) => "SERVING".to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "key-value store unhealthy");
                "NOT_SERVING".to_string()
            }
        },
    );
    services.insert(
        "masterdata".to_string(),
        match state.masterdata.probe().await {
            Ok(()) => "SERVING".to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "masterdata unhealthy");
                "NOT_SERVING".to_string()
            }
        },
    );

    let status = if services.values().all(|status| status == "SERVING") {
        "SERVING"
    } else {
        "DEGRADED"
    };

    Ok(Json(HealthServiceGetResponse {
        status: status.to_string(),
        services,
    }))
}

pub async fn version(
    State(state): State<AppState>,
) -> Result<Json<VersionServiceGetResponse>, ApiError> {
    Ok(Json(VersionServiceGetResponse {
        version: state.version.clone(),
        revision: state.revision.clone(),
    }))
}
