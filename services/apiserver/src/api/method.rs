//! Method service: tells a caller which methods its token can reach, per
//! subject. Programmatic clients use this to discover what a token can
//! delegate before calling `TokenService/Create`.
use crate::api::error::ApiError;
use crate::api::types::MethodServiceListResponse;
use crate::auth::caller::Caller;
use axum::Json;
use basalt_authz::MethodPermission;

pub async fn list(caller: Caller) -> Result<Json<MethodServiceListResponse>, ApiError> {
    let permissions = caller
        .effective_permissions()
        .into_iter()
        .map(|(subject, methods)| MethodPermission { subject, methods })
        .collect();
    Ok(Json(MethodServiceListResponse { permissions }))
}
