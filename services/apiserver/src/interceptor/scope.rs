//! Scope-resolution layer.
//!
//! Requests that name a project are resolved to the project and its owning
//! tenant before the handler runs, through a one-hour single-flight cache in
//! front of masterdata. Requests without a project field pass through
//! unchanged. A failed lookup is a not-found, without the backend detail.
use crate::api::error::{ApiError, api_internal_message, api_not_found};
use crate::app::AppState;
use crate::interceptor::RpcBody;
use crate::masterdata::{MasterdataError, Project, Tenant};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;

/// The resolved subject of a project-scoped request.
#[derive(Debug, Clone)]
pub struct ResolvedScope {
    pub project: Project,
    pub tenant: Tenant,
}

pub async fn resolve_scope(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let project_id = req
        .extensions()
        .get::<RpcBody>()
        .and_then(|body| body.json.get("project"))
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_owned);

    let Some(project_id) = project_id else {
        return Ok(next.run(req).await);
    };

    let project = state.project_cache.get(project_id).await.map_err(|err| {
        match err.downcast_ref::<MasterdataError>() {
            Some(MasterdataError::NotFound(_)) => api_not_found("project not found"),
            _ => {
                tracing::error!(error = %err, "project lookup failed");
                api_internal_message("unable to resolve project")
            }
        }
    })?;

    // TODO: cache tenants as well; needs invalidation on tenant updates
    // because the annotations feed auditing.
    let tenant = state
        .masterdata
        .get_tenant(&project.tenant_id)
        .await
        .map_err(|err| match err {
            MasterdataError::NotFound(_) => api_not_found("tenant not found"),
            MasterdataError::Backend(err) => {
                tracing::error!(error = %err, "tenant lookup failed");
                api_internal_message("unable to resolve tenant")
            }
        })?;

    req.extensions_mut().insert(ResolvedScope { project, tenant });
    Ok(next.run(req).await)
}
