//! Project service.
//!
//! `List` is SELF-scoped: it returns the projects the caller holds a role or
//! an explicit permission on, resolved against masterdata. `Get` is
//! project-scoped and served from the scope the interceptor chain already
//! resolved.
use crate::api::error::{ApiError, api_internal_message};
use crate::api::types::{ProjectServiceGetResponse, ProjectServiceListResponse};
use crate::app::AppState;
use crate::auth::caller::Caller;
use crate::interceptor::scope::ResolvedScope;
use crate::masterdata::MasterdataError;
use axum::extract::State;
use axum::{Extension, Json};
use std::collections::BTreeSet;

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ProjectServiceListResponse>, ApiError> {
    let mut subjects: BTreeSet<String> = caller.project_roles.keys().cloned().collect();
    subjects.extend(caller.permissions.keys().cloned());

    let mut projects = Vec::new();
    for subject in subjects {
        match state.masterdata.get_project(&subject).await {
            Ok(project) => projects.push(project),
            // Permission subjects may name tenants; those are not projects.
            Err(MasterdataError::NotFound(_)) => continue,
            Err(MasterdataError::Backend(err)) => {
                tracing::error!(error = %err, "project listing failed");
                return Err(api_internal_message("unable to list projects"));
            }
        }
    }

    Ok(Json(ProjectServiceListResponse { projects }))
}

pub async fn get(
    Extension(scope): Extension<ResolvedScope>,
) -> Result<Json<ProjectServiceGetResponse>, ApiError> {
    Ok(Json(ProjectServiceGetResponse {
        project: scope.project,
        tenant: scope.tenant,
    }))
}
