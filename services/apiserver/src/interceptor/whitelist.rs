//! Token whitelist layer.
//!
//! Re-checks that an API token still exists in the store. Redundant with the
//! policy engine's revocation lookup on purpose: this is the defense-in-depth
//! hook where custom admission logic slots in without touching the engine.
//! Console tokens and anonymous requests pass through.
use crate::api::error::{ApiError, api_internal, api_unauthenticated};
use crate::app::AppState;
use crate::auth::caller::Caller;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use basalt_authz::TokenType;

pub async fn whitelist(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(caller) = req.extensions().get::<Caller>() {
        if caller.token_type == TokenType::Api {
            let allowed = state
                .tokens
                .exists(&caller.user_id, &caller.token_id)
                .await
                .map_err(|err| api_internal("unable to check token whitelist", &err))?;
            if !allowed {
                return Err(api_unauthenticated("your token was revoked"));
            }
        }
    }

    Ok(next.run(req).await)
}
