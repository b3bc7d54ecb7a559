//! Token-issuance service.
//!
//! # Purpose and responsibility
//! Mints, lists, and revokes bearer credentials. The RPC `Create` path is
//! guarded by the privilege-reduction rules: a derived token can narrow but
//! never widen the capabilities of the token that mints it.
//!
//! # Callers / consumers
//! - `/api.v1.TokenService/*` RPCs (SELF visibility).
//! - The console login flow, which mints short-lived console tokens with a
//!   trusted subject and therefore skips the permission check.
//! - The server CLI, which mints operator API tokens without a check; that
//!   path is never routed over RPC.
//!
//! # Key invariants
//! - Every method granted to a new token is inside the effective methods of
//!   the creating token.
//! - Requested roles can be equal or weaker than held roles, never stronger;
//!   OWNER carries the smallest ordinal.
//! - Admin roles can only be requested when the caller holds (or is uplifted
//!   to) one, and never a stronger one than held.
//! - The record is stored before the signed form is returned, so a token
//!   that was never delivered is still revocable from the admin listing.
use crate::api::error::{
    ApiError, api_conflict, api_internal, api_internal_message, api_permission_denied,
};
use crate::api::types::{
    TokenServiceCreateRequest, TokenServiceCreateResponse, TokenServiceListResponse,
    TokenServiceRevokeRequest, TokenServiceRevokeResponse,
};
use crate::app::AppState;
use crate::auth::caller::Caller;
use crate::auth::keys::SigningKeyStore;
use crate::store::StoreError;
use crate::store::tokens::TokenStore;
use axum::Json;
use axum::extract::State;
use basalt_authz::{
    AdminRole, DEFAULT_EXPIRATION, MAX_EXPIRATION, TenantRole, Token, TokenType, catalogue,
};
use std::time::Duration;

/// Subject recorded for operator tokens minted from the CLI.
pub const CLI_SUBJECT: &str = "apiserver-cli";

pub struct TokenIssuer {
    tokens: TokenStore,
    keys: SigningKeyStore,
    issuer: String,
    admin_subjects: Vec<String>,
}

impl TokenIssuer {
    pub fn new(
        tokens: TokenStore,
        keys: SigningKeyStore,
        issuer: String,
        admin_subjects: Vec<String>,
    ) -> Self {
        Self {
            tokens,
            keys,
            issuer,
            admin_subjects,
        }
    }

    /// Mint a console token for a trusted subject. Only the login flow calls
    /// this; requested permissions and roles are copied verbatim, but a
    /// console token never receives an admin role this way.
    pub async fn create_console_token(
        &self,
        subject: &str,
        req: &TokenServiceCreateRequest,
    ) -> Result<(Token, String), ApiError> {
        let ttl = req
            .expires
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_EXPIRATION);
        let (mut token, secret) = self.mint(TokenType::Console, subject, ttl).await?;
        token.permissions = req.permissions.clone();
        token.project_roles = req.project_roles.clone();
        token.tenant_roles = req.tenant_roles.clone();
        self.store(token, secret).await
    }

    /// Mint an operator API token without a permission check. Reachable only
    /// from the server CLI, never over RPC.
    pub async fn create_api_token_unchecked(
        &self,
        req: &TokenServiceCreateRequest,
    ) -> Result<(Token, String), ApiError> {
        let ttl = req
            .expires
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_EXPIRATION);
        let (mut token, secret) = self.mint(TokenType::Api, CLI_SUBJECT, ttl).await?;
        token.description = req.description.clone();
        token.permissions = req.permissions.clone();
        token.project_roles = req.project_roles.clone();
        token.tenant_roles = req.tenant_roles.clone();
        token.admin_role = req.admin_role;
        self.store(token, secret).await
    }

    /// Mint an API token on behalf of an authenticated caller, authorized by
    /// the privilege-reduction rules.
    pub async fn create_api_token(
        &self,
        caller: &Caller,
        req: &TokenServiceCreateRequest,
    ) -> Result<(Token, String), ApiError> {
        validate_token_create(caller, req, &self.admin_subjects)
            .map_err(|rule| api_permission_denied(&rule))?;

        let ttl = Duration::from_secs(req.expires.unwrap_or_default());
        let (mut token, secret) = self.mint(TokenType::Api, &caller.user_id, ttl).await?;
        token.description = req.description.clone();
        token.permissions = req.permissions.clone();
        token.project_roles = req.project_roles.clone();
        token.tenant_roles = req.tenant_roles.clone();
        token.admin_role = req.admin_role;
        self.store(token, secret).await
    }

    async fn mint(
        &self,
        token_type: TokenType,
        subject: &str,
        ttl: Duration,
    ) -> Result<(Token, String), ApiError> {
        let signing = self
            .keys
            .latest_private()
            .await
            .map_err(|err| api_internal("unable to fetch signing key", &err))?;
        let (secret, token) = basalt_authz::issue(
            token_type,
            subject,
            &self.issuer,
            ttl,
            &signing.encoding_key,
            &signing.kid,
        )
        .map_err(|err| {
            tracing::error!(error = %err, "unable to sign token");
            api_internal_message("unable to create token")
        })?;
        Ok((token, secret))
    }

    async fn store(&self, token: Token, secret: String) -> Result<(Token, String), ApiError> {
        self.tokens.put(&token).await.map_err(|err| match err {
            StoreError::Conflict(message) => api_conflict(&message),
            err => api_internal("unable to store token", &err),
        })?;
        metrics::counter!("apiserver_tokens_issued_total").increment(1);
        Ok((token, secret))
    }
}

/// The privilege-reduction rules for `Create` over RPC. Returns the failed
/// rule as a message; that message is surfaced to the developer.
fn validate_token_create(
    caller: &Caller,
    req: &TokenServiceCreateRequest,
    admin_subjects: &[String],
) -> Result<(), String> {
    let cat = catalogue();
    // Methods a token with only roles may delegate are the ones its roles
    // imply, per subject.
    let effective = caller.effective_permissions();

    for requested in &req.permissions {
        let Some(allowed_methods) = effective.get(&requested.subject) else {
            return Err(format!(
                "requested subject '{}' access is not allowed",
                requested.subject
            ));
        };

        for method in &requested.methods {
            if !cat.contains(method) {
                return Err(format!("requested method '{method}' is not allowed"));
            }
            if !allowed_methods.contains(method) {
                return Err(format!(
                    "requested method '{method}' is not allowed for subject '{}'",
                    requested.subject
                ));
            }
        }
    }

    // Operator uplift: a member of a configured admin tenant derives an
    // admin role from its role on its own identity. Invited members of the
    // admin tenant do not qualify, the user id itself must match.
    let mut admin_role = caller.admin_role;
    for subject in admin_subjects {
        if caller.user_id != *subject {
            continue;
        }
        match caller.tenant_roles.get(subject) {
            Some(TenantRole::Owner) | Some(TenantRole::Editor) => {
                admin_role = Some(AdminRole::Editor);
            }
            Some(TenantRole::Viewer) => {
                admin_role = Some(AdminRole::Viewer);
            }
            _ => {}
        }
    }

    for (project_id, requested_role) in &req.project_roles {
        if requested_role.rank() == 0 {
            return Err(format!(
                "requested project role '{requested_role}' is not allowed"
            ));
        }
        let Some(held_role) = caller.project_roles.get(project_id) else {
            return Err(format!("requested project '{project_id}' is not allowed"));
        };
        // A smaller ordinal means more privilege.
        if requested_role.rank() < held_role.rank() {
            return Err(format!(
                "requested role '{requested_role}' is higher than allowed role '{held_role}'"
            ));
        }
    }

    for (tenant_id, requested_role) in &req.tenant_roles {
        if requested_role.rank() == 0 {
            return Err(format!(
                "requested tenant role '{requested_role}' is not allowed"
            ));
        }
        let Some(held_role) = caller.tenant_roles.get(tenant_id) else {
            return Err(format!("requested tenant '{tenant_id}' is not allowed"));
        };
        if requested_role.rank() < held_role.rank() {
            return Err(format!(
                "requested role '{requested_role}' is higher than allowed role '{held_role}'"
            ));
        }
    }

    if let Some(requested_admin) = req.admin_role {
        let Some(held_admin) = admin_role else {
            return Err(format!(
                "requested admin role '{requested_admin}' is not allowed"
            ));
        };
        if requested_admin.rank() == 0 || requested_admin.rank() < held_admin.rank() {
            return Err(format!(
                "requested admin role '{requested_admin}' is not allowed"
            ));
        }
    }

    let ttl = req.expires.unwrap_or_default();
    if ttl == 0 {
        return Err("ttl must be positive".to_string());
    }
    if Duration::from_secs(ttl) > MAX_EXPIRATION {
        return Err(format!(
            "requested expiration duration '{ttl}s' exceeds max expiration '{}s'",
            MAX_EXPIRATION.as_secs()
        ));
    }

    Ok(())
}

pub async fn create(
    State(state): State<AppState>,
    caller: Caller,
    body: Option<Json<TokenServiceCreateRequest>>,
) -> Result<Json<TokenServiceCreateResponse>, ApiError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let (token, secret) = state.issuer.create_api_token(&caller, &req).await?;
    Ok(Json(TokenServiceCreateResponse { token, secret }))
}

pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<TokenServiceListResponse>, ApiError> {
    let tokens = state
        .tokens
        .list_by_user(&caller.user_id)
        .await
        .map_err(|err| api_internal("unable to list tokens", &err))?;
    Ok(Json(TokenServiceListResponse { tokens }))
}

pub async fn revoke(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<TokenServiceRevokeRequest>,
) -> Result<Json<TokenServiceRevokeResponse>, ApiError> {
    state
        .tokens
        .revoke(&caller.user_id, &req.uuid)
        .await
        .map_err(|err| api_internal("unable to revoke token", &err))?;
    Ok(Json(TokenServiceRevokeResponse {}))
}
