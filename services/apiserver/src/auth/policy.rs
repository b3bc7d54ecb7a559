//! The policy engine.
//!
//! # Purpose and responsibility
//! Makes the allow/deny decision for every RPC: is this caller allowed to
//! invoke this method on this subject right now. Verification of the bearer
//! credential, the revocation lookup, and the subject-scoped authorization
//! all happen here; the interceptor only maps the outcome onto a status.
//!
//! # Decision semantics
//! Authorization for project- and tenant-scoped methods is evaluated by a
//! per-request Casbin enforcer. The caller's explicit permissions become
//! direct policies, its roles become domain-scoped groupings, and the static
//! catalogue contributes the role policy rows. Combining both at decision
//! time means a newly catalogued method reaches existing role holders
//! without reissuing their tokens, while an explicit-permission token can
//! never be widened after the fact.
//!
//! # Security considerations
//! - Every deny maps to the unauthenticated status externally; the reasons
//!   below are diagnostics and never distinguish a bad signature from a
//!   revoked token beyond what the spec of the store already reveals.
//! - Backend failures are logged and denied, never surfaced to the caller.
use crate::auth::cache::TtlCache;
use crate::auth::caller::Caller;
use crate::store::{StoreError, tokens::TokenStore};
use basalt_authz::{
    AdminAccess, AdminRole, Jwks, MODEL_CONF, MethodSpec, ProjectRole, TenantRole, Visibility,
    catalogue,
};
use casbin::{CoreApi, DefaultModel, Enforcer, MemoryAdapter, MgmtApi};
use serde_json::Value;
use std::sync::Arc;

/// Public-key set plus its canonical serialization, as cached per process.
pub type KeySet = (Jwks, String);

#[derive(Debug)]
pub enum Decision {
    Allow(Option<Caller>),
    Deny(String),
}

pub struct PolicyEngine {
    tokens: TokenStore,
    key_cache: Arc<TtlCache<(), KeySet>>,
    allowed_issuers: Vec<String>,
}

/// Strip the `Bearer ` prefix (case-insensitive, exactly one space) from an
/// Authorization header value. Any other scheme counts as no credential.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_at_checked(7)?;
    scheme.eq_ignore_ascii_case("bearer ").then_some(token)
}

fn admin_allows(admin_role: Option<AdminRole>, access: Option<AdminAccess>) -> bool {
    match (admin_role, access) {
        (Some(AdminRole::Editor), Some(_)) => true,
        (Some(AdminRole::Viewer), Some(AdminAccess::ReadOnly)) => true,
        _ => false,
    }
}

fn project_role_tag(role: ProjectRole) -> String {
    format!("role:project-{}", role.as_str().to_lowercase())
}

fn tenant_role_tag(role: TenantRole) -> String {
    format!("role:tenant-{}", role.as_str().to_lowercase())
}

/// Build the per-request enforcer from the caller's stored capabilities plus
/// the catalogue's role policies.
async fn build_enforcer(caller: &Caller) -> casbin::Result<Enforcer> {
    let model = DefaultModel::from_str(MODEL_CONF).await?;
    let adapter = MemoryAdapter::default();
    let mut enforcer = Enforcer::new(model, adapter).await?;

    let subject = format!("u:{}", caller.user_id);
    let cat = catalogue();

    for (granted_subject, methods) in &caller.permissions {
        for method in methods {
            enforcer
                .add_policy(vec![
                    subject.clone(),
                    granted_subject.clone(),
                    method.clone(),
                ])
                .await?;
        }
    }

    for (project_id, role) in &caller.project_roles {
        if *role == ProjectRole::Unspecified {
            continue;
        }
        let tag = project_role_tag(*role);
        enforcer
            .add_grouping_policy(vec![subject.clone(), tag.clone(), project_id.clone()])
            .await?;
        for method in cat.project_role_methods(*role) {
            let _ = enforcer
                .add_policy(vec![tag.clone(), "*".to_string(), method.to_string()])
                .await?;
        }
    }

    for (tenant_id, role) in &caller.tenant_roles {
        if *role == TenantRole::Unspecified {
            continue;
        }
        let tag = tenant_role_tag(*role);
        enforcer
            .add_grouping_policy(vec![subject.clone(), tag.clone(), tenant_id.clone()])
            .await?;
        for method in cat.tenant_role_methods(*role) {
            let _ = enforcer
                .add_policy(vec![tag.clone(), "*".to_string(), method.to_string()])
                .await?;
        }
    }

    enforcer.build_role_links()?;
    Ok(enforcer)
}

impl PolicyEngine {
    pub fn new(
        tokens: TokenStore,
        key_cache: Arc<TtlCache<(), KeySet>>,
        allowed_issuers: Vec<String>,
    ) -> Self {
        Self {
            tokens,
            key_cache,
            allowed_issuers,
        }
    }

    /// Decide whether `method` may be invoked with this request body and
    /// bearer credential. On allow, the verified caller is returned so the
    /// interceptor can attach it to the request.
    pub async fn decide(
        &self,
        method: &str,
        request: &Value,
        authorization: Option<&str>,
    ) -> Decision {
        let Some(spec) = catalogue().spec(method) else {
            return Decision::Deny(format!("method denied or unknown: {method}"));
        };

        if spec.visibility == Visibility::Public {
            return Decision::Allow(None);
        }

        let bearer = authorization.and_then(extract_bearer).unwrap_or_default();
        if bearer.is_empty() {
            return Decision::Deny("token is not valid".to_string());
        }

        let (jwks, _) = match self.key_set().await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::error!(error = %err, "unable to retrieve signing keys");
                return Decision::Deny("token is not valid".to_string());
            }
        };

        let claims = match basalt_authz::verify(bearer, &jwks, &self.allowed_issuers) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, method, "bearer verification failed");
                return Decision::Deny("token is not valid".to_string());
            }
        };

        let token = match self.tokens.get(&claims.sub, &claims.jti).await {
            Ok(token) => token,
            Err(StoreError::NotFound(_)) => {
                return Decision::Deny("token was revoked or has expired".to_string());
            }
            Err(err) => {
                tracing::error!(error = %err, "token store lookup failed");
                return Decision::Deny("token is not valid".to_string());
            }
        };
        let caller = Caller::from_token(&token);

        match spec.visibility {
            Visibility::Public => Decision::Allow(None),
            Visibility::SelfScoped => Decision::Allow(Some(caller)),
            Visibility::Admin => {
                if admin_allows(caller.admin_role, spec.admin_access) {
                    Decision::Allow(Some(caller))
                } else {
                    Decision::Deny(format!("not allowed to call: {method}"))
                }
            }
            Visibility::Project => {
                self.decide_scoped(method, spec, caller, subject_field(request, "project"))
                    .await
            }
            Visibility::Tenant => {
                self.decide_scoped(method, spec, caller, subject_field(request, "tenant"))
                    .await
            }
        }
    }

    async fn decide_scoped(
        &self,
        method: &str,
        spec: &MethodSpec,
        caller: Caller,
        subject_id: Option<&str>,
    ) -> Decision {
        let Some(subject_id) = subject_id else {
            return Decision::Deny(format!("not allowed to call: {method}"));
        };

        // Operators reach admin-accessible methods on any subject.
        if admin_allows(caller.admin_role, spec.admin_access) {
            return Decision::Allow(Some(caller));
        }

        let enforcer = match build_enforcer(&caller).await {
            Ok(enforcer) => enforcer,
            Err(err) => {
                tracing::error!(error = %err, "unable to build policy enforcer");
                return Decision::Deny(format!("not allowed to call: {method}"));
            }
        };

        let subject = format!("u:{}", caller.user_id);
        match enforcer.enforce((subject.as_str(), subject_id, method)) {
            Ok(true) => Decision::Allow(Some(caller)),
            Ok(false) => Decision::Deny(format!("not allowed to call: {method}")),
            Err(err) => {
                tracing::error!(error = %err, "policy evaluation failed");
                Decision::Deny(format!("not allowed to call: {method}"))
            }
        }
    }

    /// The cached public-key set. An empty set triggers one forced refresh
    /// so authentication works immediately after the very first signing key
    /// is created, instead of waiting out the cache TTL.
    async fn key_set(&self) -> anyhow::Result<KeySet> {
        let keys = self.key_cache.get(()).await?;
        if keys.0.is_empty() {
            return self.key_cache.refresh(()).await;
        }
        Ok(keys)
    }
}

fn subject_field<'a>(request: &'a Value, field: &str) -> Option<&'a str> {
    request
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}
