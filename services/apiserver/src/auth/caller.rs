//! Verified caller capabilities.
//!
//! # Purpose
//! The single representation of "who is calling" once the policy engine has
//! allowed a request. The authorization interceptor derives it from the
//! stored token record and attaches it to the request extensions; handlers
//! retrieve it with the extractor below. It lives exactly as long as the
//! request.
use crate::api::error::{ApiError, api_unauthenticated};
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use basalt_authz::{
    AdminRole, ProjectRole, TenantRole, Token, TokenType, allowed_methods_from_roles,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub token_id: String,
    pub token_type: TokenType,
    /// Explicit permissions grouped by subject.
    pub permissions: BTreeMap<String, Vec<String>>,
    pub project_roles: BTreeMap<String, ProjectRole>,
    pub tenant_roles: BTreeMap<String, TenantRole>,
    pub admin_role: Option<AdminRole>,
}

impl Caller {
    pub fn from_token(token: &Token) -> Self {
        Caller {
            user_id: token.user_id.clone(),
            token_id: token.id.clone(),
            token_type: token.token_type,
            permissions: token.permissions_by_subject(),
            project_roles: token.project_roles.clone(),
            tenant_roles: token.tenant_roles.clone(),
            admin_role: token.admin_role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin_role.is_some()
    }

    /// Effective permissions: the explicit ones, or when a token carries
    /// only roles, the methods those roles imply per subject.
    pub fn effective_permissions(&self) -> BTreeMap<String, Vec<String>> {
        if self.permissions.is_empty() {
            allowed_methods_from_roles(&self.project_roles, &self.tenant_roles)
        } else {
            self.permissions.clone()
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(|| api_unauthenticated("no token found in request"))
    }
}
