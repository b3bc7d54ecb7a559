//! Basalt authn/authz primitives shared by the api-server and its tooling.
//!
//! # Purpose
//! Centralizes the role model, the bearer-token codec, JWKS types, the
//! service-permission catalogue, and the embedded Casbin model so the server,
//! the CLI, and tests all agree on authorization semantics.
//!
//! # Key invariants
//! - Role privilege ordering is explicit (`rank()`); OWNER has the smallest
//!   ordinal and the most privilege.
//! - The signed bearer form carries only registered claims plus the token
//!   type; authorization fields live in the server-side token record.
//! - Signing is ES256 over P-256, consistent between issue and verify.

mod casbin_model;
mod catalogue;
mod errors;
mod jwks;
mod roles;
mod token;

pub use casbin_model::MODEL_CONF;
pub use catalogue::{
    AdminAccess, MethodSpec, ServiceCatalogue, Visibility, allowed_methods_from_roles, catalogue,
};
pub use errors::{AuthzError, AuthzResult};
pub use jwks::{Jwk, Jwks, KeyUse};
pub use roles::{AdminRole, ProjectRole, TenantRole};
pub use token::{
    Claims, DEFAULT_EXPIRATION, MAX_EXPIRATION, MethodPermission, Token, TokenType, issue, parse,
    verify,
};
