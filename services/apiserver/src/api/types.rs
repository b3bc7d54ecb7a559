//! Request and response shapes for the RPC surface.
//!
//! Field names follow the wire contract of the service definitions; subject
//! scoped requests carry their project or tenant id in the body, which is
//! where the interceptor chain reads it from.
use crate::masterdata::{Project, Tenant};
use basalt_authz::{AdminRole, MethodPermission, ProjectRole, TenantRole, Token};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Request validation applied by the first interceptor in the chain.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenServiceCreateRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<MethodPermission>,
    #[serde(default)]
    pub project_roles: BTreeMap<String, ProjectRole>,
    #[serde(default)]
    pub tenant_roles: BTreeMap<String, TenantRole>,
    #[serde(default)]
    pub admin_role: Option<AdminRole>,
    /// Requested lifetime in seconds.
    #[serde(default)]
    pub expires: Option<u64>,
}

impl Validate for TokenServiceCreateRequest {
    fn validate(&self) -> Result<(), String> {
        if self.description.len() > 256 {
            return Err("description must not exceed 256 characters".to_string());
        }
        for permission in &self.permissions {
            if permission.subject.is_empty() {
                return Err("permission subject must not be empty".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenServiceCreateResponse {
    pub token: Token,
    /// The signed bearer credential. Only returned once, never stored.
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenServiceListResponse {
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenServiceRevokeRequest {
    pub uuid: String,
}

impl Validate for TokenServiceRevokeRequest {
    fn validate(&self) -> Result<(), String> {
        Uuid::parse_str(&self.uuid)
            .map(|_| ())
            .map_err(|_| "uuid must be a valid token id".to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenServiceRevokeResponse {}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminTokenServiceRevokeRequest {
    pub user_id: String,
    pub uuid: String,
}

impl Validate for AdminTokenServiceRevokeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.user_id.is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        Uuid::parse_str(&self.uuid)
            .map(|_| ())
            .map_err(|_| "uuid must be a valid token id".to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ip {
    pub uuid: String,
    pub ip: String,
    pub project: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpServiceListRequest {
    pub project: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IpServiceListResponse {
    pub ips: Vec<Ip>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpServiceGetRequest {
    pub project: String,
    pub uuid: String,
}

impl Validate for IpServiceGetRequest {
    fn validate(&self) -> Result<(), String> {
        if self.uuid.is_empty() {
            return Err("uuid must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IpServiceGetResponse {
    pub ip: Ip,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpServiceAllocateRequest {
    pub project: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Validate for IpServiceAllocateRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.len() > 128 {
            return Err("name must not exceed 128 characters".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IpServiceAllocateResponse {
    pub ip: Ip,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpServiceDeleteRequest {
    pub project: String,
    pub uuid: String,
}

impl Validate for IpServiceDeleteRequest {
    fn validate(&self) -> Result<(), String> {
        if self.uuid.is_empty() {
            return Err("uuid must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IpServiceDeleteResponse {
    pub ip: Ip,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectServiceListResponse {
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectServiceGetRequest {
    pub project: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectServiceGetResponse {
    pub project: Project,
    pub tenant: Tenant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantServiceGetRequest {
    pub tenant: String,
}

impl Validate for TenantServiceGetRequest {
    fn validate(&self) -> Result<(), String> {
        if self.tenant.is_empty() {
            return Err("tenant must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TenantServiceGetResponse {
    pub tenant: Tenant,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminTenantServiceListResponse {
    pub tenants: Vec<Tenant>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MethodServiceListResponse {
    /// Methods the caller may invoke, per subject.
    pub permissions: Vec<MethodPermission>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthServiceGetResponse {
    pub status: String,
    pub services: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionServiceGetResponse {
    pub version: String,
    pub revision: String,
}
