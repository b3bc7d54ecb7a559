//! Service-permission catalogue.
//!
//! # Purpose
//! The process-wide, immutable map of every known RPC method: its visibility
//! class, the roles that implicitly grant it, and whether operators may reach
//! it with an admin role. Both the policy engine and the token-issuance
//! service read this; nothing else defines method metadata.
use crate::roles::{ProjectRole, TenantRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Authorization class of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// No credential required.
    Public,
    /// Any authenticated caller; the handler compares against the caller's
    /// own identity.
    SelfScoped,
    /// Requires membership in the project named by the request body.
    Project,
    /// Requires membership in the tenant named by the request body.
    Tenant,
    /// Requires an admin role.
    Admin,
}

/// Whether an admin role may invoke a method, and with which strength.
/// `AdminRole::Viewer` is limited to [`AdminAccess::ReadOnly`] methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminAccess {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodSpec {
    pub visibility: Visibility,
    /// Set on ADMIN-visibility methods and on subject-scoped methods that
    /// operators may call without membership.
    pub admin_access: Option<AdminAccess>,
}

pub struct ServiceCatalogue {
    methods: BTreeMap<&'static str, MethodSpec>,
    project_viewer: Vec<&'static str>,
    project_editor: Vec<&'static str>,
    tenant_viewer: Vec<&'static str>,
}

impl ServiceCatalogue {
    pub fn contains(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn spec(&self, method: &str) -> Option<&MethodSpec> {
        self.methods.get(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    /// Methods a project role implicitly grants. Roles nest: EDITOR grants
    /// everything VIEWER does, OWNER everything EDITOR does.
    pub fn project_role_methods(&self, role: ProjectRole) -> &[&'static str] {
        match role {
            ProjectRole::Owner | ProjectRole::Editor => &self.project_editor,
            ProjectRole::Viewer => &self.project_viewer,
            ProjectRole::Unspecified => &[],
        }
    }

    pub fn tenant_role_methods(&self, role: TenantRole) -> &[&'static str] {
        match role {
            TenantRole::Owner | TenantRole::Editor | TenantRole::Viewer => &self.tenant_viewer,
            TenantRole::Guest | TenantRole::Unspecified => &[],
        }
    }
}

static CATALOGUE: LazyLock<ServiceCatalogue> = LazyLock::new(build);

/// The process-wide service-permission catalogue.
pub fn catalogue() -> &'static ServiceCatalogue {
    &CATALOGUE
}

fn build() -> ServiceCatalogue {
    let mut methods = BTreeMap::new();

    let mut public = |name| {
        methods.insert(
            name,
            MethodSpec {
                visibility: Visibility::Public,
                admin_access: None,
            },
        );
    };
    public("/api.v1.HealthService/Get");
    public("/api.v1.VersionService/Get");

    let mut self_scoped = |name| {
        methods.insert(
            name,
            MethodSpec {
                visibility: Visibility::SelfScoped,
                admin_access: None,
            },
        );
    };
    self_scoped("/api.v1.TokenService/Create");
    self_scoped("/api.v1.TokenService/List");
    self_scoped("/api.v1.TokenService/Revoke");
    self_scoped("/api.v1.MethodService/List");
    self_scoped("/api.v1.ProjectService/List");

    let mut project = |name, admin_access| {
        methods.insert(
            name,
            MethodSpec {
                visibility: Visibility::Project,
                admin_access: Some(admin_access),
            },
        );
    };
    project("/api.v1.IPService/Get", AdminAccess::ReadOnly);
    project("/api.v1.IPService/List", AdminAccess::ReadOnly);
    project("/api.v1.IPService/Allocate", AdminAccess::ReadWrite);
    project("/api.v1.IPService/Delete", AdminAccess::ReadWrite);
    project("/api.v1.ProjectService/Get", AdminAccess::ReadOnly);

    methods.insert(
        "/api.v1.TenantService/Get",
        MethodSpec {
            visibility: Visibility::Tenant,
            admin_access: Some(AdminAccess::ReadOnly),
        },
    );

    let mut admin = |name, admin_access| {
        methods.insert(
            name,
            MethodSpec {
                visibility: Visibility::Admin,
                admin_access: Some(admin_access),
            },
        );
    };
    admin("/admin.v1.TenantService/List", AdminAccess::ReadOnly);
    admin("/admin.v1.TokenService/List", AdminAccess::ReadOnly);
    admin("/admin.v1.TokenService/Revoke", AdminAccess::ReadWrite);

    let project_viewer = vec![
        "/api.v1.IPService/Get",
        "/api.v1.IPService/List",
        "/api.v1.ProjectService/Get",
    ];
    let mut project_editor = project_viewer.clone();
    project_editor.push("/api.v1.IPService/Allocate");
    project_editor.push("/api.v1.IPService/Delete");

    let tenant_viewer = vec!["/api.v1.TenantService/Get"];

    ServiceCatalogue {
        methods,
        project_viewer,
        project_editor,
        tenant_viewer,
    }
}

/// Synthesize a permissions map from role assignments: for every subject the
/// caller holds a role on, the methods that role implies. Used when a token
/// carries roles but no explicit permissions.
pub fn allowed_methods_from_roles(
    project_roles: &BTreeMap<String, ProjectRole>,
    tenant_roles: &BTreeMap<String, TenantRole>,
) -> BTreeMap<String, Vec<String>> {
    let cat = catalogue();
    let mut perms: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (project_id, role) in project_roles {
        perms
            .entry(project_id.clone())
            .or_default()
            .extend(cat.project_role_methods(*role).iter().map(|m| m.to_string()));
    }
    for (tenant_id, role) in tenant_roles {
        perms
            .entry(tenant_id.clone())
            .or_default()
            .extend(cat.tenant_role_methods(*role).iter().map(|m| m.to_string()));
    }

    perms
}
