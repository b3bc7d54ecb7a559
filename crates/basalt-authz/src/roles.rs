use serde::{Deserialize, Serialize};

/// Role of a user within a single project.
///
/// The privilege order is part of the authorization contract: a smaller
/// [`ProjectRole::rank`] means more privilege. Token issuance compares ranks,
/// so the ordering is encoded explicitly instead of relying on variant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectRole {
    Unspecified,
    Owner,
    Editor,
    Viewer,
}

impl ProjectRole {
    /// Privilege ordinal, OWNER = 1 is the most privileged.
    pub fn rank(self) -> u8 {
        match self {
            ProjectRole::Unspecified => 0,
            ProjectRole::Owner => 1,
            ProjectRole::Editor => 2,
            ProjectRole::Viewer => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectRole::Unspecified => "UNSPECIFIED",
            ProjectRole::Owner => "OWNER",
            ProjectRole::Editor => "EDITOR",
            ProjectRole::Viewer => "VIEWER",
        }
    }
}

impl std::fmt::Display for ProjectRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectRole {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OWNER" => Ok(ProjectRole::Owner),
            "EDITOR" => Ok(ProjectRole::Editor),
            "VIEWER" => Ok(ProjectRole::Viewer),
            "UNSPECIFIED" => Ok(ProjectRole::Unspecified),
            _ => Err(()),
        }
    }
}

/// Role of a user within a tenant (organization).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantRole {
    Unspecified,
    Owner,
    Editor,
    Viewer,
    Guest,
}

impl TenantRole {
    /// Privilege ordinal, OWNER = 1 is the most privileged.
    pub fn rank(self) -> u8 {
        match self {
            TenantRole::Unspecified => 0,
            TenantRole::Owner => 1,
            TenantRole::Editor => 2,
            TenantRole::Viewer => 3,
            TenantRole::Guest => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TenantRole::Unspecified => "UNSPECIFIED",
            TenantRole::Owner => "OWNER",
            TenantRole::Editor => "EDITOR",
            TenantRole::Viewer => "VIEWER",
            TenantRole::Guest => "GUEST",
        }
    }
}

impl std::fmt::Display for TenantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TenantRole {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OWNER" => Ok(TenantRole::Owner),
            "EDITOR" => Ok(TenantRole::Editor),
            "VIEWER" => Ok(TenantRole::Viewer),
            "GUEST" => Ok(TenantRole::Guest),
            "UNSPECIFIED" => Ok(TenantRole::Unspecified),
            _ => Err(()),
        }
    }
}

/// Global operator role. Absence of an admin role means "not an admin";
/// there is no owner variant on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminRole {
    Unspecified,
    Editor,
    Viewer,
}

impl AdminRole {
    /// Privilege ordinal, EDITOR = 1 is the most privileged.
    pub fn rank(self) -> u8 {
        match self {
            AdminRole::Unspecified => 0,
            AdminRole::Editor => 1,
            AdminRole::Viewer => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AdminRole::Unspecified => "UNSPECIFIED",
            AdminRole::Editor => "EDITOR",
            AdminRole::Viewer => "VIEWER",
        }
    }
}

impl std::fmt::Display for AdminRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdminRole {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "EDITOR" => Ok(AdminRole::Editor),
            "VIEWER" => Ok(AdminRole::Viewer),
            "UNSPECIFIED" => Ok(AdminRole::Unspecified),
            _ => Err(()),
        }
    }
}
