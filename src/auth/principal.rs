//! Principal records and their public view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::permissions::{Role, UnknownScope};

/// Campus (tenant) a principal belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Campus {
    LlanoLargo,
    Acapulco,
    Chilpancingo,
    Taxco,
    Iguala,
    Zihuatanejo,
}

impl Campus {
    pub const ALL: [Self; 6] = [
        Self::LlanoLargo,
        Self::Acapulco,
        Self::Chilpancingo,
        Self::Taxco,
        Self::Iguala,
        Self::Zihuatanejo,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LlanoLargo => "llano-largo",
            Self::Acapulco => "acapulco",
            Self::Chilpancingo => "chilpancingo",
            Self::Taxco => "taxco",
            Self::Iguala => "iguala",
            Self::Zihuatanejo => "zihuatanejo",
        }
    }
}

impl fmt::Display for Campus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Campus {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|campus| campus.as_str() == s)
            .ok_or_else(|| UnknownScope(s.to_string()))
    }
}

/// Document id of the principal `username` on `campus`.
#[must_use]
pub fn principal_id(username: &str, campus: Campus) -> String {
    format!("user:{username}@{campus}")
}

/// Stored user record. The password digest never leaves the auth module.
#[derive(Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub campus: Campus,
    #[serde(default)]
    pub department: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_access: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default)]
    pub locked_until: Option<DateTime<Utc>>,
    pub(crate) password_hash: String,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("campus", &self.campus)
            .field("active", &self.active)
            .field("failed_attempts", &self.failed_attempts)
            .field("locked_until", &self.locked_until)
            .field("password_hash", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl Principal {
    /// `username@campus`, the actor name used in audit records.
    #[must_use]
    pub fn actor(&self) -> String {
        format!("{}@{}", self.username, self.campus)
    }

    #[must_use]
    pub fn view(&self) -> PrincipalView {
        PrincipalView {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            campus: self.campus,
            department: self.department.clone(),
            active: self.active,
            created_at: self.created_at,
            last_access: self.last_access,
        }
    }
}

/// What callers outside the core get to see of a principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PrincipalView {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub campus: Campus,
    pub department: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_access: Option<DateTime<Utc>>,
}

/// Input for registering a new principal.
#[derive(Clone, Deserialize, ToSchema)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub campus: Campus,
    #[serde(default)]
    pub department: String,
    pub password: String,
}

impl fmt::Debug for NewPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewPrincipal")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("campus", &self.campus)
            .finish_non_exhaustive()
    }
}

/// Administrative changes; only these fields are ever touched.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PrincipalUpdate {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub department: Option<String>,
    pub active: Option<bool>,
}

impl PrincipalUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.display_name.is_none()
            && self.role.is_none()
            && self.department.is_none()
            && self.active.is_none()
    }

    /// Names of the fields this update sets, for the audit detail.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            ("email", self.email.is_some()),
            ("display_name", self.display_name.is_some()),
            ("role", self.role.is_some()),
            ("department", self.department.is_some()),
            ("active", self.active.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}
