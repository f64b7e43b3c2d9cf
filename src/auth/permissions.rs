//! Roles, permission scopes and the static role → permission table.
//!
//! The table is the single enforcement point for authorization. Matching is
//! exact; anything that does not parse into a known role or scope is denied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Physician,
    Nutrition,
    Psychology,
    Dentistry,
    Nursing,
    Reception,
    ReadOnly,
}

impl Role {
    pub const ALL: [Self; 8] = [
        Self::Admin,
        Self::Physician,
        Self::Nutrition,
        Self::Psychology,
        Self::Dentistry,
        Self::Nursing,
        Self::Reception,
        Self::ReadOnly,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Physician => "physician",
            Self::Nutrition => "nutrition",
            Self::Psychology => "psychology",
            Self::Dentistry => "dentistry",
            Self::Nursing => "nursing",
            Self::Reception => "reception",
            Self::ReadOnly => "read_only",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownScope(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    HealthCards,
    Notes,
    Appointments,
    Promotions,
    Vaccination,
    Audit,
    Reports,
}

impl Resource {
    pub const ALL: [Self; 8] = [
        Self::Users,
        Self::HealthCards,
        Self::Notes,
        Self::Appointments,
        Self::Promotions,
        Self::Vaccination,
        Self::Audit,
        Self::Reports,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::HealthCards => "health_cards",
            Self::Notes => "notes",
            Self::Appointments => "appointments",
            Self::Promotions => "promotions",
            Self::Vaccination => "vaccination",
            Self::Audit => "audit",
            Self::Reports => "reports",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Self; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A `resource:action` scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Permission {
    pub resource: Resource,
    pub action: Action,
}

impl Permission {
    #[must_use]
    pub const fn new(resource: Resource, action: Action) -> Self {
        Self { resource, action }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource.as_str(), self.action.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownScope(s.to_string());
        let (resource, action) = s.split_once(':').ok_or_else(unknown)?;
        let resource = Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == resource)
            .ok_or_else(unknown)?;
        let action = Action::ALL
            .into_iter()
            .find(|a| a.as_str() == action)
            .ok_or_else(unknown)?;
        Ok(Self::new(resource, action))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role or permission: {0}")]
pub struct UnknownScope(pub String);

use Action::{Create, Delete, Read, Update};
use Resource::{Appointments, Audit, HealthCards, Notes, Promotions, Reports, Users, Vaccination};

const fn p(resource: Resource, action: Action) -> Permission {
    Permission::new(resource, action)
}

const ADMIN: &[Permission] = &[
    p(Users, Create),
    p(Users, Read),
    p(Users, Update),
    p(Users, Delete),
    p(HealthCards, Create),
    p(HealthCards, Read),
    p(HealthCards, Update),
    p(HealthCards, Delete),
    p(Notes, Create),
    p(Notes, Read),
    p(Notes, Update),
    p(Notes, Delete),
    p(Appointments, Create),
    p(Appointments, Read),
    p(Appointments, Update),
    p(Appointments, Delete),
    p(Promotions, Create),
    p(Promotions, Read),
    p(Vaccination, Create),
    p(Vaccination, Read),
    p(Vaccination, Update),
    p(Audit, Read),
    p(Reports, Read),
];

const PHYSICIAN: &[Permission] = &[
    p(HealthCards, Create),
    p(HealthCards, Read),
    p(HealthCards, Update),
    p(Notes, Create),
    p(Notes, Read),
    p(Notes, Update),
    p(Appointments, Create),
    p(Appointments, Read),
    p(Appointments, Update),
    p(Promotions, Read),
    p(Vaccination, Read),
];

// nutrition, psychology and dentistry share one profile
const SPECIALIST: &[Permission] = &[
    p(HealthCards, Read),
    p(Notes, Create),
    p(Notes, Read),
    p(Notes, Update),
    p(Appointments, Create),
    p(Appointments, Read),
    p(Promotions, Read),
];

const NURSING: &[Permission] = &[
    p(HealthCards, Read),
    p(Notes, Read),
    p(Appointments, Read),
    p(Vaccination, Read),
];

const RECEPTION: &[Permission] = &[
    p(HealthCards, Read),
    p(Appointments, Create),
    p(Appointments, Read),
    p(Appointments, Update),
];

const READ_ONLY: &[Permission] = &[
    p(HealthCards, Read),
    p(Notes, Read),
    p(Appointments, Read),
    p(Reports, Read),
];

/// Every permission granted to `role`.
#[must_use]
pub fn grants(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => ADMIN,
        Role::Physician => PHYSICIAN,
        Role::Nutrition | Role::Psychology | Role::Dentistry => SPECIALIST,
        Role::Nursing => NURSING,
        Role::Reception => RECEPTION,
        Role::ReadOnly => READ_ONLY,
    }
}

#[must_use]
pub fn has_permission(role: Role, permission: Permission) -> bool {
    grants(role).contains(&permission)
}

/// String form of [`has_permission`]; unknown roles or malformed scopes are denied.
#[must_use]
pub fn has_permission_str(role: &str, permission: &str) -> bool {
    match (role.parse::<Role>(), permission.parse::<Permission>()) {
        (Ok(role), Ok(permission)) => has_permission(role, permission),
        _ => false,
    }
}
