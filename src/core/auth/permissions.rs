//! Roles, permissions and the static grant table between them

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::LazyLock;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Account role stored on `account.role` and carried in token claims
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[display("developer")]
    Developer,
    #[display("admin")]
    Admin,
    #[default]
    #[display("user")]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role {0:?}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "developer" => Ok(Role::Developer),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A capability a route can require, written `action:resource`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Permission {
    #[display("create:court")]
    CreateCourt,
    #[display("update:court")]
    UpdateCourt,
    #[display("delete:court")]
    DeleteCourt,
    #[display("create:season")]
    CreateSeason,
    #[display("update:season")]
    UpdateSeason,
    #[display("delete:season")]
    DeleteSeason,
    #[display("create:league")]
    CreateLeague,
    #[display("update:league")]
    UpdateLeague,
    #[display("delete:league")]
    DeleteLeague,
    #[display("create:match")]
    CreateMatch,
    #[display("update:match")]
    UpdateMatch,
    #[display("delete:match")]
    DeleteMatch,
    #[display("create:player")]
    CreatePlayer,
    #[display("update:player")]
    UpdatePlayer,
    #[display("delete:player")]
    DeletePlayer,
    #[display("submit:score")]
    SubmitScore,
}

const COURT_PERMISSIONS: [Permission; 3] = [
    Permission::CreateCourt,
    Permission::UpdateCourt,
    Permission::DeleteCourt,
];

const SEASON_PERMISSIONS: [Permission; 3] = [
    Permission::CreateSeason,
    Permission::UpdateSeason,
    Permission::DeleteSeason,
];

const LEAGUE_PERMISSIONS: [Permission; 3] = [
    Permission::CreateLeague,
    Permission::UpdateLeague,
    Permission::DeleteLeague,
];

const MATCH_PERMISSIONS: [Permission; 3] = [
    Permission::CreateMatch,
    Permission::UpdateMatch,
    Permission::DeleteMatch,
];

const PLAYER_PERMISSIONS: [Permission; 3] = [
    Permission::CreatePlayer,
    Permission::UpdatePlayer,
    Permission::DeletePlayer,
];

static ROLE_PERMISSIONS: LazyLock<HashMap<Role, HashSet<Permission>>> = LazyLock::new(|| {
    let admin: HashSet<Permission> = COURT_PERMISSIONS
        .into_iter()
        .chain(SEASON_PERMISSIONS)
        .chain(LEAGUE_PERMISSIONS)
        .chain(MATCH_PERMISSIONS)
        .chain([Permission::SubmitScore])
        .collect();

    let developer: HashSet<Permission> = admin
        .iter()
        .copied()
        .chain(PLAYER_PERMISSIONS)
        .collect();

    let user: HashSet<Permission> = [Permission::CreateMatch, Permission::SubmitScore]
        .into_iter()
        .collect();

    HashMap::from([
        (Role::Developer, developer),
        (Role::Admin, admin),
        (Role::User, user),
    ])
});

/// Permissions granted to `role`, if the role has any grants at all
pub fn permissions_for(role: Role) -> Option<&'static HashSet<Permission>> {
    ROLE_PERMISSIONS.get(&role)
}

/// Whether the role named in a token grants `required`.
///
/// Role names that do not parse are treated as having no grants.
pub fn is_granted(role: &str, required: Permission) -> bool {
    role.parse::<Role>()
        .ok()
        .and_then(permissions_for)
        .is_some_and(|granted| granted.contains(&required))
}
