//! Users, roles, ownership levels, and document permission checks.

use crate::document::Document;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

///
/// UserRole
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    None = 0,
    Player = 1,
    Trusted = 2,
    Assistant = 3,
    Gamemaster = 4,
}

impl UserRole {
    pub const ALL: [Self; 5] = [
        Self::None,
        Self::Player,
        Self::Trusted,
        Self::Assistant,
        Self::Gamemaster,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Player => "PLAYER",
            Self::Trusted => "TRUSTED",
            Self::Assistant => "ASSISTANT",
            Self::Gamemaster => "GAMEMASTER",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown user role '{s}'"))
    }
}

///
/// OwnershipLevel
///
/// `Inherit` defers to the parent document's ownership.
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnershipLevel {
    Inherit = -1,
    #[default]
    None = 0,
    Limited = 1,
    Observer = 2,
    Owner = 3,
}

impl OwnershipLevel {
    pub const ALL: [Self; 5] = [
        Self::Inherit,
        Self::None,
        Self::Limited,
        Self::Observer,
        Self::Owner,
    ];

    #[must_use]
    pub const fn from_i64(level: i64) -> Option<Self> {
        match level {
            -1 => Some(Self::Inherit),
            0 => Some(Self::None),
            1 => Some(Self::Limited),
            2 => Some(Self::Observer),
            3 => Some(Self::Owner),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inherit => "INHERIT",
            Self::None => "NONE",
            Self::Limited => "LIMITED",
            Self::Observer => "OBSERVER",
            Self::Owner => "OWNER",
        }
    }
}

impl FromStr for OwnershipLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown ownership level '{s}'"))
    }
}

///
/// User
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: UserRole,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            permissions: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    #[must_use]
    pub const fn is_gm(&self) -> bool {
        matches!(self.role, UserRole::Gamemaster)
    }

    #[must_use]
    pub const fn is_banned(&self) -> bool {
        matches!(self.role, UserRole::None)
    }

    #[must_use]
    pub fn has_role(&self, role: UserRole) -> bool {
        self.role >= role
    }

    /// Named capability check; gamemasters hold every capability.
    #[must_use]
    pub fn can(&self, capability: &str) -> bool {
        self.is_gm() || self.permissions.contains(capability)
    }
}

///
/// CompendiumOwnership
///
/// Role-based ownership applied to every document of a compendium pack.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompendiumOwnership {
    pub roles: BTreeMap<UserRole, OwnershipLevel>,
}

impl CompendiumOwnership {
    /// Highest level granted to any role the user holds.
    #[must_use]
    pub fn level_for(&self, user: &User) -> OwnershipLevel {
        self.roles
            .iter()
            .filter(|(role, _)| user.has_role(**role))
            .map(|(_, level)| *level)
            .max()
            .unwrap_or(OwnershipLevel::None)
    }
}

impl Default for CompendiumOwnership {
    fn default() -> Self {
        Self {
            roles: BTreeMap::from([
                (UserRole::Player, OwnershipLevel::Observer),
                (UserRole::Assistant, OwnershipLevel::Owner),
            ]),
        }
    }
}

///
/// Action
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[display("get")]
    Get,
    #[display("create")]
    Create,
    #[display("update")]
    Update,
    #[display("delete")]
    Delete,
}

impl Action {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

///
/// Permission
///
/// How a document kind decides whether a user may perform an action.
///

#[derive(Clone, Copy)]
pub enum Permission {
    /// Arbitrary predicate over user, document and submitted data.
    Custom(fn(&User, &Document, &Value) -> bool),
    /// Named capability held by the user.
    Capability(&'static str),
    /// Minimum role.
    Role(UserRole),
    /// Ownership of the document itself.
    Owner,
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Capability(name) => f.debug_tuple("Capability").field(name).finish(),
            Self::Role(role) => f.debug_tuple("Role").field(role).finish(),
            Self::Owner => f.write_str("Owner"),
        }
    }
}

impl Document {
    // ======================================================================
    // Ownership
    // ======================================================================

    /// Effective ownership level with the default compendium rules.
    #[must_use]
    pub fn get_user_level(&self, user: &User) -> OwnershipLevel {
        self.get_user_level_in(user, &CompendiumOwnership::default())
    }

    /// Effective ownership level. Compendium documents use role-based
    /// pack ownership; other documents consult their own ownership map
    /// (user entry, then `default`) and fall back to the parent's.
    #[must_use]
    pub fn get_user_level_in(&self, user: &User, compendium: &CompendiumOwnership) -> OwnershipLevel {
        if self.pack().is_some() {
            return compendium.level_for(user);
        }

        level_from(self.source().get("ownership"), user)
            .or_else(|| {
                self.parent()
                    .and_then(|link| level_from(link.ownership.as_ref(), user))
            })
            .unwrap_or(OwnershipLevel::None)
    }

    /// Test a user against an ownership level. Gamemasters always pass;
    /// banned users never do.
    #[must_use]
    pub fn test_user_permission(&self, user: &User, level: OwnershipLevel, exact: bool) -> bool {
        self.test_user_permission_in(user, level, exact, &CompendiumOwnership::default())
    }

    /// `test_user_permission` under a pack's configured role ownership.
    #[must_use]
    pub fn test_user_permission_in(
        &self,
        user: &User,
        level: OwnershipLevel,
        exact: bool,
        compendium: &CompendiumOwnership,
    ) -> bool {
        if user.is_gm() {
            return true;
        }
        if user.is_banned() {
            return false;
        }

        let actual = self.get_user_level_in(user, compendium);
        if exact {
            actual == level
        } else {
            actual >= level
        }
    }

    #[must_use]
    pub fn is_owner(&self, user: &User) -> bool {
        self.test_user_permission(user, OwnershipLevel::Owner, false)
    }

    /// Whether a user may perform a mutating action on this document.
    /// Embedded documents require update permission on their parent's
    /// ownership for every action.
    #[must_use]
    pub fn can_user_modify(&self, user: &User, action: Action, data: &Value) -> bool {
        self.can_user_modify_in(user, action, data, &CompendiumOwnership::default())
    }

    /// `can_user_modify` under a pack's configured role ownership.
    #[must_use]
    pub fn can_user_modify_in(
        &self,
        user: &User,
        action: Action,
        data: &Value,
        compendium: &CompendiumOwnership,
    ) -> bool {
        if user.is_gm() {
            return true;
        }
        let owns = || self.test_user_permission_in(user, OwnershipLevel::Owner, false, compendium);

        let permissions = self.kind().metadata().permissions;
        let permission = match action {
            Action::Get => {
                return self.test_user_permission_in(user, OwnershipLevel::Limited, false, compendium);
            }
            Action::Create => permissions.create,
            Action::Update => permissions.update,
            Action::Delete => permissions.delete,
        };
        if self.is_embedded() && matches!(action, Action::Create | Action::Delete) {
            // child lifecycle follows the owner's update right
            return owns();
        }

        match permission {
            Permission::Custom(check) => check(user, self, data),
            Permission::Capability(name) => user.can(name),
            Permission::Role(role) => user.has_role(role),
            Permission::Owner => owns(),
        }
    }
}

// a concrete level from an ownership map; INHERIT and missing defer
fn level_from(ownership: Option<&Value>, user: &User) -> Option<OwnershipLevel> {
    let map = ownership?.as_object()?;
    let lookup = |key: &str| {
        map.get(key)
            .and_then(Value::as_i64)
            .and_then(OwnershipLevel::from_i64)
            .filter(|level| *level != OwnershipLevel::Inherit)
    };

    lookup(&user.id).or_else(|| lookup("default"))
}
