use std::fmt;

use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Which scope a file is persisted under.
///
/// Transitions are `Unknown -> AppLevel` and `Unknown -> UserLevel`. Both resolved
/// levels are terminal for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipLevel {
    /// Not attached to any store yet.
    #[default]
    Unknown,
    AppLevel,
    UserLevel,
}

impl OwnershipLevel {
    /// Level this file ends up with once attached, given whether it has an owner.
    pub fn resolve(self, has_owner: bool) -> OwnershipLevel {
        match self {
            OwnershipLevel::Unknown if has_owner => OwnershipLevel::UserLevel,
            OwnershipLevel::Unknown => OwnershipLevel::AppLevel,
            resolved => resolved,
        }
    }
}

impl fmt::Display for OwnershipLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OwnershipLevel::Unknown => "unknown",
            OwnershipLevel::AppLevel => "app-level",
            OwnershipLevel::UserLevel => "user-level",
        })
    }
}

/// Namespace a store keeps an object under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user", rename_all = "snake_case")]
pub enum Scope {
    App,
    User(UserId),
}

impl Scope {
    pub fn user(&self) -> Option<&UserId> {
        match self {
            Scope::App => None,
            Scope::User(id) => Some(id),
        }
    }
}

impl From<Option<UserId>> for Scope {
    fn from(user: Option<UserId>) -> Self {
        user.map_or(Scope::App, Scope::User)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::App => f.write_str("app"),
            Scope::User(id) => write!(f, "user:{id}"),
        }
    }
}
