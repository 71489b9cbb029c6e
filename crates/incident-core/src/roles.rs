//! Roles and the Capability Table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use storage::ACTION_SLOTS;

/// Caller role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator1,
    Operator2,
    Operator3,
    Visitor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operator1 => "operator1",
            Role::Operator2 => "operator2",
            Role::Operator3 => "operator3",
            Role::Visitor => "visitor",
        }
    }

    /// Look the capability up in [`GRANTS`]
    pub fn allows(&self, capability: Capability) -> bool {
        GRANTS
            .iter()
            .find(|(role, _)| role == self)
            .map_or(false, |(_, caps)| caps.contains(&capability))
    }

    /// Permission summary for status queries
    pub fn permissions(&self) -> Permissions {
        let mut actions = [false; ACTION_SLOTS];
        for (slot, allowed) in actions.iter_mut().enumerate() {
            *allowed = Capability::for_slot(slot).map_or(false, |c| self.allows(c));
        }
        Permissions {
            can_acknowledge: self.allows(Capability::Acknowledge),
            can_comment: self.allows(Capability::Comment),
            can_edit_actions: actions,
            can_set_thresholds: self.allows(Capability::SetThresholds),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "operator1" => Ok(Role::Operator1),
            "operator2" => Ok(Role::Operator2),
            "operator3" => Ok(Role::Operator3),
            "visitor" => Ok(Role::Visitor),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// A writable concern of an incident or of the thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Acknowledge,
    Comment,
    /// Checked flag and comment of corrective action slot 1
    Action1,
    Action2,
    Action3,
    SetThresholds,
}

impl Capability {
    /// Capability guarding slot `index` (0-based)
    pub fn for_slot(index: usize) -> Option<Self> {
        match index {
            0 => Some(Capability::Action1),
            1 => Some(Capability::Action2),
            2 => Some(Capability::Action3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Acknowledge => "acknowledgement",
            Capability::Comment => "comment",
            Capability::Action1 => "action1",
            Capability::Action2 => "action2",
            Capability::Action3 => "action3",
            Capability::SetThresholds => "thresholds",
        }
    }
}

use Capability::*;

/// Who may write what. Anything absent is denied.
const GRANTS: &[(Role, &[Capability])] = &[
    (
        Role::Admin,
        &[Acknowledge, Comment, Action1, Action2, Action3, SetThresholds],
    ),
    (Role::Operator1, &[Acknowledge, Comment, Action1]),
    (Role::Operator2, &[Acknowledge, Comment, Action2]),
    (Role::Operator3, &[Acknowledge, Comment, Action3]),
    (Role::Visitor, &[]),
];

/// What the caller may do on the active incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permissions {
    pub can_acknowledge: bool,
    pub can_comment: bool,
    pub can_edit_actions: [bool; ACTION_SLOTS],
    pub can_set_thresholds: bool,
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: Role,
    pub identity: String,
}

impl Actor {
    pub fn new(role: Role, identity: impl Into<String>) -> Self {
        Self {
            role,
            identity: identity.into(),
        }
    }
}
