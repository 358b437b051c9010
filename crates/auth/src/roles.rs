use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of roles.
///
/// Privilege order is `Admin > Manager > Staff`; each role holds every
/// privilege of the roles below it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Staff,
}

/// Privilege order table. Higher ranks outrank lower ones.
const PRIVILEGE: [(Role, u8); 3] = [(Role::Staff, 1), (Role::Manager, 2), (Role::Admin, 3)];

impl Role {
    /// Every role, lowest privilege first.
    pub const ALL: [Role; 3] = [Role::Staff, Role::Manager, Role::Admin];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Staff => "staff",
        }
    }

    pub fn privilege(self) -> u8 {
        PRIVILEGE
            .iter()
            .find_map(|(role, rank)| (*role == self).then_some(*rank))
            .unwrap_or(0)
    }

    /// Strictly higher privilege than `other`.
    pub fn outranks(self, other: Role) -> bool {
        self.privilege() > other.privilege()
    }

    /// Same or higher privilege than `other`.
    pub fn at_least(self, other: Role) -> bool {
        self.privilege() >= other.privilege()
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}' (expected one of: admin, manager, staff)")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "staff" => Ok(Role::Staff),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privilege_order_is_total() {
        assert!(Role::Admin.outranks(Role::Manager));
        assert!(Role::Manager.outranks(Role::Staff));
        assert!(Role::Admin.outranks(Role::Staff));
        assert!(!Role::Staff.outranks(Role::Staff));
        assert!(Role::Staff.at_least(Role::Staff));
        assert!(!Role::Staff.at_least(Role::Manager));
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(" Admin ".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("MANAGER".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!("staff".parse::<Role>().unwrap(), Role::Staff);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Role::Manager).unwrap(), "\"manager\"");
        let role: Role = serde_json::from_str("\"staff\"").unwrap();
        assert_eq!(role, Role::Staff);
    }
}
