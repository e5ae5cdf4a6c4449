//! User roles and their hierarchy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role assigned to an authenticated user.
///
/// Roles carry a numeric level used for hierarchy comparisons
/// (`ADMIN > DINAS > POPT > PPL`). The level is independent from the
/// resource-level permission catalog: a higher role does not implicitly
/// inherit the catalog entries of a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Field extension worker (Penyuluh Pertanian Lapangan).
    #[serde(alias = "ppl")]
    Ppl,
    /// Pest and disease observer (Pengamat Organisme Pengganggu Tumbuhan).
    #[serde(alias = "popt")]
    Popt,
    /// Regional agriculture office staff.
    #[serde(alias = "dinas")]
    Dinas,
    /// System administrator.
    #[serde(alias = "admin")]
    Admin,
}

impl Role {
    /// All roles, highest level first.
    pub const ALL: [Role; 4] = [Role::Admin, Role::Dinas, Role::Popt, Role::Ppl];

    /// Numeric hierarchy level.
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::Admin => 100,
            Self::Dinas => 75,
            Self::Popt => 50,
            Self::Ppl => 25,
        }
    }

    /// Returns `true` if this role is at or above `other` in the hierarchy.
    #[must_use]
    pub fn is_at_least(self, other: Role) -> bool {
        self.level() >= other.level()
    }

    /// Canonical upper-case name, as used in cache keys and audit entries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Dinas => "DINAS",
            Self::Popt => "POPT",
            Self::Ppl => "PPL",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "DINAS" => Ok(Self::Dinas),
            "POPT" => Ok(Self::Popt),
            "PPL" => Ok(Self::Ppl),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_levels_are_totally_ordered() {
        assert!(Role::Admin.level() > Role::Dinas.level());
        assert!(Role::Dinas.level() > Role::Popt.level());
        assert!(Role::Popt.level() > Role::Ppl.level());
        assert!(Role::Admin > Role::Ppl);
    }

    #[test]
    fn test_is_at_least() {
        assert!(Role::Dinas.is_at_least(Role::Popt));
        assert!(Role::Dinas.is_at_least(Role::Dinas));
        assert!(!Role::Ppl.is_at_least(Role::Popt));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("dinas".parse::<Role>().unwrap(), Role::Dinas);
        assert_eq!(" PPL ".parse::<Role>().unwrap(), Role::Ppl);
        assert!("farmer".parse::<Role>().is_err());
        assert_eq!(Role::Popt.to_string(), "POPT");
    }

    #[test]
    fn test_serde_uses_upper_case() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        let role: Role = serde_json::from_str("\"POPT\"").unwrap();
        assert_eq!(role, Role::Popt);
        let role: Role = serde_json::from_str("\"dinas\"").unwrap();
        assert_eq!(role, Role::Dinas);
    }
}
