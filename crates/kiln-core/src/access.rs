//! Access algebra: privilege orderings and wildcard semantics.
//!
//! Each ordering assigns an index to its levels; a lower index is a higher
//! privilege. On top of the total order every ordering defines an explicit
//! parent-of relation, which is what lets e.g. `delete` imply `read`
//! without implying `approve`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KilnError;

/// Shared operations of the privilege orderings.
pub trait PrivilegeOrder: Copy + Eq + 'static {
    /// Every level, highest privilege first.
    const ALL: &'static [Self];

    fn index(self) -> usize;

    fn is_parent_of(self, other: Self) -> bool;

    fn is_higher_than(self, other: Self) -> bool {
        self.index() < other.index()
    }

    fn is_equal(self, other: Self) -> bool {
        self.index() == other.index()
    }

    fn is_lower_than(self, other: Self) -> bool {
        self.index() > other.index()
    }

    fn is_child_of(self, other: Self) -> bool {
        other.is_parent_of(self)
    }

    fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

// ---------------------------------------------------------------------------
// SecurityLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Superuser,
    Admin,
    Manager,
    User,
    Auditor,
    Guest,
    None,
}

impl PrivilegeOrder for SecurityLevel {
    const ALL: &'static [Self] = &[
        Self::Superuser,
        Self::Admin,
        Self::Manager,
        Self::User,
        Self::Auditor,
        Self::Guest,
        Self::None,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn is_parent_of(self, other: Self) -> bool {
        use SecurityLevel::*;
        match self {
            Superuser => other != Superuser,
            Admin => matches!(other, Manager | User | Auditor | Guest | None),
            Manager => matches!(other, User | Guest | None),
            User | Auditor => matches!(other, Guest | None),
            Guest => other == None,
            None => false,
        }
    }
}

impl SecurityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superuser => "superuser",
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::User => "user",
            Self::Auditor => "auditor",
            Self::Guest => "guest",
            Self::None => "none",
        }
    }

    /// Action granted by default claims synthesized for this level.
    pub fn default_access_level(self) -> AccessLevel {
        match self {
            Self::Superuser | Self::Admin => AccessLevel::All,
            Self::Manager => AccessLevel::Write,
            Self::User | Self::Auditor => AccessLevel::Read,
            Self::Guest => AccessLevel::View,
            Self::None => AccessLevel::None,
        }
    }

    /// Whether a principal at this level meets a `required` minimum level.
    pub fn satisfies(self, required: Self) -> bool {
        self == required || self.is_parent_of(required) || self.is_higher_than(required)
    }
}

// ---------------------------------------------------------------------------
// AccessLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[serde(rename = "*")]
    All,
    Write,
    Update,
    Create,
    Delete,
    Approve,
    Reject,
    Cancel,
    Suspend,
    Resume,
    Reset,
    Lock,
    Unlock,
    Revoke,
    Audit,
    Read,
    View,
    None,
}

impl PrivilegeOrder for AccessLevel {
    const ALL: &'static [Self] = &[
        Self::All,
        Self::Write,
        Self::Update,
        Self::Create,
        Self::Delete,
        Self::Approve,
        Self::Reject,
        Self::Cancel,
        Self::Suspend,
        Self::Resume,
        Self::Reset,
        Self::Lock,
        Self::Unlock,
        Self::Revoke,
        Self::Audit,
        Self::Read,
        Self::View,
        Self::None,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn is_parent_of(self, other: Self) -> bool {
        use AccessLevel::*;
        match self {
            All => other != All,
            Write => matches!(other, Read | Update | Create | View),
            Read => other == View,
            View => other == None,
            None => false,
            Update | Create | Delete | Approve | Reject | Cancel | Suspend | Resume | Reset
            | Lock | Unlock | Revoke | Audit => matches!(other, Read | View),
        }
    }
}

impl AccessLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "*",
            Self::Write => "write",
            Self::Update => "update",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Cancel => "cancel",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
            Self::Reset => "reset",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Revoke => "revoke",
            Self::Audit => "audit",
            Self::Read => "read",
            Self::View => "view",
            Self::None => "none",
        }
    }

    /// `have.can_access(required)`.
    pub fn can_access(self, required: Self) -> bool {
        self == Self::All
            || self == required
            || self.is_parent_of(required)
            || self.is_higher_than(required)
    }
}

// ---------------------------------------------------------------------------
// ApiKeySecurityLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeySecurityLevel {
    Superuser,
    Admin,
    Write,
    #[default]
    Read,
    None,
}

impl PrivilegeOrder for ApiKeySecurityLevel {
    const ALL: &'static [Self] = &[
        Self::Superuser,
        Self::Admin,
        Self::Write,
        Self::Read,
        Self::None,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn is_parent_of(self, other: Self) -> bool {
        self != Self::None && self.is_higher_than(other)
    }
}

impl ApiKeySecurityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superuser => "superuser",
            Self::Admin => "admin",
            Self::Write => "write",
            Self::Read => "read",
            Self::None => "none",
        }
    }

    /// Level used when synthesizing default claims for a key.
    pub fn security_level(self) -> SecurityLevel {
        match self {
            Self::Superuser => SecurityLevel::Superuser,
            Self::Admin => SecurityLevel::Admin,
            Self::Write => SecurityLevel::Manager,
            Self::Read => SecurityLevel::User,
            Self::None => SecurityLevel::None,
        }
    }
}

// ---------------------------------------------------------------------------
// Text forms
// ---------------------------------------------------------------------------

macro_rules! text_form {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = KilnError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty as PrivilegeOrder>::ALL
                    .iter()
                    .copied()
                    .find(|level| level.as_str() == s)
                    .ok_or_else(|| KilnError::validation(format!("unknown {}: {s}", $what)))
            }
        }
    };
}

text_form!(SecurityLevel, "security level");
text_form!(AccessLevel, "access level");
text_form!(ApiKeySecurityLevel, "API key security level");

#[cfg(test)]
mod tests {
    use super::*;

    fn totality<T: PrivilegeOrder + fmt::Debug>() {
        for &a in T::ALL {
            for &b in T::ALL {
                let relations = [a.is_higher_than(b), a.is_equal(b), a.is_lower_than(b)];
                assert_eq!(
                    relations.iter().filter(|r| **r).count(),
                    1,
                    "{a:?} vs {b:?}"
                );
            }
        }
    }

    fn duality<T: PrivilegeOrder + fmt::Debug>() {
        for &a in T::ALL {
            assert!(!a.is_parent_of(a), "{a:?} is its own parent");
            for &b in T::ALL {
                assert_eq!(a.is_parent_of(b), b.is_child_of(a), "{a:?} / {b:?}");
            }
        }
    }

    #[test]
    fn orderings_are_total() {
        totality::<SecurityLevel>();
        totality::<AccessLevel>();
        totality::<ApiKeySecurityLevel>();
    }

    #[test]
    fn parent_and_child_are_dual() {
        duality::<SecurityLevel>();
        duality::<AccessLevel>();
        duality::<ApiKeySecurityLevel>();
    }

    #[test]
    fn indices_match_declared_order() {
        assert_eq!(SecurityLevel::Superuser.index(), 0);
        assert_eq!(SecurityLevel::None.index(), 6);
        assert_eq!(AccessLevel::All.index(), 0);
        assert_eq!(AccessLevel::Audit.index(), 14);
        assert_eq!(AccessLevel::None.index(), 17);
        assert_eq!(AccessLevel::from_index(15), Some(AccessLevel::Read));
        assert_eq!(AccessLevel::from_index(18), None);
    }

    #[test]
    fn access_parent_table() {
        use AccessLevel::*;
        assert!(Write.is_parent_of(Read));
        assert!(Write.is_parent_of(Create));
        assert!(!Write.is_parent_of(Delete));
        assert!(Delete.is_parent_of(View));
        assert!(!Delete.is_parent_of(Approve));
        assert!(Read.is_parent_of(View));
        assert!(!Read.is_parent_of(None));
        assert!(View.is_parent_of(None));
        assert!(All.is_parent_of(None));
        assert!(!None.is_parent_of(None));
    }

    #[test]
    fn can_access_wildcard_and_order() {
        use AccessLevel::*;
        for &required in AccessLevel::ALL {
            assert!(All.can_access(required));
        }
        assert!(Write.can_access(Read));
        assert!(Write.can_access(Delete));
        assert!(!Read.can_access(Write));
        assert!(Audit.can_access(Read));
        assert!(!View.can_access(Read));
    }

    #[test]
    fn security_parent_table() {
        use SecurityLevel::*;
        assert!(Superuser.is_parent_of(Admin));
        assert!(Admin.is_parent_of(Auditor));
        assert!(!Manager.is_parent_of(Auditor));
        assert!(Auditor.is_parent_of(Guest));
        assert!(!Auditor.is_parent_of(User));
        assert!(Manager.satisfies(User));
        assert!(!Guest.satisfies(User));
    }

    #[test]
    fn api_key_levels_map_onto_security_levels() {
        assert_eq!(
            ApiKeySecurityLevel::Write.security_level(),
            SecurityLevel::Manager
        );
        assert!(ApiKeySecurityLevel::Admin.is_parent_of(ApiKeySecurityLevel::None));
        assert!(!ApiKeySecurityLevel::None.is_parent_of(ApiKeySecurityLevel::None));
    }

    #[test]
    fn text_forms_round_trip() {
        for &level in AccessLevel::ALL {
            assert_eq!(level.to_string().parse::<AccessLevel>().unwrap(), level);
        }
        assert!("frobnicate".parse::<AccessLevel>().is_err());
        assert_eq!(
            serde_json::to_string(&AccessLevel::All).unwrap(),
            "\"*\""
        );
        assert_eq!(
            serde_json::from_str::<SecurityLevel>("\"auditor\"").unwrap(),
            SecurityLevel::Auditor
        );
    }
}
