//! Role domain model.
//!
//! Roles are global. Each role carries a security level and a set of claim
//! ids granted to every user holding the role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::SecurityLevel;
use crate::well_known;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub security_level: SecurityLevel,
    /// True exactly for the default superuser role.
    pub is_super_user: bool,
    /// Claim ids.
    pub claims: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn grants_superuser(&self) -> bool {
        self.is_super_user || self.security_level == SecurityLevel::Superuser
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRole {
    pub id: Option<Uuid>,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub security_level: SecurityLevel,
    pub is_super_user: bool,
    pub claims: Vec<Uuid>,
}

/// The seven roles seeded by bootstrap, one per security level.
pub fn default_roles() -> Vec<CreateRole> {
    let role = |id: Uuid, level: SecurityLevel, name: &str, description: &str| CreateRole {
        id: Some(id),
        slug: level.as_str().to_string(),
        name: name.to_string(),
        description: description.to_string(),
        security_level: level,
        is_super_user: level == SecurityLevel::Superuser,
        claims: Vec::new(),
    };

    vec![
        role(
            well_known::SUPERUSER_ROLE_ID,
            SecurityLevel::Superuser,
            "Superuser",
            "Unrestricted access to every service and tenant",
        ),
        role(
            well_known::ADMIN_ROLE_ID,
            SecurityLevel::Admin,
            "Administrator",
            "Full access to every catalog module",
        ),
        role(
            well_known::MANAGER_ROLE_ID,
            SecurityLevel::Manager,
            "Manager",
            "Write access to every catalog module",
        ),
        role(
            well_known::USER_ROLE_ID,
            SecurityLevel::User,
            "User",
            "Read access to every catalog module",
        ),
        role(
            well_known::AUDITOR_ROLE_ID,
            SecurityLevel::Auditor,
            "Auditor",
            "Read access for audit purposes",
        ),
        role(
            well_known::GUEST_ROLE_ID,
            SecurityLevel::Guest,
            "Guest",
            "View-only access",
        ),
        role(
            well_known::NONE_ROLE_ID,
            SecurityLevel::None,
            "No access",
            "Holds no capabilities",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::PrivilegeOrder;

    #[test]
    fn one_default_role_per_level() {
        let roles = default_roles();
        assert_eq!(roles.len(), SecurityLevel::ALL.len());
        for (role, level) in roles.iter().zip(SecurityLevel::ALL) {
            assert_eq!(role.security_level, *level);
            assert_eq!(role.slug, level.as_str());
        }
        assert_eq!(roles.iter().filter(|r| r.is_super_user).count(), 1);
    }
}
