//! Claims: `<service>::<module>::<action>` capabilities.
//!
//! A [`ClaimPattern`] is the parsed triple used for matching; a [`Claim`]
//! is the persisted entity carrying a pattern plus the security level it
//! was synthesized for.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{AccessLevel, SecurityLevel};
use crate::error::{KilnError, KilnResult};

pub const WILDCARD: &str = "*";
pub const SEPARATOR: &str = "::";
/// Slug of the superuser wildcard claim.
pub const UNIVERSAL_CLAIM: &str = "*::*::*";

/// Parsed `<service>::<module>::<action>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClaimPattern {
    service: String,
    module: String,
    action: AccessLevel,
}

impl ClaimPattern {
    pub fn new(
        service: impl Into<String>,
        module: impl Into<String>,
        action: AccessLevel,
    ) -> KilnResult<Self> {
        let service = service.into();
        let module = module.into();
        let slug = format!("{service}{SEPARATOR}{module}{SEPARATOR}{action}");
        check_segment(&slug, &service)?;
        check_segment(&slug, &module)?;
        Ok(Self {
            service,
            module,
            action,
        })
    }

    /// The superuser wildcard `*::*::*`.
    pub fn universal() -> Self {
        Self {
            service: WILDCARD.into(),
            module: WILDCARD.into(),
            action: AccessLevel::All,
        }
    }

    pub fn parse(input: &str) -> KilnResult<Self> {
        let parts: Vec<&str> = input.split(SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(parse_error(
                input,
                format!("expected 3 segments separated by '::', found {}", parts.len()),
            ));
        }
        check_segment(input, parts[0])?;
        check_segment(input, parts[1])?;
        if parts[2].is_empty() {
            return Err(parse_error(input, "empty action segment"));
        }
        let action = parts[2]
            .parse::<AccessLevel>()
            .map_err(|_| parse_error(input, format!("unknown action '{}'", parts[2])))?;
        Ok(Self {
            service: parts[0].to_string(),
            module: parts[1].to_string(),
            action,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn action(&self) -> AccessLevel {
        self.action
    }

    pub fn slug(&self) -> String {
        self.to_string()
    }

    /// Wildcard service and module. With `*` as action this is `*::*::*`.
    pub fn is_universal(&self) -> bool {
        self.service == WILDCARD && self.module == WILDCARD && self.action == AccessLevel::All
    }

    /// Whether holding `self` satisfies `required`.
    pub fn can_access(&self, required: &ClaimPattern) -> bool {
        segment_matches(&self.service, &required.service)
            && segment_matches(&self.module, &required.module)
            && self.action.can_access(required.action)
    }

    /// Whether `self` grants everything `other` grants. Unlike
    /// [`can_access`](Self::can_access), a wildcard in `other` is only
    /// covered by a wildcard in `self`.
    pub fn covers(&self, other: &ClaimPattern) -> bool {
        (self.service == WILDCARD || self.service == other.service)
            && (self.module == WILDCARD || self.module == other.module)
            && self.action.can_access(other.action)
    }
}

fn segment_matches(have: &str, required: &str) -> bool {
    have == required || have == WILDCARD || required == WILDCARD
}

fn check_segment(input: &str, segment: &str) -> KilnResult<()> {
    if segment.is_empty() {
        return Err(parse_error(input, "empty segment"));
    }
    if segment.contains(':') || !segment.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(parse_error(
            input,
            format!("segment '{segment}' must be printable ASCII without ':'"),
        ));
    }
    Ok(())
}

fn parse_error(input: &str, reason: impl Into<String>) -> KilnError {
    KilnError::ClaimParse {
        input: input.to_string(),
        reason: reason.into(),
    }
}

impl fmt::Display for ClaimPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.service, self.module, self.action
        )
    }
}

impl FromStr for ClaimPattern {
    type Err = KilnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClaimPattern {
    type Error = KilnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClaimPattern> for String {
    fn from(value: ClaimPattern) -> Self {
        value.to_string()
    }
}

/// A persisted claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub id: Uuid,
    /// `None` for system-wide claims.
    pub tenant_id: Option<Uuid>,
    pub service: String,
    pub module: String,
    pub action: AccessLevel,
    /// Level the claim was synthesized for.
    pub security_level: SecurityLevel,
    /// Canonical `<service>::<module>::<action>`.
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

impl Claim {
    pub fn pattern(&self) -> KilnResult<ClaimPattern> {
        ClaimPattern::new(self.service.clone(), self.module.clone(), self.action)
    }

    pub fn can_access(&self, required: &ClaimPattern) -> bool {
        self.pattern()
            .map(|pattern| pattern.can_access(required))
            .unwrap_or(false)
    }
}

/// Input for claim upsert; identity is `(tenant_id, slug)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertClaim {
    pub tenant_id: Option<Uuid>,
    pub pattern: ClaimPattern,
    pub security_level: SecurityLevel,
}
