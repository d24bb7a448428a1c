//! Client tiers and how a request is assigned one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client tier. Each tier has its own window budget in the
/// [`TierTable`](crate::TierTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Unauthenticated traffic.
    Anonymous,
    /// Signed-in customers.
    Free,
    /// Agents and paying customers.
    Premium,
    /// Operators and administrators.
    Business,
}

impl Tier {
    /// All tiers, cheapest first.
    pub const ALL: [Self; 4] = [Self::Anonymous, Self::Free, Self::Premium, Self::Business];

    /// Wire name, also used in cache keys and the `X-RateLimit-Tier` header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Business => "business",
        }
    }

    /// Parse a tier name, falling back to [`Tier::Anonymous`] for anything
    /// unknown.
    #[must_use]
    pub fn parse_or_anonymous(name: &str) -> Self {
        name.parse().unwrap_or(Self::Anonymous)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anonymous" => Ok(Self::Anonymous),
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            "business" => Ok(Self::Business),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Maps the caller's role onto a tier.
pub trait TierResolver: Send + Sync {
    /// Tier for a caller; `None` means unauthenticated.
    fn resolve(&self, role: Option<&str>) -> Tier;
}

/// Default role mapping: `admin` → business, `agent` → premium, any other
/// authenticated role → free, no identity → anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleTierResolver;

impl TierResolver for RoleTierResolver {
    fn resolve(&self, role: Option<&str>) -> Tier {
        match role {
            None => Tier::Anonymous,
            Some("admin") => Tier::Business,
            Some("agent") => Tier::Premium,
            Some(_) => Tier::Free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_fall_back_to_anonymous() {
        assert_eq!(Tier::parse_or_anonymous("Premium"), Tier::Premium);
        assert_eq!(Tier::parse_or_anonymous("platinum"), Tier::Anonymous);
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn roles_map_to_tiers() {
        let resolver = RoleTierResolver;
        assert_eq!(resolver.resolve(None), Tier::Anonymous);
        assert_eq!(resolver.resolve(Some("user")), Tier::Free);
        assert_eq!(resolver.resolve(Some("agent")), Tier::Premium);
        assert_eq!(resolver.resolve(Some("admin")), Tier::Business);
    }
}
