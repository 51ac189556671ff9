//! Partition key for router rules
//!
//! A [`Scope`] selects the subset of router state a reconciliation works
//! on (for example one router "site"). It is a flat string map compared by
//! value, independent of insertion order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key under which the router site is stored
pub const SITE_KEY: &str = "site";

/// Site used when a scope does not name one
pub const DEFAULT_SITE: &str = "default";

/// Order-independent partition key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope {
    entries: BTreeMap<String, String>,
}

impl Scope {
    /// Create an empty scope (the router's default partition)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope naming a single site
    pub fn site(site: impl Into<String>) -> Self {
        Self::new().with(SITE_KEY, site)
    }

    /// Add or replace an entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Look up an entry
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The site this scope selects, falling back to [`DEFAULT_SITE`]
    pub fn site_name(&self) -> &str {
        self.get(SITE_KEY).unwrap_or(DEFAULT_SITE)
    }

    /// Whether the scope carries no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Scope {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_equality_ignores_insertion_order() {
        let a = Scope::new().with("site", "home").with("zone", "lan");
        let b: Scope = [("zone", "lan"), ("site", "home")].into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_site_name_defaults() {
        assert_eq!(Scope::new().site_name(), "default");
        assert_eq!(Scope::site("garage").site_name(), "garage");
    }

    #[test]
    fn test_display() {
        let scope = Scope::new().with("zone", "lan").with("site", "home");
        assert_eq!(scope.to_string(), "{site=home,zone=lan}");
        assert_eq!(Scope::new().to_string(), "{}");
    }
}
