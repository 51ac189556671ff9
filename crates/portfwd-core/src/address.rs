//! Forwarding rule value type
//!
//! An [`Address`] is either a rule the caller wants on the router or a rule
//! the router reported back. Values are immutable; every transform returns
//! a new address.

use crate::error::{Error, Result};
use crate::scope::Scope;
use std::fmt;

/// Router-side sentinel for an unrestricted source range
pub const ANY_SOURCE: &str = "any";

/// A desired or observed port-forwarding rule
#[derive(Debug, Clone)]
pub struct Address {
    name: String,
    port: u16,
    ip: String,
    source_range: String,
    scope: Scope,
}

impl Address {
    /// Create an unrestricted address in the default scope
    pub fn new(name: impl Into<String>, port: u16, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port,
            ip: ip.into(),
            source_range: String::new(),
            scope: Scope::default(),
        }
    }

    /// Restrict allowed source traffic to a CIDR (empty means unrestricted)
    pub fn with_source_range(mut self, source_range: impl Into<String>) -> Self {
        self.source_range = source_range.into();
        self
    }

    /// Place the address in a partition
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Same rule under a different name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Rule name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forwarded port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Target IP literal
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Allowed source CIDR; empty when unrestricted
    pub fn source_range(&self) -> &str {
        &self.source_range
    }

    /// Partition the rule lives in
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether the source range is unrestricted
    pub fn is_unrestricted(&self) -> bool {
        self.source_range.is_empty()
    }

    /// Map the router's `"any"` sentinel to the empty source range
    pub fn normalized(mut self) -> Self {
        if self.source_range == ANY_SOURCE {
            self.source_range.clear();
        }
        self
    }

    /// Field-wise comparison of the full record
    ///
    /// Two addresses describe the same rule when name, port, ip, source
    /// range and scope are all equal.
    pub fn same_rule(&self, other: &Address) -> bool {
        self.name == other.name
            && self.port == other.port
            && self.ip == other.ip
            && self.source_range == other.source_range
            && self.scope == other.scope
    }

    /// Reject values the router cannot hold
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::invalid_input(format!(
                "Address {} has port 0 (must be 1-65535)",
                self.name
            )));
        }
        if self.name.is_empty() {
            return Err(Error::invalid_input("Address name cannot be empty"));
        }
        Ok(())
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.same_rule(other)
    }
}

impl Eq for Address {}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} -> {}", self.name, self.port, self.ip)?;
        if !self.source_range.is_empty() {
            write!(f, " from {}", self.source_range)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_maps_any_to_empty() {
        let addr = Address::new("a", 80, "1.2.3.4").with_source_range("any");
        assert!(addr.normalized().is_unrestricted());

        let restricted = Address::new("a", 80, "1.2.3.4").with_source_range("10.0.0.0/8");
        assert_eq!(restricted.normalized().source_range(), "10.0.0.0/8");
    }

    #[test]
    fn test_same_rule_compares_every_field() {
        let base = Address::new("a", 80, "1.2.3.4");
        assert!(base.same_rule(&Address::new("a", 80, "1.2.3.4")));
        assert!(!base.same_rule(&Address::new("a", 81, "1.2.3.4")));
        assert!(!base.same_rule(&Address::new("a", 80, "1.2.3.5")));
        assert!(!base.same_rule(&base.clone().with_source_range("10.0.0.0/8")));
        assert!(!base.same_rule(&base.clone().with_scope(Scope::site("other"))));
        assert!(!base.same_rule(&base.renamed("b")));
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        assert!(Address::new("a", 0, "1.2.3.4").validate().is_err());
        assert!(Address::new("", 80, "1.2.3.4").validate().is_err());
        assert!(Address::new("a", 65535, "1.2.3.4").validate().is_ok());
    }
}
