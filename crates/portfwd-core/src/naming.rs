//! Qualified rule names
//!
//! Router rules carry nothing but a flat name, so the reconciler correlates
//! desired and observed rules by deriving `prefix + name + "-" + port`. The
//! prefix separates rules owned by this installation from rules created by
//! other tools or by hand.

use crate::address::Address;

/// Deterministic rule-name derivation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Naming {
    prefix: String,
}

impl Naming {
    /// Create a naming scheme with the given rule prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The configured rule prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prepend the rule prefix to the address name
    pub fn qualify(&self, address: &Address) -> Address {
        address.renamed(format!("{}{}", self.prefix, address.name()))
    }

    /// Append `-<port>` to the address name
    pub fn with_port_suffix(address: &Address) -> Address {
        address.renamed(format!("{}-{}", address.name(), address.port()))
    }

    /// Full router-side name of a desired address
    pub fn rule_name(&self, address: &Address) -> String {
        format!("{}{}-{}", self.prefix, address.name(), address.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_then_suffix() {
        let naming = Naming::new("test-");
        let desired = Address::new("svc", 80, "1.2.3.4");

        let qualified = naming.qualify(&desired);
        assert_eq!(qualified.name(), "test-svc");
        assert_eq!(Naming::with_port_suffix(&qualified).name(), "test-svc-80");
        assert_eq!(naming.rule_name(&desired), "test-svc-80");

        // transforms never touch their input
        assert_eq!(desired.name(), "svc");
    }

    #[test]
    fn test_empty_prefix() {
        let naming = Naming::default();
        let desired = Address::new("default-web", 443, "1.2.3.4");
        assert_eq!(naming.qualify(&desired).name(), "default-web");
    }
}
