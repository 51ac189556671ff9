//! Pure diff computation between desired and observed rules
//!
//! Every function here takes desired addresses that are already qualified
//! (prefix applied, no port suffix) and existing rules that are already
//! normalized. Nothing performs I/O; the reconciler applies the results.

use crate::address::Address;
use crate::naming::Naming;

/// Changes needed to converge a partition on a desired set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePlan {
    /// Existing rules to delete, in listing order
    pub stale: Vec<Address>,
    /// Desired rules to create, in desired order
    pub missing: Vec<Address>,
}

impl CreatePlan {
    /// Whether the partition already matches the desired set
    pub fn is_empty(&self) -> bool {
        self.stale.is_empty() && self.missing.is_empty()
    }
}

/// Compute the full create plan
pub fn plan_create(desired: &[Address], existing: &[Address]) -> CreatePlan {
    CreatePlan {
        stale: stale_rules(desired, existing),
        missing: missing_rules(desired, existing),
    }
}

/// Whether `rule_name` was derived from the qualified name `qualified`
///
/// The rule must be the qualified name followed by `-<port>`. A bare string
/// prefix test would also claim rules of a sibling service whose name
/// merely starts the same way (`svc` vs `svc-admin`).
pub fn owns(qualified: &str, rule_name: &str) -> bool {
    match rule_name.strip_prefix(qualified) {
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

/// Existing rules owned by a desired address but matching none of them
///
/// For each existing rule, every desired address owning it is port-suffixed
/// and compared field-wise; the first exact match keeps the rule. Rules
/// owned by no desired address are never touched.
pub fn stale_rules(desired: &[Address], existing: &[Address]) -> Vec<Address> {
    existing
        .iter()
        .filter(|rule| {
            let mut owners = desired
                .iter()
                .filter(|d| owns(d.name(), rule.name()))
                .peekable();

            if owners.peek().is_none() {
                return false;
            }

            !owners.any(|d| Naming::with_port_suffix(d).same_rule(rule))
        })
        .cloned()
        .collect()
}

/// Port-suffixed desired rules with no exact match among existing rules
pub fn missing_rules(desired: &[Address], existing: &[Address]) -> Vec<Address> {
    desired
        .iter()
        .map(Naming::with_port_suffix)
        .filter(|want| !existing.iter().any(|rule| rule.same_rule(want)))
        .collect()
}

/// Port-suffixed desired rules that exist and must be removed
///
/// A desired rule present several times is returned once per copy.
pub fn rules_to_delete(desired: &[Address], existing: &[Address]) -> Vec<Address> {
    desired
        .iter()
        .map(Naming::with_port_suffix)
        .flat_map(|gone| {
            let copies = existing.iter().filter(|rule| rule.same_rule(&gone)).count();
            std::iter::repeat_n(gone, copies)
        })
        .collect()
}
