//! Test doubles and common utilities for contract tests
//!
//! The doubles record every call in order so tests can assert on the exact
//! sequence of router mutations, and can be told to fail on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use portfwd_core::engine::{AddressReconciler, ReconcileSummary};
use portfwd_core::error::{Error, Result};
use portfwd_core::service::{ServicePort, ServiceResource, ServiceType};
use portfwd_core::{Address, AnnotationConfig, RuleStore, Scope};
use std::sync::{Arc, Mutex};

/// Annotation namespace used throughout the tests
pub const ANNOTATION_PREFIX: &str = "port-forwarding.lylefranklin.com";

/// One call made against a [`FakeRuleStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(Scope),
    Create(Address),
    Delete(Address),
}

#[derive(Debug, Default)]
struct FakeState {
    rules: Vec<Address>,
    calls: Vec<Call>,
    fail_list: bool,
    fail_create: Option<String>,
    fail_delete: Option<String>,
}

/// Router double backed by a plain rule table
///
/// Clones share the table, call log and failure switches, so a test can
/// hand one clone to the reconciler and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct FakeRuleStore {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `rules`
    pub fn with_rules(rules: impl IntoIterator<Item = Address>) -> Self {
        let store = Self::new();
        store.state.lock().unwrap().rules.extend(rules);
        store
    }

    /// Current rules, as stored
    pub fn rules(&self) -> Vec<Address> {
        self.state.lock().unwrap().rules.clone()
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Only the mutating calls, in order
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::List(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    /// Fail creates of the rule with this exact name
    pub fn fail_create_of(&self, name: Option<&str>) {
        self.state.lock().unwrap().fail_create = name.map(str::to_string);
    }

    /// Fail deletes of the rule with this exact name
    pub fn fail_delete_of(&self, name: Option<&str>) {
        self.state.lock().unwrap().fail_delete = name.map(str::to_string);
    }
}

#[async_trait]
impl RuleStore for FakeRuleStore {
    async fn list(&self, scope: &Scope) -> Result<Vec<Address>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::List(scope.clone()));
        if state.fail_list {
            return Err(Error::list("router unreachable"));
        }
        Ok(state
            .rules
            .iter()
            .filter(|rule| rule.scope() == scope)
            .cloned()
            .collect())
    }

    async fn create(&self, address: &Address) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(address.clone()));
        if state.fail_create.as_deref() == Some(address.name()) {
            return Err(Error::create(address.name(), "rejected by router"));
        }
        state.rules.push(address.clone());
        Ok(())
    }

    async fn delete(&self, address: &Address) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Delete(address.clone()));
        if state.fail_delete.as_deref() == Some(address.name()) {
            return Err(Error::delete(address.name(), "rejected by router"));
        }
        let position = state.rules.iter().position(|rule| {
            rule.scope() == address.scope()
                && rule.name() == address.name()
                && rule.port() == address.port()
                && rule.ip() == address.ip()
        });
        if let Some(index) = position {
            state.rules.remove(index);
        }
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "fake"
    }
}

/// Reconciler double recording the batches it receives
#[derive(Debug, Clone, Default)]
pub struct FakeReconciler {
    created: Arc<Mutex<Vec<Vec<Address>>>>,
    deleted: Arc<Mutex<Vec<Vec<Address>>>>,
    failing: Arc<Mutex<bool>>,
}

impl FakeReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_batches(&self) -> Vec<Vec<Address>> {
        self.created.lock().unwrap().clone()
    }

    pub fn delete_batches(&self) -> Vec<Vec<Address>> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn check(&self) -> Result<()> {
        if *self.failing.lock().unwrap() {
            Err(Error::list("router unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AddressReconciler for FakeReconciler {
    async fn create_addresses(&self, desired: &[Address]) -> Result<ReconcileSummary> {
        self.created.lock().unwrap().push(desired.to_vec());
        self.check()?;
        Ok(ReconcileSummary {
            deleted: Vec::new(),
            created: desired.to_vec(),
        })
    }

    async fn delete_addresses(&self, desired: &[Address]) -> Result<ReconcileSummary> {
        self.deleted.lock().unwrap().push(desired.to_vec());
        self.check()?;
        Ok(ReconcileSummary {
            deleted: desired.to_vec(),
            created: Vec::new(),
        })
    }
}

pub fn annotations() -> AnnotationConfig {
    AnnotationConfig::new(ANNOTATION_PREFIX)
}

pub fn finalizer() -> String {
    annotations().finalizer_name()
}

/// Enabled load-balancer service exposing `ports` on `ip`
pub fn lb_service(namespace: &str, name: &str, ip: &str, ports: &[u16]) -> ServiceResource {
    let mut svc = ServiceResource::new(namespace, name, ServiceType::LoadBalancer);
    svc.load_balancer_ip = Some(ip.to_string());
    svc.ports = ports.iter().copied().map(ServicePort::new).collect();
    svc.annotations.insert(
        annotations().enable_annotation(),
        "true".to_string(),
    );
    svc
}
