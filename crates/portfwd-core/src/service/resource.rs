//! Network-service resources and the addresses they expose
//!
//! A [`ServiceResource`] is the controller's view of a load-balanced
//! service: its ports, external address, source restrictions, annotations
//! and lifecycle markers. The JSON shape follows the usual service object
//! field names so exported manifests can be fed in with little massaging.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::address::Address;
use crate::config::AnnotationConfig;
use crate::error::{Error, Result};
use crate::scope::Scope;

/// Identity of a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    /// Namespace the service lives in
    pub namespace: String,
    /// Service name
    pub name: String,
}

impl ServiceKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// How a service is exposed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    /// Cluster-internal only
    #[default]
    #[serde(rename = "ClusterIP")]
    ClusterIp,
    /// Exposed on node ports
    NodePort,
    /// Exposed through a load balancer
    LoadBalancer,
    /// DNS alias
    ExternalName,
}

/// A port exposed by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    /// Optional port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Exposed port number
    pub port: u16,
}

impl ServicePort {
    /// Create an unnamed port
    pub fn new(port: u16) -> Self {
        Self { name: None, port }
    }
}

/// A network service the controller may forward ports to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResource {
    /// Namespace the service lives in
    pub namespace: String,

    /// Service name
    pub name: String,

    /// Exposure type
    #[serde(rename = "type", default)]
    pub service_type: ServiceType,

    /// Exposed ports
    #[serde(default)]
    pub ports: Vec<ServicePort>,

    /// Address assigned by the load balancer
    #[serde(rename = "loadBalancerIP", default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_ip: Option<String>,

    /// Externally routable node addresses
    #[serde(rename = "externalIPs", default, skip_serializing_if = "Vec::is_empty")]
    pub external_ips: Vec<String>,

    /// Source CIDRs allowed through the load balancer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancer_source_ranges: Vec<String>,

    /// Free-form annotations
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Lifecycle markers that block final removal
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,

    /// Set once removal was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ServiceResource {
    /// Create a service with no ports or annotations
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, service_type: ServiceType) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            service_type,
            ports: Vec::new(),
            load_balancer_ip: None,
            external_ips: Vec::new(),
            load_balancer_source_ranges: Vec::new(),
            annotations: BTreeMap::new(),
            finalizers: Vec::new(),
            deletion_timestamp: None,
        }
    }

    /// The service's identity
    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.namespace, &self.name)
    }

    /// Whether removal was requested
    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Request removal
    pub fn mark_deleted(&mut self) {
        if self.deletion_timestamp.is_none() {
            self.deletion_timestamp = Some(Utc::now());
        }
    }

    /// Whether the finalizer is present
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add a finalizer; returns `true` if it was missing
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove a finalizer; returns `true` if it was present
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }

    /// Load-balancer type, or node-port type with an external IP
    pub fn is_externally_reachable(&self) -> bool {
        match self.service_type {
            ServiceType::LoadBalancer => true,
            ServiceType::NodePort => !self.external_ips.is_empty(),
            ServiceType::ClusterIp | ServiceType::ExternalName => false,
        }
    }

    /// Whether the enable annotation is the literal string `"true"`
    pub fn is_enabled(&self, keys: &AnnotationConfig) -> bool {
        self.annotations
            .get(&keys.enable_annotation())
            .is_some_and(|value| value == "true")
    }

    /// Whether port forwarding applies to this service at all
    pub fn is_eligible(&self, keys: &AnnotationConfig) -> bool {
        self.is_externally_reachable() && self.is_enabled(keys)
    }

    /// IP the router should forward to
    pub fn target_ip(&self) -> Option<&str> {
        match self.service_type {
            ServiceType::LoadBalancer => self.load_balancer_ip.as_deref(),
            _ => self.external_ips.first().map(String::as_str),
        }
    }

    /// Allowed source CIDR (load balancers only, first range wins)
    pub fn source_range(&self) -> &str {
        match self.service_type {
            ServiceType::LoadBalancer => self
                .load_balancer_source_ranges
                .first()
                .map(String::as_str)
                .unwrap_or(""),
            _ => "",
        }
    }

    /// Scope from annotations under the namespace, prefix stripped
    ///
    /// The enable flag is not part of the scope.
    pub fn scope(&self, keys: &AnnotationConfig) -> Scope {
        let namespace = format!("{}/", keys.prefix);
        self.annotations
            .iter()
            .filter_map(|(key, value)| {
                let option = key.strip_prefix(&namespace)?;
                (option != keys.enable_key).then_some((option, value.as_str()))
            })
            .collect()
    }

    /// Logical rule name shared by every port of the service
    pub fn address_name(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }

    /// One desired address per exposed port
    ///
    /// Fails when no target IP is assigned yet.
    pub fn desired_addresses(&self, keys: &AnnotationConfig) -> Result<Vec<Address>> {
        let ip = self.target_ip().filter(|ip| !ip.is_empty()).ok_or_else(|| {
            Error::invalid_input(format!("Service {} has no external IP assigned", self.key()))
        })?;
        Ok(self.addresses_for(ip, keys))
    }

    /// Addresses to remove when the service goes away
    ///
    /// Never fails: without a target IP the addresses carry an empty IP,
    /// which matches no router rule, so teardown deletes nothing and the
    /// finalizer can still be released.
    pub fn teardown_addresses(&self, keys: &AnnotationConfig) -> Vec<Address> {
        self.addresses_for(self.target_ip().unwrap_or(""), keys)
    }

    fn addresses_for(&self, ip: &str, keys: &AnnotationConfig) -> Vec<Address> {
        let scope = self.scope(keys);
        let name = self.address_name();

        self.ports
            .iter()
            .map(|port| {
                Address::new(&name, port.port, ip)
                    .with_source_range(self.source_range())
                    .with_scope(scope.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> AnnotationConfig {
        AnnotationConfig::new("port-forwarding.lylefranklin.com")
    }

    fn lb_service() -> ServiceResource {
        let mut svc = ServiceResource::new("default", "some-svc", ServiceType::LoadBalancer);
        svc.load_balancer_ip = Some("1.2.3.4".to_string());
        svc.ports = vec![ServicePort::new(80)];
        svc.annotations.insert(
            "port-forwarding.lylefranklin.com/enable".to_string(),
            "true".to_string(),
        );
        svc
    }

    #[test]
    fn test_load_balancer_with_enable_annotation_is_eligible() {
        assert!(lb_service().is_eligible(&keys()));
    }

    #[test]
    fn test_enable_annotation_must_be_literal_true() {
        let mut svc = lb_service();
        svc.annotations.insert(
            "port-forwarding.lylefranklin.com/enable".to_string(),
            "True".to_string(),
        );
        assert!(!svc.is_eligible(&keys()));

        svc.annotations.clear();
        assert!(!svc.is_eligible(&keys()));
    }

    #[test]
    fn test_node_port_needs_external_ip() {
        let mut svc = lb_service();
        svc.service_type = ServiceType::NodePort;
        assert!(!svc.is_eligible(&keys()));

        svc.external_ips = vec!["5.6.7.8".to_string(), "5.6.7.9".to_string()];
        assert!(svc.is_eligible(&keys()));
        assert_eq!(svc.target_ip(), Some("5.6.7.8"));
    }

    #[test]
    fn test_cluster_ip_is_never_eligible() {
        let mut svc = lb_service();
        svc.service_type = ServiceType::ClusterIp;
        svc.external_ips = vec!["5.6.7.8".to_string()];
        assert!(!svc.is_eligible(&keys()));
    }

    #[test]
    fn test_scope_strips_prefix_and_skips_enable() {
        let mut svc = lb_service();
        svc.annotations.insert(
            "port-forwarding.lylefranklin.com/site".to_string(),
            "garage".to_string(),
        );
        svc.annotations
            .insert("unrelated.io/site".to_string(), "other".to_string());

        assert_eq!(svc.scope(&keys()), Scope::site("garage"));
    }

    #[test]
    fn test_source_range_only_for_load_balancers() {
        let mut svc = lb_service();
        svc.load_balancer_source_ranges = vec!["10.0.0.0/8".to_string(), "192.168.0.0/16".to_string()];
        assert_eq!(svc.source_range(), "10.0.0.0/8");

        svc.service_type = ServiceType::NodePort;
        assert_eq!(svc.source_range(), "");
    }

    #[test]
    fn test_desired_addresses_one_per_port() {
        let mut svc = lb_service();
        svc.ports.push(ServicePort::new(443));

        let addresses = svc.desired_addresses(&keys()).unwrap();
        assert_eq!(
            addresses,
            vec![
                Address::new("default-some-svc", 80, "1.2.3.4"),
                Address::new("default-some-svc", 443, "1.2.3.4"),
            ]
        );
    }

    #[test]
    fn test_desired_addresses_without_ip_fails() {
        let mut svc = lb_service();
        svc.load_balancer_ip = None;
        assert!(svc.desired_addresses(&keys()).is_err());
    }

    #[test]
    fn test_teardown_addresses_without_ip() {
        let mut svc = lb_service();
        svc.load_balancer_ip = None;
        let addresses = svc.teardown_addresses(&keys());
        assert_eq!(addresses.len(), svc.ports.len());
        assert!(addresses.iter().all(|a| a.ip().is_empty()));
    }

    #[test]
    fn test_finalizer_helpers() {
        let mut svc = lb_service();
        assert!(svc.add_finalizer("f"));
        assert!(!svc.add_finalizer("f"));
        assert!(svc.has_finalizer("f"));
        assert!(svc.remove_finalizer("f"));
        assert!(!svc.remove_finalizer("f"));
    }

    #[test]
    fn test_json_field_names() {
        let svc: ServiceResource = serde_json::from_value(serde_json::json!({
            "namespace": "default",
            "name": "web",
            "type": "NodePort",
            "ports": [{ "port": 443, "name": "https" }],
            "externalIPs": ["5.6.7.8"],
            "annotations": { "port-forwarding.lylefranklin.com/enable": "true" }
        }))
        .unwrap();

        assert_eq!(svc.service_type, ServiceType::NodePort);
        assert_eq!(svc.target_ip(), Some("5.6.7.8"));
        assert!(svc.is_eligible(&keys()));
    }
}
