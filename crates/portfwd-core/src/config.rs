//! Configuration types for the port-forwarding system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main port-forwarding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortForwardConfig {
    /// Prefix marking router rules owned by this installation
    #[serde(default = "default_rule_prefix")]
    pub rule_prefix: String,

    /// Router rule store configuration
    pub router: RouterConfig,

    /// Annotation keys read from services
    #[serde(default)]
    pub annotations: AnnotationConfig,

    /// Where services are read from
    #[serde(default)]
    pub services: ServiceStoreConfig,

    /// Optional controller settings
    #[serde(default)]
    pub controller: ControllerConfig,
}

impl PortForwardConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            rule_prefix: default_rule_prefix(),
            router: RouterConfig::default(),
            annotations: AnnotationConfig::default(),
            services: ServiceStoreConfig::default(),
            controller: ControllerConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.rule_prefix.is_empty() {
            return Err(crate::Error::config(
                "Rule prefix cannot be empty (it separates owned rules from foreign ones)",
            ));
        }

        self.router.validate()?;
        self.annotations.validate()?;
        self.services.validate()?;
        self.controller.validate()?;

        Ok(())
    }
}

impl Default for PortForwardConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Router rule store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouterConfig {
    /// UniFi controller
    Unifi {
        /// Controller base URL (e.g., "https://unifi.local:8443")
        controller_url: String,
        /// Login user
        username: String,
        /// Login password
        password: String,
        /// Accept self-signed controller certificates
        #[serde(default)]
        accept_invalid_certs: bool,
    },

    /// In-memory rule table (no router)
    #[default]
    Memory,

    /// Custom rule store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl RouterConfig {
    /// Validate the router configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            RouterConfig::Unifi {
                controller_url,
                username,
                password,
                ..
            } => {
                if controller_url.is_empty() {
                    return Err(crate::Error::config("UniFi controller URL cannot be empty"));
                }
                if !controller_url.starts_with("https://") && !controller_url.starts_with("http://")
                {
                    return Err(crate::Error::config(format!(
                        "UniFi controller URL must use HTTP or HTTPS scheme. Got: {}",
                        controller_url
                    )));
                }
                if username.is_empty() || password.is_empty() {
                    return Err(crate::Error::config(
                        "UniFi username and password cannot be empty",
                    ));
                }
                Ok(())
            }
            RouterConfig::Memory => Ok(()),
            RouterConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom router factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom router config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the router type name
    pub fn type_name(&self) -> &str {
        match self {
            RouterConfig::Unifi { .. } => "unifi",
            RouterConfig::Memory => "memory",
            RouterConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Annotation keys recognized on services
///
/// Only the service controller reads these; the reconciler never sees
/// annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// Annotation namespace (e.g., "port-forwarding.lylefranklin.com")
    #[serde(default = "default_annotation_prefix")]
    pub prefix: String,

    /// Key under the namespace that opts a service in
    #[serde(default = "default_enable_key")]
    pub enable_key: String,

    /// Finalizer recorded on services whose rules may exist
    #[serde(default)]
    pub finalizer: Option<String>,
}

impl AnnotationConfig {
    /// Create annotation keys under a namespace
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            enable_key: default_enable_key(),
            finalizer: None,
        }
    }

    /// Full annotation key of the enable flag
    pub fn enable_annotation(&self) -> String {
        format!("{}/{}", self.prefix, self.enable_key)
    }

    /// Finalizer name, defaulting to `finalizer.<prefix>/v1`
    pub fn finalizer_name(&self) -> String {
        self.finalizer
            .clone()
            .unwrap_or_else(|| format!("finalizer.{}/v1", self.prefix))
    }

    /// Validate the annotation keys
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.prefix.is_empty() {
            return Err(crate::Error::config("Annotation prefix cannot be empty"));
        }
        if self.prefix.ends_with('/') {
            return Err(crate::Error::config(format!(
                "Annotation prefix must not end with '/'. Got: {}",
                self.prefix
            )));
        }
        if self.enable_key.is_empty() {
            return Err(crate::Error::config("Enable annotation key cannot be empty"));
        }
        Ok(())
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self::new(default_annotation_prefix())
    }
}

/// Service store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceStoreConfig {
    /// JSON file of services
    File {
        /// Path to the services file
        path: String,
    },

    /// In-memory services (not persistent)
    #[default]
    Memory,
}

impl ServiceStoreConfig {
    /// Validate the service store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ServiceStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Services file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Interval between full resyncs of every service (in seconds)
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    /// Capacity of the change notification channel
    ///
    /// When full, change notifications are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ControllerConfig {
    /// Validate the controller configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.resync_interval_secs == 0 {
            return Err(crate::Error::config("Resync interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: default_resync_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_rule_prefix() -> String {
    "port-forwarding-".to_string()
}

fn default_annotation_prefix() -> String {
    "port-forwarding.lylefranklin.com".to_string()
}

fn default_enable_key() -> String {
    "enable".to_string()
}

fn default_resync_interval_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PortForwardConfig::default().validate().is_ok());
    }

    #[test]
    fn test_router_config_from_json() {
        let config: PortForwardConfig = serde_json::from_value(serde_json::json!({
            "rule_prefix": "k8s-",
            "router": {
                "type": "unifi",
                "controller_url": "https://unifi.local:8443",
                "username": "admin",
                "password": "secret"
            },
            "services": { "type": "file", "path": "/var/lib/portfwd/services.json" }
        }))
        .unwrap();

        assert_eq!(config.router.type_name(), "unifi");
        assert_eq!(config.controller.resync_interval_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unifi_requires_scheme_and_credentials() {
        let bad_url = RouterConfig::Unifi {
            controller_url: "unifi.local".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
            accept_invalid_certs: false,
        };
        assert!(bad_url.validate().is_err());

        let no_password = RouterConfig::Unifi {
            controller_url: "https://unifi.local".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            accept_invalid_certs: false,
        };
        assert!(no_password.validate().is_err());
    }

    #[test]
    fn test_annotation_keys() {
        let keys = AnnotationConfig::new("example.com");
        assert_eq!(keys.enable_annotation(), "example.com/enable");
        assert_eq!(keys.finalizer_name(), "finalizer.example.com/v1");
        assert!(AnnotationConfig::new("example.com/").validate().is_err());
    }
}
