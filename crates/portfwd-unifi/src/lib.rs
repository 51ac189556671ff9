// # UniFi Rule Store
//
// This crate provides a UniFi controller implementation of `RuleStore` for
// the port-forwarding controller.
//
// ## Behavior
//
// - One HTTP request per store call (two for delete: list, then delete)
// - Session cookie kept in the client's cookie jar
// - "Login required" answers trigger one re-login and one retry
// - Every other failure is returned to the reconciler unchanged
// - HTTP timeout configured (30 seconds)
// - Dry-run mode for safe testing (list is real, mutations are logged only)
// - No retry or backoff beyond the single re-login; resync owns retries
//
// ## Security Requirements
//
// - The password NEVER appears in logs or `Debug` output
// - Credentials come from configuration/environment only
//
// ## API Reference
//
// - Login: POST `/api/login`
// - List rules: GET `/api/s/:site/rest/portforward`
// - Create rule: POST `/api/s/:site/rest/portforward`
// - Delete rule: DELETE `/api/s/:site/rest/portforward/:id`

use async_trait::async_trait;
use portfwd_core::address::ANY_SOURCE;
use portfwd_core::config::RouterConfig;
use portfwd_core::traits::{RuleStore, RuleStoreFactory};
use portfwd_core::{Address, Error, Result, Scope, StoreRegistry};
use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// `meta.msg` of a response asking the client to log in again
const LOGIN_REQUIRED: &str = "api.err.LoginRequired";

/// Protocol of every created rule
const FORWARD_PROTO: &str = "tcp_udp";

/// Failure talking to the controller
#[derive(Debug, thiserror::Error)]
pub enum UnifiError {
    /// Transport error (connect, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status
    #[error("Invalid response code {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not the expected JSON
    #[error("Failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct BaseResponse {
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    msg: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<PortForward>,
}

/// A port-forwarding entry as the controller reports it
#[derive(Debug, Clone, Deserialize)]
struct PortForward {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    fwd_port: String,
    #[serde(default)]
    fwd: String,
    #[serde(default)]
    src: String,
}

impl PortForward {
    fn to_address(&self, scope: &Scope) -> Result<Address> {
        let port: u16 = self.fwd_port.parse().map_err(|_| {
            Error::malformed(format!(
                "Rule {} has non-numeric port {:?}",
                self.name, self.fwd_port
            ))
        })?;

        Ok(Address::new(&self.name, port, &self.fwd)
            .with_source_range(&self.src)
            .with_scope(scope.clone())
            .normalized())
    }

    fn matches(&self, address: &Address) -> bool {
        self.name == address.name()
            && self.fwd_port == address.port().to_string()
            && self.fwd == address.ip()
    }
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    name: &'a str,
    fwd_port: String,
    fwd: &'a str,
    dst_port: String,
    enabled: bool,
    proto: &'a str,
    src: &'a str,
}

impl<'a> CreateRequest<'a> {
    fn for_address(address: &'a Address) -> Self {
        Self {
            name: address.name(),
            fwd_port: address.port().to_string(),
            fwd: address.ip(),
            dst_port: address.port().to_string(),
            enabled: true,
            proto: FORWARD_PROTO,
            src: if address.is_unrestricted() {
                ANY_SOURCE
            } else {
                address.source_range()
            },
        }
    }
}

/// UniFi controller rule store
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the store will:
/// - Perform all GET requests (listing, delete lookups)
/// - Log the intended POST/DELETE
/// - **NOT** actually modify the router
pub struct UnifiRuleStore {
    /// Controller base URL without trailing slash
    controller_url: String,

    /// Login user
    username: String,

    /// Login password
    /// ⚠️ NEVER log this value
    password: String,

    /// HTTP client holding the session cookie
    client: reqwest::Client,

    /// Dry-run mode: if true, list normally but skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for UnifiRuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiRuleStore")
            .field("controller_url", &self.controller_url)
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl UnifiRuleStore {
    /// Create a new UniFi rule store
    ///
    /// # Parameters
    ///
    /// - `controller_url`: Base URL, e.g. `https://unifi.local:8443`
    /// - `username` / `password`: Controller credentials
    /// - `accept_invalid_certs`: Accept self-signed controller certificates
    /// - `dry_run`: If true, list normally but skip mutations
    pub fn new(
        controller_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        accept_invalid_certs: bool,
        dry_run: bool,
    ) -> Result<Self> {
        let controller_url = controller_url.into().trim_end_matches('/').to_string();
        let username = username.into();
        let password = password.into();

        if controller_url.is_empty() {
            return Err(Error::config("UniFi controller URL cannot be empty"));
        }
        if username.is_empty() || password.is_empty() {
            return Err(Error::config("UniFi username and password cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .cookie_store(true)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            controller_url,
            username,
            password,
            client,
            dry_run,
        })
    }

    /// Whether mutations are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Log in and store the session cookie
    ///
    /// Called automatically when the controller reports an expired session.
    pub async fn login(&self) -> std::result::Result<(), UnifiError> {
        tracing::debug!("Logging in to UniFi controller as {}", self.username);

        let url = format!("{}/api/login", self.controller_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        Self::read_body(response).await.map(|_| ())
    }

    fn rules_url(&self, scope: &Scope) -> String {
        format!(
            "{}/api/s/{}/rest/portforward",
            self.controller_url,
            scope.site_name()
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> std::result::Result<Response, UnifiError> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Issue a request, re-logging in once if the session expired
    async fn api_call(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> std::result::Result<String, UnifiError> {
        let response = self.send(method.clone(), url, body).await?;

        if response.status().as_u16() == 401 {
            let text = response.text().await?;
            if !is_login_required(&text) {
                return Err(UnifiError::Status { status: 401, body: text });
            }

            tracing::info!("UniFi session expired, logging in again");
            self.login().await?;
            let retry = self.send(method, url, body).await?;
            return Self::read_body(retry).await;
        }

        Self::read_body(response).await
    }

    async fn read_body(response: Response) -> std::result::Result<String, UnifiError> {
        let status = response.status().as_u16();
        let text = response.text().await?;
        if status >= 300 {
            return Err(UnifiError::Status { status, body: text });
        }
        Ok(text)
    }

    async fn list_entries(&self, scope: &Scope) -> std::result::Result<Vec<PortForward>, UnifiError> {
        let body = self.api_call(Method::GET, &self.rules_url(scope), None).await?;
        let parsed: ListResponse = serde_json::from_str(&body)?;
        Ok(parsed.data)
    }
}

fn is_login_required(body: &str) -> bool {
    serde_json::from_str::<BaseResponse>(body).is_ok_and(|r| r.meta.msg == LOGIN_REQUIRED)
}

#[async_trait]
impl RuleStore for UnifiRuleStore {
    async fn list(&self, scope: &Scope) -> Result<Vec<Address>> {
        let entries = self
            .list_entries(scope)
            .await
            .map_err(|e| Error::list(e.to_string()))?;

        tracing::debug!(
            "UniFi site {} reports {} port forwarding rules",
            scope.site_name(),
            entries.len()
        );

        entries.iter().map(|entry| entry.to_address(scope)).collect()
    }

    async fn create(&self, address: &Address) -> Result<()> {
        let payload = serde_json::to_value(CreateRequest::for_address(address))?;
        let url = self.rules_url(address.scope());

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send POST request to {} with payload: {}", url, payload);
            return Ok(());
        }

        self.api_call(Method::POST, &url, Some(&payload))
            .await
            .map_err(|e| Error::create(address.name(), e.to_string()))?;

        tracing::debug!("Created UniFi rule {}", address.name());
        Ok(())
    }

    async fn delete(&self, address: &Address) -> Result<()> {
        let entries = self
            .list_entries(address.scope())
            .await
            .map_err(|e| Error::delete(address.name(), e.to_string()))?;

        let Some(entry) = entries.iter().find(|entry| entry.matches(address)) else {
            tracing::debug!("UniFi rule {} already absent", address.name());
            return Ok(());
        };

        let url = format!("{}/{}", self.rules_url(address.scope()), entry.id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE request to {}", url);
            return Ok(());
        }

        self.api_call(Method::DELETE, &url, None)
            .await
            .map_err(|e| Error::delete(address.name(), e.to_string()))?;

        tracing::debug!("Deleted UniFi rule {} ({})", address.name(), entry.id);
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "unifi"
    }
}

/// Factory for creating UniFi rule stores
pub struct UnifiFactory;

impl RuleStoreFactory for UnifiFactory {
    fn create(&self, config: &RouterConfig) -> Result<Box<dyn RuleStore>> {
        match config {
            RouterConfig::Unifi {
                controller_url,
                username,
                password,
                accept_invalid_certs,
            } => {
                // Check for dry-run mode environment variable
                let dry_run = std::env::var("PORTFWD_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!("UniFi rule store running in DRY-RUN mode - no changes will be made");
                }

                Ok(Box::new(UnifiRuleStore::new(
                    controller_url.clone(),
                    username.clone(),
                    password.clone(),
                    *accept_invalid_certs,
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for UniFi rule store")),
        }
    }
}

/// Register the UniFi rule store with a registry
///
/// # Example
///
/// ```rust
/// use portfwd_core::StoreRegistry;
///
/// let registry = StoreRegistry::new();
/// portfwd_unifi::register(&registry);
/// assert!(registry.has_store("unifi"));
/// ```
pub fn register(registry: &StoreRegistry) {
    registry.register_store("unifi", Box::new(UnifiFactory));
}
