// # portfwdd - Port Forwarding Daemon
//
// Thin integration layer: all reconciliation logic lives in portfwd-core.
// Configuration is via environment variables only.
//
// The portfwdd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering router integrations
// 4. Running the service controller until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Router
// - `PORTFWD_ROUTER_TYPE`: Router type (unifi, memory). Default: unifi
// - `PORTFWD_UNIFI_URL`: Controller URL (e.g., https://unifi.local:8443)
// - `PORTFWD_UNIFI_USERNAME`: Controller user
// - `PORTFWD_UNIFI_PASSWORD`: Controller password
// - `PORTFWD_UNIFI_INSECURE`: Accept self-signed certificates (true/false)
// - `PORTFWD_MODE`: Set to `dry-run` to log router changes without applying them
//
// ### Rules
// - `PORTFWD_RULE_PREFIX`: Prefix of rules owned by this daemon. Default: port-forwarding-
//
// ### Services
// - `PORTFWD_SERVICES_PATH`: JSON file of services. Default: /var/lib/portfwd/services.json
// - `PORTFWD_ANNOTATION_PREFIX`: Annotation namespace. Default: port-forwarding.lylefranklin.com
// - `PORTFWD_RESYNC_INTERVAL_SECS`: Seconds between full resyncs (5-3600). Default: 30
//
// ### Logging
// - `PORTFWD_LOG_LEVEL`: trace, debug, info, warn, error. Default: info
//
// ## Example
//
// ```bash
// export PORTFWD_UNIFI_URL=https://192.168.1.1:8443
// export PORTFWD_UNIFI_USERNAME=portfwd
// export PORTFWD_UNIFI_PASSWORD=...
// export PORTFWD_UNIFI_INSECURE=true
// export PORTFWD_SERVICES_PATH=/var/lib/portfwd/services.json
//
// portfwdd
// ```

use anyhow::Result;
use portfwd_core::traits::TracingChangeLogger;
use portfwd_core::{
    AnnotationConfig, ControllerConfig, ControllerEvent, PortForwardConfig, Reconciler,
    RouterConfig, ServiceController, ServiceStoreConfig, StoreRegistry,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum PortfwdExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PortfwdExitCode> for ExitCode {
    fn from(code: PortfwdExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration (holds the router password; never log it)
struct Config {
    router_type: String,
    unifi_url: Option<String>,
    unifi_username: Option<String>,
    unifi_password: Option<String>,
    unifi_insecure: bool,
    rule_prefix: String,
    services_path: String,
    annotation_prefix: String,
    resync_interval_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let resync_interval_secs = match lookup("PORTFWD_RESYNC_INTERVAL_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                anyhow::anyhow!(
                    "PORTFWD_RESYNC_INTERVAL_SECS must be a whole number of seconds. Got: {}",
                    raw
                )
            })?,
            None => 30,
        };

        let unifi_insecure = match lookup("PORTFWD_UNIFI_INSECURE") {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" | "" => false,
                _ => anyhow::bail!("PORTFWD_UNIFI_INSECURE must be true or false. Got: {}", raw),
            },
            None => false,
        };

        Ok(Self {
            router_type: lookup("PORTFWD_ROUTER_TYPE").unwrap_or_else(|| "unifi".to_string()),
            unifi_url: lookup("PORTFWD_UNIFI_URL"),
            unifi_username: lookup("PORTFWD_UNIFI_USERNAME"),
            unifi_password: lookup("PORTFWD_UNIFI_PASSWORD"),
            unifi_insecure,
            rule_prefix: lookup("PORTFWD_RULE_PREFIX")
                .unwrap_or_else(|| "port-forwarding-".to_string()),
            services_path: lookup("PORTFWD_SERVICES_PATH")
                .unwrap_or_else(|| "/var/lib/portfwd/services.json".to_string()),
            annotation_prefix: lookup("PORTFWD_ANNOTATION_PREFIX")
                .unwrap_or_else(|| "port-forwarding.lylefranklin.com".to_string()),
            resync_interval_secs,
            log_level: lookup("PORTFWD_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks required variables per router type, numeric ranges and the
    /// log level, then defers to the library's own validation.
    fn validate(&self) -> Result<()> {
        match self.router_type.as_str() {
            "unifi" => {
                if self.unifi_url.as_ref().is_none_or(|u| u.is_empty()) {
                    anyhow::bail!(
                        "PORTFWD_UNIFI_URL is required when PORTFWD_ROUTER_TYPE=unifi. \
                        Set it via: export PORTFWD_UNIFI_URL=https://unifi.local:8443"
                    );
                }
                if self.unifi_username.as_ref().is_none_or(|u| u.is_empty()) {
                    anyhow::bail!("PORTFWD_UNIFI_USERNAME is required when PORTFWD_ROUTER_TYPE=unifi");
                }
                if self.unifi_password.as_ref().is_none_or(|p| p.is_empty()) {
                    anyhow::bail!("PORTFWD_UNIFI_PASSWORD is required when PORTFWD_ROUTER_TYPE=unifi");
                }
            }
            "memory" => {}
            _ => anyhow::bail!(
                "PORTFWD_ROUTER_TYPE '{}' is not supported. \
                Supported types: unifi, memory",
                self.router_type
            ),
        }

        if self.services_path.is_empty() {
            anyhow::bail!("PORTFWD_SERVICES_PATH cannot be empty");
        }

        if !(5..=3600).contains(&self.resync_interval_secs) {
            anyhow::bail!(
                "PORTFWD_RESYNC_INTERVAL_SECS must be between 5 and 3600 seconds. Got: {}",
                self.resync_interval_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "PORTFWD_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.to_core_config().validate()?;
        Ok(())
    }

    /// Build the library configuration
    fn to_core_config(&self) -> PortForwardConfig {
        let router = match self.router_type.as_str() {
            "unifi" => RouterConfig::Unifi {
                controller_url: self.unifi_url.clone().unwrap_or_default(),
                username: self.unifi_username.clone().unwrap_or_default(),
                password: self.unifi_password.clone().unwrap_or_default(),
                accept_invalid_certs: self.unifi_insecure,
            },
            _ => RouterConfig::Memory,
        };

        PortForwardConfig {
            rule_prefix: self.rule_prefix.clone(),
            router,
            annotations: AnnotationConfig::new(&self.annotation_prefix),
            services: ServiceStoreConfig::File {
                path: self.services_path.clone(),
            },
            controller: ControllerConfig {
                resync_interval_secs: self.resync_interval_secs,
                ..ControllerConfig::default()
            },
        }
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return PortfwdExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return PortfwdExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PortfwdExitCode::ConfigError.into();
    }

    info!("Starting portfwdd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PortfwdExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config.to_core_config()).await {
            error!("Daemon error: {}", e);
            PortfwdExitCode::RuntimeError
        } else {
            PortfwdExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: PortForwardConfig) -> Result<()> {
    let registry = StoreRegistry::with_builtins();

    #[cfg(feature = "unifi")]
    {
        debug!("Registering UniFi rule store");
        portfwd_unifi::register(&registry);
    }

    info!("Router type: {}", config.router.type_name());
    info!("Rule prefix: {}", config.rule_prefix);

    let store = registry.create_store(&config.router)?;
    let reconciler = Reconciler::new(&config.rule_prefix, store)
        .with_logger(Box::new(TracingChangeLogger));

    let services = portfwd_core::service::open_store(&config.services).await?;

    let (controller, mut events) = ServiceController::new(
        Arc::new(reconciler),
        services,
        config.annotations.clone(),
        &config.controller,
    )?;

    // Drain controller events into the log
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ControllerEvent::ServiceFailed { service, error } => {
                    warn!("Service {} will be retried on next resync: {}", service, error);
                }
                other => debug!("Controller event: {:?}", other),
            }
        }
    });

    controller
        .run_until(async {
            match wait_for_shutdown().await {
                Ok(signal) => info!("Received shutdown signal: {}", signal),
                Err(e) => error!("Shutdown error: {}", e),
            }
        })
        .await?;

    drop(controller);
    let _ = event_task.await;

    info!("Shutting down daemon");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
