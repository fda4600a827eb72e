//! Configuration management.

use crate::access::{AccessReviewer, HttpAccessReviewer};
use crate::error::{AuthzError, ErrorCode, Result};
use crate::telemetry::LoggingConfig;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable prefix, e.g. `DBAAS_AUTHZ__CONTROLLER__MAX_CONCURRENT_RECONCILES`.
pub const ENV_PREFIX: &str = "DBAAS_AUTHZ";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Scheduling configuration
    #[serde(default)]
    pub controller: ControllerSettings,

    /// Operator installation
    #[serde(default)]
    pub operator: OperatorSettings,

    /// Authorization query endpoint
    #[serde(default)]
    pub access_review: AccessReviewSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerSettings {
    /// Reconciles allowed to run at once
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,

    /// First requeue delay after a failure
    #[serde(default = "default_requeue_base_delay", with = "humantime_serde")]
    pub requeue_base_delay: Duration,

    /// Upper bound on the requeue delay
    #[serde(default = "default_requeue_max_delay", with = "humantime_serde")]
    pub requeue_max_delay: Duration,

    /// How long a key waits for a worker before it is requeued
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,

    /// How long shutdown waits for in-flight reconciles
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            requeue_base_delay: default_requeue_base_delay(),
            requeue_max_delay: default_requeue_max_delay(),
            acquire_timeout: default_acquire_timeout(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorSettings {
    /// Namespace the operator runs in; the default config lives here
    #[serde(default = "default_install_namespace")]
    pub install_namespace: String,

    /// Create the `cluster` config when the install namespace has none
    #[serde(default = "default_create_default_config")]
    pub create_default_config: bool,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            install_namespace: default_install_namespace(),
            create_default_config: default_create_default_config(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessReviewSettings {
    /// API server base URL. Unset means a static reviewer is used.
    pub endpoint: Option<String>,

    /// Bearer token sent with each review
    pub bearer_token: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_review_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for AccessReviewSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            bearer_token: None,
            timeout: default_review_timeout(),
        }
    }
}

impl AccessReviewSettings {
    /// Build the HTTP reviewer, or `None` when no endpoint is configured.
    pub fn http_reviewer(&self) -> Result<Option<Arc<dyn AccessReviewer>>> {
        match &self.endpoint {
            Some(endpoint) => {
                let reviewer =
                    HttpAccessReviewer::new(endpoint, self.bearer_token.clone(), self.timeout)?;
                Ok(Some(Arc::new(reviewer)))
            }
            None => Ok(None),
        }
    }
}

// Default value functions
fn default_max_concurrent_reconciles() -> usize { 6 }
fn default_requeue_base_delay() -> Duration { Duration::from_millis(5) }
fn default_requeue_max_delay() -> Duration { Duration::from_secs(1000) }
fn default_acquire_timeout() -> Duration { Duration::from_secs(30) }
fn default_shutdown_grace() -> Duration { Duration::from_secs(10) }
fn default_install_namespace() -> String { "openshift-dbaas-operator".to_string() }
fn default_create_default_config() -> bool { true }
fn default_review_timeout() -> Duration { Duration::from_secs(10) }

impl Settings {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` when given, otherwise from the environment alone.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::load(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let controller = &self.controller;
        if controller.max_concurrent_reconciles == 0 {
            return Err(invalid("controller.max_concurrent_reconciles must be at least 1"));
        }
        if controller.requeue_base_delay > controller.requeue_max_delay {
            return Err(invalid(format!(
                "controller.requeue_base_delay ({:?}) exceeds controller.requeue_max_delay ({:?})",
                controller.requeue_base_delay, controller.requeue_max_delay
            )));
        }
        if self.operator.install_namespace.is_empty() {
            return Err(invalid("operator.install_namespace must not be empty"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AuthzError {
    AuthzError::new(ErrorCode::InvalidConfiguration, message.into())
}
