use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

/// Base name of the optional config file (`controller.toml`, `controller.yaml`, ...)
const CONFIG_FILE: &str = "controller";

#[derive(Clone, Debug, Deserialize)]
pub struct ControllerConfig {
    /// Container image used by the scan Job and CronJob
    pub scan_image: String,

    /// Restrict the controller to one namespace, all namespaces if unset
    #[serde(default)]
    pub watch_namespace: Option<String>,

    /// Deadline for a single reconcile invocation
    pub reconcile_timeout_secs: u64,

    /// Periodic resync after a successful reconcile
    pub resync_interval_secs: u64,

    /// Requeue delay for retryable errors
    pub retry_interval_secs: u64,

    /// Requeue delay for invalid or fatal errors
    pub invalid_interval_secs: u64,
}

impl ControllerConfig {
    /// Load defaults, then `controller.*` if present, then environment variables
    pub fn load() -> Result<Self> {
        Self::layered(
            ::config::File::with_name(CONFIG_FILE).required(false),
            ::config::Environment::default(),
        )
    }

    fn layered<F>(file: F, environment: ::config::Environment) -> Result<Self>
    where
        F: ::config::Source + Send + Sync + 'static,
    {
        let builder = Self::defaults()?
            .add_source(file)
            .add_source(environment.try_parsing(true));
        Self::from_builder(builder)
    }

    fn defaults() -> Result<::config::ConfigBuilder<::config::builder::DefaultState>> {
        Ok(::config::Config::builder()
            .set_default("scan_image", "busybox")?
            .set_default("reconcile_timeout_secs", 30)?
            .set_default("resync_interval_secs", 3600)?
            .set_default("retry_interval_secs", 10)?
            .set_default("invalid_interval_secs", 300)?)
    }

    fn from_builder(builder: ::config::ConfigBuilder<::config::builder::DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scan_image.trim().is_empty() {
            return Err(Error::ConfigError("scan_image must not be empty".to_string()));
        }
        for (key, value) in [
            ("reconcile_timeout_secs", self.reconcile_timeout_secs),
            ("resync_interval_secs", self.resync_interval_secs),
            ("retry_interval_secs", self.retry_interval_secs),
            ("invalid_interval_secs", self.invalid_interval_secs),
        ] {
            if value == 0 {
                return Err(Error::ConfigError(format!("{} must be greater than zero", key)));
            }
        }
        Ok(())
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn invalid_interval(&self) -> Duration {
        Duration::from_secs(self.invalid_interval_secs)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scan_image: "busybox".to_string(),
            watch_namespace: None,
            reconcile_timeout_secs: 30,
            resync_interval_secs: 3600,
            retry_interval_secs: 10,
            invalid_interval_secs: 300,
        }
    }
}
