//! Layered configuration for the device-side policy runtime.
//!
//! Sources are applied in order, each overriding the last:
//!
//! 1. **Defaults** baked into this crate
//! 2. **Config file**: `edgepolicy.toml` in the current directory, or
//!    `~/.config/edgepolicy/edgepolicy.toml`
//! 3. **Environment variables**: `EDGEPOLICY__<SECTION>__<KEY>`, e.g.
//!    `EDGEPOLICY__POLICY_SERVER__BASE_URL=https://policy.example.com`
//!
//! # Example edgepolicy.toml
//!
//! ```toml
//! [trust_store]
//! file_path = "/var/lib/edgepolicy/trust-store.json"
//!
//! [policy_server]
//! base_url = "https://policy.example.com"
//! poll_interval_secs = 60
//!
//! [scheduler]
//! tick_resolution_ms = 100
//!
//! [telemetry]
//! enabled = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Errors that can occur while assembling or validating the runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration for a device-side policy runtime process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub trust_store: TrustStoreConfig,
    pub policy_server: PolicyServerConfig,
    pub scheduler: SchedulerConfig,
    pub telemetry: TelemetryConfig,
}

/// Where the trust-store container lives and how a freshly provisioned store
/// should be seeded before activation sets an endpoint id and certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustStoreConfig {
    pub file_path: PathBuf,
    pub default_server_scheme: String,
    pub default_server_port: u16,
}

/// Cloud policy-server location and the remaining-retries delivery policy's
/// base backoff parameters (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyServerConfig {
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_secs: u64,
}

/// Tick resolution for the scheduled-window dispatcher that drives batch and
/// detect-duplicates window expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_resolution_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
    pub export_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            trust_store: TrustStoreConfig::default(),
            policy_server: PolicyServerConfig::default(),
            scheduler: SchedulerConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Default for TrustStoreConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("trust-store.json"),
            default_server_scheme: "https".to_string(),
            default_server_port: 443,
        }
    }
}

impl Default for PolicyServerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            poll_interval_secs: 60,
            backoff_initial_ms: 200,
            backoff_max_secs: 30,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_resolution_ms: 100 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "edgepolicy".to_string(),
            export_interval_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file locations and environment,
    /// validating the result before returning it.
    pub fn load() -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = config::Config::builder()
            .set_default("trust_store.file_path", defaults.trust_store.file_path.to_string_lossy().into_owned())?
            .set_default("trust_store.default_server_scheme", defaults.trust_store.default_server_scheme)?
            .set_default("trust_store.default_server_port", defaults.trust_store.default_server_port as i64)?
            .set_default("policy_server.base_url", defaults.policy_server.base_url)?
            .set_default("policy_server.poll_interval_secs", defaults.policy_server.poll_interval_secs as i64)?
            .set_default("policy_server.backoff_initial_ms", defaults.policy_server.backoff_initial_ms as i64)?
            .set_default("policy_server.backoff_max_secs", defaults.policy_server.backoff_max_secs as i64)?
            .set_default("scheduler.tick_resolution_ms", defaults.scheduler.tick_resolution_ms as i64)?
            .set_default("telemetry.enabled", defaults.telemetry.enabled)?
            .set_default("telemetry.otlp_endpoint", defaults.telemetry.otlp_endpoint)?
            .set_default("telemetry.service_name", defaults.telemetry.service_name)?
            .set_default("telemetry.export_interval_secs", defaults.telemetry.export_interval_secs as i64)?;

        if let Some(path) = Self::find_config_file() {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("EDGEPOLICY")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file, ignoring the standard
    /// search path and environment overrides. Used in tests and for
    /// explicit `--config` invocations.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from("edgepolicy.toml");
        if local.exists() {
            return Some(local);
        }

        let user = dirs::config_dir()?.join("edgepolicy").join("edgepolicy.toml");
        user.exists().then_some(user)
    }

    fn validate(&self) -> Result<()> {
        if self.policy_server.base_url.is_empty() {
            return Err(ConfigError::Validation(
                "policy_server.base_url must not be empty".to_string(),
            ));
        }

        if self.policy_server.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "policy_server.poll_interval_secs must be greater than zero".to_string(),
            ));
        }

        if self.policy_server.backoff_max_secs * 1000 < self.policy_server.backoff_initial_ms {
            return Err(ConfigError::Validation(
                "policy_server.backoff_max_secs must be at least backoff_initial_ms".to_string(),
            ));
        }

        if self.scheduler.tick_resolution_ms == 0 {
            return Err(ConfigError::Validation(
                "scheduler.tick_resolution_ms must be greater than zero".to_string(),
            ));
        }

        if self.trust_store.file_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "trust_store.file_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let toml_content = r#"
[policy_server]
base_url = "https://policy.example.com"
poll_interval_secs = 30

[scheduler]
tick_resolution_ms = 50
"#;
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.policy_server.base_url, "https://policy.example.com");
        assert_eq!(config.policy_server.poll_interval_secs, 30);
        assert_eq!(config.scheduler.tick_resolution_ms, 50);
        // untouched sections keep their defaults
        assert_eq!(config.telemetry.service_name, "edgepolicy");
    }

    #[test]
    fn rejects_empty_base_url() {
        let mut config = AppConfig::default();
        config.policy_server.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let mut config = AppConfig::default();
        config.policy_server.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_tick_resolution() {
        let mut config = AppConfig::default();
        config.scheduler.tick_resolution_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_backoff_max_below_initial() {
        let mut config = AppConfig::default();
        config.policy_server.backoff_initial_ms = 50_000;
        config.policy_server.backoff_max_secs = 1;
        assert!(config.validate().is_err());
    }
}
