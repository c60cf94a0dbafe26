//! Configuration loading and typed config structures for the containment layer.
//!
//! The canonical configuration lives in `warden-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads, validates, and applies
//! environment overrides to the file. Every section is independently
//! defaultable: an empty file yields a working fail-closed configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use warden_types::{FailMode, ThresholdConfig, WindowMetricThreshold};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The file parsed but a value is out of its permitted range.
    #[error("invalid config: {message}")]
    Invalid {
        /// What was wrong, in one line.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level containment configuration.
///
/// Mirrors the structure of `warden-config.yaml`. All fields have safe
/// defaults; in particular the fail mode defaults to `closed` and can never
/// silently become `open`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WardenConfig {
    /// Supervisor behavior (risk gate, validator timeout, maintenance).
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Action-rate thresholds.
    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    /// Short-window exfiltration caps.
    #[serde(default)]
    pub exfiltration: ExfiltrationConfig,

    /// Multi-window metric limits.
    #[serde(default)]
    pub windows: WindowsConfig,

    /// Validator failure behavior and the policy cache.
    #[serde(default)]
    pub fail_mode: FailModeConfig,

    /// Process kill timing.
    #[serde(default)]
    pub kill: KillConfig,

    /// Firewall backend selection.
    #[serde(default)]
    pub firewall: FirewallConfig,

    /// HTTP status surface.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WardenConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for deployment-varying
    /// settings:
    /// - `WARDEN_OBSERVER_PORT` overrides `observer.port`
    /// - `WARDEN_FIREWALL_BACKEND` overrides `firewall.backend`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override deployment-varying settings with environment variables when set.
    ///
    /// This allows containers (or any deployment) to vary the port and the
    /// firewall backend without modifying the YAML config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WARDEN_OBSERVER_PORT")
            && let Ok(port) = val.parse::<u16>()
        {
            self.observer.port = port;
        }
        if let Ok(val) = std::env::var("WARDEN_FIREWALL_BACKEND") {
            self.firewall.backend = val;
        }
    }

    /// Check every value against its permitted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for threshold in &self.thresholds.custom {
            validate_threshold(threshold)?;
        }
        for window in &self.windows.custom {
            if window.limit == 0 {
                return Err(invalid(format!(
                    "window limit for {}/{} must be >= 1",
                    window.metric.label(),
                    window.span.label()
                )));
            }
        }
        if self.exfiltration.window_seconds == 0 {
            return Err(invalid("exfiltration.window_seconds must be >= 1"));
        }
        if self.exfiltration.max_bytes == 0 {
            return Err(invalid("exfiltration.max_bytes must be >= 1"));
        }
        if self.exfiltration.max_targets == 0 {
            return Err(invalid("exfiltration.max_targets must be >= 1"));
        }
        if self.fail_mode.cache.ttl_seconds == 0 {
            return Err(invalid("fail_mode.cache.ttl_seconds must be >= 1"));
        }
        if self.fail_mode.cache.max_entries == 0 {
            return Err(invalid("fail_mode.cache.max_entries must be >= 1"));
        }
        if self.kill.soft_timeout_ms == 0 {
            return Err(invalid("kill.soft_timeout_ms must be >= 1"));
        }
        if self.kill.verify_interval_ms == 0 {
            return Err(invalid("kill.verify_interval_ms must be >= 1"));
        }
        if self.kill.max_verify_attempts == 0 {
            return Err(invalid("kill.max_verify_attempts must be >= 1"));
        }
        if !(0.0..=100.0).contains(&self.supervisor.block_risk_threshold) {
            return Err(invalid(
                "supervisor.block_risk_threshold must be between 0 and 100",
            ));
        }
        if !FIREWALL_BACKENDS.contains(&self.firewall.backend.as_str()) {
            return Err(invalid(format!(
                "firewall.backend must be one of {FIREWALL_BACKENDS:?}, got {:?}",
                self.firewall.backend
            )));
        }
        Ok(())
    }
}

/// Validate one threshold row against its permitted ranges.
///
/// Also used by the supervisor when thresholds are added at runtime.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the offending value.
pub fn validate_threshold(threshold: &ThresholdConfig) -> Result<(), ConfigError> {
    if threshold.name.is_empty() {
        return Err(invalid("threshold name must not be empty"));
    }
    if threshold.action_type.is_empty() {
        return Err(invalid(format!(
            "threshold {:?} must name an action_type",
            threshold.name
        )));
    }
    if threshold.max_count == 0 {
        return Err(invalid(format!(
            "threshold {:?}: max_count must be >= 1",
            threshold.name
        )));
    }
    if threshold.window_seconds == 0 {
        return Err(invalid(format!(
            "threshold {:?}: window_seconds must be >= 1",
            threshold.name
        )));
    }
    if threshold.kill_multiplier < 1.0 {
        return Err(invalid(format!(
            "threshold {:?}: kill_multiplier must be >= 1.0",
            threshold.name
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// Names accepted by `firewall.backend`.
pub const FIREWALL_BACKENDS: [&str; 5] = ["auto", "linux", "macos", "windows", "noop"];

/// Supervisor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupervisorConfig {
    /// Validator risk score at or above which an action is blocked.
    #[serde(default = "default_block_risk_threshold")]
    pub block_risk_threshold: f64,

    /// Milliseconds the validator gets before its failure path engages.
    #[serde(default = "default_validator_timeout_ms")]
    pub validator_timeout_ms: u64,

    /// Seconds between maintenance passes (cache persistence, idle pruning).
    #[serde(default = "default_maintenance_interval_seconds")]
    pub maintenance_interval_seconds: u64,

    /// Seconds of inactivity after which an agent's detection state is pruned.
    #[serde(default = "default_cleanup_idle_seconds")]
    pub cleanup_idle_seconds: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            block_risk_threshold: default_block_risk_threshold(),
            validator_timeout_ms: default_validator_timeout_ms(),
            maintenance_interval_seconds: default_maintenance_interval_seconds(),
            cleanup_idle_seconds: default_cleanup_idle_seconds(),
        }
    }
}

/// Action-rate threshold configuration.
///
/// When `custom` is empty the built-in default table is loaded (see
/// [`crate::thresholds::default_thresholds`]).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThresholdsConfig {
    /// Threshold rows replacing the default table.
    #[serde(default)]
    pub custom: Vec<ThresholdConfig>,
}

/// Short-window exfiltration caps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExfiltrationConfig {
    /// Length of the accumulation window in seconds.
    #[serde(default = "default_exfil_window_seconds")]
    pub window_seconds: u64,

    /// Windowed byte volume above which exfiltration is reported.
    #[serde(default = "default_exfil_max_bytes")]
    pub max_bytes: u64,

    /// Windowed distinct target count above which exfiltration is reported.
    #[serde(default = "default_exfil_max_targets")]
    pub max_targets: usize,
}

impl Default for ExfiltrationConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_exfil_window_seconds(),
            max_bytes: default_exfil_max_bytes(),
            max_targets: default_exfil_max_targets(),
        }
    }
}

/// Multi-window metric limit configuration.
///
/// When `custom` is empty the built-in default table is loaded (see
/// [`crate::window::default_window_thresholds`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WindowsConfig {
    /// Limit rows replacing the default table.
    #[serde(default)]
    pub custom: Vec<WindowMetricThreshold>,
}

/// Validator failure behavior and the policy cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FailModeConfig {
    /// What to do when the validator is unreachable. Defaults to `closed`;
    /// `open` must be written into the file deliberately.
    #[serde(default)]
    pub mode: FailMode,

    /// Policy cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Policy cache tuning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Seconds a cached decision stays replayable.
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Capacity bound; exceeding it evicts the oldest tenth.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Where the cache persists across restarts. `None` disables persistence.
    #[serde(default = "default_cache_path")]
    pub persist_path: Option<PathBuf>,

    /// Persist whenever the entry count is a multiple of this after an insert.
    #[serde(default = "default_cache_persist_every")]
    pub persist_every: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_seconds(),
            max_entries: default_cache_max_entries(),
            persist_path: default_cache_path(),
            persist_every: default_cache_persist_every(),
        }
    }
}

/// Process kill timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KillConfig {
    /// Grace period after the soft signal before escalating, in milliseconds.
    #[serde(default = "default_soft_timeout_ms")]
    pub soft_timeout_ms: u64,

    /// Liveness poll interval in milliseconds.
    #[serde(default = "default_verify_interval_ms")]
    pub verify_interval_ms: u64,

    /// Liveness polls after the hard signal before declaring a zombie.
    #[serde(default = "default_max_verify_attempts")]
    pub max_verify_attempts: u32,
}

impl Default for KillConfig {
    fn default() -> Self {
        Self {
            soft_timeout_ms: default_soft_timeout_ms(),
            verify_interval_ms: default_verify_interval_ms(),
            max_verify_attempts: default_max_verify_attempts(),
        }
    }
}

/// Firewall backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FirewallConfig {
    /// Backend name: `auto`, `linux`, `macos`, `windows`, or `noop`.
    /// `auto` resolves to the host platform at startup.
    #[serde(default = "default_firewall_backend")]
    pub backend: String,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            backend: default_firewall_backend(),
        }
    }
}

/// HTTP status surface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Whether the observer API is served at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind host.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). Used as the `EnvFilter`
    /// fallback when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_block_risk_threshold() -> f64 {
    75.0
}

const fn default_validator_timeout_ms() -> u64 {
    100
}

const fn default_maintenance_interval_seconds() -> u64 {
    60
}

const fn default_cleanup_idle_seconds() -> u64 {
    3_600
}

const fn default_exfil_window_seconds() -> u64 {
    300
}

const fn default_exfil_max_bytes() -> u64 {
    // 100 MB in a five-minute window.
    104_857_600
}

const fn default_exfil_max_targets() -> usize {
    1_000
}

const fn default_cache_ttl_seconds() -> u64 {
    60
}

const fn default_cache_max_entries() -> usize {
    10_000
}

fn default_cache_path() -> Option<PathBuf> {
    Some(PathBuf::from(".warden_policy_cache.json"))
}

const fn default_cache_persist_every() -> usize {
    100
}

const fn default_soft_timeout_ms() -> u64 {
    2_000
}

const fn default_verify_interval_ms() -> u64 {
    100
}

const fn default_max_verify_attempts() -> u32 {
    10
}

fn default_firewall_backend() -> String {
    "auto".to_owned()
}

fn default_observer_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_observer_port() -> u16 {
    8900
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use warden_types::ThresholdAction;

    #[test]
    fn default_config_is_valid_and_fail_closed() {
        let config = WardenConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fail_mode.mode, FailMode::Closed);
        assert_eq!(config.kill.soft_timeout_ms, 2_000);
        assert_eq!(config.exfiltration.max_bytes, 104_857_600);
        assert_eq!(config.firewall.backend, "auto");
    }

    #[test]
    fn parse_empty_yaml() {
        let config = WardenConfig::parse("");
        assert!(config.is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
supervisor:
  block_risk_threshold: 80.0
  validator_timeout_ms: 250
  maintenance_interval_seconds: 30
  cleanup_idle_seconds: 1800

thresholds:
  custom:
    - name: "Rapid File Access"
      action_type: file_read
      max_count: 50
      window_seconds: 60
      breach_action: block
      cooldown_seconds: 120
      kill_multiplier: 2.5

exfiltration:
  window_seconds: 600
  max_bytes: 52428800
  max_targets: 500

windows:
  custom:
    - metric: bytes_out
      span: 1h
      limit: 5000000
      action: alert
    - metric: bytes_out
      span: 24h
      limit: 20000000
      action: kill

fail_mode:
  mode: cached
  cache:
    ttl_seconds: 30
    max_entries: 5000
    persist_path: "/tmp/warden-cache.json"
    persist_every: 50

kill:
  soft_timeout_ms: 1000
  verify_interval_ms: 50
  max_verify_attempts: 20

firewall:
  backend: noop

observer:
  enabled: true
  host: "127.0.0.1"
  port: 9100

logging:
  level: debug
"#;
        let config = WardenConfig::parse(yaml).unwrap();
        assert!((config.supervisor.block_risk_threshold - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.thresholds.custom.len(), 1);
        assert_eq!(
            config.thresholds.custom.first().map(|t| t.breach_action),
            Some(ThresholdAction::Block)
        );
        assert_eq!(config.exfiltration.max_targets, 500);
        assert_eq!(config.windows.custom.len(), 2);
        assert_eq!(config.fail_mode.mode, FailMode::Cached);
        assert_eq!(config.fail_mode.cache.ttl_seconds, 30);
        assert_eq!(config.kill.max_verify_attempts, 20);
        assert_eq!(config.firewall.backend, "noop");
        assert_eq!(config.observer.port, 9100);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn parse_minimal_yaml_keeps_defaults() {
        let yaml = "fail_mode:\n  mode: cached\n";
        let config = WardenConfig::parse(yaml).unwrap();
        assert_eq!(config.fail_mode.mode, FailMode::Cached);
        // Everything else uses defaults.
        assert_eq!(config.fail_mode.cache.ttl_seconds, 60);
        assert_eq!(config.supervisor.validator_timeout_ms, 100);
        assert_eq!(config.observer.port, 8900);
    }

    #[test]
    fn zero_max_count_is_rejected() {
        let yaml = r#"
thresholds:
  custom:
    - name: "Broken"
      action_type: file_read
      max_count: 0
      window_seconds: 60
      breach_action: block
"#;
        let err = WardenConfig::parse(yaml);
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn low_kill_multiplier_is_rejected() {
        let threshold = ThresholdConfig {
            name: "Test".to_owned(),
            action_type: "file_read".to_owned(),
            max_count: 10,
            window_seconds: 60,
            breach_action: ThresholdAction::Block,
            cooldown_seconds: 60,
            kill_multiplier: 0.5,
        };
        assert!(validate_threshold(&threshold).is_err());
    }

    #[test]
    fn unknown_firewall_backend_is_rejected() {
        let yaml = "firewall:\n  backend: ipfw\n";
        let err = WardenConfig::parse(yaml);
        assert!(matches!(err, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("warden-config.yaml");
        if path.exists() {
            let config = WardenConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
