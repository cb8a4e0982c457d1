//! Configuration module for Fleetshell
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/fleetshell/fleetshell.toml)
//! - User configuration (~/.fleetshell.toml)
//! - Project configuration (./fleetshell.toml)
//! - Environment variables
//! - Command-line arguments (applied by the CLI)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::PtyRequest;
use crate::error::{Error, Result};
use crate::fleet::DEFAULT_MAX_CONCURRENCY;
use crate::metrics::MetricSpec;
use crate::terminal::{TerminalOptions, DEFAULT_READ_BUFFER};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Host store settings
    pub store: StoreConfig,

    /// SSH settings
    pub ssh: SshConfig,

    /// Fleet execution settings
    pub fleet: FleetConfig,

    /// Metrics polling settings
    pub metrics: MetricsConfig,

    /// Terminal bridge settings
    pub terminal: TerminalConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,

    /// Hosts per page in listings
    pub page_size: usize,

    /// Allow cross-origin requests from any origin
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            page_size: 4,
            cors_permissive: true,
        }
    }
}

/// Host store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding host records; in-memory only when unset
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("fleetshell-hosts.json")),
        }
    }
}

/// SSH settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// TCP connect + handshake + auth deadline in seconds
    pub connect_timeout_secs: u64,

    /// Trust any server host key instead of checking known_hosts
    pub accept_any_host_key: bool,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            accept_any_host_key: false,
        }
    }
}

/// Fleet execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Hosts executing at the same time
    pub max_concurrency: usize,

    /// Per-host connect + run deadline in seconds (0 disables)
    pub host_timeout_secs: u64,

    /// Stored hosts included in one fleet execution
    pub max_hosts: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            host_timeout_secs: 60,
            max_hosts: 100,
        }
    }
}

/// Metrics polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between cycles
    pub interval_secs: u64,

    /// Per-command deadline in seconds (0 disables)
    pub command_timeout_secs: u64,

    /// Diagnostic battery, in snapshot order
    pub commands: Vec<MetricSpec>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            command_timeout_secs: 10,
            commands: MetricSpec::defaults(),
        }
    }
}

/// Terminal bridge settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// TERM value for the pseudo-terminal
    pub term: String,

    /// Terminal width
    pub cols: u32,

    /// Terminal height
    pub rows: u32,

    /// Command to run instead of the login shell
    pub shell: Option<String>,

    /// Maximum bytes per output message
    pub read_buffer: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        let pty = PtyRequest::default();
        Self {
            term: pty.term,
            cols: pty.cols,
            rows: pty.rows,
            shell: None,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when neither `-v` nor RUST_LOG is given
    pub level: Option<String>,

    /// Emit JSON log lines
    pub json: bool,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut merged = serde_json::Value::Object(Default::default());

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                merge_values(&mut merged, Self::read_file(&path)?);
            }
        }

        let mut config: Config = serde_json::from_value(merged)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from a single file, ignoring the standard locations
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Config = serde_json::from_value(Self::read_file(path)?)
            .map_err(|e| Error::config_load(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the list of configuration file paths to check, lowest priority first
    fn get_config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        // Explicit path takes priority
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        if let Ok(env_config) = std::env::var("FLEETSHELL_CONFIG") {
            return vec![PathBuf::from(env_config)];
        }

        let mut paths = vec![PathBuf::from("/etc/fleetshell/fleetshell.toml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".fleetshell.toml"));
        }

        paths.push(PathBuf::from("fleetshell.toml"));
        paths
    }

    /// Parse one file into a generic value tree
    fn read_file(path: &Path) -> Result<serde_json::Value> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config_load(path, e.to_string()))?;

        // Determine format based on extension
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let parsed = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
            _ => toml::from_str(&content).map_err(|e| e.to_string()),
        };

        match parsed.map_err(|message| Error::config_load(path, message))? {
            // An empty YAML document
            serde_json::Value::Null => Ok(serde_json::Value::Object(Default::default())),
            value => Ok(value),
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // FLEETSHELL_BIND
        if let Ok(bind) = std::env::var("FLEETSHELL_BIND") {
            self.server.bind = bind;
        }

        // FLEETSHELL_STORE
        if let Ok(path) = std::env::var("FLEETSHELL_STORE") {
            self.store.path = Some(PathBuf::from(path));
        }

        // FLEETSHELL_MAX_CONCURRENCY
        if let Ok(value) = std::env::var("FLEETSHELL_MAX_CONCURRENCY") {
            if let Ok(n) = value.parse() {
                self.fleet.max_concurrency = n;
            }
        }

        // FLEETSHELL_HOST_TIMEOUT
        if let Ok(value) = std::env::var("FLEETSHELL_HOST_TIMEOUT") {
            if let Ok(n) = value.parse() {
                self.fleet.host_timeout_secs = n;
            }
        }

        // FLEETSHELL_METRICS_INTERVAL
        if let Ok(value) = std::env::var("FLEETSHELL_METRICS_INTERVAL") {
            if let Ok(n) = value.parse() {
                self.metrics.interval_secs = n;
            }
        }

        // FLEETSHELL_ACCEPT_ANY_HOST_KEY
        if let Ok(value) = std::env::var("FLEETSHELL_ACCEPT_ANY_HOST_KEY") {
            self.ssh.accept_any_host_key = parse_flag(&value);
        }

        // FLEETSHELL_LOG_JSON
        if let Ok(value) = std::env::var("FLEETSHELL_LOG_JSON") {
            self.logging.json = parse_flag(&value);
        }
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.fleet.max_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "fleet.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.server.page_size == 0 {
            return Err(Error::InvalidConfig(
                "server.page_size must be at least 1".to_string(),
            ));
        }
        if self.terminal.read_buffer == 0 {
            return Err(Error::InvalidConfig(
                "terminal.read_buffer must be at least 1".to_string(),
            ));
        }
        if self.metrics.commands.is_empty() {
            return Err(Error::InvalidConfig(
                "metrics.commands must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Host store file with a leading `~` expanded
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store
            .path
            .as_ref()
            .map(|path| PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref()))
    }

    /// Per-host fleet deadline
    pub fn host_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.fleet.host_timeout_secs)
    }

    /// Sleep between metric cycles
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics.interval_secs)
    }

    /// Per-command metrics deadline
    pub fn metrics_command_timeout(&self) -> Option<Duration> {
        non_zero_secs(self.metrics.command_timeout_secs)
    }

    /// Terminal bridge options
    pub fn terminal_options(&self) -> TerminalOptions {
        TerminalOptions {
            pty: PtyRequest {
                term: self.terminal.term.clone(),
                cols: self.terminal.cols,
                rows: self.terminal.rows,
                ..PtyRequest::default()
            },
            shell: self.terminal.shell.clone(),
            read_buffer: self.terminal.read_buffer,
        }
    }

    /// SSH connector options
    #[cfg(feature = "russh")]
    pub fn ssh_options(&self) -> crate::connection::SshOptions {
        crate::connection::SshOptions {
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs.max(1)),
            accept_any_host_key: self.ssh.accept_any_host_key,
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Recursively merge `other` into `base`; tables merge key by key, anything else is replaced
fn merge_values(base: &mut serde_json::Value, other: serde_json::Value) {
    match (base, other) {
        (serde_json::Value::Object(base), serde_json::Value::Object(other)) => {
            for (key, value) in other {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, other) => *base = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKey;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_store_path_expands_home() {
        let mut config = Config::default();
        config.store.path = Some(PathBuf::from("~/fleet/hosts.json"));

        let expanded = config.store_path().unwrap();
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("fleet/hosts.json"));

        config.store.path = None;
        assert_eq!(config.store_path(), None);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fleet.max_concurrency, 16);
        assert_eq!(config.fleet.max_hosts, 100);
        assert_eq!(config.server.page_size, 4);
        assert_eq!(config.metrics.interval_secs, 5);
        assert!(!config.ssh.accept_any_host_key);
        assert_eq!(config.metrics.commands.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_values_keeps_untouched_keys() {
        let mut base = serde_json::json!({"fleet": {"max_concurrency": 4, "max_hosts": 10}});
        merge_values(&mut base, serde_json::json!({"fleet": {"max_hosts": 50}}));
        assert_eq!(base, serde_json::json!({"fleet": {"max_concurrency": 4, "max_hosts": 50}}));
    }

    #[test]
    fn test_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[fleet]
max_concurrency = 4

[[metrics.commands]]
key = "uptime"
command = "cat /proc/uptime"

[terminal]
shell = "/bin/bash -l"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.fleet.max_concurrency, 4);
        assert_eq!(config.fleet.host_timeout_secs, 60);
        assert_eq!(config.metrics.commands.len(), 1);
        assert_eq!(config.metrics.commands[0].key, MetricKey::Uptime);
        assert_eq!(
            config.terminal_options().shell.as_deref(),
            Some("/bin/bash -l")
        );
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "ssh:\n  accept_any_host_key: true\n  connect_timeout_secs: 3").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.ssh.accept_any_host_key);
        assert_eq!(config.ssh.connect_timeout_secs, 3);
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, "{{ not json").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.fleet.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_disable() {
        let mut config = Config::default();
        config.fleet.host_timeout_secs = 0;
        config.metrics.command_timeout_secs = 0;
        assert_eq!(config.host_timeout(), None);
        assert_eq!(config.metrics_command_timeout(), None);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("FLEETSHELL_MAX_CONCURRENCY", "3");
        std::env::set_var("FLEETSHELL_ACCEPT_ANY_HOST_KEY", "true");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.fleet.max_concurrency, 3);
        assert!(config.ssh.accept_any_host_key);
        std::env::remove_var("FLEETSHELL_MAX_CONCURRENCY");
        std::env::remove_var("FLEETSHELL_ACCEPT_ANY_HOST_KEY");
    }

    #[test]
    #[serial]
    fn test_explicit_path_wins_over_env() {
        std::env::set_var("FLEETSHELL_CONFIG", "/nonexistent/fleetshell.toml");
        let explicit = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(
            Config::get_config_paths(Some(&explicit)),
            vec![explicit.clone()]
        );
        assert_eq!(
            Config::get_config_paths(None),
            vec![PathBuf::from("/nonexistent/fleetshell.toml")]
        );
        std::env::remove_var("FLEETSHELL_CONFIG");
    }
}
