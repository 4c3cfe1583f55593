//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config = Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!(
                "Configuration file not found at {}, using defaults",
                path.display()
            );
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let env = Self::env_layer(|key| std::env::var(key).ok())?;
        let config = Self::layer(env, None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with the file (if present) layered over
    /// environment variables, layered over defaults
    pub fn load_layered(path: &Path) -> Result<Config> {
        let env = Self::env_layer(|key| std::env::var(key).ok())?;

        let file = if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?,
            )
        } else {
            tracing::info!(
                "Configuration file not found at {}, using environment and defaults",
                path.display()
            );
            None
        };

        let config = Self::layer(env, file.as_deref())
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        config
            .validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }

    /// Overlay `file` on top of `env` and deserialize the result
    fn layer(env: toml::Table, file: Option<&str>) -> Result<Config> {
        let mut table = env;
        if let Some(content) = file {
            merge_tables(&mut table, content.parse::<toml::Table>()?);
        }
        Ok(toml::Value::Table(table).try_into()?)
    }

    /// Collect `PRESENCE_*` variables into a partial config table
    fn env_layer(lookup: impl Fn(&str) -> Option<String>) -> Result<toml::Table> {
        let mut server = toml::Table::new();
        let mut monitoring = toml::Table::new();

        if let Some(bind_addr) = lookup("PRESENCE_BIND_ADDR") {
            bind_addr
                .parse::<SocketAddr>()
                .with_context(|| format!("Invalid PRESENCE_BIND_ADDR: {}", bind_addr))?;
            server.insert("bind_addr".into(), bind_addr.into());
        }

        if let Some(timeout) = lookup("PRESENCE_KEEPALIVE_TIMEOUT") {
            humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid PRESENCE_KEEPALIVE_TIMEOUT: {}", timeout))?;
            server.insert("keepalive_timeout".into(), timeout.into());
        }

        if let Some(interval) = lookup("PRESENCE_SWEEP_INTERVAL") {
            humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid PRESENCE_SWEEP_INTERVAL: {}", interval))?;
            server.insert("sweep_interval".into(), interval.into());
        }

        if let Some(log_level) = lookup("PRESENCE_LOG_LEVEL") {
            monitoring.insert("log_level".into(), log_level.into());
        }

        let mut table = toml::Table::new();
        table.insert("server".into(), toml::Value::Table(server));
        table.insert("monitoring".into(), toml::Value::Table(monitoring));
        Ok(table)
    }
}

/// Recursively overlay `overlay` onto `base`; keys in `overlay` win
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(section) => match base.get_mut(&key) {
                Some(toml::Value::Table(base_section)) => merge_tables(base_section, section),
                _ => {
                    base.insert(key, toml::Value::Table(section));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_console_config()
            .with_context(|| "Console configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        let server = &self.server;

        if server.keepalive_timeout.is_zero() {
            bail!("keepalive_timeout must be greater than 0");
        }

        if server.keepalive_timeout > Duration::from_secs(3600) {
            bail!("keepalive_timeout cannot exceed 1 hour");
        }

        if server.sweep_interval.is_zero() {
            bail!("sweep_interval must be greater than 0");
        }

        if server.sweep_interval > server.keepalive_timeout {
            bail!("sweep_interval cannot exceed keepalive_timeout");
        }

        if server.buffer_size < 64 {
            bail!("buffer_size must be at least 64 bytes");
        }

        if server.buffer_size > 1_048_576 {
            bail!("buffer_size cannot exceed 1MB");
        }

        Ok(())
    }

    fn validate_console_config(&self) -> Result<()> {
        if self.console.render_queue_capacity == 0 {
            bail!("render_queue_capacity must be greater than 0");
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.monitoring.log_level.as_str()) {
            bail!(
                "monitoring.log_level must be one of: {}",
                VALID_LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        keepalive_timeout_ms: Option<u64>,
        sweep_interval_ms: Option<u64>,
        no_console: bool,
    ) {
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(timeout_ms) = keepalive_timeout_ms {
            self.server.keepalive_timeout = Duration::from_millis(timeout_ms);
            tracing::info!("CLI override: keep-alive timeout set to {}ms", timeout_ms);
        }

        if let Some(interval_ms) = sweep_interval_ms {
            self.server.sweep_interval = Duration::from_millis(interval_ms);
            tracing::info!("CLI override: sweep interval set to {}ms", interval_ms);
        } else if keepalive_timeout_ms.is_some()
            && self.server.sweep_interval > self.server.keepalive_timeout
        {
            self.server.sweep_interval = self.server.keepalive_timeout;
            tracing::info!(
                "CLI override: sweep interval capped at the keep-alive timeout ({:?})",
                self.server.keepalive_timeout
            );
        }

        if no_console {
            self.console.enabled = false;
            tracing::info!("CLI override: operator console disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.keepalive_timeout, Duration::from_millis(10_000));
        assert_eq!(config.server.sweep_interval, Duration::from_millis(250));
        assert_eq!(config.server.bind_addr.port(), 1337);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = ConfigManager::parse(
            r#"
            [server]
            bind_addr = "127.0.0.1:4000"
            keepalive_timeout = "2s"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind_addr.port(), 4000);
        assert_eq!(config.server.keepalive_timeout, Duration::from_secs(2));
        assert_eq!(config.server.buffer_size, 1024);
        assert!(config.console.enabled);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nsweep_interval = \"100ms\"\n[console]\nenabled = false"
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.sweep_interval, Duration::from_millis(100));
        assert!(!config.console.enabled);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.buffer_size, 1024);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nkeepalive_timeout = \"0s\"").unwrap();

        assert!(ConfigManager::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_validation_rules() {
        let mut config = Config::default();
        config.server.sweep_interval = Duration::from_secs(20);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.buffer_size = 16;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.console.render_queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitoring.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_with_cli_args() {
        let mut config = Config::default();
        config.merge_with_cli_args(Some("127.0.0.1:9000"), Some(9100), Some(2000), None, true);

        assert_eq!(config.server.bind_addr, "127.0.0.1:9100".parse().unwrap());
        assert_eq!(config.server.keepalive_timeout, Duration::from_millis(2000));
        assert!(!config.console.enabled);
    }

    #[test]
    fn test_short_cli_timeout_caps_sweep_interval() {
        let mut config = Config::default();
        config.merge_with_cli_args(None, None, Some(200), None, false);

        assert_eq!(config.server.sweep_interval, Duration::from_millis(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_sweep_interval_override() {
        let mut config = Config::default();
        config.merge_with_cli_args(None, None, Some(200), Some(50), false);
        assert_eq!(config.server.sweep_interval, Duration::from_millis(50));
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.merge_with_cli_args(None, None, Some(200), Some(500), false);
        assert!(config.validate().is_err());
    }

    fn env(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn test_env_layer_applies_without_file() {
        let layer = ConfigManager::env_layer(env(&[
            ("PRESENCE_KEEPALIVE_TIMEOUT", "2500ms"),
            ("PRESENCE_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        let config = ConfigManager::layer(layer, None).unwrap();
        assert_eq!(config.server.keepalive_timeout, Duration::from_millis(2500));
        assert_eq!(config.server.sweep_interval, Duration::from_millis(250));
        assert_eq!(config.monitoring.log_level, "debug");
    }

    #[test]
    fn test_file_overrides_env_per_key() {
        let layer = ConfigManager::env_layer(env(&[
            ("PRESENCE_BIND_ADDR", "127.0.0.1:7000"),
            ("PRESENCE_KEEPALIVE_TIMEOUT", "5s"),
        ]))
        .unwrap();

        let config = ConfigManager::layer(
            layer,
            Some("[server]\nkeepalive_timeout = \"3s\"\n[console]\nenabled = false"),
        )
        .unwrap();

        assert_eq!(config.server.keepalive_timeout, Duration::from_secs(3));
        assert_eq!(config.server.bind_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.server.buffer_size, 1024);
        assert!(!config.console.enabled);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        assert!(ConfigManager::env_layer(env(&[("PRESENCE_SWEEP_INTERVAL", "soon")])).is_err());
        assert!(ConfigManager::env_layer(env(&[("PRESENCE_BIND_ADDR", "nowhere")])).is_err());
    }

    #[test]
    fn test_load_layered_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbuffer_size = 2048").unwrap();

        let config = ConfigManager::load_layered(file.path()).unwrap();
        assert_eq!(config.server.buffer_size, 2048);
    }

    #[test]
    fn test_merge_ignores_invalid_bind() {
        let mut config = Config::default();
        config.merge_with_cli_args(Some("not-an-address"), None, None, None, false);
        assert_eq!(config.server.bind_addr.port(), 1337);
        assert!(config.console.enabled);
    }
}
