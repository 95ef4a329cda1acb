//! Daemon configuration.
//!
//! Loaded from TOML. Lookup order: an explicit path, `$RELAY_CONFIG`, then
//! `<config_dir>/relay/config.toml`. A missing default file means defaults;
//! a missing explicit file is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::{DiffMode, SessionId};
use relay_tmux::TmuxConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::session::SessionSettings;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "RELAY_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level relay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Wait between a send (or start) and the capture that follows it
    pub capture_delay_ms: u64,
    /// Period of the session liveness probe
    pub liveness_interval_ms: u64,
    /// Broadcast buffer for session and outbound events
    pub event_buffer: usize,
    /// Mailbox size of each session actor
    pub command_buffer: usize,
    pub diff_mode: DiffMode,
    pub tmux: TmuxConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capture_delay_ms: 3000,
            liveness_interval_ms: 5000,
            event_buffer: 100,
            command_buffer: 100,
            diff_mode: DiffMode::default(),
            tmux: TmuxConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Resolves and loads the configuration.
    ///
    /// `explicit` and `$RELAY_CONFIG` must point at a readable file. The
    /// per-user default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::load_from(explicit, env_path.as_deref(), default_config_path().as_deref())
    }

    fn load_from(
        explicit: Option<&Path>,
        env_path: Option<&Path>,
        default_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit.or(env_path) {
            debug!(path = %path.display(), "Loading config");
            return Self::from_file(path);
        }

        match default_path {
            Some(path) if path.is_file() => {
                debug!(path = %path.display(), "Loading default config");
                Self::from_file(path)
            }
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "capture_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.liveness_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "liveness_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.event_buffer == 0 || self.command_buffer == 0 {
            return Err(ConfigError::Invalid(
                "event_buffer and command_buffer must be greater than 0".to_string(),
            ));
        }
        if self.tmux.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("tmux.binary must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn capture_delay(&self) -> Duration {
        Duration::from_millis(self.capture_delay_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    /// Per-session settings for the given instance.
    pub fn session_settings(&self, id: &SessionId) -> SessionSettings {
        SessionSettings {
            tmux_name: id.tmux_name(&self.tmux.session_prefix),
            command: self.tmux.command.clone(),
            capture_delay: self.capture_delay(),
            liveness_interval: self.liveness_interval(),
            scrollback_lines: self.tmux.scrollback_lines,
            diff_mode: self.diff_mode,
            command_buffer: self.command_buffer,
            event_buffer: self.event_buffer,
        }
    }
}

/// `<config_dir>/relay/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("relay").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.capture_delay(), Duration::from_secs(3));
        assert_eq!(config.liveness_interval(), Duration::from_secs(5));
        assert_eq!(config.diff_mode, DiffMode::LineCount);
        assert_eq!(config.tmux.command, "claude");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = RelayConfig::from_toml(
            r#"
            capture_delay_ms = 500
            diff_mode = "strict"

            [tmux]
            session_prefix = "cc-"
            scrollback_lines = 300
            "#,
        )
        .unwrap();
        assert_eq!(config.capture_delay_ms, 500);
        assert_eq!(config.liveness_interval_ms, 5000);
        assert_eq!(config.diff_mode, DiffMode::Strict);
        assert_eq!(config.tmux.session_prefix, "cc-");
        assert_eq!(config.tmux.binary, "tmux");
        assert_eq!(config.tmux.scrollback_lines, Some(300));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = RelayConfig::from_toml("capture_delay_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = RelayConfig::from_toml("capture_delay_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "liveness_interval_ms = 1000").unwrap();

        let config = RelayConfig::load_from(Some(file.path()), None, None).unwrap();
        assert_eq!(config.liveness_interval_ms, 1000);
    }

    #[test]
    fn test_explicit_path_wins_over_env() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit.toml");
        let env = dir.path().join("env.toml");
        std::fs::write(&explicit, "event_buffer = 7").unwrap();
        std::fs::write(&env, "event_buffer = 9").unwrap();

        let config = RelayConfig::load_from(Some(&explicit), Some(&env), None).unwrap();
        assert_eq!(config.event_buffer, 7);

        let config = RelayConfig::load_from(None, Some(&env), None).unwrap();
        assert_eq!(config.event_buffer, 9);
    }

    #[test]
    fn test_missing_default_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("relay").join("config.toml");
        let config = RelayConfig::load_from(None, None, Some(&missing)).unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = RelayConfig::load_from(Some(&missing), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_session_settings() {
        let config = RelayConfig::default();
        let settings = config.session_settings(&SessionId::new("alpha"));
        assert_eq!(settings.tmux_name, "relay-alpha");
        assert_eq!(settings.capture_delay, Duration::from_secs(3));
    }
}
