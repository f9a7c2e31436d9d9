//! Execution configuration
//!
//! Defaults match the reference limits (5 s budget, 10,000 characters).
//! [`ExecutionConfig::load`] overlays an optional TOML file and then
//! `JSRUNNER_*` environment variables, e.g. `JSRUNNER_EXECUTION_TIMEOUT_MS`.

use std::path::Path;
use std::time::Duration;

use jsrunner_protocol::{DEFAULT_EXECUTION_TIMEOUT_MS, DEFAULT_MAX_SCRIPT_LENGTH};
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "JSRUNNER";

/// How the wrapped script reports its serialized value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultChannel {
    /// The evaluation's own return value
    #[default]
    Return,
    /// `JsBridge.onResult`, with `undefined` returned
    Bridge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock budget per run, in milliseconds
    pub execution_timeout_ms: u64,
    /// Maximum script length in characters
    pub max_script_length: usize,
    pub result_channel: ResultChannel,
    /// Report `console.error` as a log line instead of a script error
    pub split_console_errors: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            execution_timeout_ms: DEFAULT_EXECUTION_TIMEOUT_MS,
            max_script_length: DEFAULT_MAX_SCRIPT_LENGTH,
            result_channel: ResultChannel::Return,
            split_console_errors: true,
        }
    }
}

impl ExecutionConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    /// Load from an optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        Self::load_layers(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_layers(path: Option<&Path>, env: config::Environment) -> Result<Self, EngineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(env.try_parsing(true));

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        tracing::debug!(config = ?loaded, "Loaded execution config");
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.execution_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "execution_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.max_script_length == 0 {
            return Err(EngineError::InvalidConfig(
                "max_script_length must be greater than zero".into(),
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
    fn config_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.execution_timeout_ms, 5_000);
        assert_eq!(config.max_script_length, 10_000);
        assert_eq!(config.result_channel, ResultChannel::Return);
        assert!(config.split_console_errors);
        assert_eq!(config.execution_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "execution_timeout_ms = 250\nresult_channel = \"bridge\"\nsplit_console_errors = false"
        )
        .unwrap();

        let config = ExecutionConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.execution_timeout_ms, 250);
        assert_eq!(config.max_script_length, 10_000);
        assert_eq!(config.result_channel, ResultChannel::Bridge);
        assert!(!config.split_console_errors);
    }

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<config::Map<String, String>>();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(vars))
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ExecutionConfig::load_layers(
            None,
            env(&[
                ("JSRUNNER_EXECUTION_TIMEOUT_MS", "750"),
                ("JSRUNNER_SPLIT_CONSOLE_ERRORS", "false"),
                ("UNRELATED_MAX_SCRIPT_LENGTH", "3"),
            ]),
        )
        .unwrap();
        assert_eq!(config.execution_timeout_ms, 750);
        assert!(!config.split_console_errors);
        assert_eq!(config.max_script_length, 10_000);
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "execution_timeout_ms = 250\nmax_script_length = 64").unwrap();

        let config = ExecutionConfig::load_layers(
            Some(file.path()),
            env(&[("JSRUNNER_EXECUTION_TIMEOUT_MS", "900")]),
        )
        .unwrap();
        assert_eq!(config.execution_timeout_ms, 900);
        assert_eq!(config.max_script_length, 64);
    }

    #[test]
    fn invalid_environment_value_is_rejected() {
        let result = ExecutionConfig::load_layers(None, env(&[("JSRUNNER_EXECUTION_TIMEOUT_MS", "0")]));
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = ExecutionConfig::load(Some(Path::new("/nonexistent/jsrunner.toml")));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = ExecutionConfig {
            execution_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }
}
