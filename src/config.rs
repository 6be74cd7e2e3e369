//! Layered configuration
//!
//! Sources, lowest priority first:
//! 1. built-in defaults
//! 2. a TOML file (`molscript.toml` in the working directory, or the path in
//!    `MOLSCRIPT_CONFIG_PATH`, or an explicit builder path)
//! 3. environment variables prefixed `MOLSCRIPT_`, nested with `__`
//!    (`MOLSCRIPT_INTERPRETER__MAX_DEPTH=64`)
//!
//! A `.env` file is loaded into the environment first.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "molscript.toml";
const CONFIG_PATH_ENV: &str = "MOLSCRIPT_CONFIG_PATH";
const ENV_PREFIX: &str = "MOLSCRIPT";

/* ===================== Sections ===================== */

/// Engine limits and switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Frames allowed on the context stack before `TooManyLevels`
    pub max_depth: usize,
    /// Let `delay`/`pause`/`load` block inside the host instead of suspending
    pub host_can_block: bool,
    /// Log every dispatched statement at trace level
    pub trace_statements: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            host_can_block: true,
            trace_statements: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub interpreter: InterpreterConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from the default search locations
    pub fn load() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Render the effective configuration
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    fn validate(&self) -> Result<()> {
        if self.interpreter.max_depth == 0 {
            anyhow::bail!("interpreter.max_depth must be at least 1");
        }
        Ok(())
    }
}

/* ===================== Builder ===================== */

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
    skip_env: bool,
}

impl ConfigBuilder {
    /// Explicit TOML file; it must exist
    pub fn config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Ignore `MOLSCRIPT_*` variables and `.env`
    pub fn skip_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    pub fn build(self) -> Result<Config> {
        if !self.skip_env {
            let _ = dotenvy::dotenv();
        }

        let defaults = config::Config::try_from(&Config::default())
            .context("Failed to build default configuration")?;
        let mut builder = config::Config::builder().add_source(defaults);

        let explicit = self.config_path.or_else(|| {
            if self.skip_env {
                None
            } else {
                std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from)
            }
        });
        builder = match explicit {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                builder.add_source(config::File::from(path))
            }
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        if !self.skip_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: Config = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::builder().skip_env().build().unwrap();
        assert_eq!(config.interpreter.max_depth, 256);
        assert!(config.interpreter.host_can_block);
        assert!(!config.interpreter.trace_statements);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("molscript-test-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[interpreter]\nmax_depth = 12\nhost_can_block = false").unwrap();

        let config = Config::builder()
            .skip_env()
            .config_path(Some(path.clone()))
            .build()
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.interpreter.max_depth, 12);
        assert!(!config.interpreter.host_can_block);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = Config::builder()
            .skip_env()
            .config_path(Some(PathBuf::from("/nonexistent/molscript.toml")))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_to_toml() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[interpreter]"));
        assert!(rendered.contains("max_depth = 256"));
    }
}
