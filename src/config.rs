//! Production configuration system
//!
//! Provides centralized configuration management with:
//! - Environment variable support
//! - Config file loading (optional)
//! - Runtime defaults
//! - Validation and type safety
//!
//! The engine itself never reads this module; the binary converts the loaded
//! [`Config`] into [`EngineOptions`] and passes them in explicitly.

use crate::analyzer::EngineOptions;
use crate::models::StorageConfig;
use crate::parser::ParseOptions;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

const LOG_FORMATS: &[&str] = &["pretty", "json"];
const LOG_OUTPUTS: &[&str] = &["console", "file", "both"];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Storage volume inclusion
    pub storage: StorageConfig,

    /// How collected records are read
    pub collection: CollectionConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Paths configuration
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub tag_key: String,
    pub cost_metric: String,
    pub usage_metric: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
    pub directory: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        let parse = ParseOptions::default();
        Self {
            tag_key: parse.tag_key,
            cost_metric: parse.cost_metric,
            usage_metric: parse.usage_metric,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_pretty: true,
            directory: PathBuf::from("reports"),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: PathBuf::from("logs"),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Invalid {}: expected true or false, got '{}'", name, value),
    }
}

impl Config {
    /// Config file locations, first existing one wins
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("cost-attribution.toml"),
            PathBuf::from(".cost-attribution.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("cost-attribution").join("config.toml"));
        }
        paths
    }

    /// Load configuration from environment, file, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        for path in Self::search_paths() {
            if path.exists() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(&path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from any variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Logging overrides
        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Some(val) = lookup("LOG_OUTPUT") {
            self.logging.output = val;
        }

        // Storage overrides
        if let Some(val) = lookup("INCLUDE_EFS") {
            self.storage.include_efs = parse_bool("INCLUDE_EFS", &val)?;
        }
        if let Some(val) = lookup("INCLUDE_EBS") {
            self.storage.include_ebs = parse_bool("INCLUDE_EBS", &val)?;
        }

        // Collection overrides
        if let Some(val) = lookup("COST_TAG_KEY") {
            self.collection.tag_key = val;
        }
        if let Some(val) = lookup("COST_METRIC") {
            self.collection.cost_metric = val;
        }

        // Path overrides
        if let Some(val) = lookup("COST_OUTPUT_DIR") {
            self.output.directory = PathBuf::from(val);
        }
        if let Some(val) = lookup("COST_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            bail!(
                "Unknown log format '{}', expected one of {:?}",
                self.logging.format,
                LOG_FORMATS
            );
        }
        if !LOG_OUTPUTS.contains(&self.logging.output.as_str()) {
            bail!(
                "Unknown log output '{}', expected one of {:?}",
                self.logging.output,
                LOG_OUTPUTS
            );
        }

        if self.collection.tag_key.trim().is_empty() {
            bail!("Tag key must not be empty");
        }
        if self.collection.cost_metric.trim().is_empty()
            || self.collection.usage_metric.trim().is_empty()
        {
            bail!("Metric names must not be empty");
        }

        // Create the log directory only when a file sink is used
        if self.logging.output != "console" && !self.paths.log_directory.exists() {
            fs::create_dir_all(&self.paths.log_directory)
                .context("Failed to create log directory")?;
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }

    /// Engine settings derived from this configuration
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            parse: ParseOptions {
                tag_key: self.collection.tag_key.clone(),
                cost_metric: self.collection.cost_metric.clone(),
                usage_metric: self.collection.usage_metric.clone(),
            },
            storage: self.storage,
        }
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load the global configuration once; later calls return the loaded instance
pub fn init_config() -> Result<&'static Config> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = Config::load()?;
    Ok(CONFIG.get_or_init(|| config))
}
