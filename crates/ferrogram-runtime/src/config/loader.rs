//! Layered configuration loading on figment.
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. the profile file (`ferrogram.{profile}.toml`) next to the main file
//! 3. the main file (`ferrogram.toml` or `config.toml`; YAML names with
//!    `yaml-config`), or the one passed to [`ConfigLoader::file`]
//! 4. `FERROGRAM_`-prefixed environment variables, `__` separating levels
//! 5. values given to [`ConfigLoader::merge`] or [`ConfigLoader::set`]
//!
//! ```text
//! FERROGRAM_BOT__TOKEN=123:abc               bot.token
//! FERROGRAM_RECEIVER__LIMIT=50               receiver.limit
//! FERROGRAM_TRANSPORTS__LOCAL__CAPACITY=64   transports.local.capacity
//! ```
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/ferrogram.toml")
//!     .set("routing.fallback_to_unmatched", true)
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "toml-config", feature = "yaml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::FerrogramConfig;
use super::validation::validate_config;

pub const ENV_PREFIX: &str = "FERROGRAM_";

/// Selects the profile when none is set on the loader.
pub const PROFILE_ENV: &str = "FERROGRAM_PROFILE";

const TOML_NAMES: &[&str] = &["ferrogram.toml", "config.toml"];
const YAML_NAMES: &[&str] = &["ferrogram.yaml", "ferrogram.yml", "config.yaml", "config.yml"];

/// Config file names in search order, limited to the enabled formats.
fn file_names() -> impl Iterator<Item = &'static str> {
    let toml: &[&str] = if cfg!(feature = "toml-config") { TOML_NAMES } else { &[] };
    let yaml: &[&str] = if cfg!(feature = "yaml-config") { YAML_NAMES } else { &[] };
    toml.iter().chain(yaml).copied()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `FERROGRAM_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a [`FerrogramConfig`] from files, environment and overrides.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            config_file: None,
            load_env: true,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::parse(&profile.into());
        self
    }

    /// Adds a directory to search for config files.
    ///
    /// Without any, the current directory and `~/.config/ferrogram` are
    /// searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(dir) => self.search_path(dir.join("ferrogram")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching; it must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Overrides every field `overrides` serializes, above files and env.
    ///
    /// Pass a partial structure (e.g. a `serde_json::json!` object) to keep
    /// the other values; a whole [`FerrogramConfig`] replaces them all.
    pub fn merge<T: Serialize>(mut self, overrides: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(overrides));
        self
    }

    /// Overrides one dotted key, e.g. `"logging.level"`, above files and env.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<FerrogramConfig> {
        let figment = self.figment()?;
        let config: FerrogramConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile = %self.profile,
            logging_level = %config.logging.level,
            transports = config.transports.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    fn figment(&self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(FerrogramConfig::default()));

        for path in self.config_files()? {
            info!(path = %path.display(), "Loading configuration file");
            figment = merge_file(figment, &path)?;
        }

        if self.load_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }

        Ok(figment.merge(self.overrides.clone()))
    }

    /// Returns the files to merge, lowest priority first.
    fn config_files(&self) -> ConfigResult<Vec<PathBuf>> {
        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            return Ok(vec![path.clone()]);
        }

        let search_paths = if self.search_paths.is_empty() {
            std::env::current_dir()
                .into_iter()
                .chain(dirs::config_dir().map(|dir| dir.join("ferrogram")))
                .collect()
        } else {
            self.search_paths.clone()
        };

        // The first main file found ends the search; profile variants seen
        // before it are kept below it.
        let mut found = Vec::new();
        for dir in &search_paths {
            for name in file_names() {
                if let Some((stem, ext)) = name.rsplit_once('.') {
                    let profiled = dir.join(format!("{stem}.{}.{ext}", self.profile));
                    if profiled.exists() {
                        found.push(profiled);
                    }
                }
                let main = dir.join(name);
                if main.exists() {
                    found.push(main);
                    return Ok(found);
                }
            }
        }

        warn!("No configuration file found, using defaults");
        Ok(found)
    }
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    match path.extension().and_then(|ext| ext.to_str()) {
        #[cfg(feature = "toml-config")]
        Some("toml") => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        Some("yaml" | "yml") => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Loads the configuration from the default locations.
pub fn load_config() -> ConfigResult<FerrogramConfig> {
    ConfigLoader::new().with_current_dir().load()
}

/// Loads the configuration from one file, with environment overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<FerrogramConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
