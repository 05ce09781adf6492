//! Unbundling options and their TOML configuration files
//!
//! Settings are layered: built-in defaults, then the user-wide
//! `<config dir>/debundle/debundle.toml`, then a project `debundle.toml`
//! next to the bundle (or the file given with `--config`), then CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use etcetera::{BaseStrategy, choose_base_strategy};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::path_resolver::has_path_prefix;

/// Name of both the project-level and the user-level configuration file
pub const CONFIG_FILE_NAME: &str = "debundle.toml";
const APP_DIR_NAME: &str = "debundle";

pub const DEFAULT_EXCLUDED_PATH_PREFIX: &str = "node_modules/";

/// Effective options for one unbundling run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Modules whose path (after `./`) starts with this prefix are not emitted;
    /// an empty prefix disables filtering
    pub excluded_path_prefix: String,
    /// Drop `.js`-style extensions from generated import specifiers
    pub strip_import_extensions: bool,
    /// Worker threads for per-module rewriting; `None` uses rayon's default
    pub jobs: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            excluded_path_prefix: DEFAULT_EXCLUDED_PATH_PREFIX.to_owned(),
            strip_import_extensions: false,
            jobs: None,
        }
    }
}

/// A configuration file where every key is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    pub excluded_path_prefix: Option<String>,
    pub strip_import_extensions: Option<bool>,
    pub jobs: Option<usize>,
}

impl ConfigFile {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("invalid debundle configuration")
    }

    pub fn read(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&source)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

impl Config {
    /// Overlay the keys a file sets onto these options
    pub fn merge(&mut self, file: ConfigFile) {
        if let Some(prefix) = file.excluded_path_prefix {
            self.excluded_path_prefix = prefix;
        }
        if let Some(strip) = file.strip_import_extensions {
            self.strip_import_extensions = strip;
        }
        if let Some(jobs) = file.jobs {
            self.jobs = Some(jobs);
        }
    }

    /// Whether a bundle-internal module path is filtered out of the output
    pub fn is_excluded(&self, path: &str) -> bool {
        has_path_prefix(path, &self.excluded_path_prefix)
    }

    /// Defaults, then the user-wide file, then the project file for `bundle`
    ///
    /// An `explicit` path replaces project discovery and must exist.
    pub fn load(bundle: Option<&Path>, explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(user) = user_config_path().filter(|path| path.is_file()) {
            debug!("Loading user config from {}", user.display());
            config.merge(ConfigFile::read(&user)?);
        }
        if let Some(project) = discover(bundle, explicit)? {
            debug!("Loading project config from {}", project.display());
            config.merge(ConfigFile::read(&project)?);
        }
        Ok(config)
    }
}

/// `<config dir>/debundle/debundle.toml` for the current platform
pub fn user_config_path() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// The project configuration file that applies to `bundle`, if any
pub fn discover(bundle: Option<&Path>, explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    let candidate = bundle
        .and_then(Path::parent)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file());
    Ok(candidate)
}
