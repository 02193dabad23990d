//! Optional `horizon.toml` settings and their merge with the command line.
//!
//! The file lives in the user's config directory (overridable through
//! `HORIZON_CONFIG_DIR`) and is never required. Values given on the command
//! line win over the file, which wins over [`RendererConfig::default`].

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::ProjectDirs;
use renderer::{PowerPreference, RenderPolicy, RendererConfig};
use serde::Deserialize;
use tracing::debug;

use crate::cli::Cli;

pub const ENV_CONFIG_DIR: &str = "HORIZON_CONFIG_DIR";
pub const CONFIG_FILE_NAME: &str = "horizon.toml";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "horizon";
const APPLICATION: &str = "horizon";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub gpu: GpuSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSection {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpuSection {
    pub power: Option<String>,
}

impl FileConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == Some(0) || self.window.height == Some(0) {
            return Err(ConfigError::Invalid(
                "window dimensions must be greater than zero".into(),
            ));
        }
        self.power()?;
        Ok(())
    }

    pub fn power(&self) -> Result<Option<PowerPreference>, ConfigError> {
        self.gpu
            .power
            .as_deref()
            .map(|value| value.parse().map_err(ConfigError::Invalid))
            .transpose()
    }
}

/// Directory searched for `horizon.toml` when `--config` is not given.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(value) = env::var_os(ENV_CONFIG_DIR) {
        if !value.is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
        .ok_or_else(|| anyhow!("failed to determine user directories"))?;
    Ok(project_dirs.config_dir().to_path_buf())
}

/// Loads the config file. An explicit path must exist; the default one may not.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (config_dir()?.join(CONFIG_FILE_NAME), false),
    };

    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(FileConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let config = FileConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to load {}", path.display()))?;
    debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Layers command-line values over the file over the built-in defaults.
pub fn resolve(cli: &Cli, file: &FileConfig) -> Result<RendererConfig> {
    let mut config = RendererConfig::default();

    let (default_width, default_height) = config.surface_size;
    config.surface_size = (
        file.window.width.unwrap_or(default_width),
        file.window.height.unwrap_or(default_height),
    );
    if let Some(size) = cli.size {
        config.surface_size = size;
    }

    if let Some(title) = cli.title.clone().or_else(|| file.window.title.clone()) {
        config.title = title;
    }

    if let Some(power) = cli.power.or(file.power()?) {
        config.power = power;
    }

    if let Some(time) = cli.still_time {
        config.policy = RenderPolicy::Still { time };
    }

    Ok(config)
}
