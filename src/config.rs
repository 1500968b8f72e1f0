//! Gate configuration.
//!
//! Loaded from `STORAGE_GATE_CONFIG` if set, otherwise
//! `<config_dir>/storage-gate/config.toml`. A missing file yields defaults;
//! a malformed one is an error.

use crate::error::{GateError, Result};
use crate::models::{ModalPrompt, SurfaceTint};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const CONFIG_ENV: &str = "STORAGE_GATE_CONFIG";

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)+$").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub title: String,
    pub message: String,
    pub continue_label: String,
    pub exit_label: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let prompt = ModalPrompt::default();
        Self {
            title: prompt.title,
            message: prompt.message,
            continue_label: prompt.continue_label,
            exit_label: prompt.exit_label,
        }
    }
}

impl PromptConfig {
    pub fn to_modal(&self) -> ModalPrompt {
        ModalPrompt {
            title: self.title.clone(),
            message: self.message.clone(),
            continue_label: self.continue_label.clone(),
            exit_label: self.exit_label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Application identifier embedded in the settings-screen address
    pub package_name: String,
    /// `#rrggbb`
    pub surface_tint: String,
    /// Used when `STORAGE_GATE_LOG` is unset
    pub log_level: String,
    /// Application storage root; defaults to `<data_dir>/storage-gate`
    pub storage_root: Option<PathBuf>,
    pub prompt: PromptConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            package_name: "com.example.storagegate".to_string(),
            surface_tint: SurfaceTint::default().to_string(),
            log_level: "info".to_string(),
            storage_root: None,
            prompt: PromptConfig::default(),
        }
    }
}

impl GateConfig {
    /// Resolve the config path and load it
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| GateError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let config: GateConfig =
            toml::from_str(content).map_err(|source| GateError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !PACKAGE_NAME.is_match(&self.package_name) {
            return Err(GateError::ConfigValue {
                field: "package_name",
                value: self.package_name.clone(),
            });
        }
        if SurfaceTint::parse(&self.surface_tint).is_none() {
            return Err(GateError::ConfigValue {
                field: "surface_tint",
                value: self.surface_tint.clone(),
            });
        }
        Ok(())
    }

    pub fn tint(&self) -> SurfaceTint {
        SurfaceTint::parse(&self.surface_tint).unwrap_or_default()
    }

    pub fn storage_root(&self) -> PathBuf {
        self.storage_root.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("storage-gate")
        })
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Config file location, honouring `STORAGE_GATE_CONFIG`
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("storage-gate").join("config.toml"))
}
