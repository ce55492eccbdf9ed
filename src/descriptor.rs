//! The `magic-pdf.json` descriptor read by the parsing engine at startup.
//!
//! Its presence is the only readiness signal downstream gets: it is written
//! at the end of a successful run and removed when a run ends degraded.

use crate::config::{Config, DeviceMode};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub model: String,
    pub enable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProvisioningDescriptor {
    pub device_mode: DeviceMode,
    pub models_dir: PathBuf,
    pub layout_config: LayoutConfig,
    pub formula_config: FeatureConfig,
    pub table_config: FeatureConfig,
}

impl ProvisioningDescriptor {
    pub fn new(config: &Config, formula_enable: bool, table_enable: bool) -> Self {
        Self {
            device_mode: config.device_mode,
            models_dir: config.store_root.clone(),
            layout_config: LayoutConfig {
                model: config.layout_model.clone(),
            },
            formula_config: FeatureConfig {
                model: config.formula_model.clone(),
                enable: formula_enable,
            },
            table_config: FeatureConfig {
                model: config.table_model.clone(),
                enable: table_enable,
            },
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write atomically (tmp + rename) so readers never see a partial file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, path)?;

        tracing::info!("Descriptor written to {}", path.display());
        Ok(())
    }

    /// Remove a descriptor left by an earlier run. Returns whether one existed.
    pub fn remove_stale(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
