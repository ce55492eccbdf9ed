use crate::error::{Error, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const STORE_ROOT_ENV: &str = "MINERU_MODELS_DIR";
pub const DESCRIPTOR_ENV: &str = "MODELSTAGE_DESCRIPTOR";
pub const SCRATCH_DIR_ENV: &str = "MODELSTAGE_SCRATCH_DIR";
pub const CONFIG_FILE_ENV: &str = "MODELSTAGE_CONFIG";

/// Compute device advertised to the parsing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
	#[default]
	Cpu,
	Cuda,
}

impl DeviceMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeviceMode::Cpu => "cpu",
			DeviceMode::Cuda => "cuda",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub store_root: PathBuf,
	pub descriptor_path: PathBuf,
	pub scratch_dir: PathBuf,
	pub cache_dir: PathBuf,
	pub repository_id: String,
	pub revision: String,
	/// Directory inside the fetched snapshot that maps onto the store root.
	pub snapshot_subdir: Option<String>,
	pub device_mode: DeviceMode,
	pub formula_enable: bool,
	pub table_enable: bool,
	pub layout_model: String,
	pub formula_model: String,
	pub table_model: String,
	pub download_concurrency: usize,
	pub show_progress: bool,
}

impl Default for Config {
	fn default() -> Self {
		let scratch_dir = std::env::temp_dir();

		let descriptor_path = UserDirs::new()
			.map(|dirs| dirs.home_dir().join("magic-pdf.json"))
			.unwrap_or_else(|| PathBuf::from("/root/magic-pdf.json"));

		let cache_dir = ProjectDirs::from("", "", "modelstage")
			.map(|dirs| dirs.cache_dir().join("hf"))
			.unwrap_or_else(|| scratch_dir.join("modelstage-cache"));

		Self {
			store_root: PathBuf::from("/data/models"),
			descriptor_path,
			scratch_dir,
			cache_dir,
			repository_id: "wanderkid/PDF-Extract-Kit".to_string(),
			revision: "main".to_string(),
			snapshot_subdir: Some("models".to_string()),
			device_mode: DeviceMode::Cpu,
			formula_enable: true,
			table_enable: false,
			layout_model: "layoutlmv3".to_string(),
			formula_model: "unimernet_small".to_string(),
			table_model: "rapid_table".to_string(),
			download_concurrency: 4,
			show_progress: false,
		}
	}
}

impl Config {
	/// Self-contained configuration rooted under `root`, ignoring the process environment.
	pub fn for_store(root: impl AsRef<Path>) -> Self {
		let root = root.as_ref();
		Self {
			store_root: root.join("models"),
			descriptor_path: root.join("magic-pdf.json"),
			scratch_dir: root.join("scratch"),
			cache_dir: root.join("cache"),
			..Self::default()
		}
	}

	/// Load configuration from an optional TOML file; missing fields keep their defaults.
	pub fn load(path: Option<&Path>) -> Result<Self> {
		let config = match path {
			Some(path) => {
				let content = std::fs::read_to_string(path).map_err(|e| {
					Error::ConfigError(format!("Could not read {}: {}", path.display(), e))
				})?;
				toml::from_str(&content)?
			}
			None => Self::default(),
		};

		config.validate()?;
		Ok(config)
	}

	/// Load the file named by `MODELSTAGE_CONFIG` (or `path`) and apply environment overrides.
	pub fn from_env(path: Option<&Path>) -> Result<Self> {
		let env_path = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
		let mut config = Self::load(path.or(env_path.as_deref()))?;
		config.apply_env();
		config.validate()?;
		Ok(config)
	}

	pub fn apply_env(&mut self) {
		if let Some(root) = std::env::var_os(STORE_ROOT_ENV) {
			self.store_root = PathBuf::from(root);
		}
		if let Some(descriptor) = std::env::var_os(DESCRIPTOR_ENV) {
			self.descriptor_path = PathBuf::from(descriptor);
		}
		if let Some(scratch) = std::env::var_os(SCRATCH_DIR_ENV) {
			self.scratch_dir = PathBuf::from(scratch);
		}
	}

	pub fn validate(&self) -> Result<()> {
		if self.store_root.as_os_str().is_empty() {
			return Err(Error::ConfigError("store_root must not be empty".to_string()));
		}
		if self.repository_id.split('/').filter(|s| !s.is_empty()).count() != 2 {
			return Err(Error::ConfigError(format!(
				"repository_id must look like 'owner/name', got '{}'",
				self.repository_id
			)));
		}
		if self.download_concurrency == 0 {
			return Err(Error::ConfigError(
				"download_concurrency must be at least 1".to_string(),
			));
		}
		Ok(())
	}
}
