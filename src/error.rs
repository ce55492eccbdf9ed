use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("Registry unavailable: {0}")]
	RegistryUnavailable(String),

	#[error("Repository not found: {0}")]
	RegistryNotFound(String),

	#[error("Failed to move files for component '{component}': {source}")]
	StructuralMoveFailed {
		component: String,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to create alias '{alias}': {reason}")]
	AliasCreationFailed { alias: String, reason: String },

	#[error("Component '{component}' is too small: {size} bytes, expected at least {min}")]
	IntegrityTooSmall {
		component: String,
		size: u64,
		min: u64,
	},

	#[error("Configuration error: {0}")]
	ConfigError(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(String),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

impl From<toml::de::Error> for Error {
	fn from(err: toml::de::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

pub type Result<T> = std::result::Result<T, Error>;
