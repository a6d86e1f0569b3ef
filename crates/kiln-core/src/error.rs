//! Error types for Kiln

use thiserror::Error;

/// The main error type for Kiln setup operations
#[derive(Debug, Error)]
pub enum KilnError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Value out of range: {field} must be between {min} and {max}, got {value}")]
    ValueOutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("Scene error: {0}")]
    SceneError(String),
}

/// Result type alias for Kiln operations
pub type Result<T> = std::result::Result<T, KilnError>;

impl From<toml::de::Error> for KilnError {
    fn from(err: toml::de::Error) -> Self {
        KilnError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for KilnError {
    fn from(err: toml::ser::Error) -> Self {
        KilnError::TomlSerError(err.to_string())
    }
}
