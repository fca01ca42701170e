//! Error types shared by the bulksync crates.

use thiserror::Error;

/// Errors raised while handling shared data types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<config::ConfigError> for TypesError {
    fn from(err: config::ConfigError) -> Self {
        TypesError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TypesError::Config("missing file".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing file");

        let err = TypesError::InvalidInput("negative id".to_string());
        assert_eq!(err.to_string(), "Invalid input: negative id");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<u64>("nope").unwrap_err();
        let err: TypesError = json_err.into();
        assert!(matches!(err, TypesError::Serialization(_)));
    }
}
