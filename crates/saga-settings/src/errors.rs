//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON or does not match the schema.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of range or contradicts another value.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(err.to_string().starts_with("failed to parse settings JSON"));
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("debounceMs must be > 0".into());
        assert_eq!(err.to_string(), "invalid settings value: debounceMs must be > 0");
    }
}
