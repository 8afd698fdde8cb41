//! Error types for Glint

use thiserror::Error;

/// The main error type for Glint operations
#[derive(Debug, Error)]
pub enum GlintError {
    #[error("Invalid keyframe track: {0}")]
    InvalidTrack(String),

    #[error("Invalid particle buffer: {0}")]
    InvalidBuffer(String),

    #[error("Invalid emitter configuration: {0}")]
    InvalidEmitter(String),

    #[error("Invalid generator state: {0}")]
    InvalidGenerator(String),

    #[error("Value out of range: {field} must be between {min} and {max}, got {value}")]
    ValueOutOfRange {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("Invalid enum value: {value} is not one of {allowed:?}")]
    InvalidEnumValue {
        value: String,
        allowed: Vec<String>,
    },

    #[error("Framebuffer error: {0}")]
    FramebufferError(String),

    #[error("Render error: {0}")]
    RenderError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),
}

/// Result type alias for Glint operations
pub type Result<T> = std::result::Result<T, GlintError>;

impl From<toml::de::Error> for GlintError {
    fn from(err: toml::de::Error) -> Self {
        GlintError::TomlParseError(err.to_string())
    }
}

impl GlintError {
    /// Build an `InvalidEnumValue` from a rejected string and the accepted names.
    pub fn invalid_enum(value: &str, allowed: &[&str]) -> Self {
        GlintError::InvalidEnumValue {
            value: value.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message_names_field() {
        let err = GlintError::ValueOutOfRange {
            field: "capacity".into(),
            min: 1.0,
            max: 1e6,
            value: 0.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("capacity"));
        assert!(msg.contains("got 0"));
    }

    #[test]
    fn invalid_enum_lists_allowed_values() {
        let err = GlintError::invalid_enum("sprite", &["unlit", "image"]);
        let msg = err.to_string();
        assert!(msg.contains("sprite"));
        assert!(msg.contains("image"));
    }

    #[test]
    fn toml_errors_convert() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("a = [");
        let err: GlintError = parsed.unwrap_err().into();
        assert!(matches!(err, GlintError::TomlParseError(_)));
    }
}
