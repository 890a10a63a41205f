//! Error handling for the vital-sign pipeline
//!
//! One error type shared by every crate in the workspace. Configuration
//! problems surface at construction time; malformed samples are reported to
//! the caller so it can drop and count them.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type VspResult<T> = Result<T, VspError>;

/// Error type for all pipeline operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VspError {
    /// Filter parameters that cannot produce a valid design
    #[error("Invalid filter spec: {reason}")]
    InvalidSpec {
        /// Description of the rejected parameter
        reason: String,
    },

    /// Invalid component or pipeline configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error
        message: String,
    },

    /// Input record that could not be parsed into a sample
    #[error("Malformed sample: {reason}")]
    MalformedSample {
        /// What was wrong with the record
        reason: String,
    },

    /// Failure reported by an external sample source
    #[error("Sample source '{source_name}' failed: {reason}")]
    Source {
        /// Name of the failing source
        source_name: String,
        /// Description of the failure
        reason: String,
    },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VspError {
    /// Build an [`VspError::InvalidSpec`] from any message
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        VspError::InvalidSpec { reason: reason.into() }
    }

    /// Build a [`VspError::Configuration`] from any message
    pub fn configuration(message: impl Into<String>) -> Self {
        VspError::Configuration { message: message.into() }
    }

    /// Build a [`VspError::MalformedSample`] from any message
    pub fn malformed(reason: impl Into<String>) -> Self {
        VspError::MalformedSample { reason: reason.into() }
    }

    /// True for errors raised while building a component
    pub fn is_configuration(&self) -> bool {
        matches!(self, VspError::InvalidSpec { .. } | VspError::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = VspError::invalid_spec("low cutoff 12 Hz must be below high cutoff 8 Hz");
        let display = format!("{}", error);
        assert!(display.contains("Invalid filter spec"));
        assert!(display.contains("12 Hz"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(VspError::invalid_spec("x").is_configuration());
        assert!(VspError::configuration("x").is_configuration());
        assert!(!VspError::malformed("x").is_configuration());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing capture");
        let error: VspError = io.into();
        assert!(matches!(error, VspError::Io(_)));
        assert!(error.to_string().contains("missing capture"));
    }
}
