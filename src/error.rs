//! Error types for sotto.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SottoError {
    // Session startup errors
    #[error("No API key configured for {provider}")]
    MissingCredential { provider: String },

    #[error("Connection to {provider} failed: {detail}")]
    ConnectionFailed { provider: String, detail: String },

    #[error("{provider} server error: {detail}")]
    Server { provider: String, detail: String },

    // Streaming errors
    #[error("Provider is not connected")]
    NotConnected,

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    // On-device engine errors
    #[error("Transcription model not found at {path}")]
    ModelNotFound { path: String },

    #[error("Transcription inference failed: {message}")]
    Inference { message: String },

    // Configuration errors
    #[error("Invalid model identifier: {value}")]
    InvalidModel { value: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SottoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_missing_credential_display() {
        let error = SottoError::MissingCredential {
            provider: "deepgram".to_string(),
        };
        assert_eq!(error.to_string(), "No API key configured for deepgram");
    }

    #[test]
    fn test_connection_failed_display() {
        let error = SottoError::ConnectionFailed {
            provider: "soniox".to_string(),
            detail: "dns lookup failed".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Connection to soniox failed: dns lookup failed"
        );
    }

    #[test]
    fn test_server_display() {
        let error = SottoError::Server {
            provider: "openai".to_string(),
            detail: "invalid session config".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "openai server error: invalid session config"
        );
    }

    #[test]
    fn test_not_connected_display() {
        assert_eq!(
            SottoError::NotConnected.to_string(),
            "Provider is not connected"
        );
    }

    #[test]
    fn test_timeout_display() {
        let error = SottoError::Timeout {
            operation: "websocket handshake".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Timed out waiting for websocket handshake"
        );
    }

    #[test]
    fn test_model_not_found_display() {
        let error = SottoError::ModelNotFound {
            path: "/models/ggml-base.bin".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transcription model not found at /models/ggml-base.bin"
        );
    }

    #[test]
    fn test_invalid_model_display() {
        let error = SottoError::InvalidModel {
            value: "nova-3".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid model identifier: nova-3");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: SottoError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: SottoError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SottoError>();
        assert_sync::<SottoError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
