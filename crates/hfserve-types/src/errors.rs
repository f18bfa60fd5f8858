//! Error types for the hfserve serving adapter

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for hfserve operations
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum ServeError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Model loading/initialization errors
    #[error("Model error: {message}")]
    Model { message: String },

    /// Tokenizer errors
    #[error("Tokenizer error: {message}")]
    Tokenizer { message: String },

    /// The model's task cannot be served. Raised at load time only.
    #[error("Unsupported task: {message}")]
    UnsupportedTask { message: String },

    /// Request validation errors, raised before any inference work
    #[error("Request validation error: {message}")]
    RequestValidation { message: String },

    /// Local forward pass or generation failures
    #[error("Inference error: {message}")]
    Inference { message: String },

    /// Transport or protocol failure talking to a remote predictor
    #[error("Remote predictor error ({endpoint}): {message}")]
    RemotePredictor { endpoint: String, message: String },

    /// The model is not loaded or has been stopped
    #[error("Model not ready: {message}")]
    ModelNotReady { message: String },

    /// Request was cancelled
    #[error("Request cancelled: {message}")]
    Cancelled { message: String },

    /// I/O errors
    #[error("I/O error: {message}")]
    IO { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Network errors outside the predictor path (model hub downloads)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Not found errors
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ServeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    /// Create a tokenizer error
    pub fn tokenizer(message: impl Into<String>) -> Self {
        Self::Tokenizer {
            message: message.into(),
        }
    }

    /// Create an unsupported task error
    pub fn unsupported_task(message: impl Into<String>) -> Self {
        Self::UnsupportedTask {
            message: message.into(),
        }
    }

    /// Create a request validation error
    pub fn request_validation(message: impl Into<String>) -> Self {
        Self::RequestValidation {
            message: message.into(),
        }
    }

    /// Create an inference error
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
        }
    }

    /// Create a remote predictor error tagged with the endpoint it came from
    pub fn remote_predictor(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemotePredictor {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a model-not-ready error
    pub fn model_not_ready(message: impl Into<String>) -> Self {
        Self::ModelNotReady {
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::IO {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Errors produced while computing a prediction. Remote predictor
    /// failures are a kind of inference failure.
    pub fn is_inference_error(&self) -> bool {
        matches!(self, Self::Inference { .. } | Self::RemotePredictor { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemotePredictor { .. } | Self::Network { .. } | Self::ModelNotReady { .. }
        )
    }

    /// Check if this is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::RequestValidation { .. } | Self::NotFound { .. } | Self::UnsupportedTask { .. }
        )
    }

    /// Check if this is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Model { .. }
                | Self::Inference { .. }
                | Self::RemotePredictor { .. }
                | Self::ModelNotReady { .. }
                | Self::Internal { .. }
        )
    }
}

/// Conversion from std::io::Error
impl From<std::io::Error> for ServeError {
    fn from(err: std::io::Error) -> Self {
        Self::io(format!("{}", err))
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for ServeError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("{}", err))
    }
}
