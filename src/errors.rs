//! Error handling for the detection engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("transaction source error: {message}")]
    Source { message: String },

    #[error("detector {kind} failed: {message}")]
    Detector { kind: &'static str, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config {
            message: message.into(),
        }
    }

    pub fn source(message: impl Into<String>) -> Self {
        EngineError::Source {
            message: message.into(),
        }
    }

    pub fn detector(kind: &'static str, message: impl Into<String>) -> Self {
        EngineError::Detector {
            kind,
            message: message.into(),
        }
    }
}

// Convenience type alias
pub type Result<T> = std::result::Result<T, EngineError>;
