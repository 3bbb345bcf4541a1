use serde::{Deserialize, Serialize};
use thiserror::Error;

use chunkstore_queue::PoolError;

/// Result type for chunk-store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for calls into an external chain client
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors that can occur during chunk-store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Remote state error: {message}")]
    RemoteState { message: String },

    #[error("Estimation error: {message}")]
    Estimation { message: String },

    #[error("Submission error: {message}")]
    Submission { message: String },

    #[error("Download failed: {message}")]
    Download { message: String },

    #[error("Commitment engine error: {message}")]
    Commitment { message: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Worker pool error: {source}")]
    Pool {
        #[from]
        source: PoolError,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

/// Coarse classification of a `StoreError`, kept on upload results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    RemoteState,
    Estimation,
    Submission,
    Download,
    Commitment,
    Config,
    Io,
    Internal,
}

impl StoreError {
    /// Create an invalid input error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a remote state error
    pub fn remote_state<S: Into<String>>(message: S) -> Self {
        Self::RemoteState {
            message: message.into(),
        }
    }

    /// Create an estimation error
    pub fn estimation<S: Into<String>>(message: S) -> Self {
        Self::Estimation {
            message: message.into(),
        }
    }

    /// Create a submission error
    pub fn submission<S: Into<String>>(message: S) -> Self {
        Self::Submission {
            message: message.into(),
        }
    }

    /// Create a download error
    pub fn download<S: Into<String>>(message: S) -> Self {
        Self::Download {
            message: message.into(),
        }
    }

    /// Create a commitment engine error
    pub fn commitment<S: Into<String>>(message: S) -> Self {
        Self::Commitment {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::RemoteState { .. } => ErrorKind::RemoteState,
            Self::Estimation { .. } => ErrorKind::Estimation,
            Self::Submission { .. } => ErrorKind::Submission,
            Self::Download { .. } => ErrorKind::Download,
            Self::Commitment { .. } => ErrorKind::Commitment,
            Self::Config { .. } | Self::Serialization { .. } => ErrorKind::Config,
            Self::Io { .. } => ErrorKind::Io,
            Self::Pool { .. } => ErrorKind::Internal,
        }
    }
}

/// Failures reported by an external `ChainClient`
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Chain backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ChainError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }

    /// Create an RPC error
    pub fn rpc<S: Into<String>>(message: S) -> Self {
        Self::Rpc(message.into())
    }
}
