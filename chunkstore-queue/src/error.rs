use thiserror::Error;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Infrastructure errors for the worker pool
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Worker {worker} panicked: {reason}")]
    WorkerPanicked { worker: usize, reason: String },

    #[error("Worker {worker} was cancelled")]
    WorkerCancelled { worker: usize },

    #[error("Item {index} panicked: {reason}")]
    ItemPanicked { index: usize, reason: String },

    #[error("Item {index} was cancelled")]
    ItemCancelled { index: usize },

    #[error("Item {index} produced no result")]
    MissingResult { index: usize },
}

impl PoolError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check if this error was caused by a worker crash
    pub fn is_worker_failure(&self) -> bool {
        matches!(self, Self::WorkerPanicked { .. } | Self::WorkerCancelled { .. })
    }

    /// Check if a single item's handler crashed
    pub fn is_item_failure(&self) -> bool {
        matches!(self, Self::ItemPanicked { .. } | Self::ItemCancelled { .. })
    }
}
