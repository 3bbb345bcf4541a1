//! # chunkstore-queue: bounded worker pool
//!
//! A small scheduling primitive used by `chunkstore-blob` to drive many
//! content uploads at once without opening unbounded concurrent RPC load.
//!
//! - **Bounded**: at most `workers` items are processed at a time
//! - **FIFO**: items start in the order they were submitted
//! - **Isolated**: an item's handler owns its own failure handling; one item
//!   going wrong never cancels its siblings
//!
//! ```rust
//! use chunkstore_queue::WorkerPool;
//!
//! # #[tokio::main]
//! # async fn main() -> chunkstore_queue::PoolResult<()> {
//! let pool = WorkerPool::with_workers(4)?;
//! let lengths = pool
//!     .run(vec!["a", "bb", "ccc"], |s| async move { s.len() })
//!     .await?;
//! assert_eq!(lengths, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pool;

pub use error::{PoolError, PoolResult};
pub use pool::{PoolConfig, WorkerPool, DEFAULT_WORKERS};

pub mod prelude {
    pub use crate::{PoolConfig, PoolError, PoolResult, WorkerPool};
}
