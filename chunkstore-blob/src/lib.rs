//! # chunkstore-blob: resumable content uploads into a blob-backed chunk store
//!
//! `chunkstore-blob` splits content into fixed-capacity chunks, encodes each
//! chunk as a blob unit and writes them to a remote key/value chunk store in
//! batched transactions. Uploads are incremental and resumable: chunks that
//! are already stored with the same versioned hash are never written again.
//!
//! ## Key Features
//!
//! - **Resumable**: every upload reports how far it got; calling again skips
//!   what is already in place
//! - **Ordered**: batches of one item are confirmed strictly in order
//! - **Concurrent**: many items share one signing identity through a single
//!   nonce coordinator and a bounded worker pool
//! - **Backend agnostic**: the ledger and the commitment scheme are traits
//!
//! ## Quick Start
//!
//! ```rust
//! use chunkstore_blob::prelude::*;
//! use chunkstore_blob::{DigestCommitmentEngine, MemoryChain};
//! use alloy_primitives::Address;
//!
//! # #[tokio::main]
//! # async fn main() -> StoreResult<()> {
//! let config = StoreConfig::default().with_geometry(8, 32);
//! let store = ChunkStore::connect(
//!     MemoryChain::new(),
//!     DigestCommitmentEngine::new(),
//!     Address::ZERO,
//!     config,
//! )
//! .await?;
//!
//! let result = store
//!     .upload_content("notes.txt".into(), ContentSource::from_bytes(&b"Hello, world!"[..]))
//!     .await?;
//! assert!(result.is_complete());
//!
//! let bytes = store.download_content("notes.txt".into()).await?;
//! assert_eq!(bytes.as_ref(), b"Hello, world!");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │      ChunkStore      │  ← uploads, downloads, estimates
//! ├──────────────────────┤
//! │  UploadOrchestrator  │  ← diff, remove stale, write batches
//! ├──────────┬───────────┤
//! │  Nonces  │    Gas    │  ← shared sequencing and pricing
//! ├──────────┴───────────┤
//! │ ChainClient / Engine │  ← remote ledger and commitments
//! └──────────────────────┘
//! ```

pub mod adapter;
mod codec;
mod config;
pub mod coordinator;
pub mod diff;
mod download;
mod error;
pub mod gas;
#[cfg(feature = "memory")]
mod memory;
mod nonce;
pub mod planner;
mod receipt;
pub mod store;
mod types;
mod upload;

// Re-export main types for clean API
pub use adapter::ChunkStore;
pub use codec::{BlobCodec, BlobUnit, BYTES_PER_BLOB, CHUNK_CAPACITY, SLOTS_PER_UNIT, SLOT_SIZE};
pub use config::{StoreConfig, ENV_PREFIX};
pub use coordinator::UploadOrchestrator;
pub use diff::{RemoteChunkDescriptor, RemoteState};
pub use download::DownloadReconstructor;
pub use error::{ChainError, ChainResult, ErrorKind, StoreError, StoreResult};
pub use gas::GasPriceEstimator;
#[cfg(feature = "memory")]
pub use memory::{DigestCommitmentEngine, FailurePlan, MemoryChain, SentTx};
pub use nonce::NonceCoordinator;
pub use planner::ChunkPlan;
pub use receipt::{wait_for_receipt, TxReceipt};
pub use store::{versioned_hash, ChainClient, CommitmentEngine};
pub use types::{
    ByteStream, Commitment, ContentKey, ContentSource, CostEstimate, FeeData, Proof, StorageMode,
    TxFees, TxKind, TxRequest, UploadItem,
};
pub use upload::{UploadFailure, UploadResult, UploadStage};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ChainClient, ChunkStore, CommitmentEngine, ContentKey, ContentSource, CostEstimate,
        StoreConfig, StoreError, StoreResult, UploadItem, UploadResult,
    };
}

/// Install a plain `fmt` subscriber filtered by `RUST_LOG`
#[cfg(feature = "tracing-basic")]
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
