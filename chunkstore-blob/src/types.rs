use std::path::PathBuf;
use std::pin::Pin;

use alloy_primitives::{Address, U256};
use bytes::Bytes;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{StoreError, StoreResult};

/// Stream of decoded content bytes
pub type ByteStream = Pin<Box<dyn Stream<Item = StoreResult<Bytes>> + Send>>;

/// Logical key of a content item in the remote chunk store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey(pub String);

impl ContentKey {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ContentKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where upload content comes from
#[derive(Debug, Clone)]
pub enum ContentSource {
    /// Content already in memory
    Bytes(Bytes),
    /// Content read lazily from a local file, one chunk at a time
    File(PathBuf),
}

impl ContentSource {
    pub fn from_bytes<B: Into<Bytes>>(bytes: B) -> Self {
        Self::Bytes(bytes.into())
    }

    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        Self::File(path.into())
    }

    pub async fn size(&self) -> StoreResult<u64> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.len() as u64),
            Self::File(path) => Ok(tokio::fs::metadata(path).await?.len()),
        }
    }

    /// Read bytes `[start, end)`
    pub async fn read_range(&self, start: u64, end: u64) -> StoreResult<Bytes> {
        if end < start {
            return Err(StoreError::invalid(format!(
                "Invalid range {}..{}",
                start, end
            )));
        }
        match self {
            Self::Bytes(bytes) => {
                let len = bytes.len() as u64;
                if end > len {
                    return Err(StoreError::invalid(format!(
                        "Range {}..{} exceeds content size {}",
                        start, end, len
                    )));
                }
                Ok(bytes.slice(start as usize..end as usize))
            }
            Self::File(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(start)).await?;
                let mut buf = vec![0u8; (end - start) as usize];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl From<Vec<u8>> for ContentSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for ContentSource {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

/// One entry of a multi-item upload
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub key: ContentKey,
    pub content: ContentSource,
}

impl UploadItem {
    pub fn new<K: Into<ContentKey>, C: Into<ContentSource>>(key: K, content: C) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
        }
    }
}

/// How a key's chunks are stored remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageMode {
    /// Chunks are field-slot encoded blobs
    #[default]
    Blob,
    /// Chunks are raw bytes carried in calldata
    Calldata,
}

/// Fee quote as reported by the chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeeData {
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

/// Fees attached to a transaction, after the safety multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_blob_gas: U256,
}

/// Chunk-store operation carried by a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxKind {
    /// Write the attached blobs as chunks `chunk_ids` of the key
    WriteChunks {
        chunk_ids: Vec<u64>,
        chunk_sizes: Vec<u64>,
    },
    /// Remove every chunk of the key
    Remove,
}

/// Transaction handed to the chain client for estimation and submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub key: ContentKey,
    pub kind: TxKind,
    pub value: U256,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub fees: Option<TxFees>,
}

impl TxRequest {
    pub fn write_chunks(
        from: Address,
        key: ContentKey,
        chunk_ids: Vec<u64>,
        chunk_sizes: Vec<u64>,
        value: U256,
    ) -> Self {
        Self {
            from,
            key,
            kind: TxKind::WriteChunks {
                chunk_ids,
                chunk_sizes,
            },
            value,
            nonce: None,
            gas_limit: None,
            fees: None,
        }
    }

    pub fn remove(from: Address, key: ContentKey) -> Self {
        Self {
            from,
            key,
            kind: TxKind::Remove,
            value: U256::ZERO,
            nonce: None,
            gas_limit: None,
            fees: None,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_fees(mut self, fees: TxFees) -> Self {
        self.fees = Some(fees);
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Number of blobs this transaction carries
    pub fn blob_count(&self) -> usize {
        match &self.kind {
            TxKind::WriteChunks { chunk_ids, .. } => chunk_ids.len(),
            TxKind::Remove => 0,
        }
    }
}

/// Polynomial commitment to one blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Commitment(pub [u8; 48]);

/// Opening proof for a blob commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Proof(pub [u8; 48]);

/// Projected cost of an upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Payment to the chunk store for the blobs that need writing
    pub storage_cost: U256,
    /// Execution plus blob fees at the multiplied quote
    pub gas_cost: U256,
}

impl CostEstimate {
    pub fn total(&self) -> U256 {
        self.storage_cost.saturating_add(self.gas_cost)
    }
}
