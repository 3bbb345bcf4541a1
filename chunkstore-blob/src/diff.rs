use tracing::debug;

use crate::store::blob_hash;
use crate::{
    BlobUnit, ChainClient, CommitmentEngine, ContentKey, StorageMode, StoreError, StoreResult,
};

/// What the chunk store currently holds for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteChunkDescriptor {
    pub chunk_count: u64,
    pub mode: StorageMode,
}

impl RemoteChunkDescriptor {
    /// Fetch count and mode for `key`. The mode is only asked for when
    /// chunks exist.
    pub async fn fetch(chain: &dyn ChainClient, key: &ContentKey) -> StoreResult<Self> {
        let chunk_count = chain
            .count_chunks(key)
            .await
            .map_err(|e| StoreError::remote_state(format!("Failed to count chunks of {}: {}", key, e)))?;

        let mode = if chunk_count == 0 {
            StorageMode::Blob
        } else {
            chain
                .storage_mode(key)
                .await
                .map_err(|e| StoreError::remote_state(format!("Failed to read storage mode of {}: {}", key, e)))?
        };

        Ok(Self { chunk_count, mode })
    }

    pub fn classify(&self, planned_chunks: u64) -> RemoteState {
        RemoteState::classify(self.chunk_count, planned_chunks)
    }
}

/// Relationship between remote chunks and the upload plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    /// Nothing stored; write everything
    Fresh,
    /// More chunks stored than planned; the key must be cleared first
    Stale { remote_chunks: u64 },
    /// Some chunks stored; compare hashes batch by batch
    Normal { remote_chunks: u64 },
}

impl RemoteState {
    pub fn classify(remote_chunks: u64, planned_chunks: u64) -> Self {
        if remote_chunks == 0 {
            Self::Fresh
        } else if remote_chunks > planned_chunks {
            Self::Stale { remote_chunks }
        } else {
            Self::Normal { remote_chunks }
        }
    }

    /// Chunks that can be compared against
    pub fn remote_chunks(&self) -> u64 {
        match self {
            Self::Fresh => 0,
            Self::Stale { remote_chunks } | Self::Normal { remote_chunks } => *remote_chunks,
        }
    }
}

/// True when every blob of the batch already matches its stored hash.
///
/// Chunks at or past `remote_chunks` cannot match, so the check stops there
/// without another round trip.
pub async fn batch_unchanged(
    chain: &dyn ChainClient,
    commitments: &dyn CommitmentEngine,
    key: &ContentKey,
    remote_chunks: u64,
    batch: &[(u64, BlobUnit)],
) -> StoreResult<bool> {
    for (index, blob) in batch {
        if *index >= remote_chunks {
            return Ok(false);
        }

        let stored = chain
            .chunk_hash(key, *index)
            .await
            .map_err(|e| StoreError::remote_state(format!("Failed to read hash of chunk {}: {}", index, e)))?;
        let local = blob_hash(commitments, blob)?;

        if stored != local {
            debug!(%key, index, "Chunk differs from stored copy");
            return Ok(false);
        }
    }
    Ok(true)
}
