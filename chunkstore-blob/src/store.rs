use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::{
    BlobUnit, ChainResult, Commitment, ContentKey, FeeData, Proof, StorageMode, StoreResult,
    TxReceipt, TxRequest,
};

/// Version byte of a KZG versioned hash
pub const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

/// Remote ledger operations the chunk store needs.
///
/// Transport, signing and contract encoding live behind this trait. Every
/// call may fail or time out; the core does not retry them, except for
/// receipt polling.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Next sequence number for a signing identity
    async fn get_nonce(&self, identity: Address) -> ChainResult<u64>;

    async fn get_fee_data(&self) -> ChainResult<FeeData>;

    /// Blob-gas congestion accumulator of the latest block
    async fn get_excess_blob_gas(&self) -> ChainResult<u64>;

    async fn estimate_gas(&self, tx: &TxRequest) -> ChainResult<u64>;

    /// Sign and broadcast; returns the transaction hash
    async fn send_transaction(&self, tx: TxRequest, blobs: Vec<BlobUnit>) -> ChainResult<B256>;

    /// Receipt of a mined transaction, `None` while still pending
    async fn get_receipt(&self, tx_hash: B256) -> ChainResult<Option<TxReceipt>>;

    /// Number of chunks currently stored under `key`
    async fn count_chunks(&self, key: &ContentKey) -> ChainResult<u64>;

    /// Versioned hash stored for chunk `index` of `key`
    async fn chunk_hash(&self, key: &ContentKey, index: u64) -> ChainResult<B256>;

    /// Declared payload size of chunk `index` of `key`, as written with it
    async fn chunk_size(&self, key: &ContentKey, index: u64) -> ChainResult<u64>;

    async fn storage_mode(&self, key: &ContentKey) -> ChainResult<StorageMode>;

    /// Stored bytes of chunk `index` of `key`
    async fn read_chunk(&self, key: &ContentKey, index: u64) -> ChainResult<Bytes>;

    /// Payment the store charges for writing `blob_count` blobs
    async fn upfront_payment(&self, blob_count: u64) -> ChainResult<U256>;
}

/// Blob commitment scheme, injected rather than held as a global.
///
/// `warm_up` loads whatever setup the scheme needs and must complete before
/// `commit` or `prove` are called.
#[async_trait]
pub trait CommitmentEngine: Send + Sync {
    async fn warm_up(&self) -> StoreResult<()>;

    fn commit(&self, blob: &BlobUnit) -> StoreResult<Commitment>;

    fn prove(&self, blob: &BlobUnit, commitment: &Commitment) -> StoreResult<Proof>;

    fn versioned_hash(&self, commitment: &Commitment) -> B256 {
        versioned_hash(commitment)
    }
}

/// `0x01 ‖ sha256(commitment)[1..]`
pub fn versioned_hash(commitment: &Commitment) -> B256 {
    let digest = Sha256::digest(commitment.0);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash[0] = VERSIONED_HASH_VERSION_KZG;
    B256::from(hash)
}

/// Versioned hash a store would record for `blob`
pub fn blob_hash(engine: &dyn CommitmentEngine, blob: &BlobUnit) -> StoreResult<B256> {
    let commitment = engine.commit(blob)?;
    Ok(engine.versioned_hash(&commitment))
}
