//! In-memory chunk store and commitment engine for development and tests.
//!
//! `MemoryChain` behaves like a ledger hosting a chunk-store contract:
//! writes land when the transaction is sent, receipts become visible after
//! a configurable number of polls, and individual calls can be made to fail.
//! `DigestCommitmentEngine` derives commitments from SHA-256; it is not a
//! KZG scheme and only suits local use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::gas::{blob_base_fee, GAS_PER_BLOB};
use crate::store::blob_hash;
use crate::{
    BlobUnit, ChainClient, ChainError, ChainResult, Commitment, CommitmentEngine, ContentKey,
    FeeData, Proof, StorageMode, StoreError, StoreResult, TxKind, TxReceipt, TxRequest,
};

/// SHA-256 based stand-in for a blob commitment scheme
#[derive(Debug, Default)]
pub struct DigestCommitmentEngine {
    ready: AtomicBool,
}

impl DigestCommitmentEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that needs no warm-up call
    pub fn ready() -> Self {
        Self {
            ready: AtomicBool::new(true),
        }
    }

    fn ensure_ready(&self) -> StoreResult<()> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(StoreError::commitment("Commitment engine used before warm-up"));
        }
        Ok(())
    }
}

fn widen(seed: &[u8]) -> [u8; 48] {
    let head = Sha256::digest(seed);
    let tail = Sha256::digest(head);
    let mut out = [0u8; 48];
    out[..32].copy_from_slice(&head);
    out[32..].copy_from_slice(&tail[..16]);
    out
}

#[async_trait]
impl CommitmentEngine for DigestCommitmentEngine {
    async fn warm_up(&self) -> StoreResult<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&self, blob: &BlobUnit) -> StoreResult<Commitment> {
        self.ensure_ready()?;
        Ok(Commitment(widen(blob.as_bytes())))
    }

    fn prove(&self, blob: &BlobUnit, commitment: &Commitment) -> StoreResult<Proof> {
        self.ensure_ready()?;
        let mut hasher = Sha256::new();
        hasher.update(blob.as_bytes());
        hasher.update(commitment.0);
        Ok(Proof(widen(&hasher.finalize())))
    }
}

#[derive(Debug, Clone)]
struct StoredFile {
    mode: StorageMode,
    chunks: Vec<Bytes>,
    hashes: Vec<B256>,
    sizes: Vec<u64>,
}

#[derive(Debug, Clone)]
struct PendingTx {
    receipt: TxReceipt,
    polls_left: u32,
}

/// Record of a transaction the chain accepted
#[derive(Debug, Clone)]
pub struct SentTx {
    pub tx: TxRequest,
    pub blob_count: usize,
    pub tx_hash: B256,
}

/// Failures to inject, counted per call kind (1-based)
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// Reject the n-th `send_transaction`
    pub fail_send_at: Option<usize>,
    /// Mine the n-th sent transaction with a failed status
    pub revert_at: Option<usize>,
    /// Reject every `estimate_gas` call
    pub fail_estimate: bool,
    /// Revert every remove transaction
    pub revert_removals: bool,
    /// Reject every `count_chunks` call
    pub fail_count: bool,
    /// Reject `read_chunk` for this index
    pub fail_read_at: Option<u64>,
    /// Reject every `chunk_hash` call
    pub fail_hash: bool,
}

#[derive(Debug)]
struct ChainState {
    files: HashMap<ContentKey, StoredFile>,
    nonces: HashMap<Address, u64>,
    pending: HashMap<B256, PendingTx>,
    sent: Vec<SentTx>,
    send_attempts: usize,
    fee_data: FeeData,
    excess_blob_gas: u64,
    payment_per_blob: U256,
    gas_estimate: u64,
    confirm_after_polls: u32,
    failures: FailurePlan,
}

/// Ledger with a chunk-store contract, held in memory
#[derive(Clone)]
pub struct MemoryChain {
    state: Arc<Mutex<ChainState>>,
    commitments: Arc<DigestCommitmentEngine>,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChain {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                files: HashMap::new(),
                nonces: HashMap::new(),
                pending: HashMap::new(),
                sent: Vec::new(),
                send_attempts: 0,
                fee_data: FeeData {
                    gas_price: Some(U256::from(1_000_000_000u64)),
                    max_fee_per_gas: Some(U256::from(2_000_000_000u64)),
                    max_priority_fee_per_gas: Some(U256::from(100_000_000u64)),
                },
                excess_blob_gas: 0,
                payment_per_blob: U256::from(1_000u64),
                gas_estimate: 100_000,
                confirm_after_polls: 0,
                failures: FailurePlan::default(),
            })),
            commitments: Arc::new(DigestCommitmentEngine::ready()),
        }
    }

    pub fn with_nonce(self, identity: Address, nonce: u64) -> Self {
        self.state.lock().nonces.insert(identity, nonce);
        self
    }

    pub fn with_fee_data(self, fee_data: FeeData) -> Self {
        self.state.lock().fee_data = fee_data;
        self
    }

    pub fn with_excess_blob_gas(self, excess: u64) -> Self {
        self.state.lock().excess_blob_gas = excess;
        self
    }

    pub fn with_payment_per_blob(self, payment: U256) -> Self {
        self.state.lock().payment_per_blob = payment;
        self
    }

    pub fn with_gas_estimate(self, gas: u64) -> Self {
        self.state.lock().gas_estimate = gas;
        self
    }

    /// Receipts stay pending for this many polls
    pub fn with_confirm_after_polls(self, polls: u32) -> Self {
        self.state.lock().confirm_after_polls = polls;
        self
    }

    pub fn set_failures(&self, failures: FailurePlan) {
        self.state.lock().failures = failures;
    }

    /// Store raw chunks directly, bypassing transactions
    pub fn seed_file(&self, key: impl Into<ContentKey>, mode: StorageMode, chunks: Vec<Bytes>) {
        let hashes = chunks
            .iter()
            .map(|chunk| B256::from_slice(&Sha256::digest(chunk)))
            .collect();
        let sizes = chunks.iter().map(|chunk| chunk.len() as u64).collect();
        self.state.lock().files.insert(
            key.into(),
            StoredFile {
                mode,
                chunks,
                hashes,
                sizes,
            },
        );
    }

    /// Transactions accepted so far
    pub fn sent(&self) -> Vec<SentTx> {
        self.state.lock().sent.clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.state.lock().send_attempts
    }

    /// Raw stored chunks of `key`
    pub fn stored_chunks(&self, key: &ContentKey) -> Vec<Bytes> {
        self.state
            .lock()
            .files
            .get(key)
            .map(|f| f.chunks.clone())
            .unwrap_or_default()
    }

    fn tx_hash(tx: &TxRequest, sequence: usize) -> B256 {
        let mut hasher = Sha256::new();
        hasher.update(tx.from.as_slice());
        hasher.update(tx.nonce.unwrap_or_default().to_be_bytes());
        hasher.update((sequence as u64).to_be_bytes());
        B256::from_slice(&hasher.finalize())
    }

    fn apply(&self, state: &mut ChainState, tx: &TxRequest, blobs: &[BlobUnit]) -> ChainResult<()> {
        match &tx.kind {
            TxKind::Remove => {
                state.files.remove(&tx.key);
                Ok(())
            }
            TxKind::WriteChunks {
                chunk_ids,
                chunk_sizes,
            } => {
                if chunk_sizes.len() != chunk_ids.len() {
                    return Err(ChainError::Reverted("chunk sizes do not match chunk ids".into()));
                }
                let mut file = state.files.get(&tx.key).cloned().unwrap_or(StoredFile {
                    mode: StorageMode::Blob,
                    chunks: Vec::new(),
                    hashes: Vec::new(),
                    sizes: Vec::new(),
                });
                for ((index, size), blob) in chunk_ids.iter().zip(chunk_sizes).zip(blobs) {
                    let index = *index as usize;
                    if index > file.chunks.len() {
                        return Err(ChainError::Reverted(format!(
                            "chunk {} written past end ({})",
                            index,
                            file.chunks.len()
                        )));
                    }
                    let hash = blob_hash(self.commitments.as_ref(), blob)
                        .map_err(|e| ChainError::rpc(e.to_string()))?;
                    let bytes = blob.clone().into_bytes();
                    if index == file.chunks.len() {
                        file.chunks.push(bytes);
                        file.hashes.push(hash);
                        file.sizes.push(*size);
                    } else {
                        file.chunks[index] = bytes;
                        file.hashes[index] = hash;
                        file.sizes[index] = *size;
                    }
                }
                state.files.insert(tx.key.clone(), file);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn get_nonce(&self, identity: Address) -> ChainResult<u64> {
        Ok(self.state.lock().nonces.get(&identity).copied().unwrap_or(0))
    }

    async fn get_fee_data(&self) -> ChainResult<FeeData> {
        Ok(self.state.lock().fee_data.clone())
    }

    async fn get_excess_blob_gas(&self) -> ChainResult<u64> {
        Ok(self.state.lock().excess_blob_gas)
    }

    async fn estimate_gas(&self, _tx: &TxRequest) -> ChainResult<u64> {
        let state = self.state.lock();
        if state.failures.fail_estimate {
            return Err(ChainError::rpc("gas estimation unavailable"));
        }
        Ok(state.gas_estimate)
    }

    async fn send_transaction(&self, tx: TxRequest, blobs: Vec<BlobUnit>) -> ChainResult<B256> {
        let mut state = self.state.lock();
        state.send_attempts += 1;
        let attempt = state.send_attempts;

        if state.failures.fail_send_at == Some(attempt) {
            return Err(ChainError::rpc(format!("send {} rejected", attempt)));
        }
        if tx.blob_count() != blobs.len() {
            return Err(ChainError::rpc("blob count does not match chunk ids"));
        }

        let nonce = tx.nonce.ok_or_else(|| ChainError::rpc("missing nonce"))?;
        let expected = state.nonces.get(&tx.from).copied().unwrap_or(0);
        if nonce != expected {
            return Err(ChainError::rpc(format!("nonce {} does not match expected {}", nonce, expected)));
        }
        state.nonces.insert(tx.from, nonce + 1);

        let reverted = state.failures.revert_at == Some(attempt)
            || (tx.kind == TxKind::Remove && state.failures.revert_removals);
        let success = !reverted && self.apply(&mut state, &tx, &blobs).is_ok();

        let tx_hash = Self::tx_hash(&tx, attempt);
        let fees = tx.fees.unwrap_or(crate::TxFees {
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            max_fee_per_blob_gas: U256::ZERO,
        });
        let blob_gas_price = blob_base_fee(state.excess_blob_gas).map_err(|e| ChainError::rpc(e.to_string()))?;
        let receipt = TxReceipt {
            tx_hash,
            success,
            gas_used: tx.gas_limit.unwrap_or_default(),
            effective_gas_price: fees.max_fee_per_gas,
            blob_gas_used: GAS_PER_BLOB * blobs.len() as u64,
            blob_gas_price,
        };

        let polls_left = state.confirm_after_polls;
        state.pending.insert(tx_hash, PendingTx { receipt, polls_left });
        state.sent.push(SentTx {
            tx,
            blob_count: blobs.len(),
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn get_receipt(&self, tx_hash: B256) -> ChainResult<Option<TxReceipt>> {
        let mut state = self.state.lock();
        let pending = state
            .pending
            .get_mut(&tx_hash)
            .ok_or_else(|| ChainError::NotFound(tx_hash.to_string()))?;
        if pending.polls_left > 0 {
            pending.polls_left -= 1;
            return Ok(None);
        }
        Ok(Some(pending.receipt.clone()))
    }

    async fn count_chunks(&self, key: &ContentKey) -> ChainResult<u64> {
        let state = self.state.lock();
        if state.failures.fail_count {
            return Err(ChainError::rpc("count unavailable"));
        }
        Ok(state.files.get(key).map_or(0, |f| f.chunks.len() as u64))
    }

    async fn chunk_hash(&self, key: &ContentKey, index: u64) -> ChainResult<B256> {
        let state = self.state.lock();
        if state.failures.fail_hash {
            return Err(ChainError::rpc("hash unavailable"));
        }
        Ok(state
            .files
            .get(key)
            .and_then(|f| f.hashes.get(index as usize).copied())
            .unwrap_or(B256::ZERO))
    }

    async fn chunk_size(&self, key: &ContentKey, index: u64) -> ChainResult<u64> {
        self.state
            .lock()
            .files
            .get(key)
            .and_then(|f| f.sizes.get(index as usize).copied())
            .ok_or_else(|| ChainError::NotFound(format!("{}#{}", key, index)))
    }

    async fn storage_mode(&self, key: &ContentKey) -> ChainResult<StorageMode> {
        Ok(self
            .state
            .lock()
            .files
            .get(key)
            .map(|f| f.mode)
            .unwrap_or_default())
    }

    async fn read_chunk(&self, key: &ContentKey, index: u64) -> ChainResult<Bytes> {
        let state = self.state.lock();
        if state.failures.fail_read_at == Some(index) {
            return Err(ChainError::rpc(format!("chunk {} unavailable", index)));
        }
        state
            .files
            .get(key)
            .and_then(|f| f.chunks.get(index as usize).cloned())
            .ok_or_else(|| ChainError::NotFound(format!("{}#{}", key, index)))
    }

    async fn upfront_payment(&self, blob_count: u64) -> ChainResult<U256> {
        Ok(self.state.lock().payment_per_blob.saturating_mul(U256::from(blob_count)))
    }
}
