use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use tracing::{debug, info, instrument, warn, Span};

use crate::diff::{batch_unchanged, RemoteChunkDescriptor, RemoteState};
use crate::receipt::wait_for_receipt;
use crate::{
    BlobCodec, BlobUnit, ChainClient, ChunkPlan, CommitmentEngine, ContentKey, ContentSource,
    GasPriceEstimator, NonceCoordinator, StorageMode, StoreError, StoreResult, TxReceipt,
    TxRequest, UploadResult, UploadStage,
};

/// A batch read from the content and encoded, ready for diffing or sending
pub(crate) struct PreparedBatch {
    pub range: Range<u64>,
    pub blobs: Vec<(u64, BlobUnit)>,
    pub sizes: Vec<u64>,
}

impl PreparedBatch {
    pub fn last_index(&self) -> u64 {
        self.range.end - 1
    }

    pub fn blob_count(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn bytes(&self) -> u64 {
        self.sizes.iter().sum()
    }
}

/// Runs the per-content upload state machine:
/// `INIT → DIFF_CHECK → {SKIP | REMOVE_STALE → WRITE | WRITE} → DONE | ABORTED`.
///
/// Batches of one item go out strictly in order. The first failure stops
/// the item; there are no retries.
pub struct UploadOrchestrator {
    chain: Arc<dyn ChainClient>,
    commitments: Arc<dyn CommitmentEngine>,
    nonces: Arc<NonceCoordinator>,
    gas: GasPriceEstimator,
    codec: BlobCodec,
    max_blobs_per_tx: usize,
    poll_interval: Duration,
}

impl UploadOrchestrator {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        commitments: Arc<dyn CommitmentEngine>,
        nonces: Arc<NonceCoordinator>,
        gas: GasPriceEstimator,
        codec: BlobCodec,
        max_blobs_per_tx: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chain,
            commitments,
            nonces,
            gas,
            codec,
            max_blobs_per_tx,
            poll_interval,
        }
    }

    pub fn codec(&self) -> &BlobCodec {
        &self.codec
    }

    pub fn max_blobs_per_tx(&self) -> usize {
        self.max_blobs_per_tx
    }

    /// Upload one content item according to `plan`. Never fails: problems
    /// end up in the result's `failure`.
    #[instrument(
        skip(self, content, plan),
        fields(key = %key, chunks = plan.chunk_count(), request_id = tracing::field::Empty)
    )]
    pub async fn run(&self, key: ContentKey, content: ContentSource, plan: ChunkPlan) -> UploadResult {
        let mut result = UploadResult::new(key.clone(), plan.chunk_count());
        Span::current().record("request_id", tracing::field::display(result.request_id));

        debug!(stage = %UploadStage::Init, "Resolving remote state");
        let remote = match RemoteChunkDescriptor::fetch(self.chain.as_ref(), &key).await {
            Ok(remote) => remote,
            Err(e) => return self.abort(result, UploadStage::Init, e),
        };

        debug!(stage = %UploadStage::DiffCheck, remote_chunks = remote.chunk_count, "Classifying remote state");
        if remote.chunk_count > 0 && remote.mode != StorageMode::Blob {
            let e = StoreError::remote_state(format!(
                "Key {} holds {:?} chunks and cannot be rewritten with blobs",
                key, remote.mode
            ));
            return self.abort(result, UploadStage::DiffCheck, e);
        }

        let mut state = remote.classify(plan.chunk_count());
        if let RemoteState::Stale { remote_chunks } = state {
            debug!(stage = %UploadStage::RemoveStale, remote_chunks, "Removing stale chunks");
            if let Err(e) = self.remove_stale(&key).await {
                return self.abort(result, UploadStage::RemoveStale, e);
            }
            state = RemoteState::Fresh;
        }

        debug!(stage = %UploadStage::Write, ?state, "Writing batches");
        for range in plan.batches(self.max_blobs_per_tx) {
            let batch = match self.prepare_batch(&content, &plan, range).await {
                Ok(batch) => batch,
                Err(e) => return self.abort(result, UploadStage::Write, e),
            };

            if let RemoteState::Normal { remote_chunks } = state {
                match batch_unchanged(
                    self.chain.as_ref(),
                    self.commitments.as_ref(),
                    &key,
                    remote_chunks,
                    &batch.blobs,
                )
                .await
                {
                    Ok(true) => {
                        debug!(range = ?batch.range, "Batch unchanged, skipping");
                        result.record_skipped(batch.last_index());
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => return self.abort(result, UploadStage::DiffCheck, e),
                }
            }

            let last_index = batch.last_index();
            let chunks = batch.blob_count();
            let bytes = batch.bytes();
            match self.submit_batch(&key, batch).await {
                Ok(cost) => {
                    info!(last_index, chunks, "Batch confirmed");
                    result.record_written(last_index, chunks, bytes, cost);
                }
                Err(e) => return self.abort(result, UploadStage::Write, e),
            }
        }

        result.finish();
        info!(
            stage = %UploadStage::Done,
            written = result.chunks_written,
            bytes = result.bytes_written,
            "Upload complete"
        );
        result
    }

    fn abort(&self, mut result: UploadResult, stage: UploadStage, error: StoreError) -> UploadResult {
        warn!(
            stage = %stage,
            success_index = ?result.success_index,
            "Upload aborted: {}",
            error
        );
        result.abort(stage, &error);
        result
    }

    /// Read and encode the chunks of one batch
    pub(crate) async fn prepare_batch(
        &self,
        content: &ContentSource,
        plan: &ChunkPlan,
        range: Range<u64>,
    ) -> StoreResult<PreparedBatch> {
        let mut blobs = Vec::with_capacity((range.end - range.start) as usize);
        let mut sizes = Vec::with_capacity(blobs.capacity());
        for index in range.clone() {
            let bytes = plan.byte_range(index);
            let data = content.read_range(bytes.start, bytes.end).await?;
            blobs.push((index, self.codec.encode(&data)?));
            sizes.push(plan.declared_size(index));
        }
        Ok(PreparedBatch {
            range,
            blobs,
            sizes,
        })
    }

    /// Build the write transaction for a batch, priced with the store's
    /// upfront payment
    pub(crate) async fn write_request(&self, key: &ContentKey, batch: &PreparedBatch) -> StoreResult<TxRequest> {
        let payment = self
            .chain
            .upfront_payment(batch.blob_count())
            .await
            .map_err(|e| StoreError::estimation(format!("Upfront payment unavailable: {}", e)))?;

        Ok(TxRequest::write_chunks(
            self.nonces.identity(),
            key.clone(),
            batch.range.clone().collect(),
            batch.sizes.clone(),
            payment,
        ))
    }

    pub(crate) async fn estimate_gas_limit(&self, tx: &TxRequest) -> StoreResult<u64> {
        let gas_limit = self
            .chain
            .estimate_gas(tx)
            .await
            .map_err(|e| StoreError::estimation(format!("Gas estimation failed: {}", e)))?;
        if gas_limit == 0 {
            return Err(StoreError::estimation("Gas estimation returned zero"));
        }
        Ok(gas_limit)
    }

    pub(crate) fn gas(&self) -> &GasPriceEstimator {
        &self.gas
    }

    pub(crate) fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    pub(crate) fn commitments(&self) -> &dyn CommitmentEngine {
        self.commitments.as_ref()
    }

    pub(crate) fn nonces(&self) -> &NonceCoordinator {
        &self.nonces
    }

    /// Price, sign and confirm one batch; returns what it cost
    async fn submit_batch(&self, key: &ContentKey, batch: PreparedBatch) -> StoreResult<U256> {
        let tx = self.write_request(key, &batch).await?;
        let value = tx.value;
        let blobs = batch.blobs.into_iter().map(|(_, blob)| blob).collect();

        let receipt = self.send_and_confirm(tx, blobs).await?;
        Ok(value.saturating_add(receipt.fee()))
    }

    #[instrument(skip(self))]
    async fn remove_stale(&self, key: &ContentKey) -> StoreResult<()> {
        let tx = TxRequest::remove(self.nonces.identity(), key.clone());
        match self.send_and_confirm(tx, Vec::new()).await {
            Ok(_) => {
                info!("Removed stale chunks");
                Ok(())
            }
            Err(e) => Err(StoreError::remote_state(format!("Failed to remove stale chunks: {}", e))),
        }
    }

    /// Estimate, price, take a nonce, send and wait for the receipt
    async fn send_and_confirm(&self, tx: TxRequest, blobs: Vec<BlobUnit>) -> StoreResult<TxReceipt> {
        let gas_limit = self.estimate_gas_limit(&tx).await?;
        let fees = self.gas.quote(self.chain.as_ref()).await?;
        let tx = tx.with_gas_limit(gas_limit).with_fees(fees);

        let chain = self.chain.as_ref();
        let tx_hash = self
            .nonces
            .submit_with_nonce(|nonce| {
                debug!(nonce, gas_limit, blobs = blobs.len(), "Sending transaction");
                chain.send_transaction(tx.with_nonce(nonce), blobs)
            })
            .await
            .map_err(|e| StoreError::submission(format!("Failed to send transaction: {}", e)))?;

        let receipt = wait_for_receipt(chain, tx_hash, self.poll_interval).await;
        if !receipt.success {
            return Err(StoreError::submission(format!(
                "Transaction {} failed on chain",
                tx_hash
            )));
        }
        Ok(receipt)
    }
}
