use std::sync::Arc;

use alloy_primitives::{Address, U256};
use bytes::Bytes;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use chunkstore_queue::WorkerPool;

use crate::coordinator::UploadOrchestrator;
use crate::diff::{batch_unchanged, RemoteChunkDescriptor, RemoteState};
use crate::gas::GAS_PER_BLOB;
use crate::{
    BlobCodec, ByteStream, ChainClient, ChunkPlan, CommitmentEngine, ContentKey, ContentSource,
    CostEstimate, DownloadReconstructor, GasPriceEstimator, NonceCoordinator, StoreConfig,
    StorageMode, StoreError, StoreResult, TxRequest, UploadItem, UploadResult, UploadStage,
};

/// The main entry point: uploads, downloads and cost estimates against a
/// remote chunk store for one signing identity
pub struct ChunkStore {
    orchestrator: Arc<UploadOrchestrator>,
    downloader: DownloadReconstructor,
    config: StoreConfig,
    run_id: Uuid,
}

impl ChunkStore {
    /// Validate the config, warm up the commitment engine and seed the
    /// nonce counter from the chain
    #[instrument(skip_all, fields(identity = %identity))]
    pub async fn connect<C, E>(
        chain: C,
        commitments: E,
        identity: Address,
        config: StoreConfig,
    ) -> StoreResult<Self>
    where
        C: ChainClient + 'static,
        E: CommitmentEngine + 'static,
    {
        Self::connect_shared(Arc::new(chain), Arc::new(commitments), identity, config).await
    }

    /// Same as `connect`, for collaborators that are shared elsewhere
    pub async fn connect_shared(
        chain: Arc<dyn ChainClient>,
        commitments: Arc<dyn CommitmentEngine>,
        identity: Address,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        config.validate()?;
        let codec = BlobCodec::new(config.slots_per_unit, config.slot_size)?;

        commitments.warm_up().await?;
        let nonces = NonceCoordinator::seed(chain.as_ref(), identity).await?;

        let orchestrator = UploadOrchestrator::new(
            chain.clone(),
            commitments,
            Arc::new(nonces),
            GasPriceEstimator::new(config.gas_multiplier_percent),
            codec,
            config.max_blobs_per_tx,
            config.receipt_poll_interval(),
        );

        let run_id = Uuid::new_v4();
        info!(%run_id, "Chunk store ready");

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            downloader: DownloadReconstructor::new(chain, codec),
            config,
            run_id,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn codec(&self) -> &BlobCodec {
        self.orchestrator.codec()
    }

    pub fn nonces(&self) -> &NonceCoordinator {
        self.orchestrator.nonces()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Plan content, rejecting empty or oversized input
    pub async fn plan(&self, content: &ContentSource) -> StoreResult<ChunkPlan> {
        let size = content.size().await?;
        let plan = ChunkPlan::new(size, self.codec().chunk_capacity() as u64)?;
        if plan.chunk_count() > self.config.max_chunks {
            return Err(StoreError::invalid(format!(
                "Content of {} bytes needs {} chunks (max: {})",
                size,
                plan.chunk_count(),
                self.config.max_chunks
            )));
        }
        Ok(plan)
    }

    /// Upload one content item.
    ///
    /// Only invalid input is returned as an error. Anything that goes wrong
    /// later is reported in the result, with `success_index` showing how far
    /// the upload got.
    #[instrument(skip(self, content), fields(run_id = %self.run_id, key = %key))]
    pub async fn upload_content(&self, key: ContentKey, content: ContentSource) -> StoreResult<UploadResult> {
        let plan = self.plan(&content).await?;
        Ok(self.orchestrator.run(key, content, plan).await)
    }

    /// Upload many items with at most `concurrency` in flight.
    ///
    /// Every item is planned before any work starts, so invalid input fails
    /// the whole call up front. Results are in input order.
    #[instrument(skip(self, items), fields(run_id = %self.run_id, items = items.len()))]
    pub async fn upload_all(&self, items: Vec<UploadItem>, concurrency: usize) -> StoreResult<Vec<UploadResult>> {
        if concurrency == 0 {
            return Err(StoreError::invalid("Concurrency must be at least 1"));
        }

        let mut planned = Vec::with_capacity(items.len());
        for item in items {
            let plan = self.plan(&item.content).await.map_err(|e| match e {
                StoreError::InvalidInput { message } => {
                    StoreError::invalid(format!("{}: {}", item.key, message))
                }
                other => other,
            })?;
            planned.push((item, plan));
        }

        let pool = WorkerPool::with_workers(concurrency)?;
        let skeletons: Vec<UploadResult> = planned
            .iter()
            .map(|(item, plan)| UploadResult::new(item.key.clone(), plan.chunk_count()))
            .collect();

        let orchestrator = self.orchestrator.clone();
        let outcomes = pool
            .run_each(planned, move |(item, plan)| {
                let orchestrator = orchestrator.clone();
                async move { orchestrator.run(item.key, item.content, plan).await }
            })
            .await;

        // A crashed item keeps its slot; its progress is unknown, so none is claimed
        let results: Vec<UploadResult> = outcomes
            .into_iter()
            .zip(skeletons)
            .map(|(outcome, mut skeleton)| match outcome {
                Ok(result) => result,
                Err(e) => {
                    skeleton.abort(UploadStage::Init, &StoreError::from(e));
                    skeleton
                }
            })
            .collect();

        let failed = results.iter().filter(|r| r.failure.is_some()).count();
        info!(uploaded = results.len() - failed, failed, "Multi-item upload finished");
        Ok(results)
    }

    /// Upload many items using the configured concurrency
    pub async fn upload_all_default(&self, items: Vec<UploadItem>) -> StoreResult<Vec<UploadResult>> {
        self.upload_all(items, self.config.concurrency).await
    }

    /// Fetch and reassemble the content stored under `key`
    pub async fn download_content(&self, key: ContentKey) -> StoreResult<Bytes> {
        self.downloader.download(key).await
    }

    /// Stream the decoded chunks of `key` in order
    pub fn download_stream(&self, key: ContentKey) -> ByteStream {
        self.downloader.stream(key)
    }

    /// Project storage payment and gas for uploading `content` under `key`.
    ///
    /// Read-only: batches that would be skipped are not counted and stale
    /// chunks are not removed.
    #[instrument(skip(self, content), fields(run_id = %self.run_id, key = %key))]
    pub async fn estimate_cost(&self, key: ContentKey, content: ContentSource) -> StoreResult<CostEstimate> {
        let plan = self.plan(&content).await?;
        let orchestrator = self.orchestrator.as_ref();
        let chain = orchestrator.chain();

        let remote = RemoteChunkDescriptor::fetch(chain, &key).await?;
        if remote.chunk_count > 0 && remote.mode != StorageMode::Blob {
            return Err(StoreError::remote_state(format!(
                "Key {} holds {:?} chunks and cannot be rewritten with blobs",
                key, remote.mode
            )));
        }
        let state = remote.classify(plan.chunk_count());
        let fees = orchestrator.gas().quote(chain).await?;
        let nonce = orchestrator.nonces().peek().await;

        let mut estimate = CostEstimate::default();
        for range in plan.batches(orchestrator.max_blobs_per_tx()) {
            let batch = orchestrator.prepare_batch(&content, &plan, range).await?;

            if let RemoteState::Normal { remote_chunks } = state {
                let unchanged = batch_unchanged(
                    chain,
                    orchestrator.commitments(),
                    &key,
                    remote_chunks,
                    &batch.blobs,
                )
                .await?;
                if unchanged {
                    debug!(range = ?batch.range, "Batch unchanged, not counted");
                    continue;
                }
            }

            let tx: TxRequest = orchestrator.write_request(&key, &batch).await?;
            let gas_limit = orchestrator
                .estimate_gas_limit(&tx.clone().with_fees(fees).with_nonce(nonce))
                .await?;

            let blobs = U256::from(batch.blob_count());
            let execution = U256::from(gas_limit).saturating_mul(fees.max_fee_per_gas);
            let blob_gas = fees
                .max_fee_per_blob_gas
                .saturating_mul(U256::from(GAS_PER_BLOB))
                .saturating_mul(blobs);

            estimate.storage_cost = estimate.storage_cost.saturating_add(tx.value);
            estimate.gas_cost = estimate.gas_cost.saturating_add(execution).saturating_add(blob_gas);
        }

        info!(
            storage_cost = %estimate.storage_cost,
            gas_cost = %estimate.gas_cost,
            "Estimated upload cost"
        );
        Ok(estimate)
    }
}
