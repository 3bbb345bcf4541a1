use std::io::Write;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use bytes::Bytes;
use futures_util::StreamExt;

use chunkstore_blob::{
    ChainClient, ChunkStore, ContentKey, ContentSource, DigestCommitmentEngine, ErrorKind, FailurePlan,
    MemoryChain, StorageMode, StoreConfig, StoreError, TxKind, UploadItem, UploadStage,
};

// 4 slots of 32 bytes: 124 payload bytes per chunk, 2 chunks per transaction
const CAPACITY: usize = 124;

fn identity() -> Address {
    Address::repeat_byte(0x11)
}

fn config() -> StoreConfig {
    StoreConfig::default()
        .with_geometry(4, 32)
        .with_max_blobs_per_tx(2)
        .with_receipt_poll_interval(Duration::from_millis(1))
}

async fn connect(chain: &MemoryChain) -> ChunkStore {
    ChunkStore::connect(chain.clone(), DigestCommitmentEngine::new(), identity(), config())
        .await
        .unwrap()
}

/// Deterministic content without zero bytes
fn content(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 + 1 + seed % 4).collect()
}

fn write_chunk_ids(chain: &MemoryChain) -> Vec<Vec<u64>> {
    chain
        .sent()
        .into_iter()
        .filter_map(|sent| match sent.tx.kind {
            TxKind::WriteChunks { chunk_ids, .. } => Some(chunk_ids),
            TxKind::Remove => None,
        })
        .collect()
}

#[tokio::test]
async fn test_upload_then_download_round_trip() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let data = content(300, 0);

    let result = store
        .upload_content("file".into(), data.clone().into())
        .await
        .unwrap();

    assert!(result.is_complete());
    assert_eq!(result.stage(), UploadStage::Done);
    assert_eq!(result.total_chunks, 3);
    assert_eq!(result.success_index, Some(2));
    assert_eq!(result.chunks_written, 3);
    assert_eq!(result.bytes_written, 300);
    assert!(result.total_cost > U256::ZERO);
    assert!(result.finished_at.is_some());

    assert_eq!(write_chunk_ids(&chain), vec![vec![0, 1], vec![2]]);

    let downloaded = store.download_content("file".into()).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_declared_sizes_end_with_remainder() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;

    store
        .upload_content("file".into(), content(300, 0).into())
        .await
        .unwrap();

    let sizes: Vec<Vec<u64>> = chain
        .sent()
        .into_iter()
        .filter_map(|sent| match sent.tx.kind {
            TxKind::WriteChunks { chunk_sizes, .. } => Some(chunk_sizes),
            TxKind::Remove => None,
        })
        .collect();
    assert_eq!(sizes, vec![vec![124, 124], vec![52]]);
}

#[tokio::test]
async fn test_second_upload_writes_nothing() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let data = content(300, 0);

    store.upload_content("file".into(), data.clone().into()).await.unwrap();
    let sends = chain.send_attempts();

    let again = store.upload_content("file".into(), data.into()).await.unwrap();

    assert!(again.is_complete());
    assert_eq!(again.chunks_written, 0);
    assert_eq!(again.success_index, Some(2));
    assert_eq!(again.total_cost, U256::ZERO);
    assert_eq!(chain.send_attempts(), sends);
}

#[tokio::test]
async fn test_only_changed_batches_are_rewritten() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let mut data = content(4 * CAPACITY, 0);

    store.upload_content("file".into(), data.clone().into()).await.unwrap();

    // touch chunk 3, which sits in the second batch
    data[3 * CAPACITY + 5] ^= 0x80;
    let result = store.upload_content("file".into(), data.clone().into()).await.unwrap();

    assert!(result.is_complete());
    assert_eq!(result.chunks_written, 2);
    assert_eq!(write_chunk_ids(&chain), vec![vec![0, 1], vec![2, 3], vec![2, 3]]);

    let downloaded = store.download_content("file".into()).await.unwrap();
    assert_eq!(downloaded.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_growing_content_appends_new_chunks() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let data = content(5 * CAPACITY, 0);

    store
        .upload_content("file".into(), data[..2 * CAPACITY].to_vec().into())
        .await
        .unwrap();
    let result = store.upload_content("file".into(), data.clone().into()).await.unwrap();

    assert!(result.is_complete());
    assert_eq!(result.chunks_written, 3);
    assert_eq!(write_chunk_ids(&chain), vec![vec![0, 1], vec![2, 3], vec![4]]);
    assert_eq!(
        store.download_content("file".into()).await.unwrap().as_ref(),
        data.as_slice()
    );
}

#[tokio::test]
async fn test_failed_send_stops_the_item() {
    let chain = MemoryChain::new();
    chain.set_failures(FailurePlan {
        fail_send_at: Some(2),
        ..Default::default()
    });
    let store = connect(&chain).await;

    let result = store
        .upload_content("file".into(), content(5 * CAPACITY, 0).into())
        .await
        .unwrap();

    assert!(!result.is_complete());
    assert_eq!(result.stage(), UploadStage::Aborted);
    assert_eq!(result.success_index, Some(1));
    assert_eq!(result.chunks_written, 2);

    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, UploadStage::Write);
    assert_eq!(failure.kind, ErrorKind::Submission);

    // no batch after the failed one was attempted
    assert_eq!(chain.send_attempts(), 2);
}

#[tokio::test]
async fn test_failed_send_leaves_nonce_gap() {
    let chain = MemoryChain::new();
    chain.set_failures(FailurePlan {
        fail_send_at: Some(2),
        ..Default::default()
    });
    let store = connect(&chain).await;

    store
        .upload_content("file".into(), content(3 * CAPACITY, 0).into())
        .await
        .unwrap();

    assert_eq!(store.nonces().peek().await, 2);
    assert_eq!(chain.get_nonce(identity()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_resume_after_restart_skips_confirmed_chunks() {
    let chain = MemoryChain::new();
    chain.set_failures(FailurePlan {
        fail_send_at: Some(2),
        ..Default::default()
    });
    let data = content(3 * CAPACITY + 10, 0);

    let first = connect(&chain).await;
    let partial = first.upload_content("file".into(), data.clone().into()).await.unwrap();
    assert_eq!(partial.success_index, Some(1));

    chain.set_failures(FailurePlan::default());
    let second = connect(&chain).await;
    let result = second.upload_content("file".into(), data.clone().into()).await.unwrap();

    assert!(result.is_complete());
    assert_eq!(result.chunks_written, 2);
    assert_eq!(write_chunk_ids(&chain), vec![vec![0, 1], vec![2, 3]]);
    assert_eq!(
        second.download_content("file".into()).await.unwrap().as_ref(),
        data.as_slice()
    );
}

#[tokio::test]
async fn test_reverted_batch_reports_submission_failure() {
    let chain = MemoryChain::new();
    chain.set_failures(FailurePlan {
        revert_at: Some(1),
        ..Default::default()
    });
    let store = connect(&chain).await;

    let result = store
        .upload_content("file".into(), content(3 * CAPACITY, 0).into())
        .await
        .unwrap();

    assert_eq!(result.success_index, None);
    assert_eq!(result.chunks_written, 0);
    assert_eq!(result.failure.unwrap().kind, ErrorKind::Submission);
    assert_eq!(chain.send_attempts(), 1);
}

#[tokio::test]
async fn test_stale_chunks_are_removed_first() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;

    store
        .upload_content("file".into(), content(5 * CAPACITY, 0).into())
        .await
        .unwrap();

    let shorter = content(2 * CAPACITY, 1);
    let result = store.upload_content("file".into(), shorter.clone().into()).await.unwrap();

    assert!(result.is_complete());
    assert_eq!(result.chunks_written, 2);

    let sent = chain.sent();
    assert_eq!(sent.len(), 5);
    assert_eq!(sent[3].tx.kind, TxKind::Remove);
    assert_eq!(chain.stored_chunks(&"file".into()).len(), 2);
    assert_eq!(
        store.download_content("file".into()).await.unwrap().as_ref(),
        shorter.as_slice()
    );
}

#[tokio::test]
async fn test_failed_removal_aborts_without_writes() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;

    store
        .upload_content("file".into(), content(5 * CAPACITY, 0).into())
        .await
        .unwrap();

    chain.set_failures(FailurePlan {
        revert_removals: true,
        ..Default::default()
    });
    let result = store
        .upload_content("file".into(), content(2 * CAPACITY, 1).into())
        .await
        .unwrap();

    assert_eq!(result.success_index, None);
    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, UploadStage::RemoveStale);
    assert_eq!(failure.kind, ErrorKind::RemoteState);
    assert_eq!(chain.sent().len(), 4);
    assert_eq!(chain.stored_chunks(&"file".into()).len(), 5);
}

#[tokio::test]
async fn test_unreadable_remote_state_aborts_at_init() {
    let chain = MemoryChain::new();
    chain.set_failures(FailurePlan {
        fail_count: true,
        ..Default::default()
    });
    let store = connect(&chain).await;

    let result = store
        .upload_content("file".into(), content(10, 0).into())
        .await
        .unwrap();

    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, UploadStage::Init);
    assert_eq!(failure.kind, ErrorKind::RemoteState);
    assert_eq!(chain.send_attempts(), 0);
}

#[tokio::test]
async fn test_gas_estimation_failure() {
    let chain = MemoryChain::new();
    chain.set_failures(FailurePlan {
        fail_estimate: true,
        ..Default::default()
    });
    let store = connect(&chain).await;

    let result = store
        .upload_content("file".into(), content(10, 0).into())
        .await
        .unwrap();

    assert_eq!(result.success_index, None);
    assert_eq!(result.failure.unwrap().kind, ErrorKind::Estimation);
    assert_eq!(chain.send_attempts(), 0);
}

#[tokio::test]
async fn test_calldata_key_is_not_overwritten() {
    let chain = MemoryChain::new();
    chain.seed_file("legacy", StorageMode::Calldata, vec![Bytes::from_static(b"old")]);
    let store = connect(&chain).await;

    let result = store
        .upload_content("legacy".into(), content(10, 0).into())
        .await
        .unwrap();

    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, UploadStage::DiffCheck);
    assert_eq!(failure.kind, ErrorKind::RemoteState);
    assert_eq!(chain.send_attempts(), 0);
}

#[tokio::test]
async fn test_empty_content_is_rejected() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;

    let err = store
        .upload_content("file".into(), ContentSource::from_bytes(Bytes::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_oversized_content_is_rejected() {
    let chain = MemoryChain::new();
    let store = ChunkStore::connect(
        chain.clone(),
        DigestCommitmentEngine::new(),
        identity(),
        config().with_max_chunks(2),
    )
    .await
    .unwrap();

    let err = store
        .upload_content("file".into(), content(3 * CAPACITY, 0).into())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));
    assert_eq!(chain.send_attempts(), 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_on_connect() {
    let result = ChunkStore::connect(
        MemoryChain::new(),
        DigestCommitmentEngine::new(),
        identity(),
        config().with_gas_multiplier_percent(50),
    )
    .await;
    assert!(matches!(result, Err(StoreError::Config { .. })));
}

#[tokio::test]
async fn test_upload_all_isolates_failures() {
    let chain = MemoryChain::new();
    chain.seed_file("legacy", StorageMode::Calldata, vec![Bytes::from_static(b"old")]);
    let store = connect(&chain).await;

    let a = content(200, 0);
    let c = content(50, 2);
    let items = vec![
        UploadItem::new("a", a.clone()),
        UploadItem::new("legacy", content(10, 1)),
        UploadItem::new("c", c.clone()),
    ];

    let results = store.upload_all(items, 2).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].key, ContentKey::from("a"));
    assert!(results[0].is_complete());
    assert_eq!(results[1].failure.as_ref().unwrap().stage, UploadStage::DiffCheck);
    assert!(results[2].is_complete());

    assert_eq!(store.download_content("a".into()).await.unwrap().as_ref(), a.as_slice());
    assert_eq!(store.download_content("c".into()).await.unwrap().as_ref(), c.as_slice());
}

#[tokio::test]
async fn test_upload_all_validates_everything_first() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;

    let items = vec![
        UploadItem::new("a", content(200, 0)),
        UploadItem::new("empty", Vec::<u8>::new()),
    ];

    let err = store.upload_all(items, 2).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));
    assert!(err.to_string().contains("empty"));
    assert_eq!(chain.send_attempts(), 0);
}

#[tokio::test]
async fn test_upload_all_rejects_zero_concurrency() {
    let store = connect(&MemoryChain::new()).await;
    let err = store
        .upload_all(vec![UploadItem::new("a", content(10, 0))], 0)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_nonces_are_contiguous_across_items() {
    let chain = MemoryChain::new().with_nonce(identity(), 7);
    let store = connect(&chain).await;

    let items = (0..4)
        .map(|i| UploadItem::new(format!("item-{}", i), content(3 * CAPACITY, i as u8)))
        .collect();
    let results = store.upload_all(items, 4).await.unwrap();

    assert!(results.iter().all(|r| r.is_complete()));
    let nonces: Vec<u64> = chain.sent().iter().filter_map(|s| s.tx.nonce).collect();
    assert_eq!(nonces, (7..15).collect::<Vec<u64>>());
    assert_eq!(chain.get_nonce(identity()).await.unwrap(), 15);
    assert_eq!(store.nonces().peek().await, 15);
}

#[tokio::test]
async fn test_slow_receipts_are_waited_for() {
    let chain = MemoryChain::new().with_confirm_after_polls(3);
    let store = connect(&chain).await;

    let result = store
        .upload_content("file".into(), content(3 * CAPACITY, 0).into())
        .await
        .unwrap();
    assert!(result.is_complete());
}

#[tokio::test]
async fn test_file_source_round_trip() {
    let path = std::env::temp_dir().join(format!("chunkstore-upload-{}.bin", uuid::Uuid::new_v4()));
    let data = content(3 * CAPACITY + 1, 3);
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&data).unwrap();
    }

    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let result = store
        .upload_content("file".into(), ContentSource::from_path(&path))
        .await
        .unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(result.is_complete());
    assert_eq!(result.total_chunks, 4);
    assert_eq!(
        store.download_content("file".into()).await.unwrap().as_ref(),
        data.as_slice()
    );
}

#[tokio::test]
async fn test_download_fails_on_missing_chunk() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    store
        .upload_content("file".into(), content(3 * CAPACITY, 0).into())
        .await
        .unwrap();

    chain.set_failures(FailurePlan {
        fail_read_at: Some(1),
        ..Default::default()
    });
    let err = store.download_content("file".into()).await.unwrap_err();
    assert!(matches!(err, StoreError::Download { .. }));
}

#[tokio::test]
async fn test_download_of_unknown_key_fails() {
    let store = connect(&MemoryChain::new()).await;
    let err = store.download_content("nothing".into()).await.unwrap_err();
    assert!(matches!(err, StoreError::Download { .. }));
}

#[tokio::test]
async fn test_download_stream_yields_chunks_in_order() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let data = content(2 * CAPACITY + 7, 0);
    store.upload_content("file".into(), data.clone().into()).await.unwrap();

    let chunks: Vec<Bytes> = store
        .download_stream("file".into())
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].as_ref(), &data[..CAPACITY]);
    assert_eq!(chunks[2].as_ref(), &data[2 * CAPACITY..]);
}

#[tokio::test]
async fn test_download_calldata_chunks_verbatim() {
    let chain = MemoryChain::new();
    chain.seed_file(
        "legacy",
        StorageMode::Calldata,
        vec![Bytes::from_static(b"hello "), Bytes::from_static(b"world\0")],
    );
    let store = connect(&chain).await;

    let bytes = store.download_content("legacy".into()).await.unwrap();
    assert_eq!(bytes.as_ref(), b"hello world\0");
}

#[tokio::test]
async fn test_trailing_zeros_survive_in_blob_mode() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;

    tokio_test::assert_ok!(store.upload_content("file".into(), vec![7u8, 0, 0].into()).await);
    let bytes = tokio_test::assert_ok!(store.download_content("file".into()).await);
    assert_eq!(bytes.as_ref(), &[7u8, 0, 0]);
}

#[tokio::test]
async fn test_interior_chunk_ending_in_zero_keeps_offsets() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let mut data = content(CAPACITY + 6, 0);
    data[CAPACITY - 1] = 0;
    data[CAPACITY - 2] = 0;

    let result = tokio_test::assert_ok!(store.upload_content("file".into(), data.clone().into()).await);
    assert!(result.is_complete());

    let bytes = tokio_test::assert_ok!(store.download_content("file".into()).await);
    assert_eq!(bytes.len(), data.len());
    assert_eq!(bytes.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_estimate_cost_counts_only_changed_batches() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let data = content(3 * CAPACITY, 0);

    let estimate = store
        .estimate_cost("file".into(), data.clone().into())
        .await
        .unwrap();

    // 1000 wei per blob, three blobs
    assert_eq!(estimate.storage_cost, U256::from(3_000u64));
    // two transactions at 100k gas and 2.4 gwei, plus 2 wei per blob gas
    let execution = U256::from(2u64 * 100_000 * 2_400_000_000);
    let blob = U256::from(2u64 * 131_072 * 3);
    assert_eq!(estimate.gas_cost, execution + blob);
    assert_eq!(estimate.total(), estimate.storage_cost + estimate.gas_cost);
    assert_eq!(chain.send_attempts(), 0);

    store.upload_content("file".into(), data.clone().into()).await.unwrap();
    let after = store.estimate_cost("file".into(), data.into()).await.unwrap();
    assert_eq!(after.total(), U256::ZERO);
}

#[tokio::test]
async fn test_estimate_cost_propagates_estimation_errors() {
    let chain = MemoryChain::new();
    chain.set_failures(FailurePlan {
        fail_estimate: true,
        ..Default::default()
    });
    let store = connect(&chain).await;

    let err = store
        .estimate_cost("file".into(), content(10, 0).into())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Estimation { .. }));
}

#[tokio::test]
async fn test_hash_read_failure_aborts_at_diff_check() {
    let chain = MemoryChain::new();
    let store = connect(&chain).await;
    let data = content(3 * CAPACITY, 0);

    tokio_test::assert_ok!(store.upload_content("file".into(), data.clone().into()).await);
    let sends = chain.send_attempts();

    chain.set_failures(FailurePlan {
        fail_hash: true,
        ..Default::default()
    });
    let result = tokio_test::assert_ok!(store.upload_content("file".into(), data.into()).await);

    assert_eq!(result.success_index, None);
    let failure = result.failure.unwrap();
    assert_eq!(failure.stage, UploadStage::DiffCheck);
    assert_eq!(failure.kind, ErrorKind::RemoteState);
    assert_eq!(chain.send_attempts(), sends);
}

#[tokio::test]
async fn test_estimate_cost_rejects_calldata_key() {
    let chain = MemoryChain::new();
    chain.seed_file("legacy", StorageMode::Calldata, vec![Bytes::from_static(b"old")]);
    let store = connect(&chain).await;

    let err = tokio_test::assert_err!(store.estimate_cost("legacy".into(), content(10, 0).into()).await);
    assert!(matches!(err, StoreError::RemoteState { .. }));
}
