use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ContentKey, ErrorKind, StoreError};

/// Stages of a single content upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStage {
    Init,
    DiffCheck,
    RemoveStale,
    Write,
    Done,
    Aborted,
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::DiffCheck => "diff_check",
            Self::RemoveStale => "remove_stale",
            Self::Write => "write",
            Self::Done => "done",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Why an upload stopped early
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFailure {
    /// Stage that was running when the failure occurred
    pub stage: UploadStage,
    pub kind: ErrorKind,
    pub message: String,
}

impl UploadFailure {
    pub fn new(stage: UploadStage, error: &StoreError) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Progress report for one content item.
///
/// Always returned, also when the upload stopped part way; calling again
/// with the same content resumes by skipping chunks already stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub request_id: Uuid,
    pub key: ContentKey,
    /// Chunks the content was planned into
    pub total_chunks: u64,
    /// Highest index of the contiguous run of confirmed or unchanged chunks
    pub success_index: Option<u64>,
    /// Chunks actually sent and confirmed in this call
    pub chunks_written: u64,
    pub bytes_written: u64,
    /// Storage payments plus fees charged, in wei
    pub total_cost: U256,
    pub failure: Option<UploadFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl UploadResult {
    pub fn new(key: ContentKey, total_chunks: u64) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            key,
            total_chunks,
            success_index: None,
            chunks_written: 0,
            bytes_written: 0,
            total_cost: U256::ZERO,
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Number of chunks known to be in place
    pub fn completed_chunks(&self) -> u64 {
        self.success_index.map_or(0, |i| i + 1)
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.completed_chunks() == self.total_chunks
    }

    /// Final stage reached
    pub fn stage(&self) -> UploadStage {
        if self.failure.is_some() {
            UploadStage::Aborted
        } else {
            UploadStage::Done
        }
    }

    pub(crate) fn record_skipped(&mut self, last_index: u64) {
        self.success_index = Some(last_index);
    }

    pub(crate) fn record_written(&mut self, last_index: u64, chunks: u64, bytes: u64, cost: U256) {
        self.success_index = Some(last_index);
        self.chunks_written += chunks;
        self.bytes_written += bytes;
        self.total_cost = self.total_cost.saturating_add(cost);
    }

    pub(crate) fn abort(&mut self, stage: UploadStage, error: &StoreError) {
        self.failure = Some(UploadFailure::new(stage, error));
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
