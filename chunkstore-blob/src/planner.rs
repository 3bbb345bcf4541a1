use std::ops::Range;

use crate::{StoreError, StoreResult};

/// How a piece of content maps onto blob-sized chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    content_size: u64,
    chunk_capacity: u64,
    chunk_count: u64,
}

impl ChunkPlan {
    pub fn new(content_size: u64, chunk_capacity: u64) -> StoreResult<Self> {
        if content_size == 0 {
            return Err(StoreError::invalid("Content must not be empty"));
        }
        if chunk_capacity == 0 {
            return Err(StoreError::config("Chunk capacity must be positive"));
        }
        Ok(Self {
            content_size,
            chunk_capacity,
            chunk_count: count_chunks(content_size, chunk_capacity),
        })
    }

    pub fn content_size(&self) -> u64 {
        self.content_size
    }

    pub fn chunk_capacity(&self) -> u64 {
        self.chunk_capacity
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    pub fn last_index(&self) -> u64 {
        self.chunk_count - 1
    }

    /// Size recorded for a chunk: full capacity except for the last one
    pub fn declared_size(&self, index: u64) -> u64 {
        if index + 1 == self.chunk_count {
            self.content_size - self.chunk_capacity * (self.chunk_count - 1)
        } else {
            self.chunk_capacity
        }
    }

    /// Byte range of a chunk within the content
    pub fn byte_range(&self, index: u64) -> Range<u64> {
        let start = index * self.chunk_capacity;
        start..start + self.declared_size(index)
    }

    pub fn batches(&self, max_blobs_per_tx: usize) -> Vec<Range<u64>> {
        plan_batches(self.chunk_count, max_blobs_per_tx)
    }
}

/// `ceil(size / capacity)`
pub fn count_chunks(size: u64, chunk_capacity: u64) -> u64 {
    size.div_ceil(chunk_capacity)
}

/// Contiguous, ordered index ranges of at most `max_blobs_per_tx` chunks
pub fn plan_batches(chunk_count: u64, max_blobs_per_tx: usize) -> Vec<Range<u64>> {
    let step = max_blobs_per_tx.max(1) as u64;
    (0..chunk_count)
        .step_by(step as usize)
        .map(|start| start..(start + step).min(chunk_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CHUNK_CAPACITY;
    use proptest::prelude::*;

    const CAP: u64 = CHUNK_CAPACITY as u64;

    #[test]
    fn test_two_and_a_bit_chunks_fit_one_batch() {
        let plan = ChunkPlan::new(CAP * 2 + 10, CAP).unwrap();
        assert_eq!(plan.chunk_count(), 3);
        assert_eq!(plan.batches(3), vec![0..3]);
        assert_eq!(plan.declared_size(0), CAP);
        assert_eq!(plan.declared_size(2), 10);
    }

    #[test]
    fn test_exact_multiple_spills_into_second_batch() {
        let plan = ChunkPlan::new(CAP * 4, CAP).unwrap();
        assert_eq!(plan.chunk_count(), 4);
        assert_eq!(plan.batches(3), vec![0..3, 3..4]);
        assert_eq!(plan.declared_size(3), CAP);
    }

    #[test]
    fn test_single_byte() {
        let plan = ChunkPlan::new(1, CAP).unwrap();
        assert_eq!(plan.chunk_count(), 1);
        assert_eq!(plan.declared_size(0), 1);
        assert_eq!(plan.byte_range(0), 0..1);
    }

    #[test]
    fn test_byte_ranges_are_contiguous() {
        let plan = ChunkPlan::new(25, 10).unwrap();
        assert_eq!(plan.byte_range(0), 0..10);
        assert_eq!(plan.byte_range(1), 10..20);
        assert_eq!(plan.byte_range(2), 20..25);
    }

    #[test]
    fn test_empty_content_rejected() {
        assert!(matches!(
            ChunkPlan::new(0, CAP),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_chunk_count_is_ceiling(size in 1u64..10_000_000, cap in 1u64..200_000) {
            let plan = ChunkPlan::new(size, cap).unwrap();
            let expected = size / cap + u64::from(size % cap != 0);
            prop_assert_eq!(plan.chunk_count(), expected);
            let total: u64 = (0..plan.chunk_count()).map(|i| plan.declared_size(i)).sum();
            prop_assert_eq!(total, size);
        }

        #[test]
        fn prop_batches_cover_in_order(count in 0u64..500, max in 1usize..10) {
            let batches = plan_batches(count, max);
            let mut next = 0;
            for batch in &batches {
                prop_assert!(batch.end - batch.start <= max as u64);
                prop_assert!(batch.end > batch.start);
                prop_assert_eq!(batch.start, next);
                next = batch.end;
            }
            prop_assert_eq!(next, count);
        }
    }
}
