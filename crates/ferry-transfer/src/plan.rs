//! Chunk plan: how a file of a given size splits into full chunks plus one
//! remainder chunk.

use crate::header::{HeaderError, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, TRAILER_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub file_size: u64,
    /// Wire size of a full chunk, trailer included.
    pub chunk_size: usize,
    pub full_chunks: u64,
    pub remainder: usize,
}

impl ChunkPlan {
    pub fn new(file_size: u64, chunk_size: u32) -> Result<Self, HeaderError> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(HeaderError::ChunkSizeOutOfRange(chunk_size));
        }
        let payload = chunk_size as u64 - TRAILER_LEN as u64;
        Ok(Self {
            file_size,
            chunk_size: chunk_size as usize,
            full_chunks: file_size / payload,
            remainder: (file_size % payload) as usize,
        })
    }

    /// Payload bytes carried by a full chunk.
    pub fn payload_size(&self) -> usize {
        self.chunk_size - TRAILER_LEN
    }

    /// Chunks exchanged on the wire: every full chunk plus the remainder
    /// chunk, which is always sent even when empty.
    pub fn wire_chunks(&self) -> u64 {
        self.full_chunks + 1
    }

    /// Payload length of chunk `index`.
    pub fn payload_len(&self, index: u64) -> usize {
        if index < self.full_chunks {
            self.payload_size()
        } else {
            self.remainder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_file() {
        let plan = ChunkPlan::new(0, 64).unwrap();
        assert_eq!(plan.full_chunks, 0);
        assert_eq!(plan.remainder, 0);
        assert_eq!(plan.wire_chunks(), 1);
        assert_eq!(plan.payload_len(0), 0);
    }

    #[test]
    fn exact_multiple() {
        let plan = ChunkPlan::new(3 * 60, 64).unwrap();
        assert_eq!(plan.full_chunks, 3);
        assert_eq!(plan.remainder, 0);
        assert_eq!(plan.payload_len(2), 60);
        assert_eq!(plan.payload_len(3), 0);
    }

    #[test]
    fn with_remainder() {
        let plan = ChunkPlan::new(130, 64).unwrap();
        assert_eq!(plan.full_chunks, 2);
        assert_eq!(plan.remainder, 10);
        assert_eq!(plan.wire_chunks(), 3);
    }

    #[test]
    fn rejects_tiny_chunks() {
        assert_eq!(
            ChunkPlan::new(10, 4),
            Err(HeaderError::ChunkSizeOutOfRange(4))
        );
    }

    proptest! {
        #[test]
        fn prop_plan_covers_file(
            file_size in 0u64..=i32::MAX as u64,
            chunk_size in MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE,
        ) {
            let plan = ChunkPlan::new(file_size, chunk_size).unwrap();
            let payload = (chunk_size - 4) as u64;
            prop_assert_eq!(plan.full_chunks * payload + plan.remainder as u64, file_size);
            prop_assert!((plan.remainder as u64) < payload);
        }
    }
}
