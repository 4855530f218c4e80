use serde::{Deserialize, Serialize};

/// One contiguous byte range of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkInfo {
    pub index: usize,
    pub offset: u64,
    pub length: u64,
}

impl ChunkInfo {
    /// Offset of the last byte in this chunk.
    pub fn end(&self) -> u64 {
        self.offset + self.length - 1
    }
}

/// Split of a file into fixed-size chunks covering `[0, total_size)`.
///
/// The last chunk carries the remainder and is never padded to a full chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    chunks: Vec<ChunkInfo>,
}

impl ChunkPlan {
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        let chunk_size = chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut offset = 0;
        let mut index = 0;

        while offset < total_size {
            let length = std::cmp::min(chunk_size, total_size - offset);
            chunks.push(ChunkInfo {
                index,
                offset,
                length,
            });
            offset += length;
            index += 1;
        }

        Self {
            total_size,
            chunk_size,
            chunks,
        }
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunks(&self) -> &[ChunkInfo] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rounded percentage for `transferred` bytes out of the plan total.
    pub fn percentage(&self, transferred: u64) -> u8 {
        if self.total_size == 0 {
            return 100;
        }
        let pct = (transferred as f64 / self.total_size as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}
