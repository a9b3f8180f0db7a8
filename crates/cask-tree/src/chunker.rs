use bytes::Bytes;

use crate::error::{TreeError, TreeResult};

/// Content-defined chunking configuration.
///
/// Boundaries are found with a gear rolling hash: a cut happens at the
/// first position past `min_size` where the hash's low `mask_bits` bits
/// are zero, giving chunks of roughly `2^mask_bits` bytes; `max_size`
/// forces a cut when no boundary appears.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Minimum chunk size in bytes.
    pub min_size: usize,
    /// Maximum chunk size in bytes.
    pub max_size: usize,
    /// Bits of the rolling-hash mask; average chunk size is `2^mask_bits`.
    pub mask_bits: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: 256 * 1024,      // 256 KiB
            max_size: 4 * 1024 * 1024, // 4 MiB
            mask_bits: 20,             // ~1 MiB average
        }
    }
}

impl ChunkerConfig {
    /// Validate size relationships and absolute limits.
    pub fn validate(&self) -> TreeResult<()> {
        const MIN_CHUNK_SIZE: usize = 64;
        const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

        if self.min_size < MIN_CHUNK_SIZE {
            return Err(TreeError::InvalidConfig(format!(
                "min_size {} is below minimum {MIN_CHUNK_SIZE}",
                self.min_size
            )));
        }
        if self.max_size > MAX_CHUNK_SIZE {
            return Err(TreeError::InvalidConfig(format!(
                "max_size {} exceeds maximum {MAX_CHUNK_SIZE}",
                self.max_size
            )));
        }
        if self.min_size >= self.max_size {
            return Err(TreeError::InvalidConfig(
                "min_size must be less than max_size".to_string(),
            ));
        }
        if self.mask_bits == 0 || self.mask_bits > 32 {
            return Err(TreeError::InvalidConfig(
                "mask_bits must be between 1 and 32".to_string(),
            ));
        }
        Ok(())
    }
}

/// One content-defined chunk of a file.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk bytes.
    pub data: Bytes,
    /// Offset of the chunk in the original stream.
    pub offset: u64,
}

/// Gear-hash content-defined chunker.
///
/// Boundaries depend only on local content, so an insertion near the start
/// of a file shifts at most a couple of chunks instead of re-cutting the
/// whole stream — which is what makes chunk-level deduplication work.
pub struct Chunker {
    config: ChunkerConfig,
    mask: u64,
    gear_table: [u64; 256],
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default()).expect("default config is valid")
    }
}

impl Chunker {
    /// Create a chunker, validating the configuration.
    pub fn new(config: ChunkerConfig) -> TreeResult<Self> {
        config.validate()?;
        let mask = (1u64 << config.mask_bits) - 1;
        Ok(Self {
            config,
            mask,
            gear_table: build_gear_table(),
        })
    }

    /// The configuration this chunker was built with.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Cut `data` into content-defined chunks covering it exactly.
    ///
    /// Empty input yields no chunks.
    pub fn chunk(&self, data: &Bytes) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < data.len() {
            let end = self.find_boundary(&data[start..]);
            chunks.push(Chunk {
                data: data.slice(start..start + end),
                offset: start as u64,
            });
            start += end;
        }
        chunks
    }

    /// Length of the next chunk at the start of `data`.
    fn find_boundary(&self, data: &[u8]) -> usize {
        if data.len() <= self.config.min_size {
            return data.len();
        }
        let limit = data.len().min(self.config.max_size);

        let mut hash: u64 = 0;
        for (i, &byte) in data[..limit].iter().enumerate() {
            hash = (hash << 1).wrapping_add(self.gear_table[byte as usize]);
            if i + 1 >= self.config.min_size && hash & self.mask == 0 {
                return i + 1;
            }
        }
        limit
    }
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("config", &self.config)
            .finish()
    }
}

/// Deterministic gear table derived from BLAKE3 so every process cuts the
/// same boundaries.
fn build_gear_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let digest = blake3_u64(i as u8);
        *slot = digest;
    }
    table
}

fn blake3_u64(seed: u8) -> u64 {
    let hash = cask_types::ContentHasher::new("cask-gear-v1").hash(&[seed]);
    let bytes = hash.as_bytes();
    u64::from_le_bytes(bytes[..8].try_into().expect("hash has at least 8 bytes"))
}
