//! Opening the shards of a bucket

use std::path::PathBuf;

use arrow::record_batch::RecordBatch;
use rustc_hash::FxHashMap;

use super::SourceKind;
use super::reader::{ChunkReader, MemoryChunkReader, ParquetChunkReader};
use crate::config::SourceDirs;
use crate::error::{CohortError, Result};

/// File name of a bucket shard within a source directory
#[must_use]
pub fn bucket_file_name(bucket: usize) -> String {
    format!("bucket_{bucket:04}.parquet")
}

/// Opens the reader for one source of one bucket
pub trait SourceProvider: Send + Sync {
    type Reader: ChunkReader + 'static;

    fn open(&self, bucket: usize, kind: SourceKind) -> Result<Self::Reader>;
}

/// Reads shards from `<source_dir>/bucket_NNNN.parquet`
#[derive(Debug, Clone)]
pub struct ParquetSourceProvider {
    dirs: SourceDirs,
    chunk_size: usize,
}

impl ParquetSourceProvider {
    #[must_use]
    pub const fn new(dirs: SourceDirs, chunk_size: usize) -> Self {
        Self { dirs, chunk_size }
    }

    /// Path of one shard
    #[must_use]
    pub fn shard_path(&self, bucket: usize, kind: SourceKind) -> PathBuf {
        self.dirs.get(kind).join(bucket_file_name(bucket))
    }
}

impl SourceProvider for ParquetSourceProvider {
    type Reader = ParquetChunkReader;

    fn open(&self, bucket: usize, kind: SourceKind) -> Result<Self::Reader> {
        let path = self.shard_path(bucket, kind);
        if !path.is_file() {
            return Err(CohortError::malformed(
                bucket,
                kind,
                format!("shard not found: {}", path.display()),
            ));
        }
        ParquetChunkReader::open(&path, kind.layout().column_names(), self.chunk_size)
    }
}

/// Serves shards held in memory; a shard never inserted reads as empty
#[derive(Debug, Clone, Default)]
pub struct MemorySourceProvider {
    shards: FxHashMap<(usize, SourceKind), Vec<RecordBatch>>,
}

impl MemorySourceProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch to the shard of `kind` in `bucket`
    pub fn insert(&mut self, bucket: usize, kind: SourceKind, batch: RecordBatch) {
        self.shards.entry((bucket, kind)).or_default().push(batch);
    }

    /// Builder-style variant of [`Self::insert`]
    #[must_use]
    pub fn with_batch(mut self, bucket: usize, kind: SourceKind, batch: RecordBatch) -> Self {
        self.insert(bucket, kind, batch);
        self
    }
}

impl SourceProvider for MemorySourceProvider {
    type Reader = MemoryChunkReader;

    fn open(&self, bucket: usize, kind: SourceKind) -> Result<Self::Reader> {
        let batches = self.shards.get(&(bucket, kind)).cloned().unwrap_or_default();
        Ok(MemoryChunkReader::new(batches))
    }
}
