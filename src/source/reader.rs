//! Chunked readers over one shard
//!
//! A reader hands out raw record batches in file order and can be rewound.
//! It does no type normalization; that is the job of [`super::BucketSource`].

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use parquet::arrow::ProjectionMask;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::schema::types::SchemaDescriptor;

use crate::error::Result;

/// A restartable stream of record batches
pub trait ChunkReader: Send {
    /// Read the next chunk, or `None` once the shard is exhausted
    fn next_chunk(&mut self) -> Result<Option<RecordBatch>>;

    /// Rewind to the first chunk
    fn reset(&mut self) -> Result<()>;
}

/// Helper for creating a projection mask from column names
///
/// Columns missing from the file are skipped here; the caller decides
/// whether a missing column is fatal.
#[must_use]
pub fn create_projection(
    columns: &[&str],
    file_schema: &Schema,
    parquet_schema: &SchemaDescriptor,
) -> Option<ProjectionMask> {
    let projection = columns
        .iter()
        .filter_map(|name| file_schema.index_of(name).ok())
        .sorted_unstable()
        .collect_vec();

    if projection.is_empty() {
        None
    } else {
        Some(ProjectionMask::roots(parquet_schema, projection))
    }
}

/// Reads one Parquet shard in chunks of `chunk_size` rows
pub struct ParquetChunkReader {
    path: PathBuf,
    columns: Vec<&'static str>,
    chunk_size: usize,
    reader: Option<ParquetRecordBatchReader>,
}

impl ParquetChunkReader {
    /// Open a shard, projecting it to `columns`
    pub fn open(path: &Path, columns: Vec<&'static str>, chunk_size: usize) -> Result<Self> {
        let mut reader = Self {
            path: path.to_path_buf(),
            columns,
            chunk_size,
            reader: None,
        };
        reader.reset()?;
        Ok(reader)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn build_reader(&self) -> Result<ParquetRecordBatchReader> {
        let file = File::open(&self.path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let builder = match create_projection(
            &self.columns,
            builder.schema().as_ref(),
            builder.parquet_schema(),
        ) {
            Some(mask) => builder.with_projection(mask),
            None => {
                log::warn!(
                    "None of the expected columns found in {}, reading all columns",
                    self.path.display()
                );
                builder
            }
        };

        Ok(builder.with_batch_size(self.chunk_size).build()?)
    }
}

impl ChunkReader for ParquetChunkReader {
    fn next_chunk(&mut self) -> Result<Option<RecordBatch>> {
        match self.reader.as_mut() {
            Some(reader) => Ok(reader.next().transpose()?),
            None => Ok(None),
        }
    }

    fn reset(&mut self) -> Result<()> {
        log::debug!("Opening shard {}", self.path.display());
        self.reader = Some(self.build_reader()?);
        Ok(())
    }
}

/// Serves batches already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryChunkReader {
    batches: Vec<RecordBatch>,
    next: usize,
}

impl MemoryChunkReader {
    #[must_use]
    pub const fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches, next: 0 }
    }
}

impl ChunkReader for MemoryChunkReader {
    fn next_chunk(&mut self) -> Result<Option<RecordBatch>> {
        let batch = self.batches.get(self.next).cloned();
        if batch.is_some() {
            self.next += 1;
        }
        Ok(batch)
    }

    fn reset(&mut self) -> Result<()> {
        self.next = 0;
        Ok(())
    }
}
