//! One source shard of one bucket, normalized to canonical column types
//!
//! Chunks coming out of a [`BucketSource`] always carry exactly the columns of
//! the source layout, in layout order, with these types:
//!
//! - subject key: `UInt64`, never null
//! - dates, years, groups, measures: `Int32`
//! - sex: `UInt8`
//! - diagnoses: `UInt32` dictionary ids (null when absent or unknown)
//!
//! String diagnosis columns are translated through the code dictionary while
//! the chunk is loaded, so every subject scan works on integer ids.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, UInt32Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use super::layout::ColumnRole;
use super::reader::ChunkReader;
use super::{SourceKind, SourceLayout};
use crate::codes::CodeDictionary;
use crate::error::{CohortError, Result};

/// A chunked, projected and type-normalized reader over one shard
pub struct BucketSource<R> {
    bucket: usize,
    layout: SourceLayout,
    reader: R,
    dictionary: Arc<CodeDictionary>,
    schema: SchemaRef,
}

impl<R: ChunkReader> BucketSource<R> {
    pub fn new(bucket: usize, kind: SourceKind, reader: R, dictionary: Arc<CodeDictionary>) -> Self {
        let layout = kind.layout();
        let fields: Vec<Field> = layout
            .columns()
            .into_iter()
            .map(|(name, role)| Field::new(name, role.canonical_type(), role != ColumnRole::Key))
            .collect();

        Self {
            bucket,
            layout,
            reader,
            dictionary,
            schema: Arc::new(Schema::new(fields)),
        }
    }

    #[must_use]
    pub const fn bucket(&self) -> usize {
        self.bucket
    }

    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        self.layout.kind
    }

    #[must_use]
    pub const fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    /// The canonical schema of every chunk from this source
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Read and normalize the next non-empty chunk
    pub fn next_chunk(&mut self) -> Result<Option<RecordBatch>> {
        while let Some(raw) = self.reader.next_chunk()? {
            if raw.num_rows() == 0 {
                continue;
            }
            return self.canonicalize(&raw).map(Some);
        }
        Ok(None)
    }

    /// Rewind to the start of the shard
    pub fn reset(&mut self) -> Result<()> {
        self.reader.reset()
    }

    fn malformed(&self, reason: impl Into<String>) -> CohortError {
        CohortError::malformed(self.bucket, self.layout.kind, reason)
    }

    fn canonicalize(&self, raw: &RecordBatch) -> Result<RecordBatch> {
        let columns = self
            .layout
            .columns()
            .into_iter()
            .map(|(name, role)| {
                let column = raw
                    .column_by_name(name)
                    .ok_or_else(|| self.malformed(format!("missing column {name}")))?;

                let converted = match role {
                    ColumnRole::Diagnosis => self.diagnosis_ids(name, column)?,
                    _ => self.cast_integer(name, column, &role.canonical_type())?,
                };

                if role == ColumnRole::Key && converted.null_count() > 0 {
                    return Err(self.malformed(format!("null subject key in column {name}")));
                }
                Ok(converted)
            })
            .collect::<Result<Vec<ArrayRef>>>()?;

        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }

    fn cast_integer(&self, name: &str, column: &ArrayRef, target: &DataType) -> Result<ArrayRef> {
        let actual = column.data_type();
        if actual == target {
            return Ok(column.clone());
        }
        if !actual.is_integer() {
            return Err(self.malformed(format!(
                "column {name} has type {actual}, expected an integer type"
            )));
        }
        Ok(cast(column, target)?)
    }

    fn diagnosis_ids(&self, name: &str, column: &ArrayRef) -> Result<ArrayRef> {
        let ids: UInt32Array = match column.data_type() {
            DataType::Utf8 => column
                .as_string::<i32>()
                .iter()
                .map(|code| code.and_then(|c| self.dictionary.get(c)))
                .collect(),
            DataType::LargeUtf8 => column
                .as_string::<i64>()
                .iter()
                .map(|code| code.and_then(|c| self.dictionary.get(c)))
                .collect(),
            DataType::Utf8View => column
                .as_string_view()
                .iter()
                .map(|code| code.and_then(|c| self.dictionary.get(c)))
                .collect(),
            _ => return self.cast_integer(name, column, &DataType::UInt32),
        };
        Ok(Arc::new(ids))
    }
}
