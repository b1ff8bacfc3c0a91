//! Keyed multi-way join over the six sources of a bucket
//!
//! The enrollment source drives the join: every distinct key it contains
//! yields exactly one [`JoinedSubjectGroup`]. The other sources are advanced
//! past lower keys (subjects without enrollment rows are dropped) and then
//! while their key equals the target. A source without rows for a subject is
//! simply not present; that is the normal case for most claim tables.
//!
//! All sources must be sorted ascending by subject key. Each cursor checks
//! every chunk it loads, including the step from the previous chunk, and
//! reports a decrease as a malformed source. Once enrollment runs out the
//! other sources are read to the end so their tails are checked as well.

use std::sync::Arc;

use arrow::array::{Array, ArrowPrimitiveType, AsArray, PrimitiveArray, UInt64Array};
use arrow::datatypes::UInt64Type;
use arrow::record_batch::RecordBatch;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::codes::CodeDictionary;
use crate::error::{CohortError, Result};
use crate::source::{BucketSource, ChunkReader, SourceKind, SourceProvider};

/// Rows of one source belonging to one subject.
///
/// Rows may span chunk boundaries, so the group is a list of zero-copy
/// slices of the canonical chunks.
#[derive(Debug, Clone)]
pub struct SourceGroup {
    bucket: usize,
    kind: SourceKind,
    batches: SmallVec<[RecordBatch; 2]>,
}

impl SourceGroup {
    fn empty(bucket: usize, kind: SourceKind) -> Self {
        Self {
            bucket,
            kind,
            batches: SmallVec::new(),
        }
    }

    #[must_use]
    pub const fn bucket(&self) -> usize {
        self.bucket
    }

    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Whether the source contributed any rows for the subject
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.batches.is_empty()
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Get a typed column, one array per slice
    pub fn primitive<T: ArrowPrimitiveType>(&self, name: &str) -> Result<Vec<&PrimitiveArray<T>>> {
        self.batches
            .iter()
            .map(|batch| {
                batch
                    .column_by_name(name)
                    .and_then(|column| column.as_primitive_opt::<T>())
                    .ok_or_else(|| {
                        CohortError::malformed(
                            self.bucket,
                            self.kind,
                            format!("column {name} missing or not {}", T::DATA_TYPE),
                        )
                    })
            })
            .collect()
    }

    /// First non-null value of a column
    pub fn first_value<T: ArrowPrimitiveType>(&self, name: &str) -> Result<Option<T::Native>> {
        Ok(self
            .primitive::<T>(name)?
            .into_iter()
            .flat_map(|array| array.iter())
            .flatten()
            .next())
    }
}

/// All rows of one subject across the six sources
#[derive(Debug, Clone)]
pub struct JoinedSubjectGroup {
    key: u64,
    groups: Vec<SourceGroup>,
}

impl JoinedSubjectGroup {
    #[must_use]
    pub const fn key(&self) -> u64 {
        self.key
    }

    #[must_use]
    pub fn group(&self, kind: SourceKind) -> &SourceGroup {
        &self.groups[kind.index()]
    }

    #[must_use]
    pub fn is_present(&self, kind: SourceKind) -> bool {
        self.group(kind).is_present()
    }

    /// Presence flags in [`SourceKind::ALL`] order
    #[must_use]
    pub fn present(&self) -> [bool; 6] {
        SourceKind::ALL.map(|kind| self.is_present(kind))
    }

    pub fn groups(&self) -> impl Iterator<Item = &SourceGroup> {
        self.groups.iter()
    }
}

/// Read position within one source
struct SourceCursor<R> {
    source: BucketSource<R>,
    chunk: Option<RecordBatch>,
    keys: Option<UInt64Array>,
    pos: usize,
    last_key: Option<u64>,
    exhausted: bool,
}

impl<R: ChunkReader> SourceCursor<R> {
    const fn new(source: BucketSource<R>) -> Self {
        Self {
            source,
            chunk: None,
            keys: None,
            pos: 0,
            last_key: None,
            exhausted: false,
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.chunk = None;
        self.keys = None;
        self.pos = 0;
        self.last_key = None;
        self.exhausted = false;
        Ok(())
    }

    /// Key of the next unconsumed row, loading chunks as needed
    fn peek_key(&mut self) -> Result<Option<u64>> {
        loop {
            if let Some(keys) = &self.keys {
                if self.pos < keys.len() {
                    return Ok(Some(keys.value(self.pos)));
                }
            }
            if self.exhausted {
                return Ok(None);
            }

            match self.source.next_chunk()? {
                Some(chunk) => self.load(chunk)?,
                None => {
                    self.chunk = None;
                    self.keys = None;
                    self.exhausted = true;
                }
            }
        }
    }

    /// Make `chunk` current after checking that its keys continue the order
    fn load(&mut self, chunk: RecordBatch) -> Result<()> {
        let keys = chunk.column(0).as_primitive::<UInt64Type>().clone();
        let unsorted = self
            .last_key
            .into_iter()
            .chain(keys.values().iter().copied())
            .tuple_windows()
            .find(|(previous, key)| key < previous);
        if let Some((previous, key)) = unsorted {
            return Err(CohortError::malformed(
                self.source.bucket(),
                self.source.kind(),
                format!("subject keys not sorted: {key} follows {previous}"),
            ));
        }

        if !keys.is_empty() {
            self.last_key = Some(keys.value(keys.len() - 1));
        }
        self.keys = Some(keys);
        self.chunk = Some(chunk);
        self.pos = 0;
        Ok(())
    }

    /// Read the rest of the source, checking its order
    fn drain(&mut self) -> Result<()> {
        while self.peek_key()?.is_some() {
            self.pos = self.keys.as_ref().map_or(0, UInt64Array::len);
        }
        Ok(())
    }

    /// Drop rows whose key is lower than `key`
    fn skip_below(&mut self, key: u64) -> Result<()> {
        while let Some(next) = self.peek_key()? {
            if next >= key {
                break;
            }
            self.pos += 1;
        }
        Ok(())
    }

    /// Take all rows equal to `key` into `group`
    fn take_equal(&mut self, key: u64, group: &mut SourceGroup) -> Result<()> {
        while self.peek_key()? == Some(key) {
            let (Some(chunk), Some(keys)) = (&self.chunk, &self.keys) else {
                break;
            };
            let start = self.pos;
            let mut end = start + 1;
            while end < keys.len() && keys.value(end) == key {
                end += 1;
            }

            group.batches.push(chunk.slice(start, end - start));
            self.pos = end;
        }
        Ok(())
    }
}

/// Lock-step join of the six sources of one bucket
pub struct KeyedMultiJoin<R> {
    bucket: usize,
    cursors: Vec<SourceCursor<R>>,
}

impl<R: ChunkReader> KeyedMultiJoin<R> {
    /// Join sources given in [`SourceKind::ALL`] order
    pub fn new(sources: Vec<BucketSource<R>>) -> Result<Self> {
        let kinds: Vec<SourceKind> = sources.iter().map(BucketSource::kind).collect();
        if kinds != SourceKind::ALL {
            return Err(CohortError::Configuration(format!(
                "join sources must be given as {:?}, got {kinds:?}",
                SourceKind::ALL
            )));
        }

        let bucket = sources.first().map_or(0, BucketSource::bucket);
        Ok(Self {
            bucket,
            cursors: sources.into_iter().map(SourceCursor::new).collect(),
        })
    }

    /// Open the six sources of `bucket` through a provider
    pub fn open<P>(provider: &P, bucket: usize, dictionary: &Arc<CodeDictionary>) -> Result<Self>
    where
        P: SourceProvider<Reader = R>,
    {
        let sources = SourceKind::ALL
            .into_iter()
            .map(|kind| {
                let reader = provider.open(bucket, kind)?;
                Ok(BucketSource::new(bucket, kind, reader, dictionary.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(sources)
    }

    #[must_use]
    pub const fn bucket(&self) -> usize {
        self.bucket
    }

    /// Rewind every source to its first row
    pub fn reset(&mut self) -> Result<()> {
        self.cursors.iter_mut().try_for_each(SourceCursor::reset)
    }

    /// Produce the group of the next enrollment key, or `None` when done
    pub fn next_group(&mut self) -> Result<Option<JoinedSubjectGroup>> {
        let Some((enrollment, others)) = self.cursors.split_first_mut() else {
            return Ok(None);
        };
        let Some(key) = enrollment.peek_key()? else {
            others.iter_mut().try_for_each(SourceCursor::drain)?;
            return Ok(None);
        };

        let mut groups: Vec<SourceGroup> = SourceKind::ALL
            .iter()
            .map(|kind| SourceGroup::empty(self.bucket, *kind))
            .collect();

        enrollment.take_equal(key, &mut groups[0])?;
        for (cursor, group) in others.iter_mut().zip(groups.iter_mut().skip(1)) {
            cursor.skip_below(key)?;
            cursor.take_equal(key, group)?;
        }

        Ok(Some(JoinedSubjectGroup { key, groups }))
    }
}

impl<R: ChunkReader> Iterator for KeyedMultiJoin<R> {
    type Item = Result<JoinedSubjectGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_group().transpose()
    }
}
