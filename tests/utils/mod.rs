use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Int32Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use hf_cohort::cohort::CohortContext;
use hf_cohort::source::layout::KEY;
use hf_cohort::{
    CategorySets, CodeDictionary, CohortConfig, LogHeader, MemorySourceProvider, Pipeline,
    RecordLogReader, RecordLogWriter, Result, RunSummary, SourceDirs, SourceKind, StudyParameters,
    SubjectRecord,
};
use tempfile::TempDir;

pub use hf_cohort::utils::test::fixtures::*;

/// Ids of the dictionary written by [`CohortFixture`]
pub const CHF_ICD9: u32 = 1;
pub const ARRHYTHMIA: u32 = 2;
pub const CHF_ICD10: u32 = 3;
pub const DIABETES: u32 = 4;

/// Category positions in header order (ARRHY, CHF, DM)
pub const ARRHYTHMIA_INDEX: u16 = 0;
pub const CHF_INDEX: u16 = 1;
pub const DIABETES_INDEX: u16 = 2;

fn dictionary_pairs() -> Vec<(&'static str, u32)> {
    vec![
        ("4280", CHF_ICD9),
        ("42731", ARRHYTHMIA),
        ("I509", CHF_ICD10),
        ("25000", DIABETES),
    ]
}

fn vocab(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    entries
        .iter()
        .map(|(name, codes)| {
            (
                (*name).to_string(),
                codes.iter().map(|c| (*c).to_string()).collect(),
            )
        })
        .collect()
}

fn vocabularies() -> (BTreeMap<String, Vec<String>>, BTreeMap<String, Vec<String>>) {
    let none: &[&str] = &[];
    (
        vocab(&[
            ("CHF", &["4280"][..]),
            ("ARRHY", &["42731"][..]),
            ("DM", &["25000"][..]),
        ]),
        vocab(&[("CHF", &["I50.9"][..]), ("ARRHY", none), ("DM", &["E119"][..])]),
    )
}

/// Context with the fixture dictionary and categories, for in-memory runs
#[must_use]
pub fn memory_context(study: StudyParameters) -> Arc<CohortContext> {
    let dictionary = CodeDictionary::from_pairs(dictionary_pairs());
    let (icd9, icd10) = vocabularies();
    let categories =
        CategorySets::merge(&icd9, &icd10, &dictionary, &study.heart_failure_category).unwrap();
    Arc::new(CohortContext::new(Arc::new(dictionary), categories, study).unwrap())
}

/// Output of an in-memory run, read back from the record log
pub struct MemoryRun {
    pub summary: RunSummary,
    pub header: LogHeader,
    pub records: Vec<SubjectRecord>,
}

/// Run the pipeline over in-memory shards, writing the log to a buffer
pub async fn run_in_memory(
    provider: MemorySourceProvider,
    buckets: usize,
    concurrency: usize,
    study: StudyParameters,
) -> Result<MemoryRun> {
    let pipeline = Pipeline::new(provider, memory_context(study))
        .with_concurrency(concurrency)
        .with_queue_capacity(4);
    let (summary, writer) = pipeline
        .run(0..buckets, RecordLogWriter::new(Vec::new()))
        .await?;

    let bytes = writer.finish()?;
    let reader = RecordLogReader::new(bytes.as_slice())?;
    let header = reader.header().clone();
    let records = reader.collect::<Result<Vec<_>>>()?;
    Ok(MemoryRun {
        summary,
        header,
        records,
    })
}

/// A temporary data root with code files and per-source shard directories
pub struct CohortFixture {
    dir: TempDir,
}

impl CohortFixture {
    pub fn new() -> Result<Self> {
        let fixture = Self {
            dir: tempfile::tempdir()?,
        };
        let dictionary: BTreeMap<&str, u32> = dictionary_pairs().into_iter().collect();
        let (icd9, icd10) = vocabularies();
        write_json(&fixture.path().join("dxcodes.json"), &dictionary)?;
        write_json(&fixture.path().join("elix9.json"), &icd9)?;
        write_json(&fixture.path().join("elix10.json"), &icd10)?;
        Ok(fixture)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn data_root(&self) -> PathBuf {
        self.path().join("data")
    }

    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.path().join("out").join("hfdat.jsonl.gz")
    }

    #[must_use]
    pub fn config(&self, num_buckets: usize) -> CohortConfig {
        CohortConfig::new()
            .with_source_dirs(SourceDirs::under(&self.data_root()))
            .with_num_buckets(num_buckets)
            .with_code_files(
                self.path().join("dxcodes.json"),
                self.path().join("elix9.json"),
                self.path().join("elix10.json"),
            )
            .with_output_path(self.output_path())
            .with_chunk_size(3)
            .with_concurrency(2)
            .with_progress(false)
    }

    pub fn write_bucket(
        &self,
        bucket: usize,
        enrollment: &[EnrollmentRow],
        claims: &[(SourceKind, Vec<ClaimRow>)],
    ) -> Result<()> {
        write_bucket(&self.data_root(), bucket, enrollment, claims)
    }
}

/// Services batch whose diagnoses are code strings rather than ids
#[must_use]
pub fn services_with_codes(rows: &[(u64, i32, Option<&str>)]) -> RecordBatch {
    let layout = SourceKind::Services.layout();
    let schema = Arc::new(Schema::new(vec![
        Field::new(KEY, DataType::UInt64, false),
        Field::new(layout.date, DataType::Int32, true),
        Field::new(layout.diagnoses[0], DataType::Utf8, true),
        Field::new(layout.diagnoses[1], DataType::Utf8, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(rows.iter().map(|r| r.0).collect::<UInt64Array>()),
        Arc::new(rows.iter().map(|r| Some(r.1)).collect::<Int32Array>()),
        Arc::new(rows.iter().map(|r| r.2).collect::<StringArray>()),
        Arc::new(StringArray::from(vec![None::<&str>; rows.len()])),
    ];
    RecordBatch::try_new(schema, columns).unwrap()
}

/// Records in a canonical order, for comparing runs
#[must_use]
pub fn sorted_records(records: Vec<SubjectRecord>) -> Vec<String> {
    let mut lines: Vec<String> = records
        .into_iter()
        .map(|r| serde_json::to_string(&r).unwrap())
        .collect();
    lines.sort();
    lines
}

/// Check the invariants every emitted record must satisfy
pub fn assert_record_invariants(record: &SubjectRecord, baseline_days: i32) {
    for list in [
        &record.comorbidities,
        &record.drug_groups,
        &record.procedure_groups,
    ] {
        assert!(
            list.windows(2).all(|w| w[0] < w[1]),
            "index list not strictly increasing: {list:?}"
        );
    }
    assert!(record.coverage_end > record.coverage_start);
    match record.hf_date {
        Some(onset) => {
            assert!(record.hf);
            assert!(onset >= record.coverage_start + baseline_days);
        }
        None => assert!(!record.hf),
    }
}
