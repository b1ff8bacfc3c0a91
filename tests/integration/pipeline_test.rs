use std::fs;

use hf_cohort::record_log::partial_path;
use hf_cohort::source::bucket_file_name;
use hf_cohort::{
    CohortError, MemorySourceProvider, SourceKind, StudyParameters, read_record_log, run_cohort,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::utils::{
    ARRHYTHMIA, ARRHYTHMIA_INDEX, CHF_ICD9, CHF_ICD10, CHF_INDEX, ClaimRow, CohortFixture,
    DIABETES, DIABETES_INDEX, EnrollmentRow, assert_record_invariants, claims_batch,
    covered_years, enrollment_batch, run_in_memory, services_with_codes, sorted_records,
    write_shard,
};

#[tokio::test]
async fn test_parquet_run_writes_complete_log() {
    let fixture = CohortFixture::new().unwrap();
    let study = StudyParameters::default();
    let start = study.year_offset(2001);

    let mut enrollment = covered_years(10, 2001, 2004);
    enrollment.push(EnrollmentRow::new(11, 2001, 365));
    fixture.write_bucket(0, &enrollment, &[]).unwrap();
    write_shard(
        &fixture.data_root(),
        0,
        SourceKind::Services,
        &services_with_codes(&[
            (10, start + 10, Some("25000")),
            (10, start + 500, Some("428.0")),
            (10, start + 600, Some("unknown")),
            (11, start + 20, None),
        ]),
    )
    .unwrap();

    fixture
        .write_bucket(
            1,
            &covered_years(20, 2001, 2003),
            &[
                (
                    SourceKind::Inpatient,
                    vec![ClaimRow::new(20, start + 800).with_dx(&[CHF_ICD10])],
                ),
                (
                    SourceKind::Drug,
                    vec![
                        ClaimRow::new(20, start + 30).with_group(5),
                        ClaimRow::new(20, start + 900).with_group(6),
                    ],
                ),
                (
                    SourceKind::Outpatient,
                    vec![ClaimRow::new(20, start + 40).with_dx(&[ARRHYTHMIA]).with_group(12)],
                ),
            ],
        )
        .unwrap();

    let config = fixture.config(2);
    let summary = run_cohort(&config).await.unwrap();

    assert_eq!(summary.buckets, 2);
    assert_eq!(summary.records_written, 2);
    assert_eq!(summary.stats.subjects, 3);
    assert_eq!(summary.stats.ineligible, 1);
    assert_eq!(summary.output.as_deref(), Some(config.output_path.as_path()));
    assert!(!partial_path(&config.output_path).exists());

    let (header, mut records) = read_record_log(&config.output_path).unwrap();
    assert_eq!(header.categories, vec!["ARRHY", "CHF", "DM"]);
    assert_eq!(header.category(CHF_INDEX), Some("CHF"));

    records.sort_by_key(|r| r.hf_date);
    let first = &records[0];
    assert_eq!(first.hf_date, Some(start + 500));
    assert_eq!(first.comorbidities, vec![DIABETES_INDEX]);
    assert_eq!(first.coverage_end, study.year_offset(2004));

    let second = &records[1];
    assert_eq!(second.hf_date, Some(start + 800));
    assert_eq!(second.comorbidities, vec![ARRHYTHMIA_INDEX]);
    assert_eq!(second.drug_groups, vec![4]);
    assert_eq!(second.procedure_groups, vec![11]);
}

#[tokio::test]
async fn test_missing_shard_fails_the_run() {
    let fixture = CohortFixture::new().unwrap();
    fixture
        .write_bucket(0, &covered_years(1, 2001, 2003), &[])
        .unwrap();
    fixture
        .write_bucket(1, &covered_years(2, 2001, 2003), &[])
        .unwrap();
    fs::remove_file(
        fixture
            .data_root()
            .join(SourceKind::Drug.dir_name())
            .join(bucket_file_name(1)),
    )
    .unwrap();

    let config = fixture.config(2);
    let err = run_cohort(&config).await.unwrap_err();

    match err {
        CohortError::MalformedSource { bucket, table, .. } => {
            assert_eq!(bucket, 1);
            assert_eq!(table, SourceKind::Drug);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!config.output_path.exists());
    assert!(!partial_path(&config.output_path).exists());
}

#[tokio::test]
async fn test_unsorted_enrollment_fails_the_run() {
    let fixture = CohortFixture::new().unwrap();
    let mut enrollment = covered_years(5, 2001, 2003);
    enrollment.extend(covered_years(3, 2001, 2003));
    fixture.write_bucket(0, &enrollment, &[]).unwrap();

    let err = run_cohort(&fixture.config(1)).await.unwrap_err();
    assert!(err.is_data_error());
}

fn expect_malformed(err: CohortError, expected: SourceKind) {
    match err {
        CohortError::MalformedSource { bucket, table, .. } => {
            assert_eq!(bucket, 0);
            assert_eq!(table, expected);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unsorted_claims_fail_the_run() {
    let fixture = CohortFixture::new().unwrap();
    let mut enrollment = covered_years(1, 2001, 2003);
    enrollment.extend(covered_years(3, 2001, 2003));
    enrollment.extend(covered_years(5, 2001, 2003));
    fixture
        .write_bucket(
            0,
            &enrollment,
            &[(
                SourceKind::Services,
                vec![ClaimRow::new(1, 10), ClaimRow::new(6, 11), ClaimRow::new(3, 12)],
            )],
        )
        .unwrap();

    let config = fixture.config(1);
    expect_malformed(run_cohort(&config).await.unwrap_err(), SourceKind::Services);
    assert!(!config.output_path.exists());
}

#[tokio::test]
async fn test_unsorted_keys_across_chunks_fail_the_run() {
    let fixture = CohortFixture::new().unwrap();
    let mut enrollment = covered_years(1, 2001, 2003);
    enrollment.extend(covered_years(3, 2001, 2003));
    fixture
        .write_bucket(
            0,
            &enrollment,
            &[(
                SourceKind::Facility,
                // Chunks of three rows: [1, 1, 6] then [3]
                vec![
                    ClaimRow::new(1, 10),
                    ClaimRow::new(1, 11),
                    ClaimRow::new(6, 12),
                    ClaimRow::new(3, 13),
                ],
            )],
        )
        .unwrap();

    let config = fixture.config(1);
    expect_malformed(run_cohort(&config).await.unwrap_err(), SourceKind::Facility);
    assert!(!partial_path(&config.output_path).exists());
}

#[tokio::test]
async fn test_missing_source_root_is_a_configuration_error() {
    let fixture = CohortFixture::new().unwrap();
    fixture
        .write_bucket(0, &covered_years(1, 2001, 2003), &[])
        .unwrap();
    fs::remove_dir_all(fixture.data_root().join(SourceKind::Inpatient.dir_name())).unwrap();

    let config = fixture.config(1);
    let err = run_cohort(&config).await.unwrap_err();
    assert!(matches!(err, CohortError::Configuration(_)));
    assert!(err.to_string().contains("inpatient"));
    assert!(!partial_path(&config.output_path).exists());
}

#[tokio::test]
async fn test_missing_vocabulary_is_a_configuration_error() {
    let fixture = CohortFixture::new().unwrap();
    let mut config = fixture.config(1);
    config.icd10_vocabulary_path = fixture.path().join("missing.json");

    let err = run_cohort(&config).await.unwrap_err();
    assert!(matches!(err, CohortError::Configuration(_)));
    assert!(!partial_path(&config.output_path).exists());
}

fn random_provider(rng: &mut StdRng, buckets: usize, study: &StudyParameters) -> MemorySourceProvider {
    let mut provider = MemorySourceProvider::new();
    for bucket in 0..buckets {
        let mut enrollment = Vec::new();
        let mut inpatient = Vec::new();
        let mut drug = Vec::new();
        let mut outpatient = Vec::new();

        for i in 0..150u64 {
            let key = bucket as u64 * 10_000 + i;
            for year in 2000..2008 {
                if year == 2000 || rng.random_bool(0.85) {
                    let days = if rng.random_bool(0.9) { 365 } else { rng.random_range(0..360) };
                    enrollment.push(EnrollmentRow::new(key, year, days));
                }
            }

            let first_day = study.year_offset(2000);
            let last_day = study.year_offset(2008);
            let mut days: Vec<i32> = (0..rng.random_range(0..8))
                .map(|_| rng.random_range(first_day..last_day))
                .collect();
            days.sort_unstable();
            for day in days {
                let dx = [CHF_ICD9, ARRHYTHMIA, DIABETES, 99][rng.random_range(0..4)];
                inpatient.push(ClaimRow::new(key, day).with_dx(&[dx]));
                drug.push(ClaimRow::new(key, day).with_group(rng.random_range(0..40)));
                outpatient.push(ClaimRow::new(key, day).with_group(rng.random_range(0..600)));
            }
        }

        provider.insert(bucket, SourceKind::Enrollment, enrollment_batch(&enrollment));
        provider.insert(bucket, SourceKind::Inpatient, claims_batch(SourceKind::Inpatient, &inpatient));
        provider.insert(bucket, SourceKind::Drug, claims_batch(SourceKind::Drug, &drug));
        provider.insert(
            bucket,
            SourceKind::Outpatient,
            claims_batch(SourceKind::Outpatient, &outpatient),
        );
    }
    provider
}

#[tokio::test]
async fn test_random_cohort_satisfies_record_invariants() {
    let study = StudyParameters::default();
    let mut rng = StdRng::seed_from_u64(42);
    let provider = random_provider(&mut rng, 4, &study);

    let run = run_in_memory(provider.clone(), 4, 3, study.clone())
        .await
        .unwrap();
    let stats = run.summary.stats;
    assert_eq!(stats.subjects, 600);
    assert_eq!(run.records.len() as u64, stats.emitted());
    assert_eq!(
        stats.subjects,
        stats.ineligible + stats.incident_excluded + stats.non_cases_dropped + stats.emitted()
    );
    for record in &run.records {
        assert_record_invariants(record, study.baseline_days);
        assert!(record.drug_groups.iter().all(|g| *g < 31));
        assert!(record.procedure_groups.iter().all(|g| *g < 500));
    }
    // A heart-failure code inside the baseline can only survive on its last day
    for record in run.records.iter().filter(|r| r.comorbidities.contains(&CHF_INDEX)) {
        assert_eq!(
            record.hf_date,
            Some(record.coverage_start + study.baseline_days)
        );
    }

    let serial = run_in_memory(provider, 4, 1, study).await.unwrap();
    assert_eq!(sorted_records(serial.records), sorted_records(run.records));
}
