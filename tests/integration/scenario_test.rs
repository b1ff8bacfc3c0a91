use hf_cohort::cohort::{CoverageYear, SubjectWindow, eligibility_window, key_hash};
use hf_cohort::{MemorySourceProvider, SourceKind, StudyParameters};

use crate::utils::{
    CHF_ICD9, ClaimRow, DIABETES, DIABETES_INDEX, EnrollmentRow, claims_batch, covered_years,
    enrollment_batch, run_in_memory, sorted_records,
};

/// First key at or after `from` whose hash leaves `residue` modulo 10
fn key_with_residue(residue: u64, from: u64) -> u64 {
    (from..).find(|k| key_hash(*k) % 10 == residue).unwrap()
}

#[test]
fn test_window_ends_before_short_year() {
    let years = [
        CoverageYear::new(2003, 10),
        CoverageYear::new(2001, 365),
        CoverageYear::new(2002, 365),
    ];
    assert_eq!(
        eligibility_window(years, 360),
        Some(SubjectWindow {
            first_year: 2001,
            last_year: 2003
        })
    );
}

#[tokio::test]
async fn test_window_sets_record_coverage() {
    let study = StudyParameters::default();
    let key = key_with_residue(0, 1);
    let rows = [
        EnrollmentRow::new(key, 2001, 365),
        EnrollmentRow::new(key, 2002, 365),
        EnrollmentRow::new(key, 2003, 10),
    ];
    let provider =
        MemorySourceProvider::new().with_batch(0, SourceKind::Enrollment, enrollment_batch(&rows));

    let run = run_in_memory(provider, 1, 1, study.clone()).await.unwrap();
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].coverage_start, study.year_offset(2001));
    assert_eq!(run.records[0].coverage_end, study.year_offset(2003));
}

#[tokio::test]
async fn test_onset_within_baseline_is_excluded() {
    let study = StudyParameters::default();
    let start = study.year_offset(2001);
    let mut enrollment = covered_years(1, 2001, 2004);
    enrollment.extend(covered_years(2, 2001, 2004));
    let provider = MemorySourceProvider::new()
        .with_batch(0, SourceKind::Enrollment, enrollment_batch(&enrollment))
        .with_batch(
            0,
            SourceKind::Inpatient,
            claims_batch(
                SourceKind::Inpatient,
                &[
                    ClaimRow::new(1, start + 100).with_dx(&[DIABETES, CHF_ICD9]),
                    ClaimRow::new(2, start + 365).with_dx(&[CHF_ICD9]),
                ],
            ),
        );

    let run = run_in_memory(provider, 1, 1, study.clone()).await.unwrap();
    assert_eq!(run.summary.stats.incident_excluded, 1);
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].hf_date, Some(start + study.baseline_days));
}

#[tokio::test]
async fn test_non_cases_follow_key_hash() {
    let dropped = key_with_residue(3, 1);
    let kept = key_with_residue(0, dropped + 1);
    let mut enrollment = covered_years(dropped, 2001, 2003);
    enrollment.extend(covered_years(kept, 2001, 2003));
    let provider = MemorySourceProvider::new().with_batch(
        0,
        SourceKind::Enrollment,
        enrollment_batch(&enrollment),
    );

    let run = run_in_memory(provider, 1, 1, StudyParameters::default())
        .await
        .unwrap();
    assert_eq!(run.summary.stats.non_cases_dropped, 1);
    assert_eq!(run.summary.stats.non_cases_emitted, 1);
    assert_eq!(run.records.len(), 1);
    assert!(!run.records[0].hf);
}

fn two_bucket_provider(study: &StudyParameters) -> MemorySourceProvider {
    let start = study.year_offset(2001);
    let mut provider = MemorySourceProvider::new();

    for bucket in 0..2usize {
        let keys: Vec<u64> = (0..40).map(|i| bucket as u64 * 1000 + i).collect();
        let enrollment: Vec<EnrollmentRow> = keys
            .iter()
            .flat_map(|key| covered_years(*key, 2001, 2004))
            .collect();
        let claims: Vec<ClaimRow> = keys
            .iter()
            .enumerate()
            .flat_map(|(i, key)| {
                let onset = start + 300 + 20 * i as i32;
                [
                    ClaimRow::new(*key, start + 5).with_dx(&[DIABETES]),
                    ClaimRow::new(*key, onset).with_dx(&[CHF_ICD9]),
                ]
            })
            .filter(|row| row.key % 3 == 0 || row.diagnoses[0] == DIABETES)
            .collect();

        provider.insert(bucket, SourceKind::Enrollment, enrollment_batch(&enrollment));
        provider.insert(bucket, SourceKind::Facility, claims_batch(SourceKind::Facility, &claims));
    }
    provider
}

#[tokio::test]
async fn test_concurrency_does_not_change_records() {
    let study = StudyParameters::default();
    let provider = two_bucket_provider(&study);

    let serial = run_in_memory(provider.clone(), 2, 1, study.clone()).await.unwrap();
    let parallel = run_in_memory(provider, 2, 8, study).await.unwrap();

    assert!(!serial.records.is_empty());
    assert!(
        serial
            .records
            .iter()
            .all(|r| r.comorbidities.contains(&DIABETES_INDEX))
    );
    assert_eq!(serial.records.len(), parallel.records.len());
    assert_eq!(serial.summary.stats, parallel.summary.stats);
    assert_eq!(sorted_records(serial.records), sorted_records(parallel.records));
}
