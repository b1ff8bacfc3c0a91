//! Eligibility window: the longest run of consecutive adequately covered years

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use arrow::datatypes::Int32Type;

use super::join::SourceGroup;
use crate::error::{CohortError, Result};
use crate::source::layout::{MEMBER_DAYS, YEAR};

/// Enrollment years accepted from the source; others mark a corrupt shard
pub const ENROLLMENT_YEARS: RangeInclusive<i32> = 1800..=2200;

/// Days of coverage in one enrollment year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageYear {
    pub year: i32,
    pub days_covered: i32,
}

impl CoverageYear {
    #[must_use]
    pub const fn new(year: i32, days_covered: i32) -> Self {
        Self { year, days_covered }
    }
}

/// A run of covered years; `last_year` is the first year after the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectWindow {
    pub first_year: i32,
    pub last_year: i32,
}

impl SubjectWindow {
    /// Number of years in the window
    #[must_use]
    pub const fn len(&self) -> i32 {
        self.last_year - self.first_year
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() <= 0
    }
}

/// Find the longest run of consecutive years with at least `min_days` covered.
///
/// Input order and duplicates do not matter. Equal-length runs resolve to the
/// earliest one. Returns `None` when no year is covered or the longest run is
/// a single year.
pub fn eligibility_window<I>(years: I, min_days: i32) -> Option<SubjectWindow>
where
    I: IntoIterator<Item = CoverageYear>,
{
    let covered: BTreeSet<i32> = years
        .into_iter()
        .filter(|y| y.days_covered >= min_days)
        .map(|y| y.year)
        .collect();

    let mut best: Option<SubjectWindow> = None;
    for &year in &covered {
        // Only run starts need extending
        if year.checked_sub(1).is_some_and(|previous| covered.contains(&previous)) {
            continue;
        }
        let mut end = year.saturating_add(1);
        while end < i32::MAX && covered.contains(&end) {
            end += 1;
        }
        let run = SubjectWindow {
            first_year: year,
            last_year: end,
        };
        if best.is_none_or(|b| run.len() > b.len()) {
            best = Some(run);
        }
    }

    best.filter(|w| w.len() >= 2)
}

/// Coverage years of one subject's enrollment rows.
///
/// Rows with a null year or null day count are skipped; a year outside
/// [`ENROLLMENT_YEARS`] is a malformed source.
pub fn coverage_years(enrollment: &SourceGroup) -> Result<Vec<CoverageYear>> {
    let years = enrollment.primitive::<Int32Type>(YEAR)?;
    let days = enrollment.primitive::<Int32Type>(MEMBER_DAYS)?;

    years
        .iter()
        .zip(&days)
        .flat_map(|(y, d)| y.iter().zip(d.iter()))
        .filter_map(|(year, days)| Some((year?, days?)))
        .map(|(year, days)| {
            if ENROLLMENT_YEARS.contains(&year) {
                Ok(CoverageYear::new(year, days))
            } else {
                Err(CohortError::malformed(
                    enrollment.bucket(),
                    enrollment.kind(),
                    format!("enrollment year {year} out of range"),
                ))
            }
        })
        .collect()
}
