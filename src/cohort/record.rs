//! The per-subject output record

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// One retained subject.
///
/// Dates are day offsets from January 1st of the study epoch year. The three
/// index lists are strictly increasing: category positions in the header
/// order, and zero-based drug and procedure group indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    /// Whether the subject ever had a heart-failure diagnosis
    pub hf: bool,
    /// Earliest heart-failure diagnosis; present exactly when `hf` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hf_date: Option<i32>,
    pub coverage_start: i32,
    pub coverage_end: i32,
    pub birth_year: i32,
    pub sex: u8,
    pub comorbidities: Vec<u16>,
    pub drug_groups: Vec<u16>,
    pub procedure_groups: Vec<u16>,
}

impl SubjectRecord {
    #[must_use]
    pub const fn is_case(&self) -> bool {
        self.hf
    }

    /// Heart-failure onset, only for cases
    #[must_use]
    pub fn heart_failure_date(&self) -> Option<i32> {
        self.hf_date.filter(|_| self.hf)
    }

    /// Days between coverage start and heart-failure onset
    #[must_use]
    pub fn days_to_onset(&self) -> Option<i32> {
        self.heart_failure_date().map(|d| d - self.coverage_start)
    }
}

/// Calendar date of a day offset
#[must_use]
pub fn offset_to_date(epoch_year: i32, offset: i32) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(epoch_year, 1, 1)?;
    let days = Days::new(u64::from(offset.unsigned_abs()));
    if offset >= 0 {
        epoch.checked_add_days(days)
    } else {
        epoch.checked_sub_days(days)
    }
}
