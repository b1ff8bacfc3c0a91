//! Per-subject scan of the claim sources
//!
//! The scanner walks every diagnosis of every claim source once. Heart-failure
//! diagnoses are tracked over the entire history, while comorbidity, drug and
//! procedure indicators only count during the baseline period
//! `[window_start, window_start + baseline_days]`.

use std::sync::Arc;

use arrow::datatypes::{Int32Type, UInt32Type};

use super::context::CohortContext;
use super::join::{JoinedSubjectGroup, SourceGroup};
use crate::error::Result;
use crate::source::SourceKind;

/// Fixed-size boolean flags compacted to a sorted index list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorSet {
    flags: Vec<bool>,
}

impl IndicatorSet {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
        }
    }

    /// Set flag `index`; out-of-range indices are ignored
    pub fn set(&mut self, index: usize) {
        if let Some(flag) = self.flags.get_mut(index) {
            *flag = true;
        }
    }

    /// Set the flag of a one-based group id when it lies in `1..=len`
    pub fn set_group(&mut self, group: i32) {
        if let Some(index) = usize::try_from(group).ok().and_then(|g| g.checked_sub(1)) {
            self.set(index);
        }
    }

    pub fn clear(&mut self) {
        self.flags.fill(false);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Indices of the set flags, ascending
    #[must_use]
    pub fn to_indices(&self) -> Vec<u16> {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .filter_map(|(i, _)| u16::try_from(i).ok())
            .collect()
    }
}

/// What one subject scan found
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanResult {
    /// Earliest heart-failure diagnosis over the whole history
    pub heart_failure_date: Option<i32>,
    pub comorbidities: Vec<u16>,
    pub drug_groups: Vec<u16>,
    pub procedure_groups: Vec<u16>,
}

/// Scans joined subject groups, reusing its indicator buffers between subjects
pub struct SubjectScanner {
    context: Arc<CohortContext>,
    comorbidities: IndicatorSet,
    drug_groups: IndicatorSet,
    procedure_groups: IndicatorSet,
}

impl SubjectScanner {
    #[must_use]
    pub fn new(context: Arc<CohortContext>) -> Self {
        let comorbidities = IndicatorSet::new(context.categories.len());
        let drug_groups = IndicatorSet::new(context.study.drug_groups);
        let procedure_groups = IndicatorSet::new(context.study.procedure_groups);
        Self {
            context,
            comorbidities,
            drug_groups,
            procedure_groups,
        }
    }

    /// Scan all claim sources of one subject
    pub fn scan(&mut self, group: &JoinedSubjectGroup, window_start: i32) -> Result<ScanResult> {
        self.comorbidities.clear();
        self.drug_groups.clear();
        self.procedure_groups.clear();

        let window_end = window_start + self.context.study.baseline_days;
        let in_window = |day: i32| day >= window_start && day <= window_end;

        let mut heart_failure_date: Option<i32> = None;
        for source in group.groups().filter(|g| g.is_present()) {
            if source.kind() == SourceKind::Enrollment {
                continue;
            }
            let onset = self.scan_diagnoses(source, &in_window)?;
            heart_failure_date = match (heart_failure_date, onset) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            self.scan_groups(source, &in_window)?;
        }

        Ok(ScanResult {
            heart_failure_date,
            comorbidities: self.comorbidities.to_indices(),
            drug_groups: self.drug_groups.to_indices(),
            procedure_groups: self.procedure_groups.to_indices(),
        })
    }

    /// Walk the diagnosis columns; returns the earliest heart-failure date
    fn scan_diagnoses(
        &mut self,
        source: &SourceGroup,
        in_window: &impl Fn(i32) -> bool,
    ) -> Result<Option<i32>> {
        let layout = source.kind().layout();
        if layout.diagnoses.is_empty() {
            return Ok(None);
        }

        let categories = &self.context.categories;
        let heart_failure = categories.heart_failure();
        let dates = source.primitive::<Int32Type>(layout.date)?;

        let mut earliest: Option<i32> = None;
        for column in layout.diagnoses {
            let ids = source.primitive::<UInt32Type>(column)?;
            for (dates, ids) in dates.iter().zip(&ids) {
                for (day, id) in dates.iter().zip(ids.iter()) {
                    let (Some(day), Some(id)) = (day, id) else {
                        continue;
                    };

                    if heart_failure.contains(id) {
                        earliest = Some(earliest.map_or(day, |e| e.min(day)));
                    }

                    if in_window(day) {
                        for (index, category) in categories.iter().enumerate() {
                            if category.contains(id) {
                                self.comorbidities.set(index);
                            }
                        }
                    }
                }
            }
        }
        Ok(earliest)
    }

    fn scan_groups(&mut self, source: &SourceGroup, in_window: &impl Fn(i32) -> bool) -> Result<()> {
        let layout = source.kind().layout();
        let Some(column) = layout.group else {
            return Ok(());
        };
        let target = match source.kind() {
            SourceKind::Drug => &mut self.drug_groups,
            SourceKind::Outpatient => &mut self.procedure_groups,
            _ => return Ok(()),
        };

        let dates = source.primitive::<Int32Type>(layout.date)?;
        let groups = source.primitive::<Int32Type>(column)?;
        for (dates, groups) in dates.iter().zip(&groups) {
            for (day, group) in dates.iter().zip(groups.iter()) {
                if let (Some(day), Some(group)) = (day, group) {
                    if in_window(day) {
                        target.set_group(group);
                    }
                }
            }
        }
        Ok(())
    }
}
