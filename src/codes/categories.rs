//! Comorbidity categories
//!
//! Each category is a named, sorted and duplicate-free set of diagnosis ids,
//! merged from an ICD-9 and an ICD-10 vocabulary. Membership is a binary
//! search, which is only correct because construction sorts and deduplicates.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use itertools::Itertools;
use rayon::prelude::*;

use super::dictionary::{CodeDictionary, DiagnosisId};
use crate::error::util::read_json_file;
use crate::error::{CohortError, Result};

/// Raw vocabulary: category name to the code strings it contains
pub type Vocabulary = BTreeMap<String, Vec<String>>;

/// A named comorbidity category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComorbidityCategory {
    name: String,
    ids: Vec<DiagnosisId>,
}

impl ComorbidityCategory {
    /// Create a category; the ids are sorted and deduplicated here
    pub fn new(name: impl Into<String>, ids: impl IntoIterator<Item = DiagnosisId>) -> Self {
        Self {
            name: name.into(),
            ids: ids.into_iter().sorted_unstable().dedup().collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sorted, distinct ids of this category
    #[must_use]
    pub fn ids(&self) -> &[DiagnosisId] {
        &self.ids
    }

    /// Membership test by binary search
    #[must_use]
    pub fn contains(&self, id: DiagnosisId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }
}

impl fmt::Display for ComorbidityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} codes)", self.name, self.ids.len())
    }
}

/// All comorbidity categories in fixed (name-sorted) order
#[derive(Debug, Clone)]
pub struct CategorySets {
    categories: Vec<ComorbidityCategory>,
    heart_failure: usize,
}

impl CategorySets {
    /// Merge two vocabularies into categories.
    ///
    /// Category names come from the ICD-9 vocabulary; both vocabularies are
    /// expected to use the same names. A name missing from the ICD-10 side
    /// simply contributes no ICD-10 codes.
    pub fn merge(
        icd9: &Vocabulary,
        icd10: &Vocabulary,
        dictionary: &CodeDictionary,
        heart_failure_category: &str,
    ) -> Result<Self> {
        // BTreeMap keys iterate in sorted order, which fixes the category order
        let names: Vec<&String> = icd9.keys().collect();

        let categories: Vec<ComorbidityCategory> = names
            .par_iter()
            .map(|name| {
                let icd9_ids = dictionary.convert(icd9.get(*name).into_iter().flatten());
                let icd10_ids = dictionary.convert(icd10.get(*name).into_iter().flatten());
                ComorbidityCategory::new(name.as_str(), icd9_ids.into_iter().chain(icd10_ids))
            })
            .collect();

        for name in icd10.keys().filter(|n| !icd9.contains_key(*n)) {
            log::warn!("Category {name} only appears in the ICD-10 vocabulary and is ignored");
        }

        Self::from_categories(categories, heart_failure_category)
    }

    /// Build from already constructed categories
    pub fn from_categories(
        categories: Vec<ComorbidityCategory>,
        heart_failure_category: &str,
    ) -> Result<Self> {
        let heart_failure = categories
            .iter()
            .position(|c| c.name() == heart_failure_category)
            .ok_or_else(|| {
                CohortError::Configuration(format!(
                    "can't find heart failure category {heart_failure_category}"
                ))
            })?;

        Ok(Self {
            categories,
            heart_failure,
        })
    }

    /// Load both vocabulary files and merge them
    pub fn load(
        icd9_path: &Path,
        icd10_path: &Path,
        dictionary: &CodeDictionary,
        heart_failure_category: &str,
    ) -> Result<Self> {
        let icd9: Vocabulary = read_json_file(icd9_path, "ICD-9 comorbidity vocabulary")?;
        let icd10: Vocabulary = read_json_file(icd10_path, "ICD-10 comorbidity vocabulary")?;

        let sets = Self::merge(&icd9, &icd10, dictionary, heart_failure_category)?;
        log::info!(
            "Built {} comorbidity categories; heart failure uses {}",
            sets.len(),
            sets.heart_failure()
        );
        Ok(sets)
    }

    /// The category whose codes define the heart-failure outcome
    #[must_use]
    pub fn heart_failure(&self) -> &ComorbidityCategory {
        &self.categories[self.heart_failure]
    }

    /// Category names in output order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComorbidityCategory> {
        self.categories.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
