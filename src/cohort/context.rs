//! Read-only state shared by every bucket worker

use std::sync::Arc;

use crate::codes::{CategorySets, CodeDictionary};
use crate::config::{CohortConfig, StudyParameters};
use crate::error::Result;

/// Dictionary, categories and study parameters, built once per run
#[derive(Debug, Clone)]
pub struct CohortContext {
    pub dictionary: Arc<CodeDictionary>,
    pub categories: CategorySets,
    pub study: StudyParameters,
}

impl CohortContext {
    pub fn new(
        dictionary: Arc<CodeDictionary>,
        categories: CategorySets,
        study: StudyParameters,
    ) -> Result<Self> {
        study.validate()?;
        Ok(Self {
            dictionary,
            categories,
            study,
        })
    }

    /// Load the dictionary and both vocabularies named in the configuration
    pub fn load(config: &CohortConfig) -> Result<Self> {
        let dictionary = CodeDictionary::load(&config.dictionary_path)?;
        let categories = CategorySets::load(
            &config.icd9_vocabulary_path,
            &config.icd10_vocabulary_path,
            &dictionary,
            &config.study.heart_failure_category,
        )?;
        Self::new(Arc::new(dictionary), categories, config.study.clone())
    }

    /// Category names in the order used by the comorbidity index lists
    #[must_use]
    pub fn category_names(&self) -> Vec<String> {
        self.categories.names()
    }
}
