//! Diagnosis code handling
//!
//! The dictionary turns code strings into integer ids; the category sets
//! group those ids into comorbidity categories (one of which defines heart
//! failure).

pub mod categories;
pub mod dictionary;

pub use categories::{CategorySets, ComorbidityCategory, Vocabulary};
pub use dictionary::{CodeDictionary, DiagnosisId};
