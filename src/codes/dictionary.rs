//! Diagnosis code dictionary
//!
//! Maps external diagnosis code strings (ICD-9 and ICD-10 alike) to the small
//! integer ids used throughout the claims tables.

use std::path::Path;

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::error::util::read_json_file;

/// Integer id of a diagnosis code
pub type DiagnosisId = u32;

/// Immutable mapping from diagnosis code strings to integer ids
#[derive(Debug, Clone, Default)]
pub struct CodeDictionary {
    codes: FxHashMap<String, DiagnosisId>,
}

impl CodeDictionary {
    /// Build a dictionary from `(code, id)` pairs
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, DiagnosisId)>,
        S: Into<String>,
    {
        let codes = pairs
            .into_iter()
            .map(|(code, id)| (normalize_code(&code.into()), id))
            .collect();
        Self { codes }
    }

    /// Load a dictionary from a JSON object of `code -> id`
    pub fn load(path: &Path) -> Result<Self> {
        let raw: FxHashMap<String, DiagnosisId> = read_json_file(path, "diagnosis code dictionary")?;
        log::info!("Loaded {} diagnosis codes from {}", raw.len(), path.display());
        Ok(Self::from_pairs(raw))
    }

    /// Look up the id of a code string
    #[must_use]
    pub fn get(&self, code: &str) -> Option<DiagnosisId> {
        self.codes
            .get(code)
            .or_else(|| self.codes.get(&normalize_code(code)))
            .copied()
    }

    /// Convert a list of code strings, silently dropping unknown codes
    pub fn convert<'a, I>(&self, codes: I) -> Vec<DiagnosisId>
    where
        I: IntoIterator<Item = &'a String>,
    {
        codes.into_iter().filter_map(|c| self.get(c)).collect()
    }

    /// Number of codes in the dictionary
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Codes are compared without surrounding whitespace, dots or case
fn normalize_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| *c != '.')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
