//! The record log
//!
//! A run writes one JSON Lines stream: the first line is a [`LogHeader`]
//! naming the comorbidity categories, every following line is one
//! [`SubjectRecord`](crate::cohort::SubjectRecord). Paths ending in `.gz` are
//! gzip-compressed.

pub mod reader;
pub mod writer;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use reader::{RecordLogReader, read_record_log};
pub use writer::{LogFile, RecordLogWriter, discard_partial, partial_path};

/// First entry of every record log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogHeader {
    /// Category names; comorbidity indices in the records refer to this order
    pub categories: Vec<String>,
}

impl LogHeader {
    #[must_use]
    pub const fn new(categories: Vec<String>) -> Self {
        Self { categories }
    }

    /// Name of the category at `index`
    #[must_use]
    pub fn category(&self, index: u16) -> Option<&str> {
        self.categories.get(usize::from(index)).map(String::as_str)
    }
}

/// Whether a log path is gzip-compressed
#[must_use]
pub fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}
