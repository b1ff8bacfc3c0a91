//! Claims source tables
//!
//! Every bucket holds one shard of each of six source tables, all sorted by
//! subject key. This module describes those tables, reads their shards in
//! chunks and normalizes each chunk to a fixed set of typed columns.
//!
//! Available sources:
//! - Enrollment: one row per subject and year with covered days and demographics
//! - Outpatient: outpatient claims with four diagnoses and a procedure group
//! - Services: outpatient services with two diagnoses
//! - Inpatient: inpatient admissions with fifteen diagnoses
//! - Facility: facility claims with nine diagnoses
//! - Drug: outpatient prescriptions with a therapeutic group

pub mod bucket;
pub mod layout;
pub mod provider;
pub mod reader;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use bucket::BucketSource;
pub use layout::SourceLayout;
pub use provider::{MemorySourceProvider, ParquetSourceProvider, SourceProvider, bucket_file_name};
pub use reader::{ChunkReader, MemoryChunkReader, ParquetChunkReader};

/// The six kinds of source table, in join order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Enrollment,
    Outpatient,
    Services,
    Inpatient,
    Facility,
    Drug,
}

impl SourceKind {
    /// All source kinds; the enrollment source comes first and drives the join
    pub const ALL: [Self; 6] = [
        Self::Enrollment,
        Self::Outpatient,
        Self::Services,
        Self::Inpatient,
        Self::Facility,
        Self::Drug,
    ];

    /// Position of this source within a joined subject group
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Enrollment => 0,
            Self::Outpatient => 1,
            Self::Services => 2,
            Self::Inpatient => 3,
            Self::Facility => 4,
            Self::Drug => 5,
        }
    }

    /// Default directory name used when all sources share one base directory
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Enrollment => "enrollment",
            Self::Outpatient => "outpatient",
            Self::Services => "services",
            Self::Inpatient => "inpatient",
            Self::Facility => "facility",
            Self::Drug => "drug",
        }
    }

    /// The column layout read from this source
    #[must_use]
    pub const fn layout(self) -> SourceLayout {
        SourceLayout::for_kind(self)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
