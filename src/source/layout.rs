//! Column layouts of the source tables
//!
//! Each source is projected to a fixed subset of its columns. Integer columns
//! are normalized to one canonical type per role so that downstream code can
//! downcast without inspecting the file schema.

use arrow::datatypes::DataType;

use super::SourceKind;

/// Subject key column, present in every source
pub const KEY: &str = "Enrolid";
/// Enrollment year
pub const YEAR: &str = "Year";
/// Days of coverage within the enrollment year
pub const MEMBER_DAYS: &str = "Memdays";
/// Year of birth
pub const BIRTH_YEAR: &str = "Dobyr";
/// Sex code
pub const SEX: &str = "Sex";
/// Service date of a claim, in days since the epoch
pub const SERVICE_DATE: &str = "Svcdate";
/// Admission date of an inpatient stay, in days since the epoch
pub const ADMISSION_DATE: &str = "Admdate";
/// Drug therapeutic group
pub const THERAPEUTIC_GROUP: &str = "Thergrp";
/// Procedure group
pub const PROCEDURE_GROUP: &str = "Procgrp";

const DX4: &[&str] = &["Dx1", "Dx2", "Dx3", "Dx4"];
const DX2: &[&str] = &["Dx1", "Dx2"];
const DX15: &[&str] = &[
    "Dx1", "Dx2", "Dx3", "Dx4", "Dx5", "Dx6", "Dx7", "Dx8", "Dx9", "Dx10", "Dx11", "Dx12", "Dx13",
    "Dx14", "Dx15",
];
const DX9: &[&str] = &["Dx1", "Dx2", "Dx3", "Dx4", "Dx5", "Dx6", "Dx7", "Dx8", "Dx9"];
const ENROLLMENT_MEASURES: &[&str] = &[MEMBER_DAYS, BIRTH_YEAR, SEX];
const NONE: &[&str] = &[];

/// What a projected column is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Key,
    Date,
    Diagnosis,
    Group,
    Measure,
    Sex,
}

impl ColumnRole {
    /// The type every column of this role is converted to
    #[must_use]
    pub fn canonical_type(self) -> DataType {
        match self {
            Self::Key => DataType::UInt64,
            Self::Diagnosis => DataType::UInt32,
            Self::Sex => DataType::UInt8,
            Self::Date | Self::Group | Self::Measure => DataType::Int32,
        }
    }
}

/// Projection of one source table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLayout {
    pub kind: SourceKind,
    /// Date column (the enrollment year for the enrollment source)
    pub date: &'static str,
    /// Diagnosis columns, coded or as strings
    pub diagnoses: &'static [&'static str],
    /// Drug or procedure group column
    pub group: Option<&'static str>,
    /// Additional enrollment measures
    pub measures: &'static [&'static str],
}

impl SourceLayout {
    #[must_use]
    pub const fn for_kind(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Enrollment => Self {
                kind,
                date: YEAR,
                diagnoses: NONE,
                group: None,
                measures: ENROLLMENT_MEASURES,
            },
            SourceKind::Outpatient => Self {
                kind,
                date: SERVICE_DATE,
                diagnoses: DX4,
                group: Some(PROCEDURE_GROUP),
                measures: NONE,
            },
            SourceKind::Services => Self {
                kind,
                date: SERVICE_DATE,
                diagnoses: DX2,
                group: None,
                measures: NONE,
            },
            SourceKind::Inpatient => Self {
                kind,
                date: ADMISSION_DATE,
                diagnoses: DX15,
                group: None,
                measures: NONE,
            },
            SourceKind::Facility => Self {
                kind,
                date: SERVICE_DATE,
                diagnoses: DX9,
                group: None,
                measures: NONE,
            },
            SourceKind::Drug => Self {
                kind,
                date: SERVICE_DATE,
                diagnoses: NONE,
                group: Some(THERAPEUTIC_GROUP),
                measures: NONE,
            },
        }
    }

    /// All projected columns with their roles, key first
    #[must_use]
    pub fn columns(&self) -> Vec<(&'static str, ColumnRole)> {
        let mut columns = vec![(KEY, ColumnRole::Key), (self.date, ColumnRole::Date)];
        columns.extend(self.diagnoses.iter().map(|c| (*c, ColumnRole::Diagnosis)));
        if let Some(group) = self.group {
            columns.push((group, ColumnRole::Group));
        }
        columns.extend(self.measures.iter().map(|c| {
            let role = if *c == SEX {
                ColumnRole::Sex
            } else {
                ColumnRole::Measure
            };
            (*c, role)
        }));
        columns
    }

    /// Names of the projected columns
    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns().into_iter().map(|(name, _)| name).collect()
    }
}
