use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "presence", rename_all = "lowercase")]
pub(crate) enum Presence {
    Present,
    Absent,
    Unknown,
}

impl Presence {
    pub(crate) fn is_present(self) -> bool {
        matches!(self, Presence::Present)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "subjectcode", rename_all = "UPPERCASE")]
pub(crate) enum SubjectCode {
    Lp,
    Mat,
    Ch,
    Cn,
}

impl SubjectCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SubjectCode::Lp => "LP",
            SubjectCode::Mat => "MAT",
            SubjectCode::Ch => "CH",
            SubjectCode::Cn => "CN",
        }
    }
}

impl fmt::Display for SubjectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "proficiencylevel", rename_all = "UPPERCASE")]
pub(crate) enum ProficiencyLevel {
    N1,
    N2,
    N3,
    N4,
}

impl ProficiencyLevel {
    pub(crate) fn numeric(self) -> u32 {
        match self {
            ProficiencyLevel::N1 => 1,
            ProficiencyLevel::N2 => 2,
            ProficiencyLevel::N3 => 3,
            ProficiencyLevel::N4 => 4,
        }
    }

    pub(crate) fn from_numeric(value: u32) -> Option<Self> {
        match value {
            1 => Some(ProficiencyLevel::N1),
            2 => Some(ProficiencyLevel::N2),
            3 => Some(ProficiencyLevel::N3),
            4 => Some(ProficiencyLevel::N4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "scanjobstatus", rename_all = "lowercase")]
pub(crate) enum ScanJobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}
