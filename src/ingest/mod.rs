//! Attendance CSV ingestion: parsing, worker matching and the table
//! replace performed by a sync run.

pub mod csv;
pub mod matcher;
pub mod normalize;
pub mod sync;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::csv::{decode_text, parse_attendance, ParseOutcome, ParsedRow};
pub use matcher::{MatchTier, WorkerDirectory, WorkerIdentity};
pub use sync::{sync_attendance, SyncError, SyncReport};

/// Call-outcome category of an attendance row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallCode {
    Free,
    Rueda,
    Cliente,
    Repite,
}

impl CallCode {
    pub const ALL: [CallCode; 4] = [
        CallCode::Free,
        CallCode::Rueda,
        CallCode::Cliente,
        CallCode::Repite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CallCode::Free => "free",
            CallCode::Rueda => "rueda",
            CallCode::Cliente => "cliente",
            CallCode::Repite => "repite",
        }
    }

    /// Parses the stored column value.
    pub fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == value)
    }
}

impl fmt::Display for CallCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("attendance CSV is empty")]
    Empty,
    #[error("attendance CSV has no {0} column")]
    MissingColumn(&'static str),
    #[error("unreadable attendance CSV: {0}")]
    Csv(#[from] ::csv::Error),
}
