//! Error taxonomy shared by the data sources, the navigation state machine
//! and the weather feed.

use thiserror::Error;

/// Failure of the read-only dataset API
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("data source `{source_name}` unavailable: {reason}")]
    DataSourceUnavailable { source_name: String, reason: String },
}

impl SourceError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataSourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// Why a raw record was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFault {
    MissingCoordinate,
    NonNumeric,
    OutOfBounds,
    InvalidCount,
}

impl std::fmt::Display for RecordFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RecordFault::MissingCoordinate => "missing coordinate",
            RecordFault::NonNumeric => "non-numeric coordinate",
            RecordFault::OutOfBounds => "coordinate outside the operating bounds",
            RecordFault::InvalidCount => "victim count is not a non-negative integer",
        })
    }
}

/// A record that cannot be placed on the map. Loaders drop these and only
/// report how many were dropped.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("malformed record: {fault}")]
pub struct MalformedRecord {
    pub fault: RecordFault,
}

impl From<RecordFault> for MalformedRecord {
    fn from(fault: RecordFault) -> Self {
        Self { fault }
    }
}

/// Level of the cascading selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionLevel {
    Region,
    SubRegion,
    Venue,
}

impl std::fmt::Display for SelectionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SelectionLevel::Region => "region",
            SelectionLevel::SubRegion => "sub-region",
            SelectionLevel::Venue => "venue",
        })
    }
}

/// Rejected navigation transition. The selection is left untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NavigationError {
    #[error("invalid {level} selection `{value}`")]
    InvalidSelection { level: SelectionLevel, value: String },
    #[error("no venue dataset has been loaded")]
    DatasetNotLoaded,
    #[error("unknown layer `{0}`")]
    UnknownLayer(String),
}

/// External weather feed failure; callers turn this into "no data"
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("weather feed request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("weather feed answered with HTTP {0}")]
    Status(u16),
    #[error("weather feed payload malformed: {0}")]
    Malformed(String),
    #[error("weather feed file unreadable: {0}")]
    Io(#[from] std::io::Error),
}
