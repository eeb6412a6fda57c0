//! Read-only access to the venue, hazard and station datasets.
//!
//! The core only talks to [`DataSource`]; whether the records live in memory,
//! in files, or behind a database is the implementor's concern.

mod cache;
mod memory;

pub use cache::{CachedSource, DEFAULT_TTL};
pub use memory::InMemorySource;

use crate::error::SourceError;
use crate::geo::BoundingBox;
use crate::model::{GridCell, HazardRecord, Station, Venue};

/// Full in-memory snapshot of the three datasets
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub venues: Vec<Venue>,
    pub hazards: Vec<HazardRecord>,
    pub stations: Vec<Station>,
}

/// Bounding-box and full-scan queries over the datasets.
/// Every query may fail when the backend cannot be reached.
pub trait DataSource: Send + Sync {
    fn query_venues(&self) -> Result<Vec<Venue>, SourceError>;

    fn query_hazards_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<HazardRecord>, SourceError>;

    fn query_hazards_grid(&self, precision: u32) -> Result<Vec<GridCell>, SourceError>;

    fn query_stations(&self) -> Result<Vec<Station>, SourceError>;

    /// Changes whenever the underlying data is replaced
    fn version(&self) -> u64;
}
