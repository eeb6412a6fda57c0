//! Pure query and aggregation functions over located records: bounding-box
//! filtering, grid bucketing and nearest-neighbour search.

pub mod filter;
pub mod grid;
pub mod index;
pub mod nearest;

pub use filter::{around, count_within, within};
pub use grid::{aggregate, top_cells, DEFAULT_PRECISION, HOTSPOT_PRECISION};
pub use index::SpatialGrid;
pub use nearest::nearest;
