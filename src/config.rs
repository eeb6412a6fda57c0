use crate::click::DEFAULT_TOLERANCE_DEG;
use crate::spatial::{DEFAULT_PRECISION, HOTSPOT_PRECISION};
use serde::Serialize;

/// Operational parameters of the layer composer and the click resolver
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewSettings {
    /// Hazards drawn around a selected venue
    pub detail_radius_km: f64,
    /// Radius of the risk count and hotspot statistics
    pub stats_radius_km: f64,
    /// Overview grid precision in decimal digits
    pub grid_precision: u32,
    pub hotspot_precision: u32,
    pub hotspot_count: usize,
    pub click_tolerance_deg: f64,
    /// Cap on individually drawn hazard points
    pub max_detail_points: usize,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            detail_radius_km: 0.5,
            stats_radius_km: 1.0,
            grid_precision: DEFAULT_PRECISION,
            hotspot_precision: HOTSPOT_PRECISION,
            hotspot_count: 10,
            click_tolerance_deg: DEFAULT_TOLERANCE_DEG,
            max_detail_points: 800,
        }
    }
}
