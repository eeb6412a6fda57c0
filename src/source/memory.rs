use super::{DataSource, Dataset};
use crate::error::SourceError;
use crate::geo::BoundingBox;
use crate::model::{GridCell, HazardRecord, Station, Venue};
use crate::spatial::{aggregate, SpatialGrid};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};
use tracing::info;

/// Hazard index cell size in degrees (about 5.5 km)
const HAZARD_CELL_DEG: f64 = 0.05;

const SOURCE_NAME: &str = "in-memory";

struct Snapshot {
    venues: Vec<Venue>,
    hazards: SpatialGrid<HazardRecord>,
    stations: Vec<Station>,
}

impl Snapshot {
    fn build(dataset: Dataset) -> Self {
        Self {
            venues: dataset.venues,
            hazards: SpatialGrid::build(dataset.hazards, HAZARD_CELL_DEG),
            stations: dataset.stations,
        }
    }
}

/// Dataset held in memory with hazards indexed in a spatial hash grid.
/// `replace` swaps the whole snapshot and bumps the version.
pub struct InMemorySource {
    snapshot: RwLock<Snapshot>,
    version: AtomicU64,
    online: AtomicBool,
}

impl InMemorySource {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            snapshot: RwLock::new(Snapshot::build(dataset)),
            version: AtomicU64::new(1),
            online: AtomicBool::new(true),
        }
    }

    /// Swap in a reloaded dataset
    pub fn replace(&self, dataset: Dataset) {
        let snapshot = Snapshot::build(dataset);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        info!(version, "dataset replaced");
    }

    /// Simulate losing (or regaining) the backend connection
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Snapshot>, SourceError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(SourceError::unavailable(SOURCE_NAME, "backend offline"));
        }
        self.snapshot
            .read()
            .map_err(|_| SourceError::unavailable(SOURCE_NAME, "snapshot lock poisoned"))
    }
}

impl DataSource for InMemorySource {
    fn query_venues(&self) -> Result<Vec<Venue>, SourceError> {
        Ok(self.read()?.venues.clone())
    }

    fn query_hazards_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<HazardRecord>, SourceError> {
        Ok(self.read()?.hazards.query_bbox(bbox).into_iter().cloned().collect())
    }

    fn query_hazards_grid(&self, precision: u32) -> Result<Vec<GridCell>, SourceError> {
        Ok(aggregate(self.read()?.hazards.items(), precision))
    }

    fn query_stations(&self) -> Result<Vec<Station>, SourceError> {
        Ok(self.read()?.stations.clone())
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{bbox, GeoPoint};
    use crate::model::SeverityCounts;

    fn hazard(lat: f64, lon: f64) -> HazardRecord {
        HazardRecord {
            position: GeoPoint::new(lat, lon),
            timestamp: None,
            category: String::new(),
            severity: SeverityCounts::default(),
        }
    }

    #[test]
    fn test_bbox_query_and_grid() {
        let source = InMemorySource::new(Dataset {
            hazards: vec![hazard(25.0881, 121.5241), hazard(25.20, 121.70)],
            ..Dataset::default()
        });
        let near = source
            .query_hazards_in_bbox(&bbox(GeoPoint::new(25.088, 121.524), 0.5))
            .unwrap();
        assert_eq!(near.len(), 1);
        let cells = source.query_hazards_grid(2).unwrap();
        assert_eq!(cells.iter().map(|c| c.count).sum::<u64>(), 2);
    }

    #[test]
    fn test_offline_and_replace() {
        let source = InMemorySource::new(Dataset::default());
        let v1 = source.version();
        source.set_online(false);
        assert!(matches!(
            source.query_venues(),
            Err(SourceError::DataSourceUnavailable { .. })
        ));
        source.set_online(true);
        source.replace(Dataset {
            hazards: vec![hazard(25.0, 121.5)],
            ..Dataset::default()
        });
        assert_eq!(source.version(), v1 + 1);
        assert_eq!(source.query_hazards_grid(2).unwrap().len(), 1);
    }
}
