use super::DataSource;
use crate::error::SourceError;
use crate::geo::BoundingBox;
use crate::model::{GridCell, HazardRecord, Station, Venue};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// How long a query result stays fresh
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Live entries per query kind before the slot is flushed
const MAX_BBOX_ENTRIES: usize = 256;

struct Entry<T> {
    version: u64,
    stored_at: DateTime<Utc>,
    value: T,
}

type Slot<K, T> = Mutex<HashMap<K, Entry<T>>>;

/// Memoizes every query of the wrapped source, keyed by its parameters and
/// the dataset version. Entries older than the TTL are never served; failed
/// queries are never stored.
pub struct CachedSource<S> {
    inner: S,
    ttl: TimeDelta,
    clock: Arc<dyn Clock + Send + Sync>,
    venues: Slot<(), Vec<Venue>>,
    stations: Slot<(), Vec<Station>>,
    grids: Slot<u32, Vec<GridCell>>,
    boxes: Slot<[u64; 4], Vec<HazardRecord>>,
}

impl<S: DataSource> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            inner,
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
            venues: Mutex::default(),
            stations: Mutex::default(),
            grids: Mutex::default(),
            boxes: Mutex::default(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn cached<K, T>(
        &self,
        slot: &Slot<K, T>,
        key: K,
        query: &'static str,
        fetch: impl FnOnce(&S) -> Result<T, SourceError>,
    ) -> Result<T, SourceError>
    where
        K: Eq + Hash,
        T: Clone,
    {
        let version = self.inner.version();
        let now = self.clock.utc();
        {
            let map = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = map.get(&key) {
                if entry.version == version && now.signed_duration_since(entry.stored_at) < self.ttl {
                    debug!(query, "cache hit");
                    return Ok(entry.value.clone());
                }
            }
        }

        debug!(query, "cache miss");
        let value = fetch(&self.inner)?;
        let mut map = slot.lock().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, e| e.version == version && now.signed_duration_since(e.stored_at) < self.ttl);
        if map.len() >= MAX_BBOX_ENTRIES {
            map.clear();
        }
        map.insert(
            key,
            Entry {
                version,
                stored_at: now,
                value: value.clone(),
            },
        );
        Ok(value)
    }
}

fn bbox_key(bbox: &BoundingBox) -> [u64; 4] {
    [
        bbox.min_lat.to_bits(),
        bbox.max_lat.to_bits(),
        bbox.min_lon.to_bits(),
        bbox.max_lon.to_bits(),
    ]
}

impl<S: DataSource> DataSource for CachedSource<S> {
    fn query_venues(&self) -> Result<Vec<Venue>, SourceError> {
        self.cached(&self.venues, (), "venues", |s| s.query_venues())
    }

    fn query_hazards_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<HazardRecord>, SourceError> {
        self.cached(&self.boxes, bbox_key(bbox), "hazards_in_bbox", |s| {
            s.query_hazards_in_bbox(bbox)
        })
    }

    fn query_hazards_grid(&self, precision: u32) -> Result<Vec<GridCell>, SourceError> {
        self.cached(&self.grids, precision, "hazards_grid", |s| {
            s.query_hazards_grid(precision)
        })
    }

    fn query_stations(&self) -> Result<Vec<Station>, SourceError> {
        self.cached(&self.stations, (), "stations", |s| s.query_stations())
    }

    fn version(&self) -> u64 {
        self.inner.version()
    }
}
