//! Layer composition: selection + data snapshot in, map descriptor out.
//!
//! [`compose`] is a pure function. It never queries a source and never
//! mutates its inputs, so the same selection over the same snapshot always
//! yields an identical [`MapDescriptor`].

use crate::config::ViewSettings;
use crate::geo::{bbox, BoundingBox, GeoPoint, DETAIL_ZOOM, OVERVIEW_CENTER, OVERVIEW_ZOOM};
use crate::model::{GridCell, HazardRecord, Schedule, Station, Venue, VenueId};
use crate::nav::{LayerFlags, LayerKind, NavState, NavigationSelection, VenueCatalog};
use crate::spatial::{aggregate, around, nearest, top_cells, within};
use crate::weather::RainfallSummary;
use serde::Serialize;
use std::collections::HashMap;

pub const REGION_ZOOM: u8 = 11;
pub const SUB_REGION_ZOOM: u8 = 13;

/// Margin around the venues of a region scope
const SCOPE_PADDING_DEG: f64 = 0.05;

/// Everything the renderer needs, as plain data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapDescriptor {
    pub center: GeoPoint,
    pub zoom: u8,
    pub mode: NavState,
    /// A source query failed; some layers may be empty
    pub degraded: bool,
    /// Bottom of the stack first
    pub layers: Vec<LayerSpec>,
}

impl MapDescriptor {
    pub fn layer(&self, kind: LayerKind) -> Option<&LayerData> {
        self.layers.iter().find(|l| l.kind == kind).map(|l| &l.data)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub kind: LayerKind,
    pub data: LayerData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerData {
    Heat { points: Vec<WeightedPoint> },
    /// Aggregated hazards for wide views
    Cells { cells: Vec<GridCell> },
    /// Individual hazards, most recent first
    Hazards { records: Vec<HazardRecord> },
    Stations { markers: Vec<StationMarker> },
    Venues { markers: Vec<VenueMarker> },
    Hotspots { cells: Vec<GridCell> },
}

impl LayerData {
    /// Number of drawable items
    pub fn len(&self) -> usize {
        match self {
            LayerData::Heat { points } => points.len(),
            LayerData::Cells { cells } | LayerData::Hotspots { cells } => cells.len(),
            LayerData::Hazards { records } => records.len(),
            LayerData::Stations { markers } => markers.len(),
            LayerData::Venues { markers } => markers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedPoint {
    pub position: GeoPoint,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMarker {
    pub id: String,
    pub name: String,
    pub position: GeoPoint,
    pub reading_mm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueMarker {
    pub id: VenueId,
    pub name: String,
    pub position: GeoPoint,
    pub polygon: Vec<GeoPoint>,
    pub selected: bool,
    /// Only carried for the selected venue
    pub schedule: Option<Schedule>,
}

/// Borrowed snapshot of the query results for one composition
#[derive(Debug, Clone, Copy)]
pub struct LayerInputs<'a> {
    pub catalog: &'a VenueCatalog,
    /// Country-wide hazard grid
    pub hazard_grid: &'a [GridCell],
    /// Hazards around the focused venue, at least the statistics radius
    pub nearby_hazards: &'a [HazardRecord],
    pub stations: &'a [Station],
    pub rainfall: &'a RainfallSummary,
    pub degraded: bool,
}

enum Scope<'a> {
    Country,
    Area { bounds: BoundingBox, zoom: u8 },
    Venue(&'a Venue),
}

/// Build the descriptor for `selection` with the layers enabled in `flags`
pub fn compose(
    selection: &NavigationSelection,
    flags: &LayerFlags,
    inputs: &LayerInputs<'_>,
    settings: &ViewSettings,
) -> MapDescriptor {
    let scope = resolve_scope(selection, inputs.catalog);
    let (center, zoom, mode) = match &scope {
        Scope::Country => (OVERVIEW_CENTER, OVERVIEW_ZOOM, NavState::Overview),
        Scope::Area { bounds, zoom } => (bounds.center(), *zoom, selection.state()),
        Scope::Venue(v) => (v.position, DETAIL_ZOOM, NavState::VenueSelected),
    };

    // hazards in the detail radius, shared by heat and points
    let detail: Vec<&HazardRecord> = match &scope {
        Scope::Venue(v) => within(inputs.nearby_hazards, &bbox(v.position, settings.detail_radius_km)),
        _ => Vec::new(),
    };

    let layers = LayerKind::ALL
        .into_iter()
        .filter(|&kind| flags.is_enabled(kind))
        .map(|kind| {
            let data = match kind {
                LayerKind::Rainfall => rainfall_layer(inputs.rainfall),
                LayerKind::HazardHeat => hazard_heat(&scope, &detail, inputs),
                LayerKind::HazardPoints => hazard_points(&scope, &detail, inputs, settings),
                LayerKind::Stations => station_layer(&scope, inputs, settings),
                LayerKind::Venues => venue_layer(&scope, selection, inputs.catalog),
                LayerKind::Hotspots => hotspot_layer(&scope, inputs, settings),
            };
            LayerSpec { kind, data }
        })
        .collect();

    MapDescriptor {
        center,
        zoom,
        mode,
        degraded: inputs.degraded,
        layers,
    }
}

fn resolve_scope<'a>(selection: &NavigationSelection, catalog: &'a VenueCatalog) -> Scope<'a> {
    match selection.state() {
        NavState::Overview => Scope::Country,
        NavState::VenueSelected => match selection.venue_id().and_then(|id| catalog.get(id)) {
            Some(venue) => Scope::Venue(venue),
            None => Scope::Country,
        },
        state => {
            let venues = catalog.venues_in(&selection.region, &selection.sub_region);
            let zoom = if state == NavState::SubRegionSelected {
                SUB_REGION_ZOOM
            } else {
                REGION_ZOOM
            };
            match venue_bounds(&venues) {
                Some(bounds) => Scope::Area { bounds, zoom },
                None => Scope::Country,
            }
        }
    }
}

fn venue_bounds(venues: &[&Venue]) -> Option<BoundingBox> {
    let first = venues.first()?;
    let point_box = |p: GeoPoint| bbox(p, 0.0);
    let bounds = venues
        .iter()
        .skip(1)
        .fold(point_box(first.position), |acc, v| acc.union(&point_box(v.position)));
    Some(BoundingBox {
        min_lat: bounds.min_lat - SCOPE_PADDING_DEG,
        max_lat: bounds.max_lat + SCOPE_PADDING_DEG,
        min_lon: bounds.min_lon - SCOPE_PADDING_DEG,
        max_lon: bounds.max_lon + SCOPE_PADDING_DEG,
    })
}

fn rainfall_layer(rainfall: &RainfallSummary) -> LayerData {
    LayerData::Heat {
        points: rainfall
            .heat
            .iter()
            .map(|&(position, weight)| WeightedPoint { position, weight })
            .collect(),
    }
}

fn scoped_cells(scope: &Scope<'_>, cells: &[GridCell]) -> Vec<GridCell> {
    match scope {
        Scope::Area { bounds, .. } => within(cells, bounds).into_iter().copied().collect(),
        _ => cells.to_vec(),
    }
}

fn hazard_heat(scope: &Scope<'_>, detail: &[&HazardRecord], inputs: &LayerInputs<'_>) -> LayerData {
    let points = match scope {
        Scope::Venue(_) => detail
            .iter()
            .map(|h| WeightedPoint {
                position: h.position,
                weight: 1.0,
            })
            .collect(),
        _ => scoped_cells(scope, inputs.hazard_grid)
            .into_iter()
            .map(|c| WeightedPoint {
                position: GeoPoint::new(c.lat_bucket, c.lon_bucket),
                weight: c.count as f64,
            })
            .collect(),
    };
    LayerData::Heat { points }
}

fn hazard_points(
    scope: &Scope<'_>,
    detail: &[&HazardRecord],
    inputs: &LayerInputs<'_>,
    settings: &ViewSettings,
) -> LayerData {
    match scope {
        Scope::Venue(_) => {
            let mut records: Vec<HazardRecord> = detail.iter().map(|&h| h.clone()).collect();
            // None sorts before Some, so the reversed order leaves undated records last
            records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            records.truncate(settings.max_detail_points);
            LayerData::Hazards { records }
        }
        _ => LayerData::Cells {
            cells: scoped_cells(scope, inputs.hazard_grid),
        },
    }
}

fn station_layer(scope: &Scope<'_>, inputs: &LayerInputs<'_>, settings: &ViewSettings) -> LayerData {
    let live: HashMap<&str, f64> = inputs
        .rainfall
        .readings
        .iter()
        .filter_map(|r| r.station_id.as_deref().map(|id| (id, r.reading_mm)))
        .collect();

    let shown: Vec<&Station> = match scope {
        Scope::Country => inputs.stations.iter().collect(),
        Scope::Area { bounds, .. } => within(inputs.stations, bounds),
        Scope::Venue(v) => {
            let mut near = within(inputs.stations, &bbox(v.position, settings.stats_radius_km));
            if let Some((closest, _)) = nearest(v.position, inputs.stations) {
                if !near.iter().any(|s| s.id == closest.id) {
                    near.push(closest);
                }
            }
            near
        }
    };

    LayerData::Stations {
        markers: shown
            .into_iter()
            .map(|s| StationMarker {
                id: s.id.clone(),
                name: s.name.clone(),
                position: s.position,
                reading_mm: s.reading.or_else(|| live.get(s.id.as_str()).copied()),
            })
            .collect(),
    }
}

fn venue_layer(scope: &Scope<'_>, selection: &NavigationSelection, catalog: &VenueCatalog) -> LayerData {
    let selected = selection.venue_id();
    let venues: Vec<&Venue> = match scope {
        Scope::Country => catalog.venues().iter().collect(),
        _ => catalog.venues_in(&selection.region, &selection.sub_region),
    };
    LayerData::Venues {
        markers: venues
            .into_iter()
            .map(|v| {
                let is_selected = selected == Some(v.id);
                VenueMarker {
                    id: v.id,
                    name: v.name.clone(),
                    position: v.position,
                    polygon: v.polygon.clone(),
                    selected: is_selected,
                    schedule: is_selected.then(|| v.schedule.clone()),
                }
            })
            .collect(),
    }
}

fn hotspot_layer(scope: &Scope<'_>, inputs: &LayerInputs<'_>, settings: &ViewSettings) -> LayerData {
    let cells = match scope {
        Scope::Venue(v) => {
            let stats = around(inputs.nearby_hazards, v.position, settings.stats_radius_km);
            top_cells(&aggregate(&stats, settings.hotspot_precision), settings.hotspot_count)
        }
        _ => top_cells(&scoped_cells(scope, inputs.hazard_grid), settings.hotspot_count),
    };
    LayerData::Hotspots { cells }
}
