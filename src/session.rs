//! One user's view of the shared datasets.
//!
//! A [`Session`] owns its [`Navigator`] and a small snapshot (venue catalog,
//! station index, rainfall). Sources are shared read-only; sessions never see
//! each other's selection.

use crate::click::{apply_click, ClickOutcome};
use crate::compose::{compose, LayerInputs, MapDescriptor};
use crate::config::ViewSettings;
use crate::error::{NavigationError, SourceError};
use crate::geo::{bbox, GeoPoint};
use crate::model::{GridCell, HazardRecord, SeveritySummary, Station, Venue, VenueId};
use crate::nav::{LayerKind, NavState, NavigationSelection, Navigator, SubRegion, VenueCatalog};
use crate::source::DataSource;
use crate::spatial::{aggregate, count_within, nearest, top_cells, within, SpatialGrid};
use crate::weather::{pull_readings, RainfallSummary, WeatherFeed, WeatherReading};
use std::sync::Arc;
use tracing::{info, warn};

/// Station index cell size in degrees
const STATION_CELL_DEG: f64 = 0.1;

/// The only mutators of session state
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    SelectRegion(String),
    SelectSubRegion(SubRegion),
    SelectVenue(VenueId),
    SelectOverview,
    ToggleLayer { name: String, enabled: bool },
    SetAllLayers(bool),
    MapClick(GeoPoint),
    Reload,
}

/// Info panel for the selected venue
#[derive(Debug, Clone, PartialEq)]
pub struct VenueInsight {
    pub venue: Venue,
    /// Hazards within the statistics radius
    pub risk_count: usize,
    pub nearest_station: Option<(Station, f64)>,
    pub nearest_rain: Option<(WeatherReading, f64)>,
    pub hotspots: Vec<GridCell>,
    /// Casualties of the hazards within the statistics radius
    pub severity: SeveritySummary,
}

pub struct Session {
    source: Arc<dyn DataSource>,
    feed: Arc<dyn WeatherFeed>,
    settings: ViewSettings,
    catalog: VenueCatalog,
    stations: SpatialGrid<Station>,
    rainfall: RainfallSummary,
    navigator: Navigator,
    load_degraded: bool,
    query_degraded: bool,
    last_click: Option<ClickOutcome>,
}

impl Session {
    pub fn new(source: Arc<dyn DataSource>, feed: Arc<dyn WeatherFeed>, settings: ViewSettings) -> Self {
        let mut session = Self {
            source,
            feed,
            settings,
            catalog: VenueCatalog::default(),
            stations: SpatialGrid::new(STATION_CELL_DEG),
            rainfall: RainfallSummary::default(),
            navigator: Navigator::new(&VenueCatalog::default()),
            load_degraded: false,
            query_degraded: false,
            last_click: None,
        };
        session.load();
        session.navigator = Navigator::new(&session.catalog);
        session
    }

    /// Refresh the snapshot from the sources
    fn load(&mut self) {
        self.load_degraded = false;
        let version = self.source.version();
        let venues = self.absorb("venues", self.source.query_venues());
        self.catalog = VenueCatalog::from_venues(venues, version);
        let stations = self.absorb("stations", self.source.query_stations());
        self.stations = SpatialGrid::build(stations, STATION_CELL_DEG);
        self.rainfall = RainfallSummary::from_readings(pull_readings(self.feed.as_ref()));
        self.load_degraded = self.query_degraded;
        info!(
            version,
            venues = self.catalog.venues().len(),
            stations = self.stations.len(),
            readings = self.rainfall.readings.len(),
            degraded = self.load_degraded,
            "session snapshot loaded"
        );
    }

    /// Turn a failed query into an empty result and mark the session degraded
    fn absorb<T: Default>(&mut self, query: &'static str, result: Result<T, SourceError>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!(query, error = %e, "query failed, continuing with empty data");
                self.query_degraded = true;
                T::default()
            }
        }
    }

    /// Apply one user event. Returns whether the selection changed.
    /// Rejected selections leave the state untouched and are reported.
    pub fn handle(&mut self, event: UserEvent) -> Result<bool, NavigationError> {
        self.navigator.reconcile(&self.catalog);
        let before = self.navigator.revision();
        self.last_click = None;

        match event {
            UserEvent::SelectRegion(region) => self.navigator.select_region(&self.catalog, &region)?,
            UserEvent::SelectSubRegion(sub) => self.navigator.select_sub_region(&self.catalog, sub)?,
            UserEvent::SelectVenue(id) => self.navigator.select_venue(&self.catalog, id)?,
            UserEvent::SelectOverview => self.navigator.select_overview(),
            UserEvent::ToggleLayer { name, enabled } => self.navigator.toggle_layer(&name, enabled)?,
            UserEvent::SetAllLayers(enabled) => self.navigator.set_all_layers(enabled),
            UserEvent::MapClick(point) => {
                let outcome = apply_click(
                    &mut self.navigator,
                    &self.catalog,
                    point,
                    self.settings.click_tolerance_deg,
                )?;
                self.last_click = Some(outcome);
            }
            UserEvent::Reload => {
                self.query_degraded = false;
                self.load();
                self.navigator.reconcile(&self.catalog);
            }
        }
        Ok(self.navigator.revision() != before)
    }

    /// Run the queries the current selection needs and compose the map
    pub fn descriptor(&mut self) -> MapDescriptor {
        self.navigator.reconcile(&self.catalog);
        self.query_degraded = false;

        let selection = self.navigator.selection().clone();
        let focus = self.focused_venue().map(|v| v.position);
        let needs = |kind: LayerKind| selection.layers.is_enabled(kind);

        let mut grid = Vec::new();
        let mut nearby = Vec::new();
        let hazard_layers = needs(LayerKind::HazardHeat) || needs(LayerKind::HazardPoints) || needs(LayerKind::Hotspots);
        if hazard_layers {
            match focus {
                Some(center) => {
                    let radius = self.settings.detail_radius_km.max(self.settings.stats_radius_km);
                    nearby = self.absorb("hazards_in_bbox", self.source.query_hazards_in_bbox(&bbox(center, radius)));
                }
                None => {
                    grid = self.absorb(
                        "hazards_grid",
                        self.source.query_hazards_grid(self.settings.grid_precision),
                    );
                }
            }
        }

        let inputs = LayerInputs {
            catalog: &self.catalog,
            hazard_grid: &grid,
            nearby_hazards: &nearby,
            stations: self.stations.items(),
            rainfall: &self.rainfall,
            degraded: self.load_degraded || self.query_degraded,
        };
        compose(&selection, &selection.layers, &inputs, &self.settings)
    }

    /// Statistics for the selected venue; `None` outside venue detail
    pub fn insight(&mut self) -> Option<VenueInsight> {
        let venue = self.focused_venue()?.clone();
        let stats = bbox(venue.position, self.settings.stats_radius_km);
        let hazards: Vec<HazardRecord> =
            self.absorb("hazards_in_bbox", self.source.query_hazards_in_bbox(&stats));

        let hotspots = top_cells(
            &aggregate(&hazards, self.settings.hotspot_precision),
            self.settings.hotspot_count,
        );
        Some(VenueInsight {
            risk_count: count_within(&hazards, &stats),
            severity: SeveritySummary::from_records(within(&hazards, &stats)),
            nearest_station: self
                .stations
                .nearest(venue.position)
                .map(|(s, km)| (s.clone(), km)),
            nearest_rain: nearest(venue.position, &self.rainfall.readings).map(|(r, km)| (r.clone(), km)),
            hotspots,
            venue,
        })
    }

    fn focused_venue(&self) -> Option<&Venue> {
        if self.navigator.state() != NavState::VenueSelected {
            return None;
        }
        self.navigator.selection().venue_id().and_then(|id| self.catalog.get(id))
    }

    pub fn selection(&self) -> &NavigationSelection {
        self.navigator.selection()
    }

    pub fn state(&self) -> NavState {
        self.navigator.state()
    }

    pub fn catalog(&self) -> &VenueCatalog {
        &self.catalog
    }

    pub fn rainfall(&self) -> &RainfallSummary {
        &self.rainfall
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn revision(&self) -> u64 {
        self.navigator.revision()
    }

    pub fn is_degraded(&self) -> bool {
        self.load_degraded || self.query_degraded
    }

    /// What the last `MapClick` resolved to
    pub fn last_click(&self) -> Option<ClickOutcome> {
        self.last_click
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Schedule, SeverityCounts, YearSeverity};
    use crate::source::{Dataset, InMemorySource};
    use crate::weather::StaticFeed;
    use chrono::NaiveDate;

    fn dataset() -> Dataset {
        Dataset {
            venues: vec![Venue {
                id: VenueId(1),
                name: "Shilin".into(),
                city: "A".into(),
                sub_region: "A1".into(),
                position: GeoPoint::new(25.088, 121.524),
                polygon: Vec::new(),
                schedule: Schedule::default(),
            }],
            hazards: [
                (25.0881, 121.5241, Some(2022), 0, 2),
                (25.0895, 121.5255, None, 1, 0),
                (25.20, 121.70, Some(2022), 0, 5),
            ]
            .iter()
            .map(|&(lat, lon, year, fatal, injured)| HazardRecord {
                position: GeoPoint::new(lat, lon),
                timestamp: year.and_then(|y| NaiveDate::from_ymd_opt(y, 3, 4)?.and_hms_opt(19, 0, 0)),
                category: String::new(),
                severity: SeverityCounts { fatal, injured },
            })
                .collect(),
            stations: vec![
                Station {
                    id: "466920".into(),
                    name: "Taipei".into(),
                    position: GeoPoint::new(25.0377, 121.5149),
                    reading: None,
                },
                Station {
                    id: "C0AC70".into(),
                    name: "Xinyi".into(),
                    position: GeoPoint::new(25.0378, 121.5646),
                    reading: None,
                },
            ],
        }
    }

    fn session(source: Arc<InMemorySource>) -> Session {
        Session::new(source, Arc::new(StaticFeed::default()), ViewSettings::default())
    }

    #[test]
    fn test_insight_for_selected_venue() {
        let source = Arc::new(InMemorySource::new(dataset()));
        let mut s = session(source);
        assert!(s.insight().is_none());

        assert!(s.handle(UserEvent::MapClick(GeoPoint::new(25.0879, 121.5239))).unwrap());
        assert_eq!(s.last_click(), Some(ClickOutcome::Selected(VenueId(1))));
        let insight = s.insight().unwrap();
        assert_eq!(insight.risk_count, 2);
        let (station, km) = insight.nearest_station.unwrap();
        assert_eq!(station.id, "466920");
        assert!(km > 5.0 && km < 7.0, "got {km}");
        assert!(insight.nearest_rain.is_none());
        assert_eq!(insight.hotspots.iter().map(|c| c.count).sum::<u64>(), 2);
    }

    #[test]
    fn test_insight_sums_severity_within_stats_radius() {
        let mut s = session(Arc::new(InMemorySource::new(dataset())));
        s.handle(UserEvent::MapClick(GeoPoint::new(25.0879, 121.5239))).unwrap();
        let severity = s.insight().unwrap().severity;
        // the third accident lies outside the radius and its injuries are not counted
        assert_eq!((severity.accidents, severity.fatal, severity.injured), (2, 1, 2));
        assert_eq!(
            severity.by_year,
            [YearSeverity { year: 2022, accidents: 1, fatal: 0, injured: 2 }]
        );
        assert_eq!(severity.undated, 1);
    }

    #[test]
    fn test_offline_source_degrades() {
        let source = Arc::new(InMemorySource::new(dataset()));
        source.set_online(false);
        let mut s = session(source.clone());
        assert!(s.is_degraded());
        assert!(s.catalog().is_empty());
        let d = s.descriptor();
        assert!(d.degraded);
        assert!(d.layers.iter().all(|l| l.data.is_empty()));
        assert_eq!(
            s.handle(UserEvent::SelectRegion("A".into())),
            Err(NavigationError::DatasetNotLoaded)
        );

        source.set_online(true);
        s.handle(UserEvent::Reload).unwrap();
        assert!(!s.is_degraded());
        assert!(s.handle(UserEvent::SelectRegion("A".into())).unwrap());
    }

    #[test]
    fn test_reload_replaces_stale_selection() {
        let source = Arc::new(InMemorySource::new(dataset()));
        let mut s = session(source.clone());
        s.handle(UserEvent::SelectRegion("A".into())).unwrap();
        s.handle(UserEvent::SelectVenue(VenueId(1))).unwrap();

        let mut next = dataset();
        next.venues[0].id = VenueId(2);
        next.venues[0].city = "B".into();
        source.replace(next);
        s.handle(UserEvent::Reload).unwrap();
        assert_eq!(s.selection().region, "B");
        assert_eq!(s.state(), NavState::RegionSelected);
    }

    #[test]
    fn test_sessions_are_independent() {
        let source = Arc::new(InMemorySource::new(dataset()));
        let mut a = session(source.clone());
        let b = session(source);
        a.handle(UserEvent::SelectRegion("A".into())).unwrap();
        a.handle(UserEvent::ToggleLayer {
            name: "venues".into(),
            enabled: false,
        })
        .unwrap();
        assert_eq!(b.state(), NavState::Overview);
        assert!(b.selection().layers.is_enabled(LayerKind::Venues));
    }
}
