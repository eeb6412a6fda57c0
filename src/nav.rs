//! Cascading region → sub-region → venue selection.
//!
//! [`Navigator`] is the only owner of mutable session state. Every transition
//! is validated against a [`VenueCatalog`] before anything is written, so a
//! rejected transition leaves the selection exactly as it was.

use crate::error::{NavigationError, SelectionLevel};
use crate::model::{Venue, VenueId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::{debug, warn};

/// Venues grouped by region and sub-region for lookup
#[derive(Debug, Clone, Default)]
pub struct VenueCatalog {
    venues: Vec<Venue>,
    by_id: HashMap<VenueId, usize>,
    regions: Vec<String>,
    sub_regions: HashMap<String, Vec<String>>,
    version: u64,
}

impl VenueCatalog {
    /// Regions and sub-regions keep first-appearance order. Duplicate ids
    /// keep the first venue.
    pub fn from_venues(venues: Vec<Venue>, version: u64) -> Self {
        let mut catalog = VenueCatalog {
            version,
            ..Default::default()
        };
        let mut seen_sub: HashSet<(String, String)> = HashSet::new();

        for venue in venues {
            if catalog.by_id.contains_key(&venue.id) {
                warn!(id = %venue.id, name = %venue.name, "duplicate venue id dropped");
                continue;
            }
            if !catalog.sub_regions.contains_key(&venue.city) {
                catalog.regions.push(venue.city.clone());
                catalog.sub_regions.insert(venue.city.clone(), Vec::new());
            }
            if !venue.sub_region.is_empty()
                && seen_sub.insert((venue.city.clone(), venue.sub_region.clone()))
            {
                if let Some(subs) = catalog.sub_regions.get_mut(&venue.city) {
                    subs.push(venue.sub_region.clone());
                }
            }
            catalog.by_id.insert(venue.id, catalog.venues.len());
            catalog.venues.push(venue);
        }
        catalog
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.venues.is_empty()
    }

    pub fn venues(&self) -> &[Venue] {
        &self.venues
    }

    pub fn get(&self, id: VenueId) -> Option<&Venue> {
        self.by_id.get(&id).map(|&i| &self.venues[i])
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.sub_regions.contains_key(region)
    }

    /// Named sub-regions of `region`; empty for unknown regions
    pub fn sub_regions(&self, region: &str) -> &[String] {
        self.sub_regions.get(region).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_sub_region(&self, region: &str, sub_region: &SubRegion) -> bool {
        match sub_region {
            SubRegion::All => self.has_region(region),
            SubRegion::Named(name) => self.sub_regions(region).iter().any(|s| s == name),
        }
    }

    /// Venues in scope, sorted by name then id
    pub fn venues_in(&self, region: &str, sub_region: &SubRegion) -> Vec<&Venue> {
        let mut scoped: Vec<&Venue> = self
            .venues
            .iter()
            .filter(|v| v.city == region && sub_region.includes(&v.sub_region))
            .collect();
        scoped.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        scoped
    }

    pub fn in_scope(&self, id: VenueId, region: &str, sub_region: &SubRegion) -> bool {
        self.get(id)
            .is_some_and(|v| v.city == region && sub_region.includes(&v.sub_region))
    }
}

/// Toggleable map layers, bottom of the stack first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Rainfall,
    HazardHeat,
    HazardPoints,
    Stations,
    Venues,
    Hotspots,
}

impl LayerKind {
    pub const ALL: [LayerKind; 6] = [
        LayerKind::Rainfall,
        LayerKind::HazardHeat,
        LayerKind::HazardPoints,
        LayerKind::Stations,
        LayerKind::Venues,
        LayerKind::Hotspots,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LayerKind::Rainfall => "rainfall",
            LayerKind::HazardHeat => "hazard_heat",
            LayerKind::HazardPoints => "hazard_points",
            LayerKind::Stations => "stations",
            LayerKind::Venues => "venues",
            LayerKind::Hotspots => "hotspots",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerKind {
    type Err = NavigationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayerKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| NavigationError::UnknownLayer(s.to_string()))
    }
}

/// One boolean per [`LayerKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerFlags([bool; 6]);

impl Default for LayerFlags {
    fn default() -> Self {
        LayerFlags([true; 6])
    }
}

impl LayerFlags {
    pub fn is_enabled(&self, kind: LayerKind) -> bool {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: LayerKind, enabled: bool) {
        self.0[kind.index()] = enabled;
    }

    pub fn set_all(&mut self, enabled: bool) {
        self.0 = [enabled; 6];
    }

    pub fn iter(&self) -> impl Iterator<Item = (LayerKind, bool)> + '_ {
        LayerKind::ALL.into_iter().map(|k| (k, self.is_enabled(k)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SubRegion {
    /// Every venue of the region, including those without a district
    All,
    Named(String),
}

impl SubRegion {
    pub fn includes(&self, sub_region: &str) -> bool {
        match self {
            SubRegion::All => true,
            SubRegion::Named(name) => name == sub_region,
        }
    }

    /// Venue districts map to `All` when the venue has none
    pub fn of(venue: &Venue) -> Self {
        if venue.sub_region.is_empty() {
            SubRegion::All
        } else {
            SubRegion::Named(venue.sub_region.clone())
        }
    }
}

impl std::fmt::Display for SubRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubRegion::All => f.write_str("all"),
            SubRegion::Named(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum VenueChoice {
    Overview,
    Venue(VenueId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavState {
    Overview,
    RegionSelected,
    SubRegionSelected,
    VenueSelected,
}

impl NavState {
    pub fn is_detail(self) -> bool {
        self != NavState::Overview
    }
}

/// The whole mutable state of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigationSelection {
    pub region: String,
    pub sub_region: SubRegion,
    pub venue: VenueChoice,
    pub layers: LayerFlags,
    /// False while the map shows the country-wide overview
    scoped: bool,
}

impl NavigationSelection {
    pub fn state(&self) -> NavState {
        match (&self.venue, &self.sub_region) {
            (VenueChoice::Venue(_), _) => NavState::VenueSelected,
            _ if !self.scoped => NavState::Overview,
            (_, SubRegion::Named(_)) => NavState::SubRegionSelected,
            (_, SubRegion::All) => NavState::RegionSelected,
        }
    }

    pub fn venue_id(&self) -> Option<VenueId> {
        match self.venue {
            VenueChoice::Venue(id) => Some(id),
            VenueChoice::Overview => None,
        }
    }
}

/// Navigation state machine. Cheap to clone; a clone is an independent
/// session state.
#[derive(Debug, Clone)]
pub struct Navigator {
    selection: NavigationSelection,
    revision: u64,
}

impl Navigator {
    /// Overview with the first region pre-seeded and every layer enabled
    pub fn new(catalog: &VenueCatalog) -> Self {
        Self {
            selection: NavigationSelection {
                region: catalog.regions().first().cloned().unwrap_or_default(),
                sub_region: SubRegion::All,
                venue: VenueChoice::Overview,
                layers: LayerFlags::default(),
                scoped: false,
            },
            revision: 0,
        }
    }

    pub fn selection(&self) -> &NavigationSelection {
        &self.selection
    }

    pub fn state(&self) -> NavState {
        self.selection.state()
    }

    /// Number of committed transitions
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn commit(&mut self, next: NavigationSelection) {
        debug!(from = ?self.selection.state(), to = ?next.state(), "navigation transition");
        self.selection = next;
        self.revision += 1;
    }

    /// Narrow to `region`. Deeper selections made under the previous region
    /// are reset.
    pub fn select_region(&mut self, catalog: &VenueCatalog, region: &str) -> Result<(), NavigationError> {
        if catalog.is_empty() {
            return Err(NavigationError::DatasetNotLoaded);
        }
        if !catalog.has_region(region) {
            return Err(invalid(SelectionLevel::Region, region));
        }
        self.commit(NavigationSelection {
            region: region.to_string(),
            sub_region: SubRegion::All,
            venue: VenueChoice::Overview,
            scoped: true,
            ..self.selection.clone()
        });
        Ok(())
    }

    /// Narrow to a sub-region of the current region. A selected venue
    /// survives only if it still belongs to the new scope.
    pub fn select_sub_region(
        &mut self,
        catalog: &VenueCatalog,
        sub_region: SubRegion,
    ) -> Result<(), NavigationError> {
        if catalog.is_empty() {
            return Err(NavigationError::DatasetNotLoaded);
        }
        if !catalog.has_sub_region(&self.selection.region, &sub_region) {
            return Err(invalid(SelectionLevel::SubRegion, &sub_region.to_string()));
        }
        let venue = match self.selection.venue {
            VenueChoice::Venue(id) if !catalog.in_scope(id, &self.selection.region, &sub_region) => {
                VenueChoice::Overview
            }
            other => other,
        };
        self.commit(NavigationSelection {
            sub_region,
            venue,
            scoped: true,
            ..self.selection.clone()
        });
        Ok(())
    }

    /// Focus a venue of the current scope
    pub fn select_venue(&mut self, catalog: &VenueCatalog, id: VenueId) -> Result<(), NavigationError> {
        if catalog.is_empty() {
            return Err(NavigationError::DatasetNotLoaded);
        }
        if !catalog.in_scope(id, &self.selection.region, &self.selection.sub_region) {
            return Err(invalid(SelectionLevel::Venue, &id.to_string()));
        }
        self.commit(NavigationSelection {
            venue: VenueChoice::Venue(id),
            scoped: true,
            ..self.selection.clone()
        });
        Ok(())
    }

    /// Back to the country-wide view; region and sub-region are kept so the
    /// side panel still shows where the user was
    pub fn select_overview(&mut self) {
        self.commit(NavigationSelection {
            venue: VenueChoice::Overview,
            scoped: false,
            ..self.selection.clone()
        });
    }

    pub fn toggle_layer(&mut self, name: &str, enabled: bool) -> Result<(), NavigationError> {
        let kind: LayerKind = name.parse()?;
        self.set_layer(kind, enabled);
        Ok(())
    }

    pub fn set_layer(&mut self, kind: LayerKind, enabled: bool) {
        let mut next = self.selection.clone();
        next.layers.set(kind, enabled);
        self.commit(next);
    }

    pub fn set_all_layers(&mut self, enabled: bool) {
        let mut next = self.selection.clone();
        next.layers.set_all(enabled);
        self.commit(next);
    }

    /// Repair a selection that no longer resolves in `catalog` by falling back
    /// to the first available option at the broken level. Returns whether
    /// anything changed.
    pub fn reconcile(&mut self, catalog: &VenueCatalog) -> bool {
        let mut next = self.selection.clone();

        if !catalog.has_region(&next.region) {
            let fallback = catalog.regions().first().cloned().unwrap_or_default();
            if fallback != next.region {
                warn!(stale = %next.region, fallback = %fallback, "selected region no longer exists");
            }
            next.region = fallback;
            next.sub_region = SubRegion::All;
            next.venue = VenueChoice::Overview;
        }
        if !catalog.has_sub_region(&next.region, &next.sub_region) && next.sub_region != SubRegion::All {
            warn!(stale = %next.sub_region, region = %next.region, "selected sub-region no longer exists");
            next.sub_region = SubRegion::All;
        }
        if let VenueChoice::Venue(id) = next.venue {
            if !catalog.in_scope(id, &next.region, &next.sub_region) {
                warn!(stale = %id, "selected venue no longer exists");
                next.venue = VenueChoice::Overview;
            }
        }

        if next == self.selection {
            return false;
        }
        self.commit(next);
        true
    }
}

fn invalid(level: SelectionLevel, value: &str) -> NavigationError {
    NavigationError::InvalidSelection {
        level,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::model::Schedule;
    use rstest::{fixture, rstest};

    fn venue(id: u64, name: &str, city: &str, sub: &str) -> Venue {
        Venue {
            id: VenueId(id),
            name: name.to_string(),
            city: city.to_string(),
            sub_region: sub.to_string(),
            position: GeoPoint::new(25.0, 121.5),
            polygon: Vec::new(),
            schedule: Schedule::default(),
        }
    }

    #[fixture]
    fn catalog() -> VenueCatalog {
        VenueCatalog::from_venues(
            vec![
                venue(1, "Shilin", "A", "A1"),
                venue(2, "Raohe", "A", "A2"),
                venue(3, "Fengjia", "B", "B1"),
                venue(4, "Anonymous", "B", ""),
                venue(1, "Duplicate", "C", "C1"),
            ],
            1,
        )
    }

    #[rstest]
    fn test_catalog_grouping(catalog: VenueCatalog) {
        assert_eq!(catalog.regions(), ["A", "B"]);
        assert_eq!(catalog.sub_regions("A"), ["A1", "A2"]);
        assert_eq!(catalog.sub_regions("B"), ["B1"]);
        assert!(catalog.sub_regions("Z").is_empty());
        let names: Vec<&str> = catalog
            .venues_in("B", &SubRegion::All)
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(names, ["Anonymous", "Fengjia"]);
        assert_eq!(catalog.get(VenueId(1)).map(|v| v.name.as_str()), Some("Shilin"));
    }

    #[rstest]
    fn test_initial_state(catalog: VenueCatalog) {
        let nav = Navigator::new(&catalog);
        assert_eq!(nav.state(), NavState::Overview);
        assert_eq!(nav.selection().region, "A");
        assert_eq!(nav.selection().sub_region, SubRegion::All);
        assert!(LayerKind::ALL.iter().all(|&k| nav.selection().layers.is_enabled(k)));
    }

    #[rstest]
    fn test_invalid_sub_region_leaves_state_unchanged(catalog: VenueCatalog) {
        let mut nav = Navigator::new(&catalog);
        nav.select_region(&catalog, "A").unwrap();
        let before = nav.selection().clone();
        let revision = nav.revision();

        let err = nav
            .select_sub_region(&catalog, SubRegion::Named("B1".into()))
            .unwrap_err();
        assert_eq!(
            err,
            NavigationError::InvalidSelection {
                level: SelectionLevel::SubRegion,
                value: "B1".into()
            }
        );
        assert_eq!(nav.selection(), &before);
        assert_eq!(nav.revision(), revision);
    }

    #[rstest]
    fn test_select_region_resets_venue(catalog: VenueCatalog) {
        let mut nav = Navigator::new(&catalog);
        nav.select_region(&catalog, "A").unwrap();
        nav.select_sub_region(&catalog, SubRegion::Named("A1".into())).unwrap();
        nav.select_venue(&catalog, VenueId(1)).unwrap();
        assert_eq!(nav.state(), NavState::VenueSelected);

        nav.select_region(&catalog, "B").unwrap();
        assert_eq!(nav.selection().venue, VenueChoice::Overview);
        assert_eq!(nav.selection().sub_region, SubRegion::All);
        assert_eq!(nav.state(), NavState::RegionSelected);
    }

    #[rstest]
    fn test_sub_region_keeps_venue_only_in_scope(catalog: VenueCatalog) {
        let mut nav = Navigator::new(&catalog);
        nav.select_region(&catalog, "A").unwrap();
        nav.select_venue(&catalog, VenueId(1)).unwrap();

        nav.select_sub_region(&catalog, SubRegion::Named("A1".into())).unwrap();
        assert_eq!(nav.selection().venue, VenueChoice::Venue(VenueId(1)));

        nav.select_sub_region(&catalog, SubRegion::Named("A2".into())).unwrap();
        assert_eq!(nav.selection().venue, VenueChoice::Overview);
        assert_eq!(nav.state(), NavState::SubRegionSelected);
    }

    #[rstest]
    fn test_venue_must_be_in_scope(catalog: VenueCatalog) {
        let mut nav = Navigator::new(&catalog);
        nav.select_region(&catalog, "A").unwrap();
        assert!(nav.select_venue(&catalog, VenueId(3)).is_err());
        assert!(nav.select_venue(&catalog, VenueId(99)).is_err());

        // a venue without a district is reachable through the region scope
        nav.select_region(&catalog, "B").unwrap();
        nav.select_venue(&catalog, VenueId(4)).unwrap();
        assert_eq!(nav.state(), NavState::VenueSelected);
    }

    #[rstest]
    fn test_layers_are_independent(catalog: VenueCatalog) {
        let mut nav = Navigator::new(&catalog);
        nav.select_region(&catalog, "A").unwrap();
        nav.select_venue(&catalog, VenueId(2)).unwrap();
        nav.toggle_layer("stations", false).unwrap();
        assert!(!nav.selection().layers.is_enabled(LayerKind::Stations));
        assert_eq!(nav.selection().venue, VenueChoice::Venue(VenueId(2)));

        assert_eq!(
            nav.toggle_layer("satellite", true),
            Err(NavigationError::UnknownLayer("satellite".into()))
        );
        nav.set_all_layers(false);
        assert!(nav.selection().layers.iter().all(|(_, on)| !on));
    }

    #[test]
    fn test_empty_catalog_reports_not_loaded() {
        let empty = VenueCatalog::default();
        let mut nav = Navigator::new(&empty);
        assert_eq!(nav.select_region(&empty, "A"), Err(NavigationError::DatasetNotLoaded));
        assert_eq!(nav.state(), NavState::Overview);
    }

    #[rstest]
    fn test_reconcile_falls_back_after_reload(catalog: VenueCatalog) {
        let mut nav = Navigator::new(&catalog);
        nav.select_region(&catalog, "B").unwrap();
        nav.select_sub_region(&catalog, SubRegion::Named("B1".into())).unwrap();
        nav.select_venue(&catalog, VenueId(3)).unwrap();
        assert!(!nav.reconcile(&catalog));

        let reloaded = VenueCatalog::from_venues(vec![venue(7, "New", "C", "C1")], 2);
        assert!(nav.reconcile(&reloaded));
        assert_eq!(nav.selection().region, "C");
        assert_eq!(nav.selection().sub_region, SubRegion::All);
        assert_eq!(nav.selection().venue, VenueChoice::Overview);
    }

    #[rstest]
    fn test_reconcile_drops_only_the_stale_venue(catalog: VenueCatalog) {
        let mut nav = Navigator::new(&catalog);
        nav.select_region(&catalog, "A").unwrap();
        nav.select_sub_region(&catalog, SubRegion::Named("A2".into())).unwrap();
        nav.select_venue(&catalog, VenueId(2)).unwrap();

        let reloaded = VenueCatalog::from_venues(
            vec![venue(1, "Shilin", "A", "A1"), venue(5, "Other", "A", "A2")],
            2,
        );
        assert!(nav.reconcile(&reloaded));
        assert_eq!(nav.selection().sub_region, SubRegion::Named("A2".into()));
        assert_eq!(nav.selection().venue, VenueChoice::Overview);
    }
}
