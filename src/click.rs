//! Turns a click on the rendered map back into a venue selection.

use crate::error::NavigationError;
use crate::geo::{haversine_km, GeoPoint};
use crate::model::{Venue, VenueId};
use crate::nav::{Navigator, SubRegion, VenueCatalog, VenueChoice};
use tracing::debug;

/// About 50 m
pub const DEFAULT_TOLERANCE_DEG: f64 = 0.0005;

/// What a click did to the selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    NoMatch,
    /// The clicked venue was already selected; nothing was emitted
    Unchanged(VenueId),
    Selected(VenueId),
}

/// Venue whose marker lies within `tolerance` degrees of `click` on both
/// axes. Several matches resolve to the one closest to the click, then to
/// the lowest id.
pub fn resolve<'a>(click: GeoPoint, venues: &'a [Venue], tolerance: f64) -> Option<&'a Venue> {
    venues
        .iter()
        .filter(|v| {
            (v.position.lat - click.lat).abs() < tolerance && (v.position.lon - click.lon).abs() < tolerance
        })
        .map(|v| (v, haversine_km(click, v.position)))
        .min_by(|(a, da), (b, db)| da.total_cmp(db).then(a.id.cmp(&b.id)))
        .map(|(v, _)| v)
}

/// Resolve a click and drive the navigator through region, sub-region and
/// venue so the usual reset rules apply. Either the whole sequence commits or
/// nothing does.
pub fn apply_click(
    navigator: &mut Navigator,
    catalog: &VenueCatalog,
    click: GeoPoint,
    tolerance: f64,
) -> Result<ClickOutcome, NavigationError> {
    let Some(venue) = resolve(click, catalog.venues(), tolerance) else {
        debug!(lat = click.lat, lon = click.lon, "click matched no venue");
        return Ok(ClickOutcome::NoMatch);
    };
    if navigator.selection().venue == VenueChoice::Venue(venue.id) {
        return Ok(ClickOutcome::Unchanged(venue.id));
    }

    let mut next = navigator.clone();
    next.select_region(catalog, &venue.city)?;
    next.select_sub_region(catalog, SubRegion::of(venue))?;
    next.select_venue(catalog, venue.id)?;
    *navigator = next;
    debug!(id = %venue.id, name = %venue.name, "click selected venue");
    Ok(ClickOutcome::Selected(venue.id))
}
