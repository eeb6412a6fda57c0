pub mod demo;

use crate::error::MalformedRecord;
use crate::geo::{GeoPoint, COUNTRY_BOUNDS};
use crate::model::{parse_position, HazardRecord, RawCoordinate, Schedule, SeverityCounts, Station, Venue, VenueId};
use crate::source::Dataset;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use geojson::{Feature, GeoJson, Value};
use serde::Deserialize;
use serde_json::Map;
use simd_json::OwnedValue;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const VENUES_FILE: &str = "venues.geojson";
pub const HAZARDS_FILE: &str = "hazards.json";
pub const STATIONS_FILE: &str = "stations.json";

/// Counts of what a load kept and dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub venues: usize,
    pub hazards: usize,
    pub stations: usize,
    pub dropped: usize,
}

/// Load every dataset file found in `data_dir`.
/// Missing files yield empty collections; unreadable files are skipped with
/// a warning; malformed records are dropped and counted.
pub fn load_dataset(data_dir: &Path) -> (Dataset, LoadReport) {
    let mut report = LoadReport::default();
    let mut dataset = Dataset::default();

    let venues_path = data_dir.join(VENUES_FILE);
    if venues_path.exists() {
        match load_venues(&venues_path) {
            Ok((venues, dropped)) => {
                dataset.venues = venues;
                report.dropped += dropped;
            }
            Err(e) => warn!(file = VENUES_FILE, error = %e, "failed to load venues"),
        }
    }

    let hazards_path = data_dir.join(HAZARDS_FILE);
    if hazards_path.exists() {
        match load_hazards(&hazards_path) {
            Ok((hazards, dropped)) => {
                dataset.hazards = hazards;
                report.dropped += dropped;
            }
            Err(e) => warn!(file = HAZARDS_FILE, error = %e, "failed to load hazards"),
        }
    }

    let stations_path = data_dir.join(STATIONS_FILE);
    if stations_path.exists() {
        match load_stations(&stations_path) {
            Ok((stations, dropped)) => {
                dataset.stations = stations;
                report.dropped += dropped;
            }
            Err(e) => warn!(file = STATIONS_FILE, error = %e, "failed to load stations"),
        }
    }

    report.venues = dataset.venues.len();
    report.hazards = dataset.hazards.len();
    report.stations = dataset.stations.len();
    info!(
        venues = report.venues,
        hazards = report.hazards,
        stations = report.stations,
        dropped = report.dropped,
        dir = %data_dir.display(),
        "dataset loaded"
    );
    (dataset, report)
}

/// Load venues from a GeoJSON FeatureCollection of points or polygons
pub fn load_venues(path: &Path) -> Result<(Vec<Venue>, usize)> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let geojson: GeoJson = content.parse().context("parsing venue GeoJSON")?;
    let GeoJson::FeatureCollection(fc) = geojson else {
        anyhow::bail!("{} is not a FeatureCollection", path.display());
    };

    let mut drafts = Vec::with_capacity(fc.features.len());
    let mut dropped = 0;
    for feature in &fc.features {
        match venue_from_feature(feature) {
            Some(draft) => drafts.push(draft),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!(dropped, "venue features without usable coordinates dropped");
    }

    // features without an id are numbered after the largest explicit one
    let mut next_id = drafts.iter().filter_map(|(id, _)| *id).max().unwrap_or(0) + 1;
    let mut seen = HashSet::new();
    let mut venues = Vec::with_capacity(drafts.len());
    for (explicit, mut venue) in drafts {
        let id = explicit.unwrap_or_else(|| {
            next_id += 1;
            next_id - 1
        });
        if !seen.insert(id) {
            warn!(id, name = %venue.name, "duplicate venue id dropped");
            dropped += 1;
            continue;
        }
        venue.id = VenueId(id);
        venues.push(venue);
    }
    Ok((venues, dropped))
}

/// Venue with its explicit id, if the feature carries one. The venue's own
/// id is assigned by the caller.
fn venue_from_feature(feature: &Feature) -> Option<(Option<u64>, Venue)> {
    let empty = Map::new();
    let props = feature.properties.as_ref().unwrap_or(&empty);

    let (position, polygon) = match feature.geometry.as_ref().map(|g| &g.value) {
        Some(Value::Point(pos)) => (lonlat(pos)?, Vec::new()),
        Some(Value::Polygon(rings)) => {
            let ring = rings.first()?;
            let mut points: Vec<GeoPoint> = ring.iter().filter_map(|p| lonlat(p)).collect();
            // GeoJSON rings repeat the first vertex at the end
            if points.len() > 1 && points.first() == points.last() {
                points.pop();
            }
            (centroid(&points)?, points)
        }
        _ => return None,
    };
    if !COUNTRY_BOUNDS.contains(position) {
        return None;
    }

    let id = props
        .get("id")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())));

    let schedule = match props.get("schedule") {
        Some(serde_json::Value::Object(days)) => Schedule::from_pairs(
            days.iter().filter_map(|(day, v)| v.as_str().map(|s| (day.as_str(), s))),
        ),
        Some(serde_json::Value::Array(lines)) => {
            Schedule::from_lines(lines.iter().filter_map(|v| v.as_str()))
        }
        _ => Schedule::default(),
    };

    let venue = Venue {
        id: VenueId(0),
        name: text(props, "name").unwrap_or("Unknown").to_string(),
        city: text(props, "city").unwrap_or("Unknown").to_string(),
        sub_region: text(props, "district")
            .or_else(|| text(props, "sub_region"))
            .unwrap_or("")
            .to_string(),
        position,
        polygon,
        schedule,
    };
    Some((id, venue))
}

fn text<'a>(props: &'a Map<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    props.get(key).and_then(|v| v.as_str()).map(str::trim)
}

fn lonlat(pos: &[f64]) -> Option<GeoPoint> {
    match pos {
        [lon, lat, ..] => {
            let p = GeoPoint::new(*lat, *lon);
            p.is_finite().then_some(p)
        }
        _ => None,
    }
}

/// Vertex average, the way venue outlines are reduced to a marker position
fn centroid(points: &[GeoPoint]) -> Option<GeoPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(la, lo), p| (la + p.lat, lo + p.lon));
    Some(GeoPoint::new(lat / n, lon / n))
}

#[derive(Debug, Deserialize)]
struct RawHazard {
    #[serde(default)]
    lat: Option<RawCoordinate>,
    #[serde(default)]
    lon: Option<RawCoordinate>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    fatal: Option<RawCoordinate>,
    #[serde(default)]
    injured: Option<RawCoordinate>,
}

impl RawHazard {
    fn into_record(self) -> Result<HazardRecord, MalformedRecord> {
        let position = parse_position(self.lat.as_ref(), self.lon.as_ref())?;
        Ok(HazardRecord {
            position,
            timestamp: self.timestamp.as_deref().and_then(parse_timestamp),
            category: self.category.unwrap_or_default(),
            severity: SeverityCounts {
                fatal: self.fatal.as_ref().map_or(Ok(0), RawCoordinate::to_count)?,
                injured: self.injured.as_ref().map_or(Ok(0), RawCoordinate::to_count)?,
            },
        })
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

#[derive(Debug, Deserialize)]
struct RawStation {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    lat: Option<RawCoordinate>,
    #[serde(default)]
    lon: Option<RawCoordinate>,
}

/// Top-level JSON array, elements left untyped so that one bad record
/// cannot reject its neighbours
fn json_array(bytes: &mut [u8]) -> Result<Vec<OwnedValue>> {
    Ok(simd_json::serde::from_slice(bytes)?)
}

/// Load accident records from a JSON array
pub fn load_hazards(path: &Path) -> Result<(Vec<HazardRecord>, usize)> {
    let mut bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_hazards(&mut bytes)
}

/// Parse a JSON array of accident records, dropping malformed ones
pub fn parse_hazards(bytes: &mut [u8]) -> Result<(Vec<HazardRecord>, usize)> {
    let raw = json_array(bytes).context("parsing hazard JSON")?;
    let total = raw.len();
    let hazards: Vec<HazardRecord> = raw
        .into_iter()
        .filter_map(|v| simd_json::serde::from_owned_value::<RawHazard>(v).ok())
        .filter_map(|r| r.into_record().ok())
        .collect();
    let dropped = total - hazards.len();
    if dropped > 0 {
        warn!(dropped, total, "malformed hazard records dropped");
    }
    Ok((hazards, dropped))
}

/// Load the weather station registry from a JSON array
pub fn load_stations(path: &Path) -> Result<(Vec<Station>, usize)> {
    let mut bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_stations(&mut bytes)
}

pub fn parse_stations(bytes: &mut [u8]) -> Result<(Vec<Station>, usize)> {
    let raw = json_array(bytes).context("parsing station JSON")?;
    let total = raw.len();
    let stations: Vec<Station> = raw
        .into_iter()
        .filter_map(|v| simd_json::serde::from_owned_value::<RawStation>(v).ok())
        .filter_map(|r| {
            let position = parse_position(r.lat.as_ref(), r.lon.as_ref()).ok()?;
            Some(Station {
                name: r.name.unwrap_or_else(|| r.id.clone()),
                id: r.id,
                position,
                reading: None,
            })
        })
        .collect();
    let dropped = total - stations.len();
    if dropped > 0 {
        warn!(dropped, total, "stations without usable coordinates dropped");
    }
    Ok((stations, dropped))
}
