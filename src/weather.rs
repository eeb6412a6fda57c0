//! Rainfall observations pulled from the Central Weather Administration.
//!
//! The feed is an external collaborator: every failure ends up as "no data"
//! in [`pull_readings`], never as an error surfaced to the session.

use crate::error::FeedError;
use crate::geo::{GeoPoint, COUNTRY_BOUNDS};
use serde::{Deserialize, Serialize};
use simd_json::prelude::*;
use simd_json::OwnedValue;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Automatic rain gauge observations (10-minute cadence)
pub const CWA_RAINFALL_URL: &str =
    "https://opendata.cwa.gov.tw/api/v1/rest/datastore/O-A0002-001";

/// Readings at or above this are instrument faults
const MAX_PLAUSIBLE_MM: f64 = 1500.0;

/// How many stations make the "wettest" list
pub const TOP_STATIONS: usize = 10;

/// One station's current precipitation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub station_id: Option<String>,
    pub name: String,
    pub position: GeoPoint,
    pub reading_mm: f64,
    pub county: Option<String>,
    pub town: Option<String>,
}

impl crate::geo::Located for WeatherReading {
    #[inline(always)]
    fn position(&self) -> GeoPoint {
        self.position
    }
}

/// Pull API over an observation feed
pub trait WeatherFeed: Send + Sync {
    fn fetch(&self) -> Result<Vec<WeatherReading>, FeedError>;
}

/// Live CWA open-data endpoint, authorized by API key
pub struct CwaFeed {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
}

impl CwaFeed {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("venue-risk-map/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

impl WeatherFeed for CwaFeed {
    fn fetch(&self) -> Result<Vec<WeatherReading>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("Authorization", self.api_key.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        let mut body = response.bytes()?.to_vec();
        debug!(bytes = body.len(), "weather payload received");
        parse_cwa_payload(&mut body)
    }
}

/// Same payload format read from disk, for offline use
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WeatherFeed for FileFeed {
    fn fetch(&self) -> Result<Vec<WeatherReading>, FeedError> {
        let mut bytes = fs::read(&self.path)?;
        parse_cwa_payload(&mut bytes)
    }
}

/// Fixed readings, used for the demo dataset and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticFeed(pub Vec<WeatherReading>);

impl WeatherFeed for StaticFeed {
    fn fetch(&self) -> Result<Vec<WeatherReading>, FeedError> {
        Ok(self.0.clone())
    }
}

/// Feed that never answers; stands in when no feed is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFeed;

impl WeatherFeed for NoFeed {
    fn fetch(&self) -> Result<Vec<WeatherReading>, FeedError> {
        Ok(Vec::new())
    }
}

/// Parse an `O-A0002-001` payload. Stations that are out of service, lack a
/// position, or report the missing-data sentinel are skipped.
pub fn parse_cwa_payload(bytes: &mut [u8]) -> Result<Vec<WeatherReading>, FeedError> {
    let root: OwnedValue =
        simd_json::to_owned_value(bytes).map_err(|e| FeedError::Malformed(e.to_string()))?;
    let stations = root
        .get("records")
        .and_then(|r| r.get("Station"))
        .and_then(|s| s.as_array())
        .ok_or_else(|| FeedError::Malformed("missing records.Station".to_string()))?;

    let readings: Vec<WeatherReading> = stations.iter().filter_map(parse_station).collect();
    debug!(stations = stations.len(), usable = readings.len(), "weather payload parsed");
    Ok(readings)
}

fn parse_station(station: &OwnedValue) -> Option<WeatherReading> {
    if let Some(state) = station.get("StationState").and_then(|v| v.as_str()) {
        if state != "1" && state != "正常" {
            return None;
        }
    }

    let geo = station.get("GeoInfo");
    let first_coord = geo
        .and_then(|g| g.get("Coordinates"))
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());
    let coord = |keys: [&str; 2]| {
        geo.and_then(|g| number(g.get(keys[0])?))
            .or_else(|| first_coord.and_then(|c| number(c.get(keys[0])?)))
            .or_else(|| first_coord.and_then(|c| number(c.get(keys[1])?)))
    };
    let position = GeoPoint::new(
        coord(["StationLatitude", "CenterLat"])?,
        coord(["StationLongitude", "CenterLon"])?,
    );
    if !COUNTRY_BOUNDS.contains(position) {
        return None;
    }

    let reading_mm = station
        .get("RainfallElement")
        .and_then(|r| r.get("Now"))
        .and_then(|n| n.get("Precipitation"))
        .and_then(number)?;
    if !(0.0..MAX_PLAUSIBLE_MM).contains(&reading_mm) {
        return None;
    }

    let text = |v: Option<&OwnedValue>| v.and_then(|v| v.as_str()).map(str::to_string);
    Some(WeatherReading {
        station_id: text(station.get("StationId")),
        name: text(station.get("StationName")).unwrap_or_else(|| "Unknown".to_string()),
        position,
        reading_mm,
        county: text(geo.and_then(|g| g.get("CountyName"))),
        town: text(geo.and_then(|g| g.get("TownName"))),
    })
}

/// Numbers arrive either as JSON numbers or as numeric strings
fn number(value: &OwnedValue) -> Option<f64> {
    value
        .cast_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|v: &f64| v.is_finite())
}

/// Fetch readings, turning any feed failure into an empty list
pub fn pull_readings(feed: &dyn WeatherFeed) -> Vec<WeatherReading> {
    match feed.fetch() {
        Ok(readings) => readings,
        Err(e) => {
            warn!(error = %e, "weather feed unavailable, continuing without rainfall");
            Vec::new()
        }
    }
}

/// Rainfall digest shown on the map and in the side panel
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RainfallSummary {
    pub readings: Vec<WeatherReading>,
    /// Stations currently reporting rain, as (point, mm)
    pub heat: Vec<(GeoPoint, f64)>,
    /// Wettest stations, heaviest first
    pub top: Vec<WeatherReading>,
    /// Wettest station name; `None` together with `max_reading_mm == 0.0`
    /// means no station reports rain (or there is no data)
    pub top_station: Option<String>,
    pub max_reading_mm: f64,
}

impl RainfallSummary {
    pub fn from_readings(readings: Vec<WeatherReading>) -> Self {
        let heat = readings
            .iter()
            .filter(|r| r.reading_mm > 0.0)
            .map(|r| (r.position, r.reading_mm))
            .collect();

        let mut raining: Vec<&WeatherReading> = readings.iter().filter(|r| r.reading_mm > 0.0).collect();
        // stable: equal readings keep feed order
        raining.sort_by(|a, b| b.reading_mm.total_cmp(&a.reading_mm));
        let top: Vec<WeatherReading> = raining.iter().take(TOP_STATIONS).map(|r| (*r).clone()).collect();

        let (top_station, max_reading_mm) = match top.first() {
            Some(r) => (Some(r.name.clone()), r.reading_mm),
            None => (None, 0.0),
        };

        Self {
            readings,
            heat,
            top,
            top_station,
            max_reading_mm,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const PAYLOAD: &str = r#"{
      "success": "true",
      "records": {"Station": [
        {"StationName": "Shilin", "StationId": "C0A9C0", "StationState": "1",
         "GeoInfo": {"Coordinates": [{"CoordinateName": "WGS84", "StationLatitude": 25.09, "StationLongitude": 121.52}],
                     "CountyName": "Taipei", "TownName": "Shilin"},
         "RainfallElement": {"Now": {"Precipitation": 12.5}}},
        {"StationName": "Banqiao", "StationId": "C0AJ80",
         "GeoInfo": {"StationLatitude": "25.0", "StationLongitude": "121.45"},
         "RainfallElement": {"Now": {"Precipitation": "0.0"}}},
        {"StationName": "Broken", "StationState": "2",
         "GeoInfo": {"StationLatitude": 25.0, "StationLongitude": 121.4},
         "RainfallElement": {"Now": {"Precipitation": 3.0}}},
        {"StationName": "Sentinel",
         "GeoInfo": {"StationLatitude": 24.0, "StationLongitude": 121.0},
         "RainfallElement": {"Now": {"Precipitation": -99}}},
        {"StationName": "Nowhere",
         "RainfallElement": {"Now": {"Precipitation": 1.0}}}
      ]}
    }"#;

    fn reading(name: &str, mm: f64) -> WeatherReading {
        WeatherReading {
            station_id: None,
            name: name.to_string(),
            position: GeoPoint::new(25.0, 121.5),
            reading_mm: mm,
            county: None,
            town: None,
        }
    }

    #[test]
    fn test_parse_cwa_payload() {
        let mut bytes = PAYLOAD.as_bytes().to_vec();
        let readings = parse_cwa_payload(&mut bytes).unwrap();
        assert_eq!(readings.len(), 2);

        assert_eq!(readings[0].name, "Shilin");
        assert_eq!(readings[0].station_id.as_deref(), Some("C0A9C0"));
        assert_eq!(readings[0].position, GeoPoint::new(25.09, 121.52));
        assert_eq!(readings[0].reading_mm, 12.5);
        assert_eq!(readings[0].town.as_deref(), Some("Shilin"));

        assert_eq!(readings[1].position, GeoPoint::new(25.0, 121.45));
        assert_eq!(readings[1].reading_mm, 0.0);
    }

    #[rstest]
    #[case(r#"{"records": {}}"#)]
    #[case("not json")]
    fn test_malformed_payload(#[case] payload: &str) {
        let mut bytes = payload.as_bytes().to_vec();
        assert!(matches!(parse_cwa_payload(&mut bytes), Err(FeedError::Malformed(_))));
    }

    #[test]
    fn test_pull_readings_absorbs_failure() {
        let feed = FileFeed::new("/nonexistent/weather.json");
        assert!(pull_readings(&feed).is_empty());
        let feed = StaticFeed(vec![reading("a", 1.0)]);
        assert_eq!(pull_readings(&feed).len(), 1);
    }

    #[test]
    fn test_summary_orders_and_caps() {
        let readings: Vec<WeatherReading> = (0..15)
            .map(|i| reading(&format!("s{i}"), i as f64))
            .collect();
        let summary = RainfallSummary::from_readings(readings);
        assert_eq!(summary.heat.len(), 14, "dry station excluded from heat");
        assert_eq!(summary.top.len(), TOP_STATIONS);
        assert_eq!(summary.top[0].name, "s14");
        assert_eq!(summary.top_station.as_deref(), Some("s14"));
        assert_eq!(summary.max_reading_mm, 14.0);
    }

    #[test]
    fn test_summary_sentinel_without_rain() {
        let summary = RainfallSummary::from_readings(vec![reading("dry", 0.0)]);
        assert_eq!(summary.top_station, None);
        assert_eq!(summary.max_reading_mm, 0.0);
        assert!(summary.heat.is_empty());
        assert!(!summary.is_empty());
        assert!(RainfallSummary::from_readings(Vec::new()).is_empty());
    }
}
