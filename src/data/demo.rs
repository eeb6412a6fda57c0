//! Built-in dataset used when no data directory is available, and the
//! deterministic generator shared by tests and benchmarks.

use crate::geo::GeoPoint;
use crate::model::{HazardRecord, Schedule, SeverityCounts, Station, Venue, VenueId};
use crate::source::Dataset;
use crate::weather::WeatherReading;
use chrono::{Duration, NaiveDate};

/// Splitmix64 stream. Same seed, same sequence.
#[derive(Debug, Clone)]
pub struct SplitMix {
    state: u64,
}

impl SplitMix {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    #[inline(always)]
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        let mut x = self.state;
        x ^= x >> 30;
        x = x.wrapping_mul(0xbf58476d1ce4e5b9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94d049bb133111eb);
        x ^ (x >> 31)
    }

    /// Uniform in [0, 1) with full f64 mantissa precision
    #[inline(always)]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / 9007199254740992.0 // 2^53
    }

    #[inline(always)]
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    /// Point scattered around `center` within `spread` degrees on each axis
    pub fn near(&mut self, center: GeoPoint, spread: f64) -> GeoPoint {
        // sum of two uniforms: denser towards the centre
        let dlat = (self.next_f64() + self.next_f64() - 1.0) * spread;
        let dlon = (self.next_f64() + self.next_f64() - 1.0) * spread;
        GeoPoint::new(center.lat + dlat, center.lon + dlon)
    }
}

const MARKETS: &[(u64, &str, &str, &str, f64, f64)] = &[
    (1, "Shilin Night Market", "Taipei", "Shilin", 25.0880, 121.5240),
    (2, "Raohe Street Night Market", "Taipei", "Songshan", 25.0509, 121.5775),
    (3, "Ningxia Night Market", "Taipei", "Datong", 25.0560, 121.5155),
    (4, "Miaokou Night Market", "Keelung", "Ren'ai", 25.1283, 121.7430),
    (5, "Luodong Night Market", "Yilan", "Luodong", 24.6773, 121.7695),
    (6, "Fengjia Night Market", "Taichung", "Xitun", 24.1753, 120.6455),
    (7, "Garden Night Market", "Tainan", "North", 23.0107, 120.2102),
    (8, "Liuhe Night Market", "Kaohsiung", "Xinxing", 22.6322, 120.3011),
    (9, "Ruifeng Night Market", "Kaohsiung", "Gushan", 22.6660, 120.2997),
];

const CATEGORIES: &[&str] = &["clear", "cloudy", "rain", "fog"];

/// Synthetic island-wide dataset: nine markets, clustered accidents around
/// them plus background noise, and a lattice of weather stations
pub fn demo_dataset() -> Dataset {
    let mut rng = SplitMix::new(0x5eed);

    let venues: Vec<Venue> = MARKETS
        .iter()
        .map(|&(id, name, city, district, lat, lon)| {
            let position = GeoPoint::new(lat, lon);
            Venue {
                id: VenueId(id),
                name: name.to_string(),
                city: city.to_string(),
                sub_region: district.to_string(),
                position,
                polygon: square_outline(position, 0.0012),
                schedule: demo_schedule(id),
            }
        })
        .collect();

    let base = NaiveDate::from_ymd_opt(2022, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    let mut hazards = Vec::with_capacity(24_000);
    for venue in &venues {
        for _ in 0..1_500 {
            let p = rng.near(venue.position, 0.02);
            hazards.push(demo_hazard(&mut rng, p, base));
        }
    }
    while hazards.len() < 24_000 {
        let p = GeoPoint::new(rng.range(22.0, 25.2), rng.range(120.1, 121.9));
        hazards.push(demo_hazard(&mut rng, p, base));
    }

    let mut stations = Vec::new();
    let mut seq = 0;
    let mut lat = 22.05;
    while lat < 25.3 {
        let mut lon = 120.15;
        while lon < 121.95 {
            seq += 1;
            stations.push(Station {
                id: format!("C0A{seq:03}"),
                name: format!("Station {seq}"),
                position: GeoPoint::new(lat, lon),
                reading: None,
            });
            lon += 0.3;
        }
        lat += 0.25;
    }

    Dataset {
        venues,
        hazards,
        stations,
    }
}

/// Rainfall readings for the demo stations: a band of showers in the north
pub fn demo_readings(stations: &[Station]) -> Vec<WeatherReading> {
    let mut rng = SplitMix::new(0x7a11);
    stations
        .iter()
        .map(|s| {
            let wet = (s.position.lat - 22.0) / 3.3;
            let reading = (rng.next_f64() * 30.0 * wet * wet - 4.0).max(0.0);
            WeatherReading {
                station_id: Some(s.id.clone()),
                name: s.name.clone(),
                position: s.position,
                reading_mm: (reading * 10.0).round() / 10.0,
                county: None,
                town: None,
            }
        })
        .collect()
}

fn demo_hazard(rng: &mut SplitMix, position: GeoPoint, base: chrono::NaiveDateTime) -> HazardRecord {
    let minutes = (rng.next_f64() * 365.0 * 24.0 * 60.0) as i64;
    let category = CATEGORIES[(rng.next_u64() % CATEGORIES.len() as u64) as usize];
    let roll = rng.next_f64();
    HazardRecord {
        position,
        timestamp: Some(base + Duration::minutes(minutes)),
        category: category.to_string(),
        severity: SeverityCounts {
            fatal: u32::from(roll > 0.995),
            injured: if roll > 0.3 { 1 + (roll * 3.0) as u32 % 3 } else { 0 },
        },
    }
}

fn square_outline(center: GeoPoint, half: f64) -> Vec<GeoPoint> {
    vec![
        GeoPoint::new(center.lat - half, center.lon - half),
        GeoPoint::new(center.lat - half, center.lon + half),
        GeoPoint::new(center.lat + half, center.lon + half),
        GeoPoint::new(center.lat + half, center.lon - half),
    ]
}

fn demo_schedule(id: u64) -> Schedule {
    let evening = "17:00-24:00";
    let late = "18:00-01:30";
    let lines: Vec<String> = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"]
        .iter()
        .enumerate()
        .map(|(i, day)| {
            let hours = if (i as u64 + id) % 7 == 0 {
                "Closed"
            } else if i >= 4 {
                late
            } else {
                evening
            };
            format!("{day}: {hours}")
        })
        .collect();
    Schedule::from_lines(lines.iter().map(String::as_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::COUNTRY_BOUNDS;

    #[test]
    fn test_splitmix_is_deterministic_and_in_range() {
        let mut a = SplitMix::new(42);
        let mut b = SplitMix::new(42);
        for _ in 0..1000 {
            let x = a.next_f64();
            assert_eq!(x, b.next_f64());
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_demo_dataset_inside_country() {
        let data = demo_dataset();
        assert_eq!(data.venues.len(), MARKETS.len());
        assert!(data.hazards.len() >= 24_000);
        assert!(data.hazards.iter().all(|h| COUNTRY_BOUNDS.contains(h.position)));
        assert!(!data.stations.is_empty());
        assert_eq!(demo_readings(&data.stations).len(), data.stations.len());
    }
}
