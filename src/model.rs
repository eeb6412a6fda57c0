//! Typed records exchanged between the data sources, the spatial engine and
//! the layer composer.

use crate::error::{MalformedRecord, RecordFault};
use crate::geo::{GeoPoint, Located, COUNTRY_BOUNDS};
use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Weekday};
use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VenueId(pub u64);

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point of interest (night market). Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    /// Top navigation level
    pub city: String,
    pub sub_region: String,
    pub position: GeoPoint,
    /// Outline, empty when only a point is known
    pub polygon: Vec<GeoPoint>,
    pub schedule: Schedule,
}

impl Located for Venue {
    #[inline(always)]
    fn position(&self) -> GeoPoint {
        self.position
    }
}

/// Accident severity tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub fatal: u32,
    pub injured: u32,
}

/// One traffic accident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardRecord {
    pub position: GeoPoint,
    pub timestamp: Option<NaiveDateTime>,
    pub category: String,
    pub severity: SeverityCounts,
}

/// Casualties over a set of accidents, with a per-year breakdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeveritySummary {
    pub accidents: u64,
    pub fatal: u64,
    pub injured: u64,
    /// Oldest year first
    pub by_year: Vec<YearSeverity>,
    /// Accidents without a timestamp
    pub undated: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct YearSeverity {
    pub year: i32,
    pub accidents: u64,
    pub fatal: u64,
    pub injured: u64,
}

impl SeveritySummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a HazardRecord>) -> Self {
        let mut summary = Self::default();
        let mut years: BTreeMap<i32, YearSeverity> = BTreeMap::new();
        for record in records {
            let (fatal, injured) = (record.severity.fatal as u64, record.severity.injured as u64);
            summary.accidents += 1;
            summary.fatal += fatal;
            summary.injured += injured;
            match record.timestamp {
                Some(ts) => {
                    let year = years.entry(ts.year()).or_insert(YearSeverity {
                        year: ts.year(),
                        ..Default::default()
                    });
                    year.accidents += 1;
                    year.fatal += fatal;
                    year.injured += injured;
                }
                None => summary.undated += 1,
            }
        }
        summary.by_year = years.into_values().collect();
        summary
    }
}

impl Located for HazardRecord {
    #[inline(always)]
    fn position(&self) -> GeoPoint {
        self.position
    }
}

/// A registered weather observation station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub position: GeoPoint,
    /// Latest precipitation in mm, when the feed reported one
    pub reading: Option<f64>,
}

impl Located for Station {
    #[inline(always)]
    fn position(&self) -> GeoPoint {
        self.position
    }
}

/// Rounded-coordinate bucket with the number of records that fell into it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub lat_bucket: f64,
    pub lon_bucket: f64,
    pub count: u64,
}

impl Located for GridCell {
    #[inline(always)]
    fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat_bucket, self.lon_bucket)
    }
}

/// Raw coordinate as it appears in source files: number or text
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawCoordinate {
    Number(f64),
    Text(String),
}

impl RawCoordinate {
    /// Non-negative whole count, e.g. victims of an accident
    pub fn to_count(&self) -> Result<u32, RecordFault> {
        let value = self.to_f64().map_err(|_| RecordFault::InvalidCount)?;
        if value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
            return Err(RecordFault::InvalidCount);
        }
        Ok(value as u32)
    }

    fn to_f64(&self) -> Result<f64, RecordFault> {
        let value = match self {
            RawCoordinate::Number(v) => *v,
            RawCoordinate::Text(s) => s
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .parse::<f64>()
                .map_err(|_| RecordFault::NonNumeric)?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(RecordFault::NonNumeric)
        }
    }
}

/// Validate a raw coordinate pair against the operating bounds
pub fn parse_position(
    lat: Option<&RawCoordinate>,
    lon: Option<&RawCoordinate>,
) -> Result<GeoPoint, MalformedRecord> {
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(RecordFault::MissingCoordinate.into());
    };
    let point = GeoPoint::new(lat.to_f64()?, lon.to_f64()?);
    if COUNTRY_BOUNDS.contains(point) {
        Ok(point)
    } else {
        Err(RecordFault::OutOfBounds.into())
    }
}

/// Opening interval in minutes after midnight. `close <= open` means the
/// interval runs past midnight into the next day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub open: u16,
    pub close: u16,
}

impl Interval {
    pub fn is_overnight(&self) -> bool {
        self.close <= self.open
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayHours {
    /// No information published
    #[default]
    Unknown,
    Closed,
    Open(Vec<Interval>),
    /// Free text that is not a time range ("by appointment", ...)
    Unparsed(String),
}

impl DayHours {
    /// Parse one day's text, e.g. `17:00-24:00`, `5:00 PM – 12:00 AM`,
    /// `16:00-19:00, 20:00-23:00` or `Closed`
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let lowered = text.to_lowercase();
        if text.is_empty() || lowered == "nan" || lowered == "none" {
            return DayHours::Closed;
        }
        if lowered.contains("closed") || text.contains("休息") || text.contains("公休") {
            return DayHours::Closed;
        }
        let intervals: Option<Vec<Interval>> = text
            .split([',', '、', ';'])
            .filter(|part| !part.trim().is_empty())
            .map(parse_interval)
            .collect();
        match intervals {
            Some(list) if !list.is_empty() => DayHours::Open(list),
            _ => DayHours::Unparsed(text.to_string()),
        }
    }
}

fn parse_interval(text: &str) -> Option<Interval> {
    let (open, close) = text.split_once(['-', '–', '—', '~'])?;
    let open = parse_clock(open)?;
    let mut close = parse_clock(close)?;
    // "12:00 AM" as a closing time means midnight at the end of the day
    if close == 0 {
        close = 24 * 60;
    }
    Some(Interval { open, close })
}

/// Minutes after midnight for `HH:MM` or `H:MM AM/PM`; `24:00` is allowed
fn parse_clock(text: &str) -> Option<u16> {
    let text = text.trim().to_uppercase().replace('\u{202f}', " ");
    let (clock, meridiem) = if let Some(rest) = text.strip_suffix("AM") {
        (rest.trim(), Some(false))
    } else if let Some(rest) = text.strip_suffix("PM") {
        (rest.trim(), Some(true))
    } else {
        (text.as_str(), None)
    };
    let (h, m) = clock.split_once(':').unwrap_or((clock, "0"));
    let mut hour: u16 = h.trim().parse().ok()?;
    let minute: u16 = m.trim().parse().ok()?;
    if minute >= 60 {
        return None;
    }
    match meridiem {
        Some(pm) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            hour %= 12;
            if pm {
                hour += 12;
            }
        }
        None if hour > 24 || (hour == 24 && minute > 0) => return None,
        None => {}
    }
    Some(hour * 60 + minute)
}

/// Weekly opening hours, Monday first. Formatting is left to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub days: [DayHours; 7],
}

impl Schedule {
    /// From `"Monday: 17:00-24:00"` style lines. Days not mentioned are closed.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut schedule = Schedule {
            days: std::array::from_fn(|_| DayHours::Closed),
        };
        let mut any = false;
        for line in lines {
            let Some((day, hours)) = line.split_once(':') else {
                continue;
            };
            if let Ok(weekday) = day.trim().parse::<Weekday>() {
                schedule.days[weekday.num_days_from_monday() as usize] = DayHours::parse(hours);
                any = true;
            }
        }
        if any {
            schedule
        } else {
            Schedule::default()
        }
    }

    /// From `(weekday name, text)` pairs such as a JSON object or CSV columns
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut schedule = Schedule::default();
        for (day, hours) in pairs {
            if let Ok(weekday) = day.trim().parse::<Weekday>() {
                schedule.days[weekday.num_days_from_monday() as usize] = DayHours::parse(hours);
            }
        }
        schedule
    }

    pub fn day(&self, weekday: Weekday) -> &DayHours {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn is_known(&self) -> bool {
        self.days.iter().any(|d| *d != DayHours::Unknown)
    }

    /// Whether the venue is open at `time` on `weekday`, including intervals
    /// that started the previous evening and run past midnight
    pub fn is_open_at(&self, weekday: Weekday, time: NaiveTime) -> bool {
        let minute = (time.hour() * 60 + time.minute()) as u16;
        let today = match self.day(weekday) {
            DayHours::Open(intervals) => intervals.iter().any(|iv| {
                if iv.is_overnight() {
                    minute >= iv.open
                } else {
                    minute >= iv.open && minute < iv.close
                }
            }),
            _ => false,
        };
        let spill = match self.day(weekday.pred()) {
            DayHours::Open(intervals) => intervals
                .iter()
                .any(|iv| iv.is_overnight() && minute < iv.close),
            _ => false,
        };
        today || spill
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("17:00-24:00", DayHours::Open(vec![Interval { open: 1020, close: 1440 }]))]
    #[case("5:00 PM – 12:00 AM", DayHours::Open(vec![Interval { open: 1020, close: 1440 }]))]
    #[case("18:00-02:00", DayHours::Open(vec![Interval { open: 1080, close: 120 }]))]
    #[case("Closed", DayHours::Closed)]
    #[case("休息", DayHours::Closed)]
    #[case("", DayHours::Closed)]
    #[case("call ahead", DayHours::Unparsed("call ahead".to_string()))]
    fn test_day_hours_parse(#[case] text: &str, #[case] expected: DayHours) {
        assert_eq!(DayHours::parse(text), expected);
    }

    #[test]
    fn test_two_intervals() {
        let hours = DayHours::parse("11:00-14:00, 17:00-22:30");
        assert_eq!(
            hours,
            DayHours::Open(vec![
                Interval { open: 660, close: 840 },
                Interval { open: 1020, close: 1350 },
            ])
        );
    }

    #[test]
    fn test_schedule_from_lines_and_overnight() {
        let schedule = Schedule::from_lines(["Friday: 18:00-02:00", "Saturday: Closed"]);
        assert_eq!(*schedule.day(Weekday::Mon), DayHours::Closed);
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert!(schedule.is_open_at(Weekday::Fri, t(19, 0)));
        assert!(!schedule.is_open_at(Weekday::Fri, t(17, 59)));
        // Friday night spills into Saturday morning even though Saturday is closed
        assert!(schedule.is_open_at(Weekday::Sat, t(1, 30)));
        assert!(!schedule.is_open_at(Weekday::Sat, t(2, 0)));
    }

    #[test]
    fn test_schedule_without_lines_is_unknown() {
        let schedule = Schedule::from_lines(["nonsense"]);
        assert!(!schedule.is_known());
    }

    #[rstest]
    #[case(Some(RawCoordinate::Number(25.0)), Some(RawCoordinate::Text(" 121.5 ".into())), None)]
    #[case(None, Some(RawCoordinate::Number(121.5)), Some(RecordFault::MissingCoordinate))]
    #[case(Some(RawCoordinate::Text("abc".into())), Some(RawCoordinate::Number(121.5)), Some(RecordFault::NonNumeric))]
    #[case(Some(RawCoordinate::Number(35.0)), Some(RawCoordinate::Number(121.5)), Some(RecordFault::OutOfBounds))]
    fn test_parse_position(
        #[case] lat: Option<RawCoordinate>,
        #[case] lon: Option<RawCoordinate>,
        #[case] fault: Option<RecordFault>,
    ) {
        let result = parse_position(lat.as_ref(), lon.as_ref());
        match fault {
            None => assert_eq!(result, Ok(GeoPoint::new(25.0, 121.5))),
            Some(f) => assert_eq!(result, Err(MalformedRecord { fault: f })),
        }
    }

    #[rstest]
    #[case(RawCoordinate::Number(2.0), Ok(2))]
    #[case(RawCoordinate::Text("2".into()), Ok(2))]
    #[case(RawCoordinate::Number(-1.0), Err(RecordFault::InvalidCount))]
    #[case(RawCoordinate::Number(1.5), Err(RecordFault::InvalidCount))]
    #[case(RawCoordinate::Text("many".into()), Err(RecordFault::InvalidCount))]
    fn test_to_count(#[case] raw: RawCoordinate, #[case] expected: Result<u32, RecordFault>) {
        assert_eq!(raw.to_count(), expected);
    }

    #[test]
    fn test_severity_summary_by_year() {
        let accident = |year: Option<i32>, fatal, injured| HazardRecord {
            position: GeoPoint::new(25.0, 121.5),
            timestamp: year.map(|y| {
                chrono::NaiveDate::from_ymd_opt(y, 6, 1)
                    .unwrap()
                    .and_hms_opt(21, 30, 0)
                    .unwrap()
            }),
            category: "A2".into(),
            severity: SeverityCounts { fatal, injured },
        };
        let records = [
            accident(Some(2022), 0, 2),
            accident(Some(2021), 1, 0),
            accident(Some(2022), 0, 1),
            accident(None, 0, 3),
        ];

        let summary = SeveritySummary::from_records(&records);
        assert_eq!(summary.accidents, 4);
        assert_eq!(summary.fatal, 1);
        assert_eq!(summary.injured, 6);
        assert_eq!(summary.undated, 1);
        assert_eq!(
            summary.by_year,
            [
                YearSeverity { year: 2021, accidents: 1, fatal: 1, injured: 0 },
                YearSeverity { year: 2022, accidents: 2, fatal: 0, injured: 3 },
            ]
        );
        assert_eq!(SeveritySummary::from_records(&[]), SeveritySummary::default());
    }
}
