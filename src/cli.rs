use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use venue_risk_map::config::ViewSettings;
use venue_risk_map::source::DEFAULT_TTL;
use venue_risk_map::weather::CWA_RAINFALL_URL;

/// `venue-risk-map` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "venue-risk-map",
    about = "Explore night markets, traffic accidents and live rainfall on a terminal map",
    version
)]
pub struct Cli {
    /// Directory holding venues.geojson, hazards.json and stations.json.
    /// The built-in demo dataset is used when it does not exist.
    #[arg(long, value_name = "dir", env = "VENUE_MAP_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Rainfall observation endpoint.
    #[arg(long, value_name = "url", default_value = CWA_RAINFALL_URL)]
    pub weather_url: String,

    /// Open-data authorization key for the weather endpoint.
    #[arg(long, value_name = "key", env = "CWA_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Never call the weather endpoint; read weather.json from the data
    /// directory instead when present.
    #[arg(long)]
    pub offline: bool,

    #[arg(long, value_name = "seconds", default_value_t = 10)]
    pub feed_timeout_secs: u64,

    /// Freshness window of cached query results.
    #[arg(long, value_name = "seconds", default_value_t = DEFAULT_TTL.as_secs())]
    pub cache_ttl_secs: u64,

    #[arg(long, value_name = "km", default_value_t = 0.5)]
    pub detail_radius_km: f64,

    #[arg(long, value_name = "km", default_value_t = 1.0)]
    pub stats_radius_km: f64,

    /// Decimal digits of the overview hazard grid.
    #[arg(long, value_name = "digits", default_value_t = 2)]
    pub grid_precision: u32,

    /// Click matching tolerance in degrees.
    #[arg(long, value_name = "degrees", default_value_t = 0.0005)]
    pub click_tolerance: f64,

    #[arg(long, value_name = "n", default_value_t = 800)]
    pub max_detail_points: usize,

    /// Print the map descriptor as JSON and exit.
    #[arg(long)]
    pub dump: bool,

    /// Venue to focus before dumping or drawing.
    #[arg(long, value_name = "id")]
    pub venue: Option<u64>,

    /// Write logs here while the terminal UI is running.
    #[arg(long, value_name = "path")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings {
            detail_radius_km: self.detail_radius_km,
            stats_radius_km: self.stats_radius_km,
            grid_precision: self.grid_precision,
            click_tolerance_deg: self.click_tolerance,
            max_detail_points: self.max_detail_points,
            ..ViewSettings::default()
        }
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_view_settings() {
        let cli = Cli::try_parse_from(["venue-risk-map"]).unwrap();
        assert_eq!(cli.view_settings(), ViewSettings::default());
        assert_eq!(cli.cache_ttl(), DEFAULT_TTL);
        assert!(!cli.dump);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "venue-risk-map",
            "--detail-radius-km",
            "0.8",
            "--offline",
            "--venue",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.view_settings().detail_radius_km, 0.8);
        assert!(cli.offline);
        assert_eq!(cli.venue, Some(3));
    }
}
