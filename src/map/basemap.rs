use anyhow::{Context, Result};
use geojson::{GeoJson, Geometry, Value};
use std::path::Path;

/// A geographic line (sequence of lon/lat coordinates)
pub type LineString = Vec<(f64, f64)>;

/// Optional high-resolution coastline inside the data directory
pub const COASTLINE_FILE: &str = "coastline.geojson";

/// Background outlines drawn under every layer
#[derive(Debug, Clone, Default)]
pub struct Basemap {
    lines: Vec<LineString>,
}

impl Basemap {
    /// Coastline from the data directory when present, the built-in outline
    /// otherwise
    pub fn for_data_dir(data_dir: &Path) -> Self {
        let path = data_dir.join(COASTLINE_FILE);
        if path.exists() {
            match Self::load(&path) {
                Ok(basemap) if !basemap.is_empty() => return basemap,
                Ok(_) => tracing::warn!(path = %path.display(), "coastline file has no lines"),
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "coastline unreadable"),
            }
        }
        Self::builtin()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let geojson: GeoJson = content.parse().context("parsing coastline GeoJSON")?;

        let mut lines = Vec::new();
        match &geojson {
            GeoJson::FeatureCollection(fc) => {
                for geometry in fc.features.iter().filter_map(|f| f.geometry.as_ref()) {
                    collect_lines(geometry, &mut lines);
                }
            }
            GeoJson::Feature(f) => {
                if let Some(geometry) = &f.geometry {
                    collect_lines(geometry, &mut lines);
                }
            }
            GeoJson::Geometry(geometry) => collect_lines(geometry, &mut lines),
        }
        Ok(Self { lines })
    }

    /// Coarse outline of Taiwan and Penghu
    pub fn builtin() -> Self {
        let main_island = vec![
            (121.54, 25.30), (121.75, 25.15), (122.00, 25.01), (121.85, 24.85),
            (121.87, 24.60), (121.62, 23.98), (121.50, 23.50), (121.15, 22.75),
            (120.90, 22.30), (120.85, 21.90), (120.70, 22.00), (120.62, 22.35),
            (120.27, 22.60), (120.15, 23.00), (120.10, 23.40), (120.20, 23.80),
            (120.40, 24.20), (120.70, 24.60), (120.90, 24.85), (121.05, 25.05),
            (121.40, 25.18), (121.54, 25.30),
        ];
        let penghu = vec![
            (119.52, 23.66), (119.66, 23.66), (119.70, 23.55), (119.60, 23.50),
            (119.52, 23.56), (119.52, 23.66),
        ];
        Self {
            lines: vec![main_island, penghu],
        }
    }

    pub fn lines(&self) -> &[LineString] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn collect_lines(geometry: &Geometry, lines: &mut Vec<LineString>) {
    let to_line = |coords: &Vec<Vec<f64>>| -> LineString {
        coords.iter().filter(|c| c.len() >= 2).map(|c| (c[0], c[1])).collect()
    };
    match &geometry.value {
        Value::LineString(coords) => lines.push(to_line(coords)),
        Value::MultiLineString(many) => lines.extend(many.iter().map(to_line)),
        Value::Polygon(rings) => lines.extend(rings.first().map(to_line)),
        Value::MultiPolygon(polygons) => {
            lines.extend(polygons.iter().filter_map(|rings| rings.first()).map(to_line))
        }
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                collect_lines(g, lines);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_polygon_and_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"type":"FeatureCollection","features":[
                {{"type":"Feature","properties":{{}},"geometry":{{"type":"Polygon","coordinates":[[[121,25],[122,25],[122,24],[121,25]]]}}}},
                {{"type":"Feature","properties":{{}},"geometry":{{"type":"MultiLineString","coordinates":[[[120,23],[120.5,23.5]],[[119,22],[119.5,22]]]}}}}
            ]}}"#
        )
        .unwrap();
        let basemap = Basemap::load(file.path()).unwrap();
        assert_eq!(basemap.lines().len(), 3);
        assert_eq!(basemap.lines()[0][1], (122.0, 25.0));
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let basemap = Basemap::for_data_dir(dir.path());
        assert_eq!(basemap.lines().len(), Basemap::builtin().lines().len());
    }
}
