use crate::braille::BrailleCanvas;
use crate::map::basemap::{Basemap, LineString};
use crate::map::geometry::{draw_circle, draw_line, draw_marker, draw_ring, draw_square};
use crate::map::projection::Viewport;
use venue_risk_map::compose::{LayerData, MapDescriptor};
use venue_risk_map::nav::LayerKind;

/// Venue names appear for every marker from this level on
const VENUE_LABEL_LEVEL: f64 = 13.0;

/// Text placed next to a marker, in character cells
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub col: u16,
    pub row: u16,
    pub text: String,
    pub kind: LayerKind,
}

/// One frame of the map, split per layer so each can get its own color
pub struct MapFrame {
    pub basemap: BrailleCanvas,
    /// Bottom to top, in descriptor order
    pub layers: Vec<(LayerKind, BrailleCanvas)>,
    pub labels: Vec<Label>,
}

/// Draws map descriptors onto braille canvases
pub struct MapRenderer {
    basemap: Basemap,
}

impl MapRenderer {
    pub fn new(basemap: Basemap) -> Self {
        Self { basemap }
    }

    /// Render the basemap and every layer of `descriptor`
    pub fn render(&self, descriptor: &MapDescriptor, viewport: &Viewport) -> MapFrame {
        let cols = viewport.width / 2;
        let rows = viewport.height / 4;

        let mut basemap = BrailleCanvas::new(cols, rows);
        for line in self.basemap.lines() {
            draw_linestring(&mut basemap, line, viewport);
        }

        let mut labels = Vec::new();
        let layers = descriptor
            .layers
            .iter()
            .map(|spec| {
                let mut canvas = BrailleCanvas::new(cols, rows);
                draw_layer(&mut canvas, &mut labels, spec.kind, &spec.data, viewport);
                (spec.kind, canvas)
            })
            .collect();

        MapFrame {
            basemap,
            layers,
            labels,
        }
    }
}

impl Default for MapRenderer {
    fn default() -> Self {
        Self::new(Basemap::builtin())
    }
}

fn draw_layer(
    canvas: &mut BrailleCanvas,
    labels: &mut Vec<Label>,
    kind: LayerKind,
    data: &LayerData,
    viewport: &Viewport,
) {
    let mut label = |px: i32, py: i32, text: String| {
        if let Some((col, row)) = label_cell(px, py, viewport) {
            labels.push(Label { col, row, text, kind });
        }
    };

    match data {
        LayerData::Heat { points } => {
            for point in points {
                let (px, py) = viewport.project_point(point.position);
                if viewport.is_visible(px, py) {
                    // log-scaled so one extreme value does not swamp the view
                    let radius = (1.0 + point.weight.max(0.0).ln_1p()).round().clamp(1.0, 5.0) as i32;
                    draw_circle(canvas, px, py, radius);
                }
            }
        }
        LayerData::Cells { cells } => {
            for cell in cells {
                let (px, py) = viewport.project(cell.lon_bucket, cell.lat_bucket);
                if viewport.is_visible(px, py) {
                    let radius = (cell.count.max(1) as f64).log10().ceil().clamp(1.0, 4.0) as i32;
                    draw_circle(canvas, px, py, radius);
                }
            }
        }
        LayerData::Hazards { records } => {
            for record in records {
                let (px, py) = viewport.project_point(record.position);
                if viewport.is_visible(px, py) {
                    draw_circle(canvas, px, py, 1);
                }
            }
        }
        LayerData::Stations { markers } => {
            for marker in markers {
                let (px, py) = viewport.project_point(marker.position);
                if !viewport.is_visible(px, py) {
                    continue;
                }
                draw_marker(canvas, px, py, 2);
                if let Some(mm) = marker.reading_mm.filter(|mm| *mm > 0.0) {
                    label(px, py, format!("{mm:.1}mm"));
                }
            }
        }
        LayerData::Venues { markers } => {
            let show_all_names = viewport.level() >= VENUE_LABEL_LEVEL;
            for marker in markers {
                let (px, py) = viewport.project_point(marker.position);
                if marker.polygon.len() >= 3 {
                    let ring: Vec<(i32, i32)> =
                        marker.polygon.iter().map(|p| viewport.project_point(*p)).collect();
                    draw_ring(canvas, &ring, marker.selected);
                } else if viewport.is_visible(px, py) {
                    draw_circle(canvas, px, py, if marker.selected { 3 } else { 2 });
                }
                if marker.selected || show_all_names {
                    label(px, py, marker.name.clone());
                }
            }
        }
        LayerData::Hotspots { cells } => {
            for cell in cells {
                let (px, py) = viewport.project(cell.lon_bucket, cell.lat_bucket);
                if viewport.is_visible(px, py) {
                    draw_square(canvas, px, py, 2);
                    label(px, py, cell.count.to_string());
                }
            }
        }
    }
}

/// Character cell two columns right of a pixel, if it lands on the canvas
fn label_cell(px: i32, py: i32, viewport: &Viewport) -> Option<(u16, u16)> {
    if px < 0 || py < 0 || px as usize >= viewport.width || py as usize >= viewport.height {
        return None;
    }
    let col = u16::try_from(px / 2).ok()?.checked_add(2)?;
    let row = u16::try_from(py / 4).ok()?;
    Some((col, row))
}

/// Draw a linestring with viewport culling
fn draw_linestring(canvas: &mut BrailleCanvas, line: &LineString, viewport: &Viewport) {
    if line.len() < 2 {
        return;
    }

    let mut prev: Option<(i32, i32)> = None;

    for &(lon, lat) in line {
        let (px, py) = viewport.project(lon, lat);

        if let Some((prev_x, prev_y)) = prev {
            if viewport.line_might_be_visible((prev_x, prev_y), (px, py)) {
                draw_line(canvas, prev_x, prev_y, px, py);
            }
        }

        prev = Some((px, py));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use venue_risk_map::compose::{LayerSpec, VenueMarker};
    use venue_risk_map::geo::GeoPoint;
    use venue_risk_map::model::{GridCell, VenueId};
    use venue_risk_map::nav::NavState;

    fn descriptor(layers: Vec<LayerSpec>) -> MapDescriptor {
        MapDescriptor {
            center: GeoPoint::new(25.088, 121.524),
            zoom: 16,
            mode: NavState::VenueSelected,
            degraded: false,
            layers,
        }
    }

    #[test]
    fn test_selected_venue_gets_label() {
        let viewport = Viewport::focused(GeoPoint::new(25.088, 121.524), 16, 80, 40);
        let venue = VenueMarker {
            id: VenueId(1),
            name: "Shilin".into(),
            position: GeoPoint::new(25.088, 121.524),
            polygon: Vec::new(),
            selected: true,
            schedule: None,
        };
        let frame = MapRenderer::default().render(
            &descriptor(vec![LayerSpec {
                kind: LayerKind::Venues,
                data: LayerData::Venues { markers: vec![venue] },
            }]),
            &viewport,
        );

        assert_eq!(frame.layers.len(), 1);
        assert!(!frame.layers[0].1.is_blank());
        assert_eq!(
            frame.labels,
            [Label {
                col: 22,
                row: 5,
                text: "Shilin".into(),
                kind: LayerKind::Venues,
            }]
        );
    }

    #[test]
    fn test_offscreen_hotspot_is_skipped() {
        let viewport = Viewport::focused(GeoPoint::new(25.088, 121.524), 16, 80, 40);
        let far = GridCell {
            lat_bucket: 22.6,
            lon_bucket: 120.3,
            count: 9,
        };
        let frame = MapRenderer::default().render(
            &descriptor(vec![LayerSpec {
                kind: LayerKind::Hotspots,
                data: LayerData::Hotspots { cells: vec![far] },
            }]),
            &viewport,
        );
        assert!(frame.layers[0].1.is_blank());
        assert!(frame.labels.is_empty());
    }

    #[test]
    fn test_builtin_coastline_visible_over_taiwan() {
        let viewport = Viewport::focused(GeoPoint::new(23.7, 120.95), 7, 200, 160);
        let frame = MapRenderer::default().render(&descriptor(Vec::new()), &viewport);
        assert!(!frame.basemap.is_blank());
        assert!(frame.layers.is_empty());
    }
}
