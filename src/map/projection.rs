use std::f64::consts::PI;
use venue_risk_map::geo::GeoPoint;

const MIN_ZOOM: f64 = 0.5;
/// Street level (web zoom 18)
const MAX_ZOOM: f64 = 65536.0;

/// Viewport representing the visible map area and zoom level
#[derive(Clone, Debug)]
pub struct Viewport {
    /// Center longitude (-180 to 180)
    pub center_lon: f64,
    /// Center latitude (-85 to 85)
    pub center_lat: f64,
    /// Scale factor: the whole world spans `zoom * width` pixels
    pub zoom: f64,
    /// Canvas pixel width
    pub width: usize,
    /// Canvas pixel height
    pub height: usize,
}

/// Scale factor for a web-map zoom level. Level 8 shows a few degrees across
/// a terminal, level 16 about two kilometres.
pub fn zoom_factor(level: u8) -> f64 {
    2f64.powi(level as i32 - 2).clamp(MIN_ZOOM, MAX_ZOOM)
}

#[inline(always)]
fn mercator_y(lat: f64) -> f64 {
    let lat_rad = lat.clamp(-85.0, 85.0) * PI / 180.0;
    (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0
}

impl Viewport {
    pub fn new(center_lon: f64, center_lat: f64, zoom: f64, width: usize, height: usize) -> Self {
        Self {
            center_lon,
            center_lat,
            zoom,
            width,
            height,
        }
    }

    /// Viewport centered on `center` at a web-map zoom level
    pub fn focused(center: GeoPoint, level: u8, width: usize, height: usize) -> Self {
        Self::new(center.lon, center.lat, zoom_factor(level), width, height)
    }

    /// Jump to `center` at a web-map zoom level
    pub fn focus(&mut self, center: GeoPoint, level: u8) {
        self.center_lon = center.lon;
        self.center_lat = center.lat;
        self.zoom = zoom_factor(level);
    }

    /// Equivalent web-map zoom level, for the status bar
    pub fn level(&self) -> f64 {
        self.zoom.log2() + 2.0
    }

    /// Pan the viewport by pixel delta
    pub fn pan(&mut self, dx: i32, dy: i32) {
        let (lon, lat) = self.unproject(self.width as i32 / 2 + dx, self.height as i32 / 2 + dy);

        // Wrap longitude
        self.center_lon = if lon > 180.0 {
            lon - 360.0
        } else if lon < -180.0 {
            lon + 360.0
        } else {
            lon
        };
        self.center_lat = lat.clamp(-85.0, 85.0);
    }

    /// Zoom in by a factor
    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom * 1.5).min(MAX_ZOOM);
    }

    /// Zoom out by a factor
    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom / 1.5).max(MIN_ZOOM);
    }

    /// Zoom in towards a specific pixel location
    pub fn zoom_in_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.5);
    }

    /// Zoom out from a specific pixel location
    pub fn zoom_out_at(&mut self, px: i32, py: i32) {
        self.zoom_at(px, py, 1.0 / 1.5);
    }

    /// Zoom by factor towards a specific pixel location
    fn zoom_at(&mut self, px: i32, py: i32, factor: f64) {
        // Get the geographic coordinates under the mouse
        let (lon, lat) = self.unproject(px, py);

        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);

        // Calculate where that point would now project to
        let (new_px, new_py) = self.project(lon, lat);

        // Pan to bring it back under the mouse
        self.pan(new_px - px, new_py - py);
    }

    /// Unproject pixel coordinates back to geographic coordinates (lon, lat)
    pub fn unproject(&self, px: i32, py: i32) -> (f64, f64) {
        let scale = self.zoom * self.width.max(1) as f64;

        let center_x = (self.center_lon + 180.0) / 360.0;
        let center_y = mercator_y(self.center_lat);

        let x = (px as f64 - self.width as f64 / 2.0) / scale + center_x;
        let y = (py as f64 - self.height as f64 / 2.0) / scale + center_y;

        // Convert from Web Mercator normalized coords back to lon/lat
        let lon = x * 360.0 - 180.0;
        let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
        let lat = lat_rad * 180.0 / PI;

        (lon, lat)
    }

    pub fn unproject_point(&self, px: i32, py: i32) -> GeoPoint {
        let (lon, lat) = self.unproject(px, py);
        GeoPoint::new(lat, lon)
    }

    /// Project a geographic coordinate (lon, lat) to pixel coordinates
    pub fn project(&self, lon: f64, lat: f64) -> (i32, i32) {
        // Web Mercator projection
        let x = (lon + 180.0) / 360.0;
        let y = mercator_y(lat);

        let center_x = (self.center_lon + 180.0) / 360.0;
        let center_y = mercator_y(self.center_lat);

        let scale = self.zoom * self.width as f64;

        let px = ((x - center_x) * scale + self.width as f64 / 2.0).round() as i32;
        let py = ((y - center_y) * scale + self.height as f64 / 2.0).round() as i32;

        (px, py)
    }

    #[inline(always)]
    pub fn project_point(&self, point: GeoPoint) -> (i32, i32) {
        self.project(point.lon, point.lat)
    }

    /// Check if a projected point is visible in the viewport
    pub fn is_visible(&self, px: i32, py: i32) -> bool {
        px >= -10 && px < self.width as i32 + 10 && py >= -10 && py < self.height as i32 + 10
    }

    /// Check if a line segment might be visible (rough bounding box check)
    pub fn line_might_be_visible(&self, p1: (i32, i32), p2: (i32, i32)) -> bool {
        let min_x = p1.0.min(p2.0);
        let max_x = p1.0.max(p2.0);
        let min_y = p1.1.min(p2.1);
        let max_y = p1.1.max(p2.1);

        max_x >= 0 && min_x < self.width as i32 && max_y >= 0 && min_y < self.height as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_center() {
        let vp = Viewport::new(0.0, 0.0, 1.0, 100, 100);
        let (x, y) = vp.project(0.0, 0.0);
        assert_eq!(x, 50);
        assert_eq!(y, 50);
    }

    #[test]
    fn test_pan() {
        let mut vp = Viewport::new(121.0, 24.0, zoom_factor(8), 200, 160);
        vp.pan(10, 0);
        assert!(vp.center_lon > 121.0);
        assert!((vp.center_lat - 24.0).abs() < 1e-9);
        vp.pan(0, -10);
        assert!(vp.center_lat > 24.0, "dragging up moves north");
    }

    #[test]
    fn test_unproject_inverts_project() {
        let vp = Viewport::focused(GeoPoint::new(25.088, 121.524), 16, 200, 160);
        let (px, py) = vp.project(121.5239, 25.0879);
        let back = vp.unproject_point(px, py);
        // one braille pixel at level 16 is about 10 m
        assert!((back.lat - 25.0879).abs() < 0.0002);
        assert!((back.lon - 121.5239).abs() < 0.0002);
        assert_eq!(vp.project_point(GeoPoint::new(25.088, 121.524)), (100, 80));
    }

    #[test]
    fn test_zoom_levels() {
        assert_eq!(zoom_factor(8), 64.0);
        assert_eq!(zoom_factor(16), 16384.0);
        let vp = Viewport::focused(GeoPoint::new(23.7, 120.95), 8, 200, 160);
        assert!((vp.level() - 8.0).abs() < 1e-9);
    }
}
