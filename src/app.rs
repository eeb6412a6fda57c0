use crate::map::{MapRenderer, Viewport};
use crate::ui;
use chrono::{DateTime, Local};
use mockable::Clock;
use ratatui::layout::Rect;
use std::sync::Arc;
use tracing::warn;
use venue_risk_map::click::ClickOutcome;
use venue_risk_map::nav::{LayerKind, SubRegion, VenueChoice};
use venue_risk_map::{MapDescriptor, Session, UserEvent, VenueInsight};

/// Application state
pub struct App {
    pub session: Session,
    /// Descriptor for the current selection, refreshed after every event
    pub descriptor: MapDescriptor,
    pub insight: Option<VenueInsight>,
    pub viewport: Viewport,
    pub map_renderer: MapRenderer,
    pub should_quit: bool,
    /// Last mouse position for drag tracking
    pub last_mouse: Option<(u16, u16)>,
    /// Current mouse position for cursor marker
    pub mouse_pos: Option<(u16, u16)>,
    /// One-line feedback for the status bar
    pub message: Option<String>,
    /// Map area inside its border, in terminal cells
    map_area: Rect,
    dragged: bool,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl App {
    pub fn new(
        mut session: Session,
        map_renderer: MapRenderer,
        clock: Arc<dyn Clock + Send + Sync>,
        width: u16,
        height: u16,
    ) -> Self {
        let map_area = ui::map_inner(Rect::new(0, 0, width, height));
        let descriptor = session.descriptor();
        let insight = session.insight();
        // Braille gives 2x4 resolution per character
        let viewport = Viewport::focused(
            descriptor.center,
            descriptor.zoom,
            map_area.width as usize * 2,
            map_area.height as usize * 4,
        );

        Self {
            session,
            descriptor,
            insight,
            viewport,
            map_renderer,
            should_quit: false,
            last_mouse: None,
            mouse_pos: None,
            message: None,
            map_area,
            dragged: false,
            clock,
        }
    }

    /// Update viewport size when terminal resizes
    pub fn resize(&mut self, width: u16, height: u16) {
        self.map_area = ui::map_inner(Rect::new(0, 0, width, height));
        self.viewport.width = self.map_area.width as usize * 2;
        self.viewport.height = self.map_area.height as usize * 4;
    }

    /// Send one event to the session and refresh the derived views.
    /// The viewport follows the descriptor only when its framing changed,
    /// so layer toggles keep the user's pan and zoom.
    pub fn apply(&mut self, event: UserEvent) {
        match self.session.handle(event) {
            Ok(_) => {
                self.message = None;
                self.refresh();
            }
            Err(err) => {
                warn!(error = %err, "event rejected");
                self.message = Some(err.to_string());
            }
        }
    }

    fn refresh(&mut self) {
        let descriptor = self.session.descriptor();
        if descriptor.center != self.descriptor.center || descriptor.zoom != self.descriptor.zoom {
            self.viewport.focus(descriptor.center, descriptor.zoom);
        }
        self.descriptor = descriptor;
        self.insight = self.session.insight();
    }

    /// Step through regions; `step` is +1 or -1
    pub fn cycle_region(&mut self, step: isize) {
        let regions = self.session.catalog().regions();
        let current = &self.session.selection().region;
        let Some(next) = cycle(regions, |r| r == current, step).cloned() else {
            return;
        };
        self.apply(UserEvent::SelectRegion(next));
    }

    /// Step through the current region's sub-regions, `All` first
    pub fn cycle_sub_region(&mut self, step: isize) {
        let selection = self.session.selection();
        let options: Vec<SubRegion> = std::iter::once(SubRegion::All)
            .chain(
                self.session
                    .catalog()
                    .sub_regions(&selection.region)
                    .iter()
                    .cloned()
                    .map(SubRegion::Named),
            )
            .collect();
        let Some(next) = cycle(&options, |s| *s == selection.sub_region, step).cloned() else {
            return;
        };
        self.apply(UserEvent::SelectSubRegion(next));
    }

    /// Step through the venues of the current scope, ordered by name
    pub fn cycle_venue(&mut self, step: isize) {
        let selection = self.session.selection();
        let current = selection.venue;
        let ids: Vec<_> = self
            .session
            .catalog()
            .venues_in(&selection.region, &selection.sub_region)
            .into_iter()
            .map(|v| v.id)
            .collect();
        let Some(&next) = cycle(&ids, |id| current == VenueChoice::Venue(*id), step) else {
            return;
        };
        self.apply(UserEvent::SelectVenue(next));
    }

    pub fn overview(&mut self) {
        self.apply(UserEvent::SelectOverview);
    }

    /// Flip the layer behind number key `index` (0-based)
    pub fn toggle_layer(&mut self, index: usize) {
        let Some(&kind) = LayerKind::ALL.get(index) else {
            return;
        };
        let enabled = !self.session.selection().layers.is_enabled(kind);
        self.apply(UserEvent::ToggleLayer {
            name: kind.name().to_string(),
            enabled,
        });
    }

    pub fn set_all_layers(&mut self, enabled: bool) {
        self.apply(UserEvent::SetAllLayers(enabled));
    }

    /// Select the venue under a terminal cell
    pub fn click(&mut self, col: u16, row: u16) {
        let Some((px, py)) = self.to_pixel(col, row) else {
            return;
        };
        let point = self.viewport.unproject_point(px, py);
        self.apply(UserEvent::MapClick(point));
        if self.session.last_click() == Some(ClickOutcome::NoMatch) {
            self.message = Some(format!("no venue at {:.4}, {:.4}", point.lat, point.lon));
        }
    }

    /// Pan the map
    pub fn pan(&mut self, dx: i32, dy: i32) {
        self.viewport.pan(dx, dy);
    }

    /// Zoom in
    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
    }

    /// Zoom out
    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
    }

    /// Zoom in towards a screen position (terminal column/row)
    pub fn zoom_in_at(&mut self, col: u16, row: u16) {
        if let Some((px, py)) = self.to_pixel(col, row) {
            self.viewport.zoom_in_at(px, py);
        }
    }

    /// Zoom out from a screen position (terminal column/row)
    pub fn zoom_out_at(&mut self, col: u16, row: u16) {
        if let Some((px, py)) = self.to_pixel(col, row) {
            self.viewport.zoom_out_at(px, py);
        }
    }

    /// Request quit
    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    /// Get current zoom level as a string
    pub fn zoom_level(&self) -> String {
        format!("z{:.1}", self.viewport.level())
    }

    /// Get current center coordinates as a string
    pub fn center_coords(&self) -> String {
        format!(
            "{:.4}°{}, {:.4}°{}",
            self.viewport.center_lat.abs(),
            if self.viewport.center_lat >= 0.0 { "N" } else { "S" },
            self.viewport.center_lon.abs(),
            if self.viewport.center_lon >= 0.0 { "E" } else { "W" }
        )
    }

    pub fn now(&self) -> DateTime<Local> {
        self.clock.local()
    }

    pub fn start_press(&mut self, col: u16, row: u16) {
        self.last_mouse = Some((col, row));
        self.dragged = false;
    }

    /// Handle mouse drag
    pub fn handle_drag(&mut self, x: u16, y: u16) {
        if let Some((last_x, last_y)) = self.last_mouse {
            let dx = last_x as i32 - x as i32;
            let dy = last_y as i32 - y as i32;
            // one terminal cell is 2x4 braille pixels
            self.pan(dx * 2, dy * 4);
            self.dragged = true;
        }
        self.last_mouse = Some((x, y));
    }

    /// Mouse released: a press without drag is a click
    pub fn end_press(&mut self, col: u16, row: u16) {
        if self.last_mouse.is_some() && !self.dragged {
            self.click(col, row);
        }
        self.last_mouse = None;
        self.dragged = false;
    }

    /// Update mouse cursor position
    pub fn set_mouse_pos(&mut self, col: u16, row: u16) {
        self.mouse_pos = Some((col, row));
    }

    /// Get mouse position in braille pixel coordinates (for rendering marker)
    pub fn mouse_pixel_pos(&self) -> Option<(i32, i32)> {
        self.mouse_pos.and_then(|(col, row)| self.to_pixel(col, row))
    }

    /// Terminal cell to braille pixel inside the map, `None` outside it
    fn to_pixel(&self, col: u16, row: u16) -> Option<(i32, i32)> {
        let area = self.map_area;
        if col < area.x || row < area.y || col >= area.x + area.width || row >= area.y + area.height {
            return None;
        }
        // centre of the cell
        Some((
            (col - area.x) as i32 * 2 + 1,
            (row - area.y) as i32 * 4 + 2,
        ))
    }
}

/// Neighbour of the item matching `is_current`, wrapping at both ends.
/// With no current item, +1 starts at the first and -1 at the last.
fn cycle<T>(items: &[T], is_current: impl Fn(&T) -> bool, step: isize) -> Option<&T> {
    if items.is_empty() {
        return None;
    }
    let len = items.len() as isize;
    let next = match items.iter().position(is_current) {
        Some(i) => (i as isize + step).rem_euclid(len),
        None if step >= 0 => 0,
        None => len - 1,
    };
    items.get(next as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;
    use venue_risk_map::data::demo::demo_dataset;
    use venue_risk_map::nav::NavState;
    use venue_risk_map::source::InMemorySource;
    use venue_risk_map::weather::NoFeed;
    use venue_risk_map::ViewSettings;

    fn app() -> App {
        let session = Session::new(
            Arc::new(InMemorySource::new(demo_dataset())),
            Arc::new(NoFeed),
            ViewSettings::default(),
        );
        App::new(session, MapRenderer::default(), Arc::new(DefaultClock), 120, 40)
    }

    #[test]
    fn test_cycle_wraps() {
        let items = [1, 2, 3];
        assert_eq!(cycle(&items, |&i| i == 3, 1), Some(&1));
        assert_eq!(cycle(&items, |&i| i == 1, -1), Some(&3));
        assert_eq!(cycle(&items, |_| false, -1), Some(&3));
        assert_eq!(cycle::<i32>(&[], |_| true, 1), None);
    }

    #[test]
    fn test_venue_cycle_recenters_viewport() {
        let mut app = app();
        app.cycle_region(1);
        app.cycle_venue(1);
        assert_eq!(app.session.state(), NavState::VenueSelected);
        let venue = app.insight.as_ref().map(|i| i.venue.position).unwrap();
        assert_eq!(app.descriptor.center, venue);
        assert!((app.viewport.center_lat - venue.lat).abs() < 1e-9);
    }

    #[test]
    fn test_layer_toggle_keeps_viewport() {
        let mut app = app();
        app.pan(30, 0);
        let lon = app.viewport.center_lon;
        app.toggle_layer(0);
        assert!(!app.session.selection().layers.is_enabled(LayerKind::Rainfall));
        assert_eq!(app.viewport.center_lon, lon);
    }

    #[test]
    fn test_click_outside_map_is_ignored() {
        let mut app = app();
        let revision = app.session.revision();
        // last column belongs to the side panel
        app.click(119, 10);
        assert_eq!(app.session.revision(), revision);
        assert!(app.message.is_none());
    }
}
