use crate::app::App;
use crate::braille::BrailleCanvas;
use crate::map::MapFrame;
use chrono::{Datelike, Weekday};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget, Wrap},
    Frame,
};
use venue_risk_map::model::{DayHours, Interval, SeveritySummary};
use venue_risk_map::nav::{LayerKind, NavState, VenueChoice};

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Map area, side panel and status bar
fn split(area: Rect) -> (Rect, Rect, Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map and panel
            Constraint::Length(1), // Status bar
        ])
        .split(area);
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(rows[0]);
    (cols[0], cols[1], rows[1])
}

fn map_block() -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
}

/// Drawable map cells for a terminal of `area`, border excluded
pub fn map_inner(area: Rect) -> Rect {
    let (map, _, _) = split(area);
    map_block().inner(map)
}

pub fn layer_color(kind: LayerKind) -> Color {
    match kind {
        LayerKind::Rainfall => Color::Blue,
        LayerKind::HazardHeat => Color::Red,
        LayerKind::HazardPoints => Color::LightRed,
        LayerKind::Stations => Color::Magenta,
        LayerKind::Venues => Color::Yellow,
        LayerKind::Hotspots => Color::LightMagenta,
    }
}

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let (map, panel, status) = split(frame.area());
    render_map(frame, app, map);
    render_panel(frame, app, panel);
    render_status_bar(frame, app, status);
}

fn render_map(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.descriptor.mode {
        NavState::Overview => " Overview ".to_string(),
        _ => format!(" {} ", app.session.selection().region),
    };
    let block = map_block().title(Span::styled(
        title,
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Update viewport size for rendering
    let mut viewport = app.viewport.clone();
    viewport.width = inner.width as usize * 2;
    viewport.height = inner.height as usize * 4;

    let map_frame = app.map_renderer.render(&app.descriptor, &viewport);

    let cursor_pos = app.mouse_pixel_pos().and_then(|(px, py)| {
        let cx = (px / 2) as u16;
        let cy = (py / 4) as u16;
        (cx < inner.width && cy < inner.height).then_some((cx, cy))
    });

    frame.render_widget(
        MapWidget {
            frame: map_frame,
            cursor_pos,
        },
        inner,
    );
}

/// Custom widget that renders braille map with text labels overlaid
struct MapWidget {
    frame: MapFrame,
    cursor_pos: Option<(u16, u16)>,
}

impl MapWidget {
    /// Render a braille canvas layer with a specific color
    fn render_layer(canvas: &BrailleCanvas, color: Color, area: Rect, buf: &mut Buffer) {
        for (col, row, ch) in canvas.glyphs() {
            if col >= area.width || row >= area.height {
                continue;
            }
            buf[(area.x + col, area.y + row)].set_char(ch).set_fg(color);
        }
    }
}

impl Widget for MapWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // Back to front: coastline, then layers in descriptor order
        Self::render_layer(&self.frame.basemap, Color::Cyan, area, buf);
        for (kind, canvas) in &self.frame.layers {
            Self::render_layer(canvas, layer_color(*kind), area, buf);
        }

        for label in &self.frame.labels {
            if label.row >= area.height || label.col >= area.width {
                continue;
            }
            let max_len = (area.width - label.col) as usize;
            let style = Style::default().fg(layer_color(label.kind)).add_modifier(Modifier::BOLD);
            for (i, ch) in label.text.chars().take(max_len.min(24)).enumerate() {
                buf[(area.x + label.col + i as u16, area.y + label.row)]
                    .set_char(ch)
                    .set_style(style);
            }
        }

        if let Some((cx, cy)) = self.cursor_pos {
            buf[(area.x + cx, area.y + cy)].set_char('╋').set_fg(Color::Red);
        }
    }
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}

fn field(name: &str, value: String, keys: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{name:<9}"), Style::default().fg(Color::DarkGray)),
        Span::styled(value, Style::default().fg(Color::White)),
        Span::styled(format!(" {keys}"), Style::default().fg(Color::DarkGray)),
    ])
}

fn render_panel(frame: &mut Frame, app: &App, area: Rect) {
    let selection = app.session.selection();
    let catalog = app.session.catalog();
    let mut lines = Vec::new();

    lines.push(heading("Navigation"));
    let scoped = app.descriptor.mode != NavState::Overview;
    lines.push(field(
        "Region",
        if scoped { selection.region.clone() } else { "-".into() },
        "[ ]",
    ));
    lines.push(field(
        "District",
        if scoped { selection.sub_region.to_string() } else { "-".into() },
        "{ }",
    ));
    let venue_name = match selection.venue {
        VenueChoice::Venue(id) => catalog.get(id).map_or_else(|| id.to_string(), |v| v.name.clone()),
        VenueChoice::Overview => "-".into(),
    };
    lines.push(field("Venue", venue_name, "n p"));
    if app.descriptor.degraded {
        lines.push(Line::from(Span::styled(
            "data degraded, showing what loaded",
            Style::default().fg(Color::Red),
        )));
    }

    lines.push(Line::default());
    lines.push(heading("Layers"));
    for (i, (kind, enabled)) in selection.layers.iter().enumerate() {
        let (mark, color) = if enabled { ("■", layer_color(kind)) } else { ("□", Color::DarkGray) };
        lines.push(Line::from(vec![
            Span::styled(format!("{} ", i + 1), Style::default().fg(Color::DarkGray)),
            Span::styled(format!("{mark} {}", kind.name()), Style::default().fg(color)),
        ]));
    }

    if let Some(insight) = &app.insight {
        let settings = app.session.settings();
        lines.push(Line::default());
        lines.push(heading(&insight.venue.name));
        lines.push(field(
            "Risk",
            format!("{} accidents", insight.risk_count),
            &format!("within {} km", settings.stats_radius_km),
        ));
        lines.extend(severity_lines(&insight.severity));
        if let Some((station, km)) = &insight.nearest_station {
            lines.push(field("Station", station.name.clone(), &format!("{km:.2} km")));
        }
        if let Some((reading, km)) = &insight.nearest_rain {
            lines.push(field(
                "Rain",
                format!("{:.1} mm at {}", reading.reading_mm, reading.name),
                &format!("{km:.1} km"),
            ));
        }
        for cell in insight.hotspots.iter().take(3) {
            lines.push(field(
                "Hotspot",
                format!("{:.3}, {:.3}", cell.lat_bucket, cell.lon_bucket),
                &format!("x{}", cell.count),
            ));
        }

        let schedule = &insight.venue.schedule;
        if schedule.is_known() {
            let now = app.now();
            let open = schedule.is_open_at(now.weekday(), now.time());
            lines.push(Line::from(Span::styled(
                if open { "open now" } else { "closed now" },
                Style::default().fg(if open { Color::Green } else { Color::DarkGray }),
            )));
            for day in WEEKDAYS {
                let style = if day == now.weekday() {
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Gray)
                };
                lines.push(Line::from(Span::styled(
                    format!("{day} {}", day_text(schedule.day(day))),
                    style,
                )));
            }
        }
    }

    let rainfall = app.session.rainfall();
    lines.push(Line::default());
    lines.push(heading("Rainfall"));
    match &rainfall.top_station {
        Some(name) => lines.push(field("Wettest", name.clone(), &format!("{:.1} mm", rainfall.max_reading_mm))),
        None if rainfall.is_empty() => lines.push(field("Feed", "no data".into(), "")),
        None => lines.push(field("Feed", "dry everywhere".into(), "")),
    }
    for reading in rainfall.top.iter().skip(1).take(4) {
        lines.push(field("", reading.name.clone(), &format!("{:.1} mm", reading.reading_mm)));
    }

    let panel = Paragraph::new(lines)
        .block(map_block().title(Span::styled(" Details ", Style::default().fg(Color::Cyan))))
        .wrap(Wrap { trim: true });
    frame.render_widget(panel, area);
}

/// Casualty totals, then the three most recent years
fn severity_lines(severity: &SeveritySummary) -> Vec<Line<'static>> {
    let mut lines = vec![field(
        "Victims",
        format!("{} killed, {} injured", severity.fatal, severity.injured),
        "",
    )];
    for year in severity.by_year.iter().rev().take(3) {
        lines.push(field(
            &year.year.to_string(),
            format!("{} killed, {} injured", year.fatal, year.injured),
            &format!("x{}", year.accidents),
        ));
    }
    lines
}

fn clock(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn day_text(hours: &DayHours) -> String {
    match hours {
        DayHours::Unknown => "?".into(),
        DayHours::Closed => "closed".into(),
        DayHours::Open(intervals) => intervals
            .iter()
            .map(|Interval { open, close }| format!("{}-{}", clock(*open), clock(*close)))
            .collect::<Vec<_>>()
            .join(", "),
        DayHours::Unparsed(text) => text.clone(),
    }
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(" ", Style::default()),
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
        Span::styled(" | ", Style::default().fg(Color::DarkGray)),
    ];
    match &app.message {
        Some(message) => spans.push(Span::styled(message.clone(), Style::default().fg(Color::Red))),
        None => spans.push(Span::styled(
            "hjkl:pan +/-:zoom click:select o:overview 1-6:layers a/A:all R:reload q:quit",
            Style::default().fg(Color::DarkGray),
        )),
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
