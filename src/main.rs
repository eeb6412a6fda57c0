mod app;
mod braille;
mod cli;
mod map;
mod ui;

use anyhow::{anyhow, Context, Result};
use app::App;
use clap::Parser;
use cli::Cli;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use map::{Basemap, MapRenderer};
use mockable::{Clock, DefaultClock};
use ratatui::DefaultTerminal;
use std::fs::File;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use venue_risk_map::data::demo::{demo_dataset, demo_readings};
use venue_risk_map::data::load_dataset;
use venue_risk_map::model::VenueId;
use venue_risk_map::source::{CachedSource, Dataset, InMemorySource};
use venue_risk_map::weather::{CwaFeed, FileFeed, NoFeed, StaticFeed, WeatherFeed};
use venue_risk_map::{Session, SubRegion, UserEvent};

/// Offline rainfall snapshot inside the data directory
const WEATHER_FILE: &str = "weather.json";

type Source = CachedSource<InMemorySource>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(DefaultClock);
    let (dataset, is_demo) = load(&cli);
    let feed = weather_feed(&cli, is_demo, &dataset)?;
    let source = Arc::new(CachedSource::new(
        InMemorySource::new(dataset),
        cli.cache_ttl(),
        clock.clone(),
    ));

    let mut session = Session::new(source.clone(), feed, cli.view_settings());
    if let Some(id) = cli.venue {
        focus_venue(&mut session, VenueId(id))?;
    }

    if cli.dump {
        println!("{}", serde_json::to_string_pretty(&session.descriptor())?);
        return Ok(());
    }

    // Initialize terminal
    let mut terminal = ratatui::init();
    terminal.clear()?;

    // Enable mouse capture
    execute!(std::io::stdout(), EnableMouseCapture)?;

    let size = terminal.size()?;
    let renderer = MapRenderer::new(Basemap::for_data_dir(&cli.data_dir));
    let mut app = App::new(session, renderer, clock, size.width, size.height);

    // Run the app
    let result = run(&mut terminal, &mut app, &cli, &source, is_demo);

    // Disable mouse capture and restore terminal
    let _ = execute!(std::io::stdout(), DisableMouseCapture);
    ratatui::restore();

    result
}

/// Logs go to stderr for `--dump`, to `--log-file` otherwise; without a log
/// file the terminal UI runs silent.
fn init_tracing(cli: &Cli) -> Result<()> {
    let builder = fmt().with_env_filter(EnvFilter::from_default_env());
    let result = if cli.dump {
        builder.with_writer(std::io::stderr).try_init()
    } else if let Some(path) = &cli.log_file {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
    } else {
        return Ok(());
    };
    if let Err(error) = result {
        eprintln!("tracing initialization failed: {error}");
    }
    Ok(())
}

/// Dataset from the data directory, or the demo dataset when it is missing
fn load(cli: &Cli) -> (Dataset, bool) {
    if cli.data_dir.is_dir() {
        (load_dataset(&cli.data_dir).0, false)
    } else {
        info!(dir = %cli.data_dir.display(), "data directory not found, using demo dataset");
        (demo_dataset(), true)
    }
}

fn weather_feed(cli: &Cli, is_demo: bool, dataset: &Dataset) -> Result<Arc<dyn WeatherFeed>> {
    if let (false, Some(key)) = (cli.offline, &cli.api_key) {
        let feed = CwaFeed::new(cli.weather_url.clone(), key.clone(), cli.feed_timeout())?;
        return Ok(Arc::new(feed));
    }
    let snapshot = cli.data_dir.join(WEATHER_FILE);
    let feed: Arc<dyn WeatherFeed> = if snapshot.exists() {
        Arc::new(FileFeed::new(snapshot))
    } else if is_demo {
        Arc::new(StaticFeed(demo_readings(&dataset.stations)))
    } else {
        warn!("no weather key and no offline snapshot, rainfall disabled");
        Arc::new(NoFeed)
    };
    Ok(feed)
}

/// Walk region, district and venue so the selection is consistent
fn focus_venue(session: &mut Session, id: VenueId) -> Result<()> {
    let venue = session
        .catalog()
        .get(id)
        .ok_or_else(|| anyhow!("unknown venue {id}"))?;
    let (region, sub_region) = (venue.city.clone(), SubRegion::of(venue));
    session.handle(UserEvent::SelectRegion(region))?;
    session.handle(UserEvent::SelectSubRegion(sub_region))?;
    session.handle(UserEvent::SelectVenue(id))?;
    Ok(())
}

/// Reread the data directory into the shared source, then let the session
/// pick up the new version
fn reload(app: &mut App, cli: &Cli, source: &Source, is_demo: bool) {
    if !is_demo {
        let (dataset, report) = load_dataset(&cli.data_dir);
        source.inner().replace(dataset);
        app.message = Some(format!(
            "reloaded {} venues, {} hazards, {} stations",
            report.venues, report.hazards, report.stations
        ));
    }
    app.apply(UserEvent::Reload);
}

/// Handle mouse events for panning, zooming and selection
fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    // Always track mouse position for cursor marker
    app.set_mouse_pos(mouse.column, mouse.row);

    match mouse.kind {
        // Scroll wheel for zooming towards mouse position
        MouseEventKind::ScrollUp => app.zoom_in_at(mouse.column, mouse.row),
        MouseEventKind::ScrollDown => app.zoom_out_at(mouse.column, mouse.row),
        // Horizontal scroll for panning (trackpad two-finger swipe)
        MouseEventKind::ScrollLeft => app.pan(-15, 0),
        MouseEventKind::ScrollRight => app.pan(15, 0),
        // Drag pans, a press without drag selects
        MouseEventKind::Down(MouseButton::Left) => app.start_press(mouse.column, mouse.row),
        MouseEventKind::Drag(MouseButton::Left) => app.handle_drag(mouse.column, mouse.row),
        MouseEventKind::Up(MouseButton::Left) => app.end_press(mouse.column, mouse.row),
        _ => {}
    }
}

fn run(
    terminal: &mut DefaultTerminal,
    app: &mut App,
    cli: &Cli,
    source: &Source,
    is_demo: bool,
) -> Result<()> {
    loop {
        // Draw
        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle events with ~60fps target
        if event::poll(Duration::from_millis(16))? {
            match event::read()? {
                Event::Key(key) => {
                    // Only handle key press events (not release)
                    if key.kind == KeyEventKind::Press {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => app.quit(),

                            // Pan with hjkl or arrow keys
                            KeyCode::Left | KeyCode::Char('h') => app.pan(-10, 0),
                            KeyCode::Right | KeyCode::Char('l') => app.pan(10, 0),
                            KeyCode::Up | KeyCode::Char('k') => app.pan(0, -6),
                            KeyCode::Down | KeyCode::Char('j') => app.pan(0, 6),

                            // Zoom
                            KeyCode::Char('+') | KeyCode::Char('=') => app.zoom_in(),
                            KeyCode::Char('-') | KeyCode::Char('_') => app.zoom_out(),

                            // Navigation
                            KeyCode::Char(']') => app.cycle_region(1),
                            KeyCode::Char('[') => app.cycle_region(-1),
                            KeyCode::Char('}') => app.cycle_sub_region(1),
                            KeyCode::Char('{') => app.cycle_sub_region(-1),
                            KeyCode::Char('n') => app.cycle_venue(1),
                            KeyCode::Char('p') => app.cycle_venue(-1),
                            KeyCode::Char('o') | KeyCode::Char('0') => app.overview(),

                            // Layer toggles
                            KeyCode::Char(c @ '1'..='6') => {
                                app.toggle_layer(c as usize - '1' as usize);
                            }
                            KeyCode::Char('a') => app.set_all_layers(true),
                            KeyCode::Char('A') => app.set_all_layers(false),

                            KeyCode::Char('R') => reload(app, cli, source, is_demo),

                            _ => {}
                        }
                    }
                }
                Event::Mouse(mouse) => {
                    handle_mouse(app, mouse);
                }
                Event::Resize(width, height) => {
                    app.resize(width, height);
                }
                _ => {}
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
