//! Venue risk explorer: night markets, traffic accidents and rainfall on one
//! map, from a national overview down to a single venue.
//!
//! The library holds the spatial engine, the navigation state machine and the
//! layer composer. Rendering lives in the binary and only ever sees a
//! [`compose::MapDescriptor`].

pub mod click;
pub mod compose;
pub mod config;
pub mod data;
pub mod error;
pub mod geo;
pub mod model;
pub mod nav;
pub mod session;
pub mod source;
pub mod spatial;
pub mod weather;

pub use compose::{compose, LayerData, LayerInputs, LayerSpec, MapDescriptor};
pub use config::ViewSettings;
pub use nav::{LayerKind, NavState, Navigator, SubRegion, VenueCatalog, VenueChoice};
pub use session::{Session, UserEvent, VenueInsight};
