mod basemap;
mod geometry;
mod projection;
mod renderer;

pub use basemap::Basemap;
pub use projection::Viewport;
pub use renderer::{MapFrame, MapRenderer};
