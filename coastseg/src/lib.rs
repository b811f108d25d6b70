pub mod collect;
pub mod commons;
pub mod geo_core;
pub mod geometric;
pub mod ui;

pub use commons::errors::CoastsegError;
pub use geo_core::{Crs, GeoCore};
pub use geometric::frame::GeoFrame;
