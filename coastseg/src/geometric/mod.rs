pub mod config;
pub mod frame;
pub mod imagery;
pub mod preprocess;
pub mod roi;
pub mod shorelines;
pub mod transects;
