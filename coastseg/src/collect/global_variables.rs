pub const TEMP_PATH: &str = "./coastseg_workspace";

/// Session state lives in `<workspace>/session`
pub const SESSION_DIR: &str = "session";

pub const CONFIG_JSON: &str = "config.json";
pub const CONFIG_GDF: &str = "config_gdf.geojson";
pub const SETTINGS_JSON: &str = "settings.json";
pub const ROI_SETTINGS_JSON: &str = "roi_settings.json";
pub const ROI_AREA_JSON: &str = "roi_area.json";

pub const EXTRACTED_SHORELINES_DICT: &str = "extracted_shorelines_dict.json";
pub const EXTRACTED_SHORELINES_POINTS: &str = "extracted_shorelines_points.geojson";
pub const EXTRACTED_SHORELINES_LINES: &str = "extracted_shorelines_lines.geojson";

/// Satellites offered for download, in the order the UI lists them
pub const SATELLITES: [&str; 5] = ["L5", "L7", "L8", "L9", "S2"];

/// Ground resolution of the RGB JPEGs in metres per pixel
pub const PIXEL_SIZE_PER_SATELLITE: [(&str, f64); 5] = [
    ("L5", 15.0),
    ("L7", 15.0),
    ("L8", 15.0),
    ("L9", 15.0),
    ("S2", 10.0),
];

/// A downloaded image is partial when its footprint falls outside
/// [0.6, 1.5] times the ROI area
pub const MIN_AREA_FACTOR: f64 = 0.6;
pub const MAX_AREA_FACTOR: f64 = 1.5;

/// Largest ROI the sliders allow, in m²
pub const MAX_ROI_AREA_M2: f64 = 980_000_000.0;

pub fn pixel_size(satellite: &str) -> Option<f64> {
    PIXEL_SIZE_PER_SATELLITE
        .iter()
        .find(|(name, _)| *name == satellite)
        .map(|(_, size)| *size)
}
