use anyhow::{Context, Result};
use log::{debug, warn};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::collect::files::{read_json_file, write_json_file};
use crate::collect::global_variables::{MAX_ROI_AREA_M2, ROI_AREA_JSON, SATELLITES, SETTINGS_JSON};
use crate::commons::dates::parse_datetime;
use crate::commons::errors::CoastsegError;

/// Keys shown by "view settings", in display order
pub const SUMMARY_KEYS: [&str; 14] = [
    "sat_list",
    "dates",
    "landsat_collection",
    "cloud_thresh",
    "dist_clouds",
    "output_epsg",
    "save_figure",
    "min_beach_area",
    "min_length_sl",
    "cloud_mask_issue",
    "sand_color",
    "pan_off",
    "max_dist_ref",
    "along_dist",
];

pub const SAND_COLORS: [&str; 4] = ["default", "latest", "dark", "bright"];

/// Booleans as written by either side: `true`, `"True"`, `"false"`, `"False"`
pub fn deserialize_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Text(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(value) => Ok(value),
        BoolOrString::Text(text) => match text.trim().to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(D::Error::custom(format!("expected a boolean, got '{}'", other))),
        },
    }
}

/// Download and extraction settings chosen in the settings panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sat_list: Vec<String>,
    pub dates: Vec<String>,
    pub landsat_collection: String,
    #[serde(rename = "include_T2", deserialize_with = "deserialize_bool")]
    pub include_t2: bool,
    /// Fraction of cloud cover above which an image is skipped
    pub cloud_thresh: f64,
    /// Distance to clouds (m) within which shoreline points are dropped
    pub dist_clouds: u32,
    pub output_epsg: u32,
    #[serde(deserialize_with = "deserialize_bool")]
    pub save_figure: bool,
    /// m²
    pub min_beach_area: u32,
    /// m
    pub min_length_sl: u32,
    #[serde(deserialize_with = "deserialize_bool")]
    pub cloud_mask_issue: bool,
    pub sand_color: String,
    #[serde(deserialize_with = "deserialize_bool")]
    pub pan_off: bool,
    /// Maximum distance (m) from the reference shoreline
    pub max_dist_ref: u32,
    /// Alongshore distance (m) used to intersect transects
    pub along_dist: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sat_list: vec!["L8".to_string()],
            dates: vec!["2018-12-01".to_string(), "2019-03-01".to_string()],
            landsat_collection: "C02".to_string(),
            include_t2: false,
            cloud_thresh: 0.5,
            dist_clouds: 300,
            output_epsg: 4326,
            save_figure: true,
            min_beach_area: 4500,
            min_length_sl: 500,
            cloud_mask_issue: false,
            sand_color: "default".to_string(),
            pan_off: false,
            max_dist_ref: 100,
            along_dist: 25,
            extra: Map::new(),
        }
    }
}

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + fmt::Display,
{
    if value < min || value > max {
        return Err(CoastsegError::InvalidInput(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        ))
        .into());
    }
    Ok(())
}

impl Settings {
    /// Enforce the bounds of the settings widgets
    pub fn validate(&self) -> Result<()> {
        if self.sat_list.is_empty() {
            return Err(
                CoastsegError::InvalidInput("Must select at least one satellite first".into()).into(),
            );
        }
        if let Some(unknown) = self.sat_list.iter().find(|sat| !SATELLITES.contains(&sat.as_str())) {
            return Err(CoastsegError::InvalidInput(format!("Unknown satellite {}", unknown)).into());
        }

        if self.dates.len() != 2 {
            return Err(CoastsegError::InvalidInput(
                "dates must hold a start and an end date".into(),
            )
            .into());
        }
        let start = parse_datetime(&self.dates[0])
            .ok_or_else(|| CoastsegError::InvalidInput(format!("Invalid date {}", self.dates[0])))?;
        let end = parse_datetime(&self.dates[1])
            .ok_or_else(|| CoastsegError::InvalidInput(format!("Invalid date {}", self.dates[1])))?;
        if start >= end {
            return Err(CoastsegError::InvalidInput(format!(
                "Start date {} must be before end date {}",
                self.dates[0], self.dates[1]
            ))
            .into());
        }

        check_range("cloud_thresh", self.cloud_thresh, 0.0, 1.0)?;
        check_range("dist_clouds", self.dist_clouds, 100, 1000)?;
        check_range("max_dist_ref", self.max_dist_ref, 100, 500)?;
        check_range("along_dist", self.along_dist, 10, 100)?;
        check_range("min_beach_area", self.min_beach_area, 1000, 10000)?;
        check_range("min_length_sl", self.min_length_sl, 200, 1000)?;

        if !SAND_COLORS.contains(&self.sand_color.as_str()) {
            return Err(CoastsegError::InvalidInput(format!(
                "sand_color must be one of {:?}, got {}",
                SAND_COLORS, self.sand_color
            ))
            .into());
        }
        Ok(())
    }

    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).context("Failed to serialize settings")? {
            Value::Object(map) => Ok(map),
            _ => anyhow::bail!("Settings did not serialize to an object"),
        }
    }

    /// Text shown by "view settings"
    pub fn summary(&self) -> Result<String> {
        Ok(settings_summary(&self.to_map()?))
    }

    /// Overwrite the fields set in `update`
    pub fn merge(&mut self, update: SettingsUpdate) {
        if let Some(sat_list) = update.sat_list {
            self.sat_list = sat_list;
        }
        if let Some(dates) = update.dates {
            self.dates = dates;
        }
        if let Some(v) = update.cloud_thresh {
            self.cloud_thresh = v;
        }
        if let Some(v) = update.dist_clouds {
            self.dist_clouds = v;
        }
        if let Some(v) = update.output_epsg {
            self.output_epsg = v;
        }
        if let Some(v) = update.save_figure {
            self.save_figure = v;
        }
        if let Some(v) = update.min_beach_area {
            self.min_beach_area = v;
        }
        if let Some(v) = update.min_length_sl {
            self.min_length_sl = v;
        }
        if let Some(v) = update.cloud_mask_issue {
            self.cloud_mask_issue = v;
        }
        if let Some(v) = update.sand_color {
            self.sand_color = v;
        }
        if let Some(v) = update.pan_off {
            self.pan_off = v;
        }
        if let Some(v) = update.max_dist_ref {
            self.max_dist_ref = v;
        }
        if let Some(v) = update.along_dist {
            self.along_dist = v;
        }
    }
}

/// "key: value" lines for the summary keys, `unknown` when a key is absent
pub fn settings_summary(values: &Map<String, Value>) -> String {
    SUMMARY_KEYS
        .iter()
        .map(|key| {
            let value = match values.get(*key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "unknown".to_string(),
                Some(other) => other.to_string(),
            };
            format!("{}: {}", key, value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Partial settings coming from the settings panel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub sat_list: Option<Vec<String>>,
    pub dates: Option<Vec<String>>,
    pub cloud_thresh: Option<f64>,
    pub dist_clouds: Option<u32>,
    pub output_epsg: Option<u32>,
    pub save_figure: Option<bool>,
    pub min_beach_area: Option<u32>,
    pub min_length_sl: Option<u32>,
    pub cloud_mask_issue: Option<bool>,
    pub sand_color: Option<String>,
    pub pan_off: Option<bool>,
    pub max_dist_ref: Option<u32>,
    pub along_dist: Option<u32>,
    pub roi_area: Option<RoiAreaLimits>,
}

/// Units of the ROI area sliders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaUnits {
    #[default]
    M2,
    Km2,
}

impl FromStr for AreaUnits {
    type Err = CoastsegError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m2" | "m²" => Ok(AreaUnits::M2),
            "km2" | "km²" => Ok(AreaUnits::Km2),
            other => Err(CoastsegError::InvalidInput(format!("Unknown area unit {}", other))),
        }
    }
}

/// Sizes of the small and large ROIs generated along a shoreline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiAreaLimits {
    pub sm_area: f64,
    pub lg_area: f64,
    pub units: AreaUnits,
}

impl Default for RoiAreaLimits {
    fn default() -> Self {
        RoiAreaLimits {
            sm_area: 1_500_000.0,
            lg_area: 2_200_000.0,
            units: AreaUnits::M2,
        }
    }
}

impl RoiAreaLimits {
    /// (small, large) in m²
    pub fn in_square_meters(&self) -> (f64, f64) {
        let factor = match self.units {
            AreaUnits::M2 => 1.0,
            AreaUnits::Km2 => 1_000_000.0,
        };
        (self.sm_area * factor, self.lg_area * factor)
    }

    pub fn validate(&self) -> Result<()> {
        let (sm, lg) = self.in_square_meters();
        check_range("sm_area (m²)", sm, 0.0, MAX_ROI_AREA_M2)?;
        check_range("lg_area (m²)", lg, 0.0, MAX_ROI_AREA_M2)?;
        Ok(())
    }
}

/// Settings kept between runs in a working directory
#[derive(Debug, Clone)]
pub struct SessionSettings {
    dir: PathBuf,
}

impl SessionSettings {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        SessionSettings {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_JSON)
    }

    pub fn roi_area_path(&self) -> PathBuf {
        self.dir.join(ROI_AREA_JSON)
    }

    /// Stored settings, or the defaults when nothing was saved yet
    pub fn load(&self) -> Result<Settings> {
        read_json_or_default(&self.settings_path())
    }

    pub fn load_roi_area(&self) -> Result<RoiAreaLimits> {
        read_json_or_default(&self.roi_area_path())
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        write_json_file(&self.settings_path(), settings)
    }

    /// Merge `update` into the stored settings, validate and persist them
    pub fn save_settings(&self, update: SettingsUpdate) -> Result<Settings> {
        let mut settings = self.load()?;
        let roi_area = update.roi_area;
        settings.merge(update);
        settings.validate()?;
        if let Some(roi_area) = &roi_area {
            roi_area.validate()?;
        }
        self.save(&settings)?;
        if let Some(roi_area) = roi_area {
            write_json_file(&self.roi_area_path(), &roi_area)?;
        }
        Ok(settings)
    }
}

fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: Default + for<'de> Deserialize<'de>,
{
    if !path.exists() {
        debug!("{} not found, using defaults", path.display());
        return Ok(T::default());
    }
    read_json_file(path)
}

fn find_nested<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|child| find_nested(child, key))),
        _ => None,
    }
}

/// Read a settings JSON file and keep only `keys`.
/// Each key is looked up at the top level first, then in nested objects.
/// A missing file yields an empty map; empty `keys` return everything.
pub fn load_settings(path: Option<&Path>, keys: &[&str]) -> Result<Map<String, Value>> {
    let path = match path {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => return Ok(Map::new()),
    };
    if !path.exists() {
        warn!("Settings file {} does not exist", path.display());
        return Ok(Map::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let Value::Object(top) = document else {
        return Err(CoastsegError::InvalidInput(format!(
            "{} does not contain a JSON object",
            path.display()
        ))
        .into());
    };
    if keys.is_empty() {
        return Ok(top);
    }

    let root = Value::Object(top);
    let mut selected = Map::new();
    for key in keys {
        if let Some(value) = find_nested(&root, key) {
            selected.insert(key.to_string(), value.clone());
        }
    }
    Ok(selected)
}
