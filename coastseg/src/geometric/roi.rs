use anyhow::{Context, Result};
use geo::{Area, Geometry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::collect::settings::{deserialize_bool, Settings};
use crate::commons::errors::CoastsegError;
use crate::geo_core::{get_epsg_from_geometry, Crs};
use crate::geometric::frame::GeoFrame;

/// Per-ROI download settings, written once the ROI imagery is downloaded
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiSettings {
    pub dates: Vec<String>,
    pub sat_list: Vec<String>,
    pub roi_id: String,
    pub polygon: Vec<Vec<[f64; 2]>>,
    pub landsat_collection: String,
    pub sitename: String,
    pub filepath: String,
    #[serde(rename = "include_T2", deserialize_with = "deserialize_bool")]
    pub include_t2: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// ROI id -> settings
pub type RoiSettingsMap = BTreeMap<String, RoiSettings>;

/// Area in km² of the first ROI, measured in the UTM zone of its centroid
pub fn get_roi_area(frame: &GeoFrame) -> Result<f64> {
    let first = frame
        .first_geometry()
        .ok_or_else(|| CoastsegError::EmptyFrame("ROI frame".into()))?;
    let epsg = get_epsg_from_geometry(first)?;
    let projected = frame
        .to_crs(Crs::new(epsg))
        .context("Failed to project the ROI to its UTM zone")?;
    let area = projected
        .first_geometry()
        .map(|geometry| geometry.unsigned_area())
        .unwrap_or_default();
    Ok(area / 1_000_000.0)
}

/// Rows whose `id` equals `roi_id`, compared as text
pub fn extract_roi_by_id(frame: &GeoFrame, roi_id: &str) -> GeoFrame {
    frame.filter(|row| row.get_key("id").as_deref() == Some(roi_id))
}

/// Exterior rings of a (multi)polygon as `[x, y]` lists
fn exterior_rings(geometry: &Geometry<f64>) -> Result<Vec<Vec<[f64; 2]>>> {
    let ring = |polygon: &geo::Polygon<f64>| -> Vec<[f64; 2]> {
        polygon.exterior().coords().map(|c| [c.x, c.y]).collect()
    };
    match geometry {
        Geometry::Polygon(polygon) => Ok(vec![ring(polygon)]),
        Geometry::MultiPolygon(multi) => Ok(multi.0.iter().map(ring).collect()),
        Geometry::Rect(rect) => Ok(vec![ring(&rect.to_polygon())]),
        _ => anyhow::bail!("ROI geometry must be a polygon"),
    }
}

/// Settings for every ROI of the selected layer, keyed by ROI id
pub fn create_roi_settings(
    settings: &Settings,
    selected_layer: &GeoFrame,
    filepath: &str,
    date_str: &str,
) -> Result<RoiSettingsMap> {
    let mut roi_settings = RoiSettingsMap::new();
    for row in selected_layer.iter() {
        let roi_id = row
            .get_key("id")
            .ok_or_else(|| CoastsegError::MissingColumn("id".into()))?;
        let geometry = row
            .geometry
            .as_ref()
            .with_context(|| format!("ROI {} has no geometry", roi_id))?;
        let polygon =
            exterior_rings(geometry).with_context(|| format!("Invalid geometry for ROI {}", roi_id))?;

        let entry = RoiSettings {
            dates: settings.dates.clone(),
            sat_list: settings.sat_list.clone(),
            roi_id: roi_id.clone(),
            polygon,
            landsat_collection: settings.landsat_collection.clone(),
            sitename: format!("ID_{}_datetime{}", roi_id, date_str),
            filepath: filepath.to_string(),
            include_t2: settings.include_t2,
            extra: Map::new(),
        };
        roi_settings.insert(roi_id, entry);
    }
    log::debug!("Created settings for {} ROIs", roi_settings.len());
    Ok(roi_settings)
}

/// True when every listed ROI has settings and its filepath exists on disk
pub fn do_rois_filepaths_exist(roi_settings: &RoiSettingsMap, roi_ids: &[String]) -> bool {
    roi_ids.iter().all(|roi_id| {
        roi_settings
            .get(roi_id)
            .map(|settings| !settings.filepath.is_empty() && Path::new(&settings.filepath).exists())
            .unwrap_or(false)
    })
}

/// True when every listed ROI has a non-empty sitename
pub fn do_rois_have_sitenames(roi_settings: &RoiSettingsMap, roi_ids: &[String]) -> bool {
    roi_ids.iter().all(|roi_id| {
        roi_settings
            .get(roi_id)
            .map(|settings| !settings.sitename.is_empty())
            .unwrap_or(false)
    })
}

/// ROIs count as downloaded once their settings carry sitenames.
/// Without ids every ROI in the settings is checked.
pub fn were_rois_downloaded(
    roi_settings: Option<&RoiSettingsMap>,
    roi_ids: Option<&[String]>,
) -> bool {
    let roi_settings = match roi_settings {
        Some(settings) if !settings.is_empty() => settings,
        _ => return false,
    };
    match roi_ids {
        Some(ids) => do_rois_have_sitenames(roi_settings, ids),
        None => {
            let ids: Vec<String> = roi_settings.keys().cloned().collect();
            do_rois_have_sitenames(roi_settings, &ids)
        }
    }
}
