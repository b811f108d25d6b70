use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use std::path::Path;

use crate::collect::files::read_json_file;
use crate::collect::global_variables::{CONFIG_GDF, CONFIG_JSON};
use crate::collect::settings::Settings;
use crate::commons::errors::CoastsegError;
use crate::geo_core::{Crs, GeoCore};
use crate::geometric::frame::GeoFrame;
use crate::geometric::preprocess::FeatureKind;
use crate::geometric::roi::{RoiSettings, RoiSettingsMap};

/// Put a frame into `crs`: reproject it, or only label it when it has no CRS.
/// A missing or empty frame becomes an empty frame in `crs`.
pub fn set_crs_or_initialize_empty(frame: Option<&GeoFrame>, crs: Crs) -> Result<GeoFrame> {
    GeoCore::validate_crs(crs)?;
    match frame {
        None => Ok(GeoFrame::empty(crs)),
        Some(frame) if frame.is_empty() => Ok(GeoFrame::empty(crs)),
        Some(frame) if frame.crs.is_none() => Ok(frame.clone().set_crs(crs)),
        Some(frame) => frame.to_crs(crs),
    }
}

/// Layers that go into `config_gdf.geojson`
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLayers<'a> {
    pub rois: Option<&'a GeoFrame>,
    pub shorelines: Option<&'a GeoFrame>,
    pub transects: Option<&'a GeoFrame>,
    pub bbox: Option<&'a GeoFrame>,
}

impl<'a> ConfigLayers<'a> {
    pub fn get(&self, kind: FeatureKind) -> Option<&'a GeoFrame> {
        match kind {
            FeatureKind::Rois => self.rois,
            FeatureKind::Shoreline => self.shorelines,
            FeatureKind::Transects => self.transects,
            FeatureKind::Bbox => self.bbox,
        }
    }
}

/// Concatenate the non-empty layers into one frame tagged by a `type` column.
/// The CRS is `epsg`, or the CRS of the ROIs when no code is given.
pub fn create_config_gdf(layers: &ConfigLayers<'_>, epsg: Option<Crs>) -> Result<GeoFrame> {
    let crs = match (epsg, layers.rois) {
        (Some(crs), _) => crs,
        (None, Some(rois)) if !rois.is_empty() => rois
            .crs
            .ok_or_else(|| CoastsegError::InvalidCrs("the ROIs have no CRS".into()))?,
        _ => {
            return Err(CoastsegError::InvalidInput(
                "Cannot create a config without ROIs or an EPSG code".into(),
            )
            .into())
        }
    };

    let mut parts = Vec::new();
    for kind in FeatureKind::ALL {
        let Some(frame) = layers.get(kind).filter(|frame| !frame.is_empty()) else {
            continue;
        };
        let frame = set_crs_or_initialize_empty(Some(frame), crs)
            .with_context(|| format!("Failed to project {} to {}", kind, crs))?;
        parts.push(frame.with_column("type", json!(kind.type_tag())));
    }
    let config = GeoFrame::concat(parts, Some(crs));
    log::debug!("Config frame has {} features in {}", config.len(), crs);
    Ok(config)
}

/// `{"roi_ids": [...], "settings": {...}, "<roi id>": {...}}`
pub fn create_json_config(roi_settings: &RoiSettingsMap, settings: &Settings) -> Result<Value> {
    let mut config = Map::new();
    config.insert(
        "roi_ids".to_string(),
        json!(roi_settings.keys().collect::<Vec<_>>()),
    );
    config.insert("settings".to_string(), Value::Object(settings.to_map()?));
    for (roi_id, roi) in roi_settings {
        let value = serde_json::to_value(roi)
            .with_context(|| format!("Failed to serialize settings of ROI {}", roi_id))?;
        config.insert(roi_id.clone(), value);
    }
    Ok(Value::Object(config))
}

/// A config pair read back from disk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedConfig {
    pub settings: Settings,
    pub roi_settings: RoiSettingsMap,
    pub rois: GeoFrame,
    pub shorelines: GeoFrame,
    pub transects: GeoFrame,
    pub bbox: GeoFrame,
}

impl LoadedConfig {
    pub fn frame(&self, kind: FeatureKind) -> &GeoFrame {
        match kind {
            FeatureKind::Rois => &self.rois,
            FeatureKind::Shoreline => &self.shorelines,
            FeatureKind::Transects => &self.transects,
            FeatureKind::Bbox => &self.bbox,
        }
    }
}

/// Read `config_gdf.geojson` and `config.json` from a directory, or from the
/// directory of one of the two files
pub fn load_configs(path: &Path) -> Result<LoadedConfig> {
    let dir = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or_else(|| Path::new("."))
    };

    let frame = GeoFrame::read_file(dir.join(CONFIG_GDF))?;
    let config: Map<String, Value> = read_json_file(&dir.join(CONFIG_JSON))?;

    let settings: Settings = match config.get("settings") {
        Some(value) => serde_json::from_value(value.clone()).context("Invalid settings in config.json")?,
        None => Settings::default(),
    };

    let roi_ids: Vec<String> = match config.get("roi_ids") {
        Some(value) => serde_json::from_value(value.clone()).context("Invalid roi_ids in config.json")?,
        None => Vec::new(),
    };
    let mut roi_settings = RoiSettingsMap::new();
    for roi_id in roi_ids {
        match config.get(&roi_id) {
            Some(Value::Object(entry)) if !entry.is_empty() => {
                let roi: RoiSettings = serde_json::from_value(Value::Object(entry.clone()))
                    .with_context(|| format!("Invalid settings for ROI {}", roi_id))?;
                roi_settings.insert(roi_id, roi);
            }
            _ => log::debug!("ROI {} has no saved settings", roi_id),
        }
    }

    let layer = |kind: FeatureKind| {
        frame
            .filter(|row| row.get_key("type").as_deref() == Some(kind.type_tag()))
            .drop_column("type")
    };

    let loaded = LoadedConfig {
        settings,
        roi_settings,
        rois: layer(FeatureKind::Rois),
        shorelines: layer(FeatureKind::Shoreline),
        transects: layer(FeatureKind::Transects),
        bbox: layer(FeatureKind::Bbox),
    };
    log::info!(
        "Loaded config from {} with {} ROIs",
        dir.display(),
        loaded.rois.len()
    );
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::files::{config_to_file, ConfigOutput};
    use crate::geometric::frame::Properties;
    use geo::{line_string, polygon};
    use tempfile::tempdir;

    fn roi_frame() -> GeoFrame {
        let mut props = Properties::new();
        props.insert("id".into(), json!("1"));
        let mut frame = GeoFrame::empty(Crs::WGS84);
        frame.push(
            Some(polygon![(x: -121.9, y: 36.6), (x: -121.8, y: 36.6), (x: -121.8, y: 36.7), (x: -121.9, y: 36.7)].into()),
            props,
        );
        frame
    }

    fn shoreline_frame() -> GeoFrame {
        let mut props = Properties::new();
        props.insert("id".into(), json!("s"));
        let mut frame = GeoFrame::empty(Crs::WGS84);
        frame.push(
            Some(line_string![(x: -121.88, y: 36.61), (x: -121.82, y: 36.69)].into()),
            props,
        );
        frame
    }

    #[test]
    fn test_set_crs_or_initialize_empty() {
        let empty = set_crs_or_initialize_empty(None, Crs::new(32610)).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.crs, Some(Crs::new(32610)));

        let unlabelled = GeoFrame::new(roi_frame().rows, None);
        let labelled = set_crs_or_initialize_empty(Some(&unlabelled), Crs::new(3857)).unwrap();
        assert_eq!(labelled.crs, Some(Crs::new(3857)));
        assert_eq!(labelled.rows, unlabelled.rows);

        let projected = set_crs_or_initialize_empty(Some(&roi_frame()), Crs::new(32610)).unwrap();
        assert_eq!(projected.crs, Some(Crs::new(32610)));
        assert_ne!(projected.rows, roi_frame().rows);

        assert!(set_crs_or_initialize_empty(Some(&roi_frame()), Crs::new(999999)).is_err());
    }

    #[test]
    fn test_create_config_gdf_valid_input() {
        let rois = roi_frame();
        let config = create_config_gdf(
            &ConfigLayers {
                rois: Some(&rois),
                ..ConfigLayers::default()
            },
            None,
        )
        .unwrap();
        assert_eq!(config.crs, Some(Crs::WGS84));
        assert_eq!(config.len(), 1);
        assert_eq!(config.rows[0].get_key("type"), Some("roi".to_string()));
    }

    #[test]
    fn test_create_config_gdf_all_layers() {
        let rois = roi_frame();
        let shorelines = shoreline_frame();
        let empty = GeoFrame::empty(Crs::WGS84);
        let config = create_config_gdf(
            &ConfigLayers {
                rois: Some(&rois),
                shorelines: Some(&shorelines),
                transects: Some(&empty),
                bbox: None,
            },
            Some(Crs::new(32610)),
        )
        .unwrap();
        assert_eq!(config.crs, Some(Crs::new(32610)));
        let types: Vec<_> = config.iter().filter_map(|row| row.get_key("type")).collect();
        assert_eq!(types, vec!["roi", "shoreline"]);
    }

    #[test]
    fn test_create_config_gdf_empty_rois_and_no_epsg() {
        let empty = GeoFrame::empty(Crs::WGS84);
        let layers = ConfigLayers {
            rois: Some(&empty),
            ..ConfigLayers::default()
        };
        let err = create_config_gdf(&layers, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoastsegError>(),
            Some(CoastsegError::InvalidInput(_))
        ));
        assert!(create_config_gdf(&ConfigLayers::default(), None).is_err());
    }

    #[test]
    fn test_create_config_gdf_empty_with_epsg() {
        let config = create_config_gdf(&ConfigLayers::default(), Some(Crs::new(3857))).unwrap();
        assert!(config.is_empty());
        assert_eq!(config.crs, Some(Crs::new(3857)));
    }

    #[test]
    fn test_create_json_config() {
        let mut roi_settings = RoiSettingsMap::new();
        for id in ["2", "1"] {
            roi_settings.insert(
                id.to_string(),
                RoiSettings {
                    roi_id: id.to_string(),
                    sitename: format!("ID_{}_datetime06-05-23__03_29_42", id),
                    ..RoiSettings::default()
                },
            );
        }
        let config = create_json_config(&roi_settings, &Settings::default()).unwrap();
        assert_eq!(config["roi_ids"], json!(["1", "2"]));
        assert_eq!(config["settings"]["sat_list"], json!(["L8"]));
        assert_eq!(config["1"]["roi_id"], json!("1"));
        assert_eq!(config["2"]["sitename"], json!("ID_2_datetime06-05-23__03_29_42"));
    }

    #[test]
    fn test_load_configs_round_trip() {
        let dir = tempdir().unwrap();
        let rois = roi_frame();
        let shorelines = shoreline_frame();
        let config_gdf = create_config_gdf(
            &ConfigLayers {
                rois: Some(&rois),
                shorelines: Some(&shorelines),
                ..ConfigLayers::default()
            },
            None,
        )
        .unwrap();
        let mut roi_settings = RoiSettingsMap::new();
        roi_settings.insert(
            "1".into(),
            RoiSettings {
                roi_id: "1".into(),
                sitename: "ID_1_datetime".into(),
                ..RoiSettings::default()
            },
        );
        let settings = Settings {
            sat_list: vec!["S2".into()],
            ..Settings::default()
        };
        let json_config = create_json_config(&roi_settings, &settings).unwrap();
        config_to_file(&ConfigOutput::Frame(config_gdf), dir.path()).unwrap();
        let json_path = config_to_file(&ConfigOutput::Json(json_config), dir.path()).unwrap();

        let loaded = load_configs(&json_path).unwrap();
        assert_eq!(loaded.settings, settings);
        assert_eq!(loaded.roi_settings, roi_settings);
        assert_eq!(loaded.rois, rois);
        assert_eq!(loaded.shorelines, shorelines);
        assert!(loaded.transects.is_empty());
        assert!(loaded.frame(FeatureKind::Bbox).is_empty());
    }

    #[test]
    fn test_load_configs_with_string_booleans() {
        let dir = tempdir().unwrap();
        let config_gdf = create_config_gdf(
            &ConfigLayers {
                rois: Some(&roi_frame()),
                ..ConfigLayers::default()
            },
            None,
        )
        .unwrap();
        config_to_file(&ConfigOutput::Frame(config_gdf), dir.path()).unwrap();
        let json_config = json!({
            "roi_ids": ["1"],
            "settings": {
                "sat_list": ["L8"],
                "dates": ["2018-12-01", "2019-03-01"],
                "pan_off": "False",
                "save_figure": "True",
                "cloud_mask_issue": "False"
            },
            "1": {"roi_id": "1", "sitename": "ID_1_datetime", "include_T2": "False"}
        });
        config_to_file(&ConfigOutput::Json(json_config), dir.path()).unwrap();

        let loaded = load_configs(dir.path()).unwrap();
        assert!(!loaded.settings.pan_off);
        assert!(loaded.settings.save_figure);
        assert!(!loaded.roi_settings["1"].include_t2);
        assert_eq!(loaded.rois.len(), 1);
    }

    #[test]
    fn test_load_configs_missing_files() {
        let dir = tempdir().unwrap();
        assert!(load_configs(dir.path()).is_err());
    }
}
