use anyhow::{Context, Result};
use chrono::Utc;
use geo::BoundingRect;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::collect::files::{config_to_file, read_json_file, write_json_file, ConfigOutput};
use crate::collect::global_variables::{ROI_SETTINGS_JSON, SESSION_DIR};
use crate::collect::settings::{RoiAreaLimits, SessionSettings, Settings, SettingsUpdate};
use crate::commons::errors::CoastsegError;
use crate::geo_core::{get_most_accurate_epsg, BoundingBox, Crs, GeoCore};
use crate::geometric::config::{
    create_config_gdf, create_json_config, load_configs, ConfigLayers,
};
use crate::geometric::frame::GeoFrame;
use crate::geometric::imagery::filter_partial_images;
use crate::geometric::preprocess::{load_feature_from_file, save_feature_to_file, FeatureKind};
use crate::geometric::roi::{
    create_roi_settings, extract_roi_by_id, get_roi_area, were_rois_downloaded, RoiSettingsMap,
};

/// Map state: settings, feature layers and ROI settings, kept in `<workspace>/session`
#[derive(Debug)]
pub struct Session {
    workspace: PathBuf,
    store: SessionSettings,
    pub geo_core: GeoCore,
    pub settings: Settings,
    pub roi_area: RoiAreaLimits,
    pub roi_settings: RoiSettingsMap,
    layers: BTreeMap<FeatureKind, GeoFrame>,
}

impl Session {
    /// Open the session stored in `workspace`, or start an empty one
    pub fn open<P: AsRef<Path>>(workspace: P) -> Result<Self> {
        let workspace = workspace.as_ref().to_path_buf();
        let session_dir = workspace.join(SESSION_DIR);
        let store = SessionSettings::new(&session_dir);
        let settings = store.load()?;
        let roi_area = store.load_roi_area()?;

        let roi_settings_path = session_dir.join(ROI_SETTINGS_JSON);
        let roi_settings = if roi_settings_path.exists() {
            read_json_file(&roi_settings_path)?
        } else {
            RoiSettingsMap::new()
        };

        let mut layers = BTreeMap::new();
        for kind in FeatureKind::ALL {
            let path = session_dir.join(format!("{}.geojson", kind.file_stem()));
            if path.exists() {
                layers.insert(kind, GeoFrame::read_file(&path)?);
            }
        }

        let mut geo_core = GeoCore::new(Crs::new(settings.output_epsg));
        geo_core.set_output_path(Some(workspace.clone()));

        let mut session = Session {
            workspace,
            store,
            geo_core,
            settings,
            roi_area,
            roi_settings,
            layers,
        };
        session.refresh_bbox();
        debug!("Opened session in {}", session.session_dir().display());
        Ok(session)
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn session_dir(&self) -> PathBuf {
        self.workspace.join(SESSION_DIR)
    }

    pub fn feature(&self, kind: FeatureKind) -> Option<&GeoFrame> {
        self.layers.get(&kind)
    }

    pub fn set_feature(&mut self, kind: FeatureKind, frame: GeoFrame) {
        self.layers.insert(kind, frame);
        if kind == FeatureKind::Bbox {
            self.refresh_bbox();
        }
    }

    pub fn remove_feature(&mut self, kind: FeatureKind) -> Option<GeoFrame> {
        let removed = self.layers.remove(&kind);
        if kind == FeatureKind::Rois {
            self.roi_settings.clear();
        }
        if kind == FeatureKind::Bbox {
            self.refresh_bbox();
        }
        removed
    }

    pub fn remove_all(&mut self) {
        self.layers.clear();
        self.roi_settings.clear();
        self.refresh_bbox();
    }

    fn refresh_bbox(&mut self) {
        let bbox = self
            .layers
            .get(&FeatureKind::Bbox)
            .and_then(|frame| frame.first_geometry())
            .and_then(|geometry| geometry.bounding_rect())
            .map(BoundingBox::from_rect);
        self.geo_core.set_bbox(bbox);
    }

    pub fn config_layers(&self) -> ConfigLayers<'_> {
        ConfigLayers {
            rois: self.feature(FeatureKind::Rois),
            shorelines: self.feature(FeatureKind::Shoreline),
            transects: self.feature(FeatureKind::Transects),
            bbox: self.feature(FeatureKind::Bbox),
        }
    }

    /// Merge the settings panel values into the stored settings
    pub fn save_settings(&mut self, update: SettingsUpdate) -> Result<&Settings> {
        let roi_area = update.roi_area;
        self.settings = self.store.save_settings(update)?;
        if let Some(roi_area) = roi_area {
            self.roi_area = roi_area;
        }
        self.geo_core.set_epsg(Crs::new(self.settings.output_epsg));
        Ok(&self.settings)
    }

    pub fn load_feature(&mut self, kind: FeatureKind, path: &Path) -> Result<usize> {
        let frame = load_feature_from_file(kind, path)?;
        let count = frame.len();
        if kind == FeatureKind::Rois {
            self.roi_settings.clear();
        }
        self.set_feature(kind, frame);
        Ok(count)
    }

    pub fn save_feature(&self, kind: FeatureKind, dir: Option<&Path>) -> Result<PathBuf> {
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| self.workspace.clone());
        save_feature_to_file(self.feature(kind), kind, &dir)
    }

    fn rois(&self) -> Result<&GeoFrame> {
        self.feature(FeatureKind::Rois)
            .filter(|rois| !rois.is_empty())
            .ok_or_else(|| {
                CoastsegError::InvalidInput("ROIs must be loaded on the map first".into()).into()
            })
    }

    fn roi(&self, roi_id: Option<&str>) -> Result<GeoFrame> {
        let rois = self.rois()?;
        match roi_id {
            Some(roi_id) => {
                let roi = extract_roi_by_id(rois, roi_id);
                if roi.is_empty() {
                    return Err(CoastsegError::InvalidInput(format!("No ROI with id {}", roi_id)).into());
                }
                Ok(roi)
            }
            None => Ok(rois.clone()),
        }
    }

    /// Area (km²) of one ROI, or of the first one
    pub fn roi_area_km2(&self, roi_id: Option<&str>) -> Result<f64> {
        get_roi_area(&self.roi(roi_id)?)
    }

    /// CRS of the saved config: the UTM zone of the bounding box when the output CRS is WGS 84
    fn config_crs(&self) -> Result<Option<Crs>> {
        match self.feature(FeatureKind::Bbox).filter(|bbox| !bbox.is_empty()) {
            Some(bbox) => Ok(Some(Crs::new(get_most_accurate_epsg(self.geo_core.get_epsg(), bbox)?))),
            None => Ok(None),
        }
    }

    /// Write `config_gdf.geojson` and `config.json` into `dir` (default: the workspace)
    pub fn save_config(&self, dir: Option<&Path>) -> Result<(PathBuf, PathBuf)> {
        let rois = self.rois()?;
        let dir = dir.map(Path::to_path_buf).unwrap_or_else(|| self.workspace.clone());

        let roi_settings = if were_rois_downloaded(Some(&self.roi_settings), None) {
            self.roi_settings.clone()
        } else {
            let date_str = Utc::now().format("%m-%d-%y__%I_%M_%S").to_string();
            let data_dir = self.workspace.join("data");
            create_roi_settings(&self.settings, rois, &data_dir.to_string_lossy(), &date_str)?
        };

        let config_gdf = create_config_gdf(&self.config_layers(), self.config_crs()?)?;
        let json_config = create_json_config(&roi_settings, &self.settings)?;
        let gdf_path = config_to_file(&ConfigOutput::Frame(config_gdf), &dir)?;
        let json_path = config_to_file(&ConfigOutput::Json(json_config), &dir)?;
        Ok((gdf_path, json_path))
    }

    /// Replace the map state with a saved config pair
    pub fn load_configs(&mut self, path: &Path) -> Result<usize> {
        let loaded = load_configs(path)?;
        self.layers.clear();
        for kind in FeatureKind::ALL {
            let frame = loaded.frame(kind);
            if !frame.is_empty() {
                let frame = frame
                    .to_crs(Crs::WGS84)
                    .with_context(|| format!("Failed to project {} to the map CRS", kind))?;
                self.layers.insert(kind, frame);
            }
        }
        self.settings = loaded.settings;
        self.roi_settings = loaded.roi_settings;
        self.geo_core.set_epsg(Crs::new(self.settings.output_epsg));
        self.refresh_bbox();
        Ok(self.feature(FeatureKind::Rois).map(GeoFrame::len).unwrap_or(0))
    }

    pub fn filter_images(&self, directory: &Path, roi_id: Option<&str>) -> Result<Vec<PathBuf>> {
        filter_partial_images(&self.roi(roi_id)?, directory)
    }

    /// Write the session back to `<workspace>/session`
    pub fn persist(&self) -> Result<()> {
        let session_dir = self.session_dir();
        fs::create_dir_all(&session_dir)
            .with_context(|| format!("Failed to create {}", session_dir.display()))?;
        self.store.save(&self.settings)?;
        write_json_file(&self.store.roi_area_path(), &self.roi_area)?;
        write_json_file(&session_dir.join(ROI_SETTINGS_JSON), &self.roi_settings)?;

        for kind in FeatureKind::ALL {
            let path = session_dir.join(format!("{}.geojson", kind.file_stem()));
            match self.layers.get(&kind) {
                Some(frame) => frame.to_file(&path)?,
                None if path.exists() => fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?,
                None => {}
            }
        }
        info!("Session saved to {}", session_dir.display());
        Ok(())
    }
}
