use anyhow::{Context, Result};
use geo::Geometry;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::commons::errors::CoastsegError;
use crate::geo_core::Crs;
use crate::geometric::frame::GeoFrame;

/// Feature layers the map can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureKind {
    Rois,
    Shoreline,
    Transects,
    Bbox,
}

impl FeatureKind {
    /// Order in which layers are written to a config frame
    pub const ALL: [FeatureKind; 4] = [
        FeatureKind::Rois,
        FeatureKind::Shoreline,
        FeatureKind::Transects,
        FeatureKind::Bbox,
    ];

    /// Value of the `type` column in `config_gdf.geojson`
    pub fn type_tag(&self) -> &'static str {
        match self {
            FeatureKind::Rois => "roi",
            FeatureKind::Shoreline => "shoreline",
            FeatureKind::Transects => "transect",
            FeatureKind::Bbox => "bbox",
        }
    }

    /// File stem used when the layer is saved on its own
    pub fn file_stem(&self) -> &'static str {
        match self {
            FeatureKind::Rois => "rois",
            FeatureKind::Shoreline => "shoreline",
            FeatureKind::Transects => "transects",
            FeatureKind::Bbox => "bbox",
        }
    }

    pub fn columns_to_keep(&self) -> &'static [&'static str] {
        match self {
            FeatureKind::Rois => &["id", "geometry"],
            FeatureKind::Shoreline => &[
                "id",
                "geometry",
                "river_label",
                "ERODIBILITY",
                "CSU_ID",
                "turbid_label",
                "slope_label",
                "sinuosity_label",
                "TIDAL_RANGE",
                "MEAN_SIG_WAVEHEIGHT",
            ],
            FeatureKind::Transects => &[
                "id",
                "geometry",
                "slope",
                "distance",
                "feature_x",
                "feature_y",
                "nearest_x",
                "nearest_y",
            ],
            FeatureKind::Bbox => &["geometry"],
        }
    }

    /// The bounding box is the only layer without ids
    pub fn creates_ids(&self) -> bool {
        !matches!(self, FeatureKind::Bbox)
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FeatureKind::Rois => "ROIs",
            FeatureKind::Shoreline => "Shoreline",
            FeatureKind::Transects => "Transects",
            FeatureKind::Bbox => "Bounding Box",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for FeatureKind {
    type Err = CoastsegError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "roi" | "rois" => Ok(FeatureKind::Rois),
            "shoreline" | "shorelines" => Ok(FeatureKind::Shoreline),
            "transect" | "transects" => Ok(FeatureKind::Transects),
            "bbox" | "bounding box" => Ok(FeatureKind::Bbox),
            other => Err(CoastsegError::InvalidInput(format!(
                "Unknown feature type '{}'",
                other
            ))),
        }
    }
}

/// Drop Z values and split MultiLineStrings into LineStrings.
/// GeoFrame geometries are 2D, so only the split changes anything.
pub fn remove_z_coordinates(frame: GeoFrame) -> GeoFrame {
    if frame.is_empty() {
        return frame;
    }
    frame.explode_by(|geometry| matches!(geometry, Geometry::MultiLineString(_)))
}

/// Clean up a frame loaded from disk before it goes on the map
pub fn preprocess_geodataframe(
    frame: GeoFrame,
    columns_to_keep: Option<&[&str]>,
    create_ids: bool,
    output_crs: Option<Crs>,
) -> Result<GeoFrame> {
    if frame.is_empty() {
        return Ok(frame);
    }

    let mut frame = frame;
    if frame.has_column("ID") {
        frame = frame.rename_column("ID", "id");
    }

    if create_ids && !frame.has_column("id") {
        for (index, row) in frame.rows.iter_mut().enumerate() {
            row.properties
                .insert("id".to_string(), Value::String(index.to_string()));
        }
    }

    if let Some(columns) = columns_to_keep {
        frame = frame.select_columns(columns);
    }

    let frame = remove_z_coordinates(frame);

    match output_crs {
        Some(crs) => frame.to_crs(crs),
        None => Ok(frame),
    }
}

/// Read a feature layer from a GeoJSON file and prepare it for the map
pub fn load_feature_from_file(kind: FeatureKind, path: &Path) -> Result<GeoFrame> {
    let frame = GeoFrame::read_file(path)
        .with_context(|| format!("Failed to load {} from {}", kind, path.display()))?;
    let frame = preprocess_geodataframe(
        frame,
        Some(kind.columns_to_keep()),
        kind.creates_ids(),
        Some(Crs::WGS84),
    )?;
    log::info!("Loaded {} {} features from {}", frame.len(), kind, path.display());
    Ok(frame)
}

/// Write a feature layer to `<dir>/<stem>.geojson`
pub fn save_feature_to_file(frame: Option<&GeoFrame>, kind: FeatureKind, dir: &Path) -> Result<PathBuf> {
    let frame = match frame {
        Some(frame) if !frame.is_empty() => frame,
        _ => {
            return Err(CoastsegError::InvalidInput(format!(
                "{} must be loaded on the map first",
                kind
            ))
            .into())
        }
    };
    let path = dir.join(format!("{}.geojson", kind.file_stem()));
    frame.to_file(&path)?;
    log::info!("Saved {} to {}", kind, path.display());
    Ok(path)
}
