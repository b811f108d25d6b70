use anyhow::{Context, Result};
use geo::{BoundingRect, Centroid, Coord, Geometry, LineString, MapCoords, Point, Rect};
use proj::Proj;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::commons::errors::CoastsegError;
use crate::geometric::frame::GeoFrame;

/// Coordinate reference system identified by its EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(u32);

impl Crs {
    /// WGS 84 longitude/latitude, the CRS of the map and of plain GeoJSON
    pub const WGS84: Crs = Crs(4326);

    pub fn new(epsg: u32) -> Self {
        Crs(epsg)
    }

    pub fn epsg(&self) -> u32 {
        self.0
    }

    pub fn is_wgs84(&self) -> bool {
        self.0 == 4326
    }

    /// OGC URN written into the `crs` member of GeoJSON files
    pub fn urn(&self) -> String {
        if self.is_wgs84() {
            "urn:ogc:def:crs:OGC:1.3:CRS84".to_string()
        } else {
            format!("urn:ogc:def:crs:EPSG::{}", self.0)
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl From<u32> for Crs {
    fn from(epsg: u32) -> Self {
        Crs(epsg)
    }
}

impl FromStr for Crs {
    type Err = CoastsegError;

    /// Accepts `4326`, `EPSG:4326`, `epsg:4326`, `urn:ogc:def:crs:EPSG::4326`
    /// and the CRS84 URN
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        if lowered.ends_with("crs84") {
            return Ok(Crs::WGS84);
        }
        let code = lowered
            .rsplit(':')
            .next()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| CoastsegError::InvalidCrs(s.to_string()))?;
        if lowered.contains(':') && !lowered.contains("epsg") {
            return Err(CoastsegError::InvalidCrs(s.to_string()));
        }
        code.parse::<u32>()
            .map(Crs)
            .map_err(|_| CoastsegError::InvalidCrs(s.to_string()))
    }
}

/// Projection state shared by the session: output CRS, bounding box and output path
#[derive(Debug, Clone)]
pub struct GeoCore {
    pub epsg: Crs,
    pub bbox: Option<BoundingBox>,
    pub output_path: Option<PathBuf>,
}

impl Default for GeoCore {
    /// Map coordinates are WGS 84
    fn default() -> Self {
        GeoCore::new(Crs::WGS84)
    }
}

impl GeoCore {
    pub fn new(epsg: Crs) -> Self {
        GeoCore {
            epsg,
            bbox: None,
            output_path: None,
        }
    }

    pub fn get_epsg(&self) -> Crs {
        self.epsg
    }

    pub fn set_epsg(&mut self, epsg: Crs) {
        self.epsg = epsg;
    }

    pub fn get_bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    pub fn set_bbox(&mut self, bbox: Option<BoundingBox>) {
        self.bbox = bbox;
    }

    pub fn get_output_path(&self) -> Option<&PathBuf> {
        self.output_path.as_ref()
    }

    pub fn set_output_path(&mut self, output_path: Option<PathBuf>) {
        self.output_path = output_path;
    }

    /// Build a Proj transformation between two CRS
    pub fn transformer(from: Crs, to: Crs) -> Result<Proj> {
        Proj::new_known_crs(&from.to_string(), &to.to_string(), None)
            .map_err(|e| CoastsegError::InvalidCrs(format!("{} -> {}: {}", from, to, e)).into())
    }

    /// Fail unless PROJ knows the CRS
    pub fn validate_crs(crs: Crs) -> Result<()> {
        Proj::new(&crs.to_string())
            .map(|_| ())
            .map_err(|e| CoastsegError::InvalidCrs(format!("{}: {}", crs, e)).into())
    }

    /// Transform coordinates from one CRS to another
    pub fn transform_coords(from: Crs, to: Crs, x: f64, y: f64) -> Result<(f64, f64)> {
        let proj = Self::transformer(from, to)?;
        let result = proj
            .convert((x, y))
            .context("Failed to transform coordinates")?;
        Ok(result)
    }

    /// Transform a Point from one CRS to another
    pub fn transform_point(from: Crs, to: Crs, point: Point<f64>) -> Result<Point<f64>> {
        let (x, y) = Self::transform_coords(from, to, point.x(), point.y())?;
        Ok(Point::new(x, y))
    }

    /// Apply an existing transformation to every coordinate of a geometry
    pub fn transform_geometry(proj: &Proj, geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
        geometry
            .try_map_coords(|coord: Coord<f64>| {
                proj.convert((coord.x, coord.y))
                    .map(|(x, y)| Coord { x, y })
            })
            .context("Failed to reproject geometry")
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_rect(rect: Rect<f64>) -> Self {
        BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Transform bounding box to another CRS
    pub fn transform(&self, from: Crs, to: Crs) -> Result<Self> {
        let (min_x, min_y) = GeoCore::transform_coords(from, to, self.min_x, self.min_y)?;
        let (max_x, max_y) = GeoCore::transform_coords(from, to, self.max_x, self.max_y)?;

        Ok(BoundingBox::new(min_x, min_y, max_x, max_y))
    }
}

/// EPSG code of the WGS 84 / UTM zone containing a lon/lat position.
/// Northern hemisphere zones are 326xx, southern ones 327xx.
pub fn convert_wgs_to_utm(lon: f64, lat: f64) -> String {
    let zone = ((lon + 180.0) / 6.0).floor().rem_euclid(60.0) as u32 + 1;
    let prefix = if lat >= 0.0 { "326" } else { "327" };
    format!("{}{:02}", prefix, zone)
}

/// UTM EPSG code for the centroid of a geometry whose coordinates are read as lon/lat
pub fn get_epsg_from_geometry(geometry: &Geometry<f64>) -> Result<u32> {
    let centroid = geometry
        .centroid()
        .ok_or_else(|| CoastsegError::InvalidInput("cannot locate an empty geometry".into()))?;
    let code = convert_wgs_to_utm(centroid.x(), centroid.y());
    code.parse::<u32>()
        .with_context(|| format!("Invalid UTM EPSG code {}", code))
}

/// Replace WGS 84 by the UTM zone of the bounding box; any other CRS is kept as is
pub fn get_most_accurate_epsg(epsg: Crs, bbox: &GeoFrame) -> Result<u32> {
    if !epsg.is_wgs84() {
        return Ok(epsg.epsg());
    }
    let geometry = bbox
        .first_geometry()
        .ok_or_else(|| CoastsegError::EmptyFrame("bounding box".into()))?;
    get_epsg_from_geometry(geometry)
}

/// Center of the rectangle enclosing the coordinates
pub fn get_center_point(coords: &[(f64, f64)]) -> Result<(f64, f64)> {
    let line: LineString<f64> = coords.iter().copied().collect();
    let rect = line
        .bounding_rect()
        .ok_or_else(|| CoastsegError::InvalidInput("no coordinates given".into()))?;
    Ok(BoundingBox::from_rect(rect).center())
}
