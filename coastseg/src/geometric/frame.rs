use anyhow::{Context, Result};
use geo::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

use crate::commons::errors::CoastsegError;
use crate::geo_core::{Crs, GeoCore};

pub type Properties = Map<String, Value>;

/// One feature: an optional geometry and its attribute values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub geometry: Option<Geometry<f64>>,
    pub properties: Properties,
}

impl Row {
    pub fn new(geometry: Option<Geometry<f64>>, properties: Properties) -> Self {
        Row {
            geometry,
            properties,
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.properties.get(column).filter(|value| !value.is_null())
    }

    /// Attribute value as text, numbers included (`17` reads as `"17"`)
    pub fn get_key(&self, column: &str) -> Option<String> {
        self.get(column).and_then(value_to_key)
    }
}

/// Text form of a scalar attribute. Arrays, objects and nulls have none.
pub fn value_to_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Name of the geometry type, as shown in attribute tables
pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "LineString",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Polygon",
        Geometry::Triangle(_) => "Polygon",
    }
}

/// Geodataframe: a list of rows sharing one CRS
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoFrame {
    pub crs: Option<Crs>,
    pub rows: Vec<Row>,
}

impl GeoFrame {
    pub fn new(rows: Vec<Row>, crs: Option<Crs>) -> Self {
        GeoFrame { crs, rows }
    }

    /// Frame without rows in the given CRS
    pub fn empty(crs: Crs) -> Self {
        GeoFrame {
            crs: Some(crs),
            rows: Vec::new(),
        }
    }

    pub fn from_geometries(geometries: Vec<Geometry<f64>>, crs: Option<Crs>) -> Self {
        let rows = geometries
            .into_iter()
            .map(|geometry| Row::new(Some(geometry), Properties::new()))
            .collect();
        GeoFrame { crs, rows }
    }

    pub fn push(&mut self, geometry: Option<Geometry<f64>>, properties: Properties) {
        self.rows.push(Row::new(geometry, properties));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn first_geometry(&self) -> Option<&Geometry<f64>> {
        self.rows.iter().find_map(|row| row.geometry.as_ref())
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.rows.iter().filter_map(|row| row.geometry.as_ref())
    }

    /// Attribute columns in first-seen order
    pub fn property_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for row in &self.rows {
            for key in row.properties.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    /// Attribute columns followed by `geometry`
    pub fn columns(&self) -> Vec<String> {
        let mut columns = self.property_columns();
        columns.push("geometry".to_string());
        columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        column == "geometry" || self.rows.iter().any(|row| row.properties.contains_key(column))
    }

    pub fn column_values(&self, column: &str) -> Vec<Option<&Value>> {
        self.rows.iter().map(|row| row.get(column)).collect()
    }

    /// Assign a CRS without touching the coordinates
    pub fn set_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    /// Reproject every geometry into `crs`
    pub fn to_crs(&self, crs: Crs) -> Result<GeoFrame> {
        let from = self.crs.ok_or_else(|| {
            CoastsegError::InvalidCrs(format!("cannot reproject a frame without a CRS to {}", crs))
        })?;
        if from == crs {
            return Ok(self.clone());
        }
        let proj = GeoCore::transformer(from, crs)?;
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let geometry = row
                    .geometry
                    .as_ref()
                    .map(|geometry| GeoCore::transform_geometry(&proj, geometry))
                    .transpose()?;
                Ok(Row::new(geometry, row.properties.clone()))
            })
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to reproject frame from {} to {}", from, crs))?;
        Ok(GeoFrame {
            crs: Some(crs),
            rows,
        })
    }

    pub fn rename_column(mut self, from: &str, to: &str) -> Self {
        for row in &mut self.rows {
            if let Some(value) = row.properties.remove(from) {
                row.properties.insert(to.to_string(), value);
            }
        }
        self
    }

    /// Keep only the listed attribute columns. The geometry always stays.
    pub fn select_columns(mut self, keep: &[&str]) -> Self {
        for row in &mut self.rows {
            row.properties.retain(|key, _| keep.contains(&key.as_str()));
        }
        self
    }

    /// Set `column` to the same value on every row
    pub fn with_column(mut self, column: &str, value: Value) -> Self {
        for row in &mut self.rows {
            row.properties.insert(column.to_string(), value.clone());
        }
        self
    }

    pub fn drop_column(mut self, column: &str) -> Self {
        for row in &mut self.rows {
            row.properties.remove(column);
        }
        self
    }

    pub fn filter<F>(&self, predicate: F) -> GeoFrame
    where
        F: Fn(&Row) -> bool,
    {
        GeoFrame {
            crs: self.crs,
            rows: self.rows.iter().filter(|row| predicate(row)).cloned().collect(),
        }
    }

    pub fn retain<F>(&mut self, predicate: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(predicate);
    }

    /// Append the rows of every frame; the frames must already share `crs`
    pub fn concat(frames: Vec<GeoFrame>, crs: Option<Crs>) -> GeoFrame {
        let rows = frames.into_iter().flat_map(|frame| frame.rows).collect();
        GeoFrame { crs, rows }
    }

    /// Split the geometries selected by `predicate` into their parts
    pub fn explode_by<F>(self, predicate: F) -> GeoFrame
    where
        F: Fn(&Geometry<f64>) -> bool,
    {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in self.rows {
            match row.geometry {
                Some(geometry) if predicate(&geometry) => {
                    for part in geometry_parts(geometry) {
                        rows.push(Row::new(Some(part), row.properties.clone()));
                    }
                }
                geometry => rows.push(Row::new(geometry, row.properties)),
            }
        }
        GeoFrame {
            crs: self.crs,
            rows,
        }
    }

    /// Split every multi-part geometry into single parts
    pub fn explode(self) -> GeoFrame {
        self.explode_by(|geometry| {
            matches!(
                geometry,
                Geometry::MultiPoint(_)
                    | Geometry::MultiLineString(_)
                    | Geometry::MultiPolygon(_)
                    | Geometry::GeometryCollection(_)
            )
        })
    }

    /// Build a frame from a FeatureCollection, a Feature or a bare Geometry.
    /// Without a `crs` member the coordinates are WGS 84.
    pub fn from_geojson(geojson: &GeoJson) -> Result<Self> {
        match geojson {
            GeoJson::FeatureCollection(collection) => {
                let crs = crs_from_members(collection.foreign_members.as_ref())?;
                let rows = collection
                    .features
                    .iter()
                    .map(row_from_feature)
                    .collect::<Result<Vec<_>>>()?;
                Ok(GeoFrame {
                    crs: Some(crs),
                    rows,
                })
            }
            GeoJson::Feature(feature) => {
                let crs = crs_from_members(feature.foreign_members.as_ref())?;
                Ok(GeoFrame {
                    crs: Some(crs),
                    rows: vec![row_from_feature(feature)?],
                })
            }
            GeoJson::Geometry(geometry) => {
                let geometry: Geometry<f64> = geometry
                    .try_into()
                    .context("Failed to convert GeoJSON geometry to geo geometry")?;
                Ok(GeoFrame::from_geometries(vec![geometry], Some(Crs::WGS84)))
            }
        }
    }

    pub fn from_geojson_str(content: &str) -> Result<Self> {
        let geojson: GeoJson = content.parse().context("Failed to parse GeoJSON")?;
        Self::from_geojson(&geojson)
    }

    /// FeatureCollection with the CRS recorded in a `crs` member
    pub fn to_geojson(&self) -> GeoJson {
        let features = self
            .rows
            .iter()
            .map(|row| Feature {
                bbox: None,
                geometry: row
                    .geometry
                    .as_ref()
                    .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry))),
                id: None,
                properties: Some(row.properties.clone()),
                foreign_members: None,
            })
            .collect();

        let foreign_members = self.crs.map(|crs| {
            let mut members = JsonObject::new();
            members.insert(
                "crs".to_string(),
                json!({"type": "name", "properties": {"name": crs.urn()}}),
            );
            members
        });

        GeoJson::FeatureCollection(FeatureCollection {
            bbox: None,
            features,
            foreign_members,
        })
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoastsegError::FileNotFound(path.to_path_buf()).into());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_geojson_str(&content).with_context(|| format!("Invalid GeoJSON in {}", path.display()))
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(&self.to_geojson()).context("Failed to serialize GeoJSON")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("Wrote {} features to {}", self.len(), path.display());
        Ok(())
    }

    /// Attribute table as a Polars DataFrame, plus a `geometry_type` column
    #[cfg(feature = "polars")]
    pub fn to_polars_df(&self) -> Result<polars::prelude::DataFrame> {
        use polars::prelude::*;

        let mut columns: Vec<Column> = Vec::new();
        for name in self.property_columns() {
            let values = self.column_values(&name);
            let column = match values.iter().flatten().next() {
                Some(Value::Bool(_)) => Column::new(
                    name.as_str().into(),
                    values
                        .iter()
                        .map(|v| v.and_then(|v| v.as_bool()))
                        .collect::<Vec<Option<bool>>>(),
                ),
                Some(Value::Number(_)) => Column::new(
                    name.as_str().into(),
                    values
                        .iter()
                        .map(|v| v.and_then(|v| v.as_f64()))
                        .collect::<Vec<Option<f64>>>(),
                ),
                _ => Column::new(
                    name.as_str().into(),
                    values
                        .iter()
                        .map(|v| {
                            v.map(|v| match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                        })
                        .collect::<Vec<Option<String>>>(),
                ),
            };
            columns.push(column);
        }

        let geometry_types: Vec<Option<&str>> = self
            .rows
            .iter()
            .map(|row| row.geometry.as_ref().map(geometry_type_name))
            .collect();
        columns.push(Column::new("geometry_type".into(), geometry_types));

        DataFrame::new(columns).context("Failed to build DataFrame from frame")
    }
}

fn row_from_feature(feature: &Feature) -> Result<Row> {
    let geometry = match &feature.geometry {
        Some(geometry) => {
            let geometry: Geometry<f64> = geometry
                .try_into()
                .context("Failed to convert GeoJSON geometry to geo geometry")?;
            Some(geometry)
        }
        None => None,
    };
    Ok(Row::new(geometry, feature.properties.clone().unwrap_or_default()))
}

/// Read the `{"type":"name","properties":{"name":...}}` member written by geopandas
fn crs_from_members(members: Option<&JsonObject>) -> Result<Crs> {
    let name = members
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|properties| properties.get("name"))
        .and_then(Value::as_str);
    match name {
        Some(name) => Ok(name.parse::<Crs>()?),
        None => Ok(Crs::WGS84),
    }
}

fn geometry_parts(geometry: Geometry<f64>) -> Vec<Geometry<f64>> {
    match geometry {
        Geometry::MultiPoint(multi) => multi.0.into_iter().map(Geometry::Point).collect(),
        Geometry::MultiLineString(multi) => {
            multi.0.into_iter().map(Geometry::LineString).collect()
        }
        Geometry::MultiPolygon(multi) => multi.0.into_iter().map(Geometry::Polygon).collect(),
        Geometry::GeometryCollection(collection) => collection.0,
        other => vec![other],
    }
}
