use anyhow::{Context, Result};
use geo::{Centroid, Geometry, GeometryCollection};
use ndarray::Array2;
use std::collections::BTreeMap;

use crate::geo_core::{convert_wgs_to_utm, Crs};
use crate::geometric::frame::GeoFrame;

/// Transect id -> n×2 array of its points in the local UTM zone.
/// Rows without an id or a line geometry are skipped; the first row wins on duplicate ids.
pub fn get_transect_points_dict(transects: &GeoFrame) -> Result<BTreeMap<String, Array2<f64>>> {
    let mut points = BTreeMap::new();
    if transects.is_empty() {
        return Ok(points);
    }

    let wgs84 = transects.to_crs(Crs::WGS84)?;
    let collection = GeometryCollection(wgs84.geometries().cloned().collect::<Vec<Geometry<f64>>>());
    let Some(centroid) = collection.centroid() else {
        return Ok(points);
    };
    let utm: Crs = convert_wgs_to_utm(centroid.x(), centroid.y()).parse()?;
    let projected = wgs84.to_crs(utm)?.explode();

    for row in projected.iter() {
        let (Some(id), Some(Geometry::LineString(line))) = (row.get_key("id"), row.geometry.as_ref())
        else {
            continue;
        };
        let flat: Vec<f64> = line.coords().flat_map(|c| [c.x, c.y]).collect();
        let array = Array2::from_shape_vec((line.0.len(), 2), flat)
            .with_context(|| format!("Failed to build point array for transect {}", id))?;
        points.entry(id).or_insert(array);
    }
    log::debug!("Collected points for {} transects in {}", points.len(), utm);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometric::frame::Properties;
    use geo::line_string;
    use serde_json::json;

    fn transects() -> GeoFrame {
        let mut frame = GeoFrame::empty(Crs::WGS84);
        for (id, offset) in [("t1", 0.0), ("t2", 0.01)] {
            let mut props = Properties::new();
            props.insert("id".into(), json!(id));
            frame.push(
                Some(
                    line_string![
                        (x: -121.85 + offset, y: 36.60),
                        (x: -121.86 + offset, y: 36.61),
                    ]
                    .into(),
                ),
                props,
            );
        }
        frame.push(Some(line_string![(x: -121.8, y: 36.6), (x: -121.7, y: 36.7)].into()), Properties::new());
        frame
    }

    #[test]
    fn test_get_transect_points_dict() {
        let points = get_transect_points_dict(&transects()).unwrap();
        assert_eq!(points.keys().cloned().collect::<Vec<_>>(), vec!["t1", "t2"]);
        let t1 = &points["t1"];
        assert_eq!(t1.shape(), &[2, 2]);
        // UTM zone 10N eastings and northings
        assert!(t1[[0, 0]] > 500_000.0 && t1[[0, 0]] < 700_000.0);
        assert!(t1[[0, 1]] > 4_000_000.0 && t1[[0, 1]] < 4_100_000.0);
    }

    #[test]
    fn test_get_transect_points_dict_empty() {
        let points = get_transect_points_dict(&GeoFrame::empty(Crs::WGS84)).unwrap();
        assert!(points.is_empty());
    }
}
