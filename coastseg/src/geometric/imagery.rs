use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::collect::files::{move_dir, walk_files};
use crate::collect::global_variables::{pixel_size, MAX_AREA_FACTOR, MIN_AREA_FACTOR, SATELLITES};
use crate::commons::dates::jpg_timestamp;
use crate::commons::errors::CoastsegError;
use crate::geometric::frame::GeoFrame;
use crate::geometric::roi::{get_roi_area, RoiSettings};

/// First `_`-separated token of the file stem that names a known satellite
pub fn satellite_from_filename(path: &Path) -> Option<&'static str> {
    let stem = path.file_stem()?.to_str()?;
    stem.split('_')
        .find_map(|token| SATELLITES.iter().copied().find(|sat| *sat == token))
}

/// Ground footprint of an image in km²
pub fn calculate_image_area(path: &Path, pixel_size: f64) -> Result<f64> {
    let (width, height) = image::image_dimensions(path)
        .with_context(|| format!("Failed to read image size of {}", path.display()))?;
    Ok(width as f64 * height as f64 * pixel_size * pixel_size / 1_000_000.0)
}

fn is_jpg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg"))
        .unwrap_or(false)
}

/// Move the JPEGs whose footprint is below `min_area` or above `max_area` (km²)
/// into `output_directory` (default `<directory>/bad`). Returns their original paths.
pub fn filter_images(
    min_area: f64,
    max_area: Option<f64>,
    directory: &Path,
    output_directory: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(CoastsegError::DirectoryNotFound(directory.to_path_buf()).into());
    }
    let output_directory = output_directory
        .map(Path::to_path_buf)
        .unwrap_or_else(|| directory.join("bad"));

    let mut jpgs = Vec::new();
    for entry in fs::read_dir(directory)
        .with_context(|| format!("Failed to read {}", directory.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_jpg(&path) {
            jpgs.push(path);
        }
    }
    jpgs.sort();

    let mut bad_images = Vec::new();
    for path in jpgs {
        let Some(satellite) = satellite_from_filename(&path) else {
            warn!("No known satellite in {}, skipping", path.display());
            continue;
        };
        let Some(pixel_size) = pixel_size(satellite) else {
            continue;
        };
        let area = calculate_image_area(&path, pixel_size)?;
        let too_large = max_area.map(|max| area > max).unwrap_or(false);
        if area < min_area || too_large {
            debug!("{} covers {:.2} km², moving it", path.display(), area);
            bad_images.push(path);
        }
    }

    if !bad_images.is_empty() {
        fs::create_dir_all(&output_directory)
            .with_context(|| format!("Failed to create {}", output_directory.display()))?;
        for path in &bad_images {
            if let Some(name) = path.file_name() {
                fs::rename(path, output_directory.join(name))
                    .with_context(|| format!("Failed to move {}", path.display()))?;
            }
        }
    }
    info!(
        "Moved {} partial images from {} to {}",
        bad_images.len(),
        directory.display(),
        output_directory.display()
    );
    Ok(bad_images)
}

/// Smallest and largest acceptable image footprints (km²) for an ROI
pub fn partial_image_area_bounds(roi: &GeoFrame) -> Result<(f64, f64)> {
    let area = get_roi_area(roi)?;
    Ok((area * MIN_AREA_FACTOR, area * MAX_AREA_FACTOR))
}

/// Move the images of `directory` that only partly cover the ROI
pub fn filter_partial_images(roi: &GeoFrame, directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(CoastsegError::DirectoryNotFound(directory.to_path_buf()).into());
    }
    let (min_area, max_area) = partial_image_area_bounds(roi)?;
    filter_images(min_area, Some(max_area), directory, None)
}

/// Satellite -> names of the `.tif` files matching the `file_type` images in `directory`.
/// Every satellite is present, possibly with an empty set.
pub fn get_filtered_files_dict(
    directory: &Path,
    file_type: &str,
    sitename: &str,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let mut files: BTreeMap<String, BTreeSet<String>> = SATELLITES
        .iter()
        .map(|sat| (sat.to_string(), BTreeSet::new()))
        .collect();

    let extension = file_type.trim_start_matches('.');
    for entry in
        fs::read_dir(directory).with_context(|| format!("Failed to read {}", directory.display()))?
    {
        let path = entry?.path();
        let matches_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !matches_type {
            continue;
        }
        let Some(satellite) = SATELLITES.iter().find(|sat| name.contains(*sat)) else {
            continue;
        };
        let date = name.split('_').next().unwrap_or_default();
        if let Some(set) = files.get_mut(*satellite) {
            set.insert(format!("{}_{}_{}_ms.tif", date, satellite, sitename));
        }
    }
    Ok(files)
}

/// Keep only the metadata entries whose image is still in
/// `<roi_directory>/<sitename>/jpg_files/preprocessed/RGB`
pub fn filter_metadata(
    metadata: &Map<String, Value>,
    sitename: &str,
    roi_directory: &Path,
) -> Result<Map<String, Value>> {
    let rgb_directory = roi_directory
        .join(sitename)
        .join("jpg_files")
        .join("preprocessed")
        .join("RGB");
    if !rgb_directory.is_dir() {
        return Err(CoastsegError::DirectoryNotFound(rgb_directory).into());
    }
    let kept_files = get_filtered_files_dict(&rgb_directory, "jpg", sitename)?;

    let mut filtered = Map::new();
    for (key, value) in metadata {
        let (Some(kept), Value::Object(entry)) = (kept_files.get(key), value) else {
            filtered.insert(key.clone(), value.clone());
            continue;
        };
        let keep: Vec<bool> = match entry.get("filenames") {
            Some(Value::Array(filenames)) => filenames
                .iter()
                .map(|name| name.as_str().map(|n| kept.contains(n)).unwrap_or(false))
                .collect(),
            _ => Vec::new(),
        };

        let entry = entry
            .iter()
            .map(|(field, values)| {
                let values = match values {
                    Value::Array(items) if items.len() == keep.len() => Value::Array(
                        items
                            .iter()
                            .zip(&keep)
                            .filter(|(_, keep)| **keep)
                            .map(|(item, _)| item.clone())
                            .collect(),
                    ),
                    other => other.clone(),
                };
                (field.clone(), values)
            })
            .collect();
        filtered.insert(key.clone(), Value::Object(entry));
    }
    Ok(filtered)
}

/// Delete `<%Y-%m-%d-%H-%M-%S>_<sat>.jpg` for each (date, sat) pair anywhere under `directory`.
/// Returns how many files were removed.
pub fn delete_jpg_files(dates: &[DateTime<Utc>], sats: &[String], directory: &Path) -> Result<usize> {
    let targets: HashSet<String> = dates
        .iter()
        .zip(sats)
        .map(|(date, sat)| format!("{}_{}.jpg", jpg_timestamp(date), sat))
        .collect();
    if targets.is_empty() || !directory.is_dir() {
        return Ok(0);
    }

    let mut deleted = 0;
    for path in walk_files(directory)? {
        let is_target = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| targets.contains(name))
            .unwrap_or(false);
        if is_target {
            fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))?;
            deleted += 1;
        }
    }
    debug!("Deleted {} jpgs under {}", deleted, directory.display());
    Ok(deleted)
}

/// Move `<filepath>/<sitename>/jpg_files/detection` to `<save_path>/jpg_files/detection`
pub fn save_extracted_shoreline_figures(roi: &RoiSettings, save_path: &Path) -> Result<PathBuf> {
    let source = Path::new(&roi.filepath)
        .join(&roi.sitename)
        .join("jpg_files")
        .join("detection");
    let destination = save_path.join("jpg_files").join("detection");
    move_dir(&source, &destination)
        .with_context(|| format!("Failed to move shoreline figures of {}", roi.sitename))?;
    info!("Saved extracted shoreline figures to {}", destination.display());
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_core::Crs;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use geo::polygon;
    use serde_json::json;
    use tempfile::tempdir;

    fn write_jpg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    /// Two partial images (S2 and L5) among images of about 25 km²
    fn image_directory(dir: &Path) {
        write_jpg(dir, "dummy_prefix_S2_image.jpg", 100, 100);
        write_jpg(dir, "dummy_prefix_L5_image.jpg", 100, 100);
        write_jpg(dir, "dummy_prefix_L7_image.jpg", 333, 334);
        write_jpg(dir, "dummy_prefix_L8_image.jpg", 333, 334);
        write_jpg(dir, "dummy_prefix_L9_image.jpg", 333, 334);
    }

    #[test]
    fn test_satellite_from_filename() {
        assert_eq!(satellite_from_filename(Path::new("dummy_prefix_S2_image.jpg")), Some("S2"));
        assert_eq!(satellite_from_filename(Path::new("2023-01-01-12-00-00_L8.jpg")), Some("L8"));
        assert_eq!(satellite_from_filename(Path::new("wrong_name.jpg")), None);
    }

    #[test]
    fn test_filter_images_existing_directory() {
        let dir = tempdir().unwrap();
        image_directory(dir.path());
        let bad_dir = dir.path().join("bad");
        let bad = filter_images(15.0, Some(30.0), dir.path(), Some(&bad_dir)).unwrap();
        assert_eq!(bad.len(), 2);
        assert!(bad.contains(&dir.path().join("dummy_prefix_S2_image.jpg")));
        assert!(bad.contains(&dir.path().join("dummy_prefix_L5_image.jpg")));
        assert!(bad_dir.join("dummy_prefix_S2_image.jpg").exists());
        assert!(dir.path().join("dummy_prefix_L8_image.jpg").exists());
    }

    #[test]
    fn test_filter_images_too_large() {
        let dir = tempdir().unwrap();
        write_jpg(dir.path(), "big_S2.jpg", 1000, 1000);
        write_jpg(dir.path(), "good_S2.jpg", 500, 500);
        let bad = filter_images(15.0, Some(30.0), dir.path(), None).unwrap();
        assert_eq!(bad, vec![dir.path().join("big_S2.jpg")]);
        assert!(dir.path().join("bad").join("big_S2.jpg").exists());

        // Without a maximum nothing is too large
        let dir = tempdir().unwrap();
        write_jpg(dir.path(), "big_S2.jpg", 1000, 1000);
        assert!(filter_images(15.0, None, dir.path(), None).unwrap().is_empty());
    }

    #[test]
    fn test_filter_images_default_output_directory() {
        let dir = tempdir().unwrap();
        image_directory(dir.path());
        let bad = filter_images(15.0, None, dir.path(), None).unwrap();
        assert_eq!(bad.len(), 2);
        assert!(dir.path().join("bad").join("dummy_prefix_L5_image.jpg").exists());
    }

    #[test]
    fn test_filter_images_no_jpgs_or_missing_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert!(filter_images(0.8, Some(1.5), dir.path(), None).unwrap().is_empty());

        let err = filter_images(0.8, Some(1.5), Path::new("non_existing_path"), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoastsegError>(),
            Some(CoastsegError::DirectoryNotFound(_))
        ));
    }

    #[test]
    fn test_partial_image_area_bounds() {
        let roi = GeoFrame::from_geometries(
            vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)].into()],
            Some(Crs::WGS84),
        );
        let (min_area, max_area) = partial_image_area_bounds(&roi).unwrap();
        assert_relative_eq!(min_area, 7393.52, max_relative = 1e-4);
        assert_relative_eq!(max_area, 18483.80, max_relative = 1e-4);

        assert!(filter_partial_images(&roi, Path::new("/non/existent/directory")).is_err());
    }

    fn sample_rgb_files(dir: &Path) {
        for name in [
            "20210101_sat1_L5.jpg",
            "20210101_sat1_L7.jpg",
            "20210101_sat1_L8.jpg",
            "20210101_sat1_L9.jpg",
            "20210101_sat1_S2.jpg",
            "20210101_wrong_name.jpg",
            "wrong_name_2.jpg",
        ] {
            fs::write(dir.join(name), "test content").unwrap();
        }
    }

    #[test]
    fn test_get_filtered_files_dict() {
        let dir = tempdir().unwrap();
        sample_rgb_files(dir.path());
        let files = get_filtered_files_dict(dir.path(), "jpg", "site1").unwrap();
        assert_eq!(files.len(), 5);
        for sat in SATELLITES {
            let expected: BTreeSet<String> = [format!("20210101_{}_site1_ms.tif", sat)].into();
            assert_eq!(files[sat], expected);
        }
    }

    fn sample_metadata() -> Map<String, Value> {
        json!({
            "L5": {
                "filenames": ["20210101_L5_site1_ms.tif", "20220101_L5_site1_ms.tif"],
                "acc_georef": [9.185, 10.185],
                "epsg": [32618, 32618],
                "dates": ["2020-01-05 15:33:53", "2020-01-21 15:33:50"]
            },
            "L7": {
                "filenames": ["20210101_L7_site1_ms.tif", "20220101_L7_site1_ms.tif"],
                "acc_georef": [7.441, 5.693],
                "epsg": [32618, 32618],
                "dates": ["2020-01-05 15:33:53", "2020-02-22 15:33:41"]
            },
            "sitename": "site1"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_filter_metadata() {
        let dir = tempdir().unwrap();
        let rgb = dir.path().join("site1").join("jpg_files").join("preprocessed").join("RGB");
        fs::create_dir_all(&rgb).unwrap();
        sample_rgb_files(&rgb);

        let result = filter_metadata(&sample_metadata(), "site1", dir.path()).unwrap();
        assert_eq!(
            Value::Object(result),
            json!({
                "L5": {
                    "filenames": ["20210101_L5_site1_ms.tif"],
                    "acc_georef": [9.185],
                    "epsg": [32618],
                    "dates": ["2020-01-05 15:33:53"]
                },
                "L7": {
                    "filenames": ["20210101_L7_site1_ms.tif"],
                    "acc_georef": [7.441],
                    "epsg": [32618],
                    "dates": ["2020-01-05 15:33:53"]
                },
                "sitename": "site1"
            })
        );
    }

    #[test]
    fn test_filter_metadata_empty_rgb_directory() {
        let dir = tempdir().unwrap();
        let rgb = dir.path().join("site1").join("jpg_files").join("preprocessed").join("RGB");
        fs::create_dir_all(&rgb).unwrap();

        let result = filter_metadata(&sample_metadata(), "site1", dir.path()).unwrap();
        assert_eq!(result["L5"]["filenames"], json!([]));
        assert_eq!(result["L7"]["epsg"], json!([]));
        assert_eq!(result["sitename"], json!("site1"));

        let other = tempdir().unwrap();
        assert!(filter_metadata(&sample_metadata(), "site1", other.path()).is_err());
    }

    #[test]
    fn test_delete_jpg_files() {
        let dir = tempdir().unwrap();
        let dates = vec![
            Utc.with_ymd_and_hms(2023, 1, 1, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 1, 2, 12, 0, 0).unwrap(),
        ];
        let sats = vec!["SatA".to_string(), "SatB".to_string()];
        for (date, sat) in dates.iter().zip(&sats) {
            fs::write(dir.path().join(format!("{}_{}.jpg", jpg_timestamp(date), sat)), "").unwrap();
        }
        let extra = "2023-01-03-12-00-00_SatC.jpg";
        fs::write(dir.path().join(extra), "").unwrap();

        // Only the satellite matches
        let other_dates = vec![
            Utc.with_ymd_and_hms(2023, 4, 1, 12, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2023, 5, 2, 12, 0, 0).unwrap(),
        ];
        assert_eq!(delete_jpg_files(&other_dates, &sats, dir.path()).unwrap(), 0);
        // Only the date matches
        let other_sats = vec!["SatZ".to_string(), "SatG".to_string()];
        assert_eq!(delete_jpg_files(&dates, &other_sats, dir.path()).unwrap(), 0);
        assert_eq!(delete_jpg_files(&[], &[], dir.path()).unwrap(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);

        assert_eq!(delete_jpg_files(&dates, &sats, dir.path()).unwrap(), 2);
        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining, vec![extra.to_string()]);
    }

    #[test]
    fn test_save_extracted_shoreline_figures() {
        let source_root = tempdir().unwrap();
        let detection = source_root
            .path()
            .join("sitename")
            .join("jpg_files")
            .join("detection");
        fs::create_dir_all(&detection).unwrap();
        for i in 0..5 {
            fs::write(detection.join(format!("test_image_{}.jpg", i)), "").unwrap();
        }
        let destination_root = tempdir().unwrap();
        let roi = RoiSettings {
            filepath: source_root.path().to_string_lossy().to_string(),
            sitename: "sitename".into(),
            ..RoiSettings::default()
        };

        let destination = save_extracted_shoreline_figures(&roi, destination_root.path()).unwrap();
        assert_eq!(destination, destination_root.path().join("jpg_files").join("detection"));
        assert_eq!(fs::read_dir(&destination).unwrap().count(), 5);
        assert!(destination.join("test_image_4.jpg").exists());
        assert!(!detection.exists());
    }
}
