use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::{debug, info, warn};
use ndarray::{Array1, ArrayD, IxDyn};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::collect::files::{read_json_file, write_json_file};
use crate::collect::global_variables::{
    EXTRACTED_SHORELINES_DICT, EXTRACTED_SHORELINES_LINES, EXTRACTED_SHORELINES_POINTS,
};
use crate::commons::dates::{parse_datetime, values_match};
use crate::commons::errors::CoastsegError;
use crate::geometric::frame::GeoFrame;
use crate::geometric::imagery::delete_jpg_files;

/// Remove every row that matches all criteria columns at the same position.
/// `criteria` pairs a column with its values; position `i` of every list forms one match.
pub fn remove_matching_rows(frame: &GeoFrame, criteria: &[(&str, Vec<Value>)]) -> GeoFrame {
    let positions = criteria
        .iter()
        .map(|(_, values)| values.len())
        .min()
        .unwrap_or(0);
    if positions == 0 {
        return frame.clone();
    }

    frame.filter(|row| {
        let matched = (0..positions).any(|i| {
            criteria.iter().all(|(column, values)| {
                row.get(column)
                    .map(|value| values_match(value, &values[i]))
                    .unwrap_or(false)
            })
        });
        !matched
    })
}

/// Split `"<sat>_<YYYY-mm-dd HH:MM:SS>"` items into UTC dates and satellite names
pub fn extract_dates_and_sats<S: AsRef<str>>(
    selected_items: &[S],
) -> Result<(Vec<DateTime<Utc>>, Vec<String>)> {
    let mut dates = Vec::with_capacity(selected_items.len());
    let mut sats = Vec::with_capacity(selected_items.len());
    for item in selected_items {
        let item = item.as_ref();
        let (sat, date) = item.split_once('_').ok_or_else(|| {
            CoastsegError::InvalidInput(format!("Expected <satellite>_<date>, got '{}'", item))
        })?;
        let naive = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S")
            .with_context(|| format!("Invalid date in '{}'", item))?;
        dates.push(Utc.from_utc_datetime(&naive));
        sats.push(sat.to_string());
    }
    Ok((dates, sats))
}

/// Positions `i` where `(data.dates[i], data.satname[i])` equals one of the
/// `(dates[j], sats[j])` pairs
pub fn get_selected_indexes(
    data: &Map<String, Value>,
    dates: &[String],
    sats: &[String],
) -> Vec<usize> {
    let (Some(Value::Array(data_dates)), Some(Value::Array(data_sats))) =
        (data.get("dates"), data.get("satname"))
    else {
        return Vec::new();
    };

    data_dates
        .iter()
        .zip(data_sats.iter())
        .enumerate()
        .filter(|(_, (date, sat))| {
            dates.iter().zip(sats.iter()).any(|(wanted_date, wanted_sat)| {
                sat.as_str() == Some(wanted_sat.as_str())
                    && values_match(date, &Value::String(wanted_date.clone()))
            })
        })
        .map(|(index, _)| index)
        .collect()
}

/// Drop the given positions from every top-level array
pub fn delete_selected_indexes(data: &Map<String, Value>, indexes: &[usize]) -> Map<String, Value> {
    let indexes: HashSet<usize> = indexes.iter().copied().collect();
    data.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .enumerate()
                        .filter(|(index, _)| !indexes.contains(index))
                        .map(|(_, item)| item.clone())
                        .collect(),
                ),
                other => other.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Numeric content of one extracted-shoreline field
#[derive(Debug, Clone, PartialEq)]
pub enum NestedArray {
    /// A list of numbers
    Flat(Array1<f64>),
    /// A list of arrays that may differ in shape
    Ragged(Vec<ArrayD<f64>>),
}

impl NestedArray {
    pub fn len(&self) -> usize {
        match self {
            NestedArray::Flat(array) => array.len(),
            NestedArray::Ragged(arrays) => arrays.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn json_to_arrayd(value: &Value) -> Result<ArrayD<f64>> {
    fn shape_of(value: &Value, shape: &mut Vec<usize>, flat: &mut Vec<f64>, depth: usize) -> Result<()> {
        match value {
            Value::Number(n) => {
                if shape.len() != depth {
                    anyhow::bail!("Array is not rectangular");
                }
                flat.push(n.as_f64().context("Number out of range")?);
                Ok(())
            }
            Value::Array(items) => {
                if shape.len() == depth {
                    shape.push(items.len());
                } else if shape.get(depth) != Some(&items.len()) {
                    anyhow::bail!("Array is not rectangular");
                }
                for item in items {
                    shape_of(item, shape, flat, depth + 1)?;
                }
                Ok(())
            }
            other => anyhow::bail!("Expected a number, got {}", other),
        }
    }

    let mut shape = Vec::new();
    let mut flat = Vec::new();
    shape_of(value, &mut shape, &mut flat, 0)?;
    ArrayD::from_shape_vec(IxDyn(&shape), flat).context("Array is not rectangular")
}

/// Convert every list in `data` into ndarray form
pub fn transform_data_to_nested_arrays(
    data: &Map<String, Value>,
) -> Result<BTreeMap<String, NestedArray>> {
    let mut arrays = BTreeMap::new();
    for (key, value) in data {
        let Value::Array(items) = value else {
            return Err(CoastsegError::InvalidInput(format!(
                "'{}' must be a list, got {}",
                key, value
            ))
            .into());
        };
        let array = if items.iter().all(Value::is_number) {
            let numbers = items.iter().filter_map(Value::as_f64).collect::<Vec<_>>();
            NestedArray::Flat(Array1::from(numbers))
        } else {
            let nested = items
                .iter()
                .map(json_to_arrayd)
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Invalid array data in '{}'", key))?;
            NestedArray::Ragged(nested)
        };
        arrays.insert(key.clone(), array);
    }
    Ok(arrays)
}

/// Rewrite each CSV without the rows whose `dates` column is one of `dates_to_remove`.
/// Files without a `dates` column are left untouched.
pub fn update_transect_time_series(csv_paths: &[PathBuf], dates_to_remove: &[DateTime<Utc>]) -> Result<()> {
    for path in csv_paths {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let headers = reader.headers()?.clone();
        let Some(date_column) = headers.iter().position(|h| h == "dates") else {
            warn!("{} has no 'dates' column, skipping", path.display());
            continue;
        };

        let mut kept = Vec::new();
        let mut removed = 0;
        for record in reader.records() {
            let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
            let date = record.get(date_column).and_then(parse_datetime);
            if date.map(|d| dates_to_remove.contains(&d)).unwrap_or(false) {
                removed += 1;
            } else {
                kept.push(record);
            }
        }
        drop(reader);

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        writer.write_record(&headers)?;
        for record in &kept {
            writer.write_record(record)?;
        }
        writer.flush()?;
        debug!("Removed {} rows from {}", removed, path.display());
    }
    Ok(())
}

/// What `remove_extracted_shorelines` changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub dict_entries: usize,
    pub frame_rows: usize,
    pub csv_files: usize,
    pub jpgs_deleted: usize,
}

fn time_series_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        let is_time_series = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| {
                name.ends_with(".csv") && (name.contains("timeseries") || name.contains("time_series"))
            })
            .unwrap_or(false);
        if is_time_series {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Delete the selected extracted shorelines (`"<sat>_<date>"` items) from a session directory
pub fn remove_extracted_shorelines<S: AsRef<str>>(
    session_dir: &Path,
    selected_items: &[S],
) -> Result<RemovalReport> {
    if !session_dir.is_dir() {
        return Err(CoastsegError::DirectoryNotFound(session_dir.to_path_buf()).into());
    }
    let (dates, sats) = extract_dates_and_sats(selected_items)?;
    let date_strings: Vec<String> = dates.iter().map(|d| d.to_rfc3339()).collect();
    let mut report = RemovalReport::default();

    let dict_path = session_dir.join(EXTRACTED_SHORELINES_DICT);
    if dict_path.exists() {
        let data: Map<String, Value> = read_json_file(&dict_path)?;
        let indexes = get_selected_indexes(&data, &date_strings, &sats);
        report.dict_entries = indexes.len();
        write_json_file(&dict_path, &delete_selected_indexes(&data, &indexes))?;
    }

    let criteria = [
        (
            "date",
            date_strings.iter().cloned().map(Value::String).collect::<Vec<_>>(),
        ),
        ("satname", sats.iter().cloned().map(Value::String).collect()),
    ];
    for name in [EXTRACTED_SHORELINES_POINTS, EXTRACTED_SHORELINES_LINES] {
        let path = session_dir.join(name);
        if !path.exists() {
            continue;
        }
        let frame = GeoFrame::read_file(&path)?;
        let updated = remove_matching_rows(&frame, &criteria);
        report.frame_rows += frame.len() - updated.len();
        updated.to_file(&path)?;
    }

    let csv_files = time_series_files(session_dir)?;
    update_transect_time_series(&csv_files, &dates)?;
    report.csv_files = csv_files.len();

    let detection_dir = session_dir.join("jpg_files").join("detection");
    if detection_dir.is_dir() {
        report.jpgs_deleted = delete_jpg_files(&dates, &sats, &detection_dir)?;
    }

    info!(
        "Removed {} shorelines from {}",
        selected_items.len(),
        session_dir.display()
    );
    Ok(report)
}
