//! Tabular datasets
//!
//! Data partitions and rotated request logs are CSV blobs with a header row.
//! This module owns every conversion between those blobs, polars frames and
//! the ndarray matrices consumed by training.

use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::BTreeSet;
use std::io::Cursor;

use crate::error::{LifecycleError, Result};

/// Decode a CSV blob with a header row
///
/// Column types are inferred from every row, so a decimal value far down a
/// week that starts with whole numbers still decodes.
pub fn read_csv(bytes: Vec<u8>) -> Result<DataFrame> {
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;
    Ok(frame)
}

/// Encode a frame as CSV with a header row
pub fn write_csv(frame: &mut DataFrame) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .finish(frame)?;
    Ok(buffer)
}

/// Names of the numeric columns of a frame, in frame order
pub fn numeric_columns(frame: &DataFrame) -> Vec<String> {
    frame
        .get_columns()
        .iter()
        .filter(|s| s.dtype().is_numeric())
        .map(|s| s.name().to_string())
        .collect()
}

/// Observed values of a numeric column with nulls and NaNs dropped
///
/// Returns `None` when the column is missing or not numeric.
pub fn numeric_values(frame: &DataFrame, column: &str) -> Option<Vec<f64>> {
    let series = frame
        .get_columns()
        .iter()
        .find(|s| s.name().to_string() == column)?;
    if !series.dtype().is_numeric() {
        return None;
    }
    let casted = series.cast(&DataType::Float64).ok()?;
    let values = casted.f64().ok()?;
    Some(values.into_iter().flatten().filter(|v| !v.is_nan()).collect())
}

/// Stack frames that share (at least) a common set of columns
///
/// Columns missing from any frame are dropped. A column is widened to
/// `Float64` in every frame when it is numeric in any of them or holds no
/// values at all, so integer weeks stack with float weeks and an empty column
/// (read back as text) stacks as nulls.
pub fn concat_frames(frames: &[DataFrame]) -> Result<DataFrame> {
    let Some(first) = frames.first() else {
        return Ok(DataFrame::empty());
    };

    let mut shared: Vec<String> = first
        .get_columns()
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    for frame in &frames[1..] {
        let names: BTreeSet<String> = frame
            .get_columns()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        shared.retain(|name| names.contains(name));
    }

    let numeric: BTreeSet<String> = shared
        .iter()
        .filter(|name| {
            let columns: Vec<&Series> = frames.iter().filter_map(|f| column(f, name)).collect();
            columns.iter().any(|c| c.dtype().is_numeric())
                || columns.iter().all(|c| is_empty_column(c))
        })
        .cloned()
        .collect();

    let mut stacked: Option<DataFrame> = None;
    for frame in frames {
        let aligned = align(frame, &shared, &numeric)?;
        match stacked.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)?;
            }
            None => stacked = Some(aligned),
        }
    }

    Ok(stacked.unwrap_or_else(DataFrame::empty))
}

fn column<'a>(frame: &'a DataFrame, name: &str) -> Option<&'a Series> {
    frame.get_columns().iter().find(|s| s.name().to_string() == name)
}

fn is_empty_column(series: &Series) -> bool {
    series.null_count() == series.len() || matches!(series.dtype(), DataType::Null)
}

fn align(frame: &DataFrame, columns: &[String], numeric: &BTreeSet<String>) -> Result<DataFrame> {
    let mut series = Vec::with_capacity(columns.len());
    for name in columns {
        let column = column(frame, name)
            .ok_or_else(|| LifecycleError::Data(format!("column '{}' missing", name)))?;
        if numeric.contains(name) {
            // non-strict: text that is not a number becomes null
            series.push(column.cast(&DataType::Float64)?);
        } else {
            series.push(column.clone());
        }
    }
    Ok(DataFrame::new(series)?)
}

/// Feature matrix plus binary targets, ready for fitting
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub feature_names: Vec<String>,
    pub records: Array2<f64>,
    pub targets: Array1<usize>,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.records.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.records.nrows() == 0
    }

    /// Build from a frame: every numeric column except `label` is a feature
    ///
    /// Rows with a missing value in any used column are dropped. Label values
    /// other than 0 are treated as the positive class.
    pub fn from_frame(frame: &DataFrame, label: &str) -> Result<Self> {
        let label_series = frame
            .get_columns()
            .iter()
            .find(|s| s.name().to_string() == label)
            .ok_or_else(|| LifecycleError::Data(format!("label column '{}' missing", label)))?;
        let labels: Vec<Option<f64>> = label_series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .collect();

        // a column with no observations would drop every row
        let feature_names: Vec<String> = numeric_columns(frame)
            .into_iter()
            .filter(|name| name != label)
            .filter(|name| column(frame, name).is_some_and(|c| !is_empty_column(c)))
            .collect();
        if feature_names.is_empty() {
            return Err(LifecycleError::Data("no numeric feature columns".to_string()));
        }

        let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(feature_names.len());
        for name in &feature_names {
            let series = frame
                .get_columns()
                .iter()
                .find(|s| s.name().to_string() == *name)
                .ok_or_else(|| LifecycleError::Data(format!("column '{}' missing", name)))?;
            columns.push(series.cast(&DataType::Float64)?.f64()?.into_iter().collect());
        }

        let mut flat = Vec::with_capacity(labels.len() * feature_names.len());
        let mut targets = Vec::with_capacity(labels.len());
        'rows: for (row, label_value) in labels.iter().copied().enumerate() {
            let Some(label_value) = label_value.filter(|v| !v.is_nan()) else {
                continue;
            };
            let start = flat.len();
            for column in &columns {
                match column[row] {
                    Some(v) if !v.is_nan() => flat.push(v),
                    _ => {
                        flat.truncate(start);
                        continue 'rows;
                    }
                }
            }
            targets.push(usize::from(label_value != 0.0));
        }

        let records = Array2::from_shape_vec((targets.len(), feature_names.len()), flat)
            .map_err(|e| LifecycleError::Data(e.to_string()))?;

        Ok(Self {
            feature_names,
            records,
            targets: Array1::from_vec(targets),
        })
    }
}

/// Build a frame of float feature columns from per-row values
pub fn frame_from_features(feature_names: &[String], rows: &[Vec<Option<f64>>]) -> Result<DataFrame> {
    Ok(DataFrame::new(feature_series(feature_names, rows))?)
}

/// Build a frame from per-row feature values plus an integer label column
pub fn frame_from_rows(
    feature_names: &[String],
    rows: &[Vec<Option<f64>>],
    label: &str,
    labels: &[i64],
) -> Result<DataFrame> {
    let mut series = feature_series(feature_names, rows);
    series.push(Series::new(label, labels.to_vec()));
    Ok(DataFrame::new(series)?)
}

fn feature_series(feature_names: &[String], rows: &[Vec<Option<f64>>]) -> Vec<Series> {
    feature_names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<Option<f64>> =
                rows.iter().map(|row| row.get(i).copied().flatten()).collect();
            Series::new(name, values)
        })
        .collect()
}
