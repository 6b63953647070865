//! # Scoring Table Loading and Validation
//!
//! Reads a tab-separated scoring table and turns it into the `ndarray` structures the
//! scorer consumes. The table holds one row per asset:
//!
//! - a target (realized returns) column and a meta-model column, both required,
//! - one or more prediction columns, found by name prefix,
//! - optional feature columns, found by name prefix,
//! - an optional era column.
//!
//! The scorer has no missing-value handling, so this module is where NaN, Inf, nulls
//! and non-numeric cells are rejected, each with an error naming the offending column.

use crate::config::ColumnNames;
use ndarray::{Array1, Array2, ShapeBuilder};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A validated scoring table.
#[derive(Debug)]
pub struct ScoringTable {
    /// Era label per row, when the table has an era column.
    pub eras: Option<Vec<String>>,
    pub target: Array1<f64>,
    pub meta_model: Array1<f64>,
    pub prediction_names: Vec<String>,
    /// Shape: [n_rows, prediction_names.len()].
    pub predictions: Array2<f64>,
    pub feature_names: Vec<String>,
    /// Shape: [n_rows, feature_names.len()]. Zero columns when no features are present.
    pub features: Array2<f64>,
}

impl ScoringTable {
    pub fn n_rows(&self) -> usize {
        self.target.len()
    }
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to assemble a matrix from the loaded columns: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the column '{0}'. Scoring requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the column '{0}'. Filter them out before scoring."
    )]
    NonFiniteValuesFound(String),
    #[error("No prediction columns starting with '{0}' were found in the input file.")]
    NoPredictionColumns(String),
    #[error("Input file contains only {found} data rows, but at least {required} are required.")]
    InsufficientRows { found: usize, required: usize },
}

/// Loads a scoring table. Feature columns are only read when `include_features` is set.
pub fn load_scoring_table(
    path: &str,
    columns: &ColumnNames,
    include_features: bool,
) -> Result<ScoringTable, DataError> {
    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;
    log::info!(
        "Loaded '{path}' with {} rows and {} columns",
        df.height(),
        df.width()
    );
    internal::table_from_frame(&df, columns, include_features)
}

mod internal {
    use super::*;

    const MINIMUM_ROWS: usize = 2;

    pub(super) fn table_from_frame(
        df: &DataFrame,
        columns: &ColumnNames,
        include_features: bool,
    ) -> Result<ScoringTable, DataError> {
        if df.height() < MINIMUM_ROWS {
            return Err(DataError::InsufficientRows {
                found: df.height(),
                required: MINIMUM_ROWS,
            });
        }

        let names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        for required in [&columns.target, &columns.meta_model] {
            if !names.iter().any(|name| name == required) {
                return Err(DataError::ColumnNotFound(required.clone()));
            }
        }

        let prediction_names = prefixed(&names, &columns.prediction_prefix);
        if prediction_names.is_empty() {
            return Err(DataError::NoPredictionColumns(
                columns.prediction_prefix.clone(),
            ));
        }
        let feature_names = if include_features {
            prefixed(&names, &columns.feature_prefix)
        } else {
            Vec::new()
        };
        log::debug!(
            "Scoring {} prediction columns with {} feature columns",
            prediction_names.len(),
            feature_names.len()
        );

        let n = df.height();
        let target = Array1::from_vec(extract_numeric_column(df, &columns.target)?);
        let meta_model = Array1::from_vec(extract_numeric_column(df, &columns.meta_model)?);
        let predictions = column_major_matrix(df, &prediction_names, n)?;
        let features = column_major_matrix(df, &feature_names, n)?;

        let eras = if names.iter().any(|name| name == &columns.era) {
            Some(extract_label_column(df, &columns.era)?)
        } else {
            None
        };

        Ok(ScoringTable {
            eras,
            target,
            meta_model,
            prediction_names,
            predictions,
            feature_names,
            features,
        })
    }

    /// Names starting with `prefix`, in file order.
    fn prefixed(names: &[String], prefix: &str) -> Vec<String> {
        names
            .iter()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn column_major_matrix(
        df: &DataFrame,
        column_names: &[String],
        n: usize,
    ) -> Result<Array2<f64>, DataError> {
        let mut buffer = Vec::with_capacity(n * column_names.len());
        for name in column_names {
            let mut column = extract_numeric_column(df, name)?;
            buffer.append(&mut column);
        }
        Ok(Array2::from_shape_vec((n, column_names.len()).f(), buffer)?)
    }

    fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }

        let casted = match series.cast(&DataType::Float64) {
            Ok(casted) => casted,
            Err(_) => {
                return Err(DataError::ColumnWrongType {
                    column_name: column_name.to_string(),
                    expected_type: "f64 (numeric)",
                    found_type: format!("{:?}", series.dtype()),
                });
            }
        };

        if casted.null_count() > 0 {
            return Err(DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }

        let chunked = casted.f64()?.rechunk();
        let values: Vec<f64> = chunked.into_no_null_iter().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
        }
        Ok(values)
    }

    fn extract_label_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
        let series = df.column(column_name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(column_name.to_string()));
        }
        let casted = series.cast(&DataType::String)?;
        let labels = casted
            .str()?
            .into_iter()
            .map(|label| label.unwrap_or_default().to_string())
            .collect();
        Ok(labels)
    }
}
