//! # Change Dataset
//!
//! This module is the only entry point for the change tables produced by the
//! upstream ingester. It reads the long-format input and output change files,
//! centers their ratios at zero, reshapes the input changes into one row per
//! (industry, year), and joins the output change onto each row.
//!
//! - Fixed schema: after the vintage-specific split codes are dropped, every
//!   (industry, year) row must carry a value for every remaining commodity. A gap is
//!   an invariant violation and aborts loading.
//! - Centering: the files hold ratios (1.0 = no change). Subtracting one maps a ratio
//!   of zero, i.e. an input the industry stopped using, to the missing-usage sentinel.
//! - Immutability: a `ChangeDataset` is never mutated after construction.

use crate::types::YearRange;
use ahash::{AHashMap, AHashSet};
use serde::Deserialize;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Failed to read '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("The input changes table contains no usable records.")]
    Empty,
    #[error("Non-finite value found for {what} in year {year}, industry '{industry}'.")]
    NonFiniteValue {
        what: String,
        year: i32,
        industry: String,
    },
    #[error(
        "Duplicate input change record for year {year}, industry '{industry}', commodity '{commodity}'."
    )]
    DuplicateRecord {
        year: i32,
        industry: String,
        commodity: String,
    },
    #[error("Duplicate output change record for year {year}, industry '{industry}'.")]
    DuplicateOutputRecord { year: i32, industry: String },
    #[error(
        "Industry '{industry}' in year {year} has no value for commodity '{commodity}'; every row must share the same commodity columns."
    )]
    IncompleteRow {
        year: i32,
        industry: String,
        commodity: String,
    },
}

/// One centered usage change: `(year, industry, commodity) -> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub year: i32,
    pub industry: String,
    pub commodity: String,
    pub value: f64,
}

/// One centered output-quantity change: `(year, industry) -> quantity_change`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputChangeRecord {
    pub year: i32,
    pub industry: String,
    pub quantity_change: f64,
}

/// A materialized (industry, year) row. `changes` is aligned with
/// [`ChangeDataset::commodities`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndustryYearObservation {
    pub year: i32,
    pub industry: String,
    pub changes: Vec<f64>,
    /// `None` when the output table has no record for this (industry, year).
    pub quantity_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct InputChangeRow {
    year: i32,
    industry: String,
    commodity: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct OutputChangeRow {
    year: i32,
    industry: String,
    quantity_change: f64,
}

/// The wide, read-only view of all usage changes.
#[derive(Debug, Clone)]
pub struct ChangeDataset {
    commodities: Vec<String>,
    commodity_index: AHashMap<String, usize>,
    observations: Vec<IndustryYearObservation>,
    /// Row indices per industry, in ascending year order.
    industry_rows: AHashMap<String, Vec<usize>>,
}

/// Natural ordering for commodity and industry codes ("22" sorts before "211").
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    natord::compare(a, b).then_with(|| a.cmp(b))
}

impl ChangeDataset {
    /// Reads both change tables from CSV, centers their ratios, and builds the dataset.
    pub fn load(
        input_changes: &Path,
        output_changes: &Path,
        dropped_commodities: &[String],
    ) -> Result<Self, DataError> {
        log::info!("Loading input changes from '{}'", input_changes.display());
        let records = read_input_changes(input_changes)?;
        log::info!("Loading output changes from '{}'", output_changes.display());
        let outputs = read_output_changes(output_changes)?;

        let dataset = Self::from_records(records, outputs, dropped_commodities)?;
        log::info!(
            "Dataset ready: {} industry-year rows across {} industries, {} commodity columns.",
            dataset.observations.len(),
            dataset.industry_rows.len(),
            dataset.commodities.len()
        );
        Ok(dataset)
    }

    /// Builds the dataset from already-centered records.
    pub fn from_records(
        records: Vec<ChangeRecord>,
        outputs: Vec<OutputChangeRecord>,
        dropped_commodities: &[String],
    ) -> Result<Self, DataError> {
        let dropped: AHashSet<&str> = dropped_commodities.iter().map(String::as_str).collect();

        let mut commodities: Vec<String> = records
            .iter()
            .filter(|r| !dropped.contains(r.commodity.as_str()))
            .map(|r| r.commodity.clone())
            .collect::<AHashSet<_>>()
            .into_iter()
            .collect();
        if commodities.is_empty() {
            return Err(DataError::Empty);
        }
        commodities.sort_by(|a, b| compare_codes(a, b));
        let commodity_index: AHashMap<String, usize> = commodities
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();

        let mut quantity_changes: AHashMap<(String, i32), f64> =
            AHashMap::with_capacity(outputs.len());
        for output in outputs {
            if !output.quantity_change.is_finite() {
                return Err(DataError::NonFiniteValue {
                    what: "quantity_change".to_string(),
                    year: output.year,
                    industry: output.industry,
                });
            }
            let key = (output.industry, output.year);
            if quantity_changes.contains_key(&key) {
                return Err(DataError::DuplicateOutputRecord {
                    year: key.1,
                    industry: key.0,
                });
            }
            quantity_changes.insert(key, output.quantity_change);
        }

        // --- Pivot long records into one partially filled row per (industry, year) ---
        let width = commodities.len();
        let mut cells: AHashMap<(String, i32), Vec<Option<f64>>> = AHashMap::new();
        for record in records {
            let Some(&column) = commodity_index.get(&record.commodity) else {
                continue;
            };
            if !record.value.is_finite() {
                return Err(DataError::NonFiniteValue {
                    what: format!("commodity '{}'", record.commodity),
                    year: record.year,
                    industry: record.industry,
                });
            }
            let row = cells
                .entry((record.industry.clone(), record.year))
                .or_insert_with(|| vec![None; width]);
            if row[column].is_some() {
                return Err(DataError::DuplicateRecord {
                    year: record.year,
                    industry: record.industry,
                    commodity: record.commodity,
                });
            }
            row[column] = Some(record.value);
        }

        let mut keys: Vec<(String, i32)> = cells.keys().cloned().collect();
        keys.sort_by(|a, b| compare_codes(&a.0, &b.0).then(a.1.cmp(&b.1)));

        let mut observations = Vec::with_capacity(keys.len());
        let mut industry_rows: AHashMap<String, Vec<usize>> = AHashMap::new();
        for key in keys {
            let Some(row) = cells.remove(&key) else {
                continue;
            };
            let mut changes = Vec::with_capacity(width);
            for (column, cell) in row.into_iter().enumerate() {
                match cell {
                    Some(value) => changes.push(value),
                    None => {
                        return Err(DataError::IncompleteRow {
                            year: key.1,
                            industry: key.0,
                            commodity: commodities[column].clone(),
                        });
                    }
                }
            }
            let quantity_change = quantity_changes.get(&key).copied();
            industry_rows
                .entry(key.0.clone())
                .or_default()
                .push(observations.len());
            observations.push(IndustryYearObservation {
                year: key.1,
                industry: key.0,
                changes,
                quantity_change,
            });
        }

        Ok(Self {
            commodities,
            commodity_index,
            observations,
            industry_rows,
        })
    }

    /// Commodity columns in their canonical order.
    pub fn commodities(&self) -> &[String] {
        &self.commodities
    }

    pub fn commodity_position(&self, code: &str) -> Option<usize> {
        self.commodity_index.get(code).copied()
    }

    pub fn observations(&self) -> &[IndustryYearObservation] {
        &self.observations
    }

    /// Rows for one industry whose year falls inside `years`, in ascending year order.
    pub fn rows_in_range(&self, industry: &str, years: YearRange) -> Vec<&IndustryYearObservation> {
        self.industry_rows
            .get(industry)
            .map(|rows| {
                rows.iter()
                    .map(|&i| &self.observations[i])
                    .filter(|obs| years.contains(obs.year))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn read_input_changes(path: &Path) -> Result<Vec<ChangeRecord>, DataError> {
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<InputChangeRow>() {
        let row = row.map_err(csv_error)?;
        records.push(ChangeRecord {
            year: row.year,
            industry: row.industry.trim().to_string(),
            commodity: row.commodity.trim().to_string(),
            value: row.value - 1.0,
        });
    }
    Ok(records)
}

fn read_output_changes(path: &Path) -> Result<Vec<OutputChangeRecord>, DataError> {
    let csv_error = |source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<OutputChangeRow>() {
        let row = row.map_err(csv_error)?;
        records.push(OutputChangeRecord {
            year: row.year,
            industry: row.industry.trim().to_string(),
            quantity_change: row.quantity_change - 1.0,
        });
    }
    Ok(records)
}
