//! Predictor selection and the output-adjusted feature transform for one
//! (industry, year range).

use crate::data::ChangeDataset;
use crate::types::{OUTPUT_FEATURE, YearRange, is_missing_usage};
use ndarray::{Array1, Array2};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Focus commodity '{0}' is not a column of the change dataset.")]
    FocusNotFound(String),
    #[error(
        "Industry '{industry}' has no output quantity change for year {year}; cannot compute output-adjusted changes."
    )]
    MissingOutputChange { industry: String, year: i32 },
}

/// Why a pair is omitted from the results. Skips are expected and non-fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    IndustryIsFocus,
    IndustryAbsent,
    IncompleteFocusUsage,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            Self::IndustryIsFocus => "the industry matches the focus commodity",
            Self::IndustryAbsent => "the industry is not present in that year range",
            Self::IncompleteFocusUsage => {
                "of incomplete usage of the focus commodity in that year range"
            }
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Design matrix and target for one (industry, year range).
#[derive(Debug, Clone)]
pub struct TrainingTable {
    /// Column names of `x`: usable commodities in natural code order, then
    /// [`OUTPUT_FEATURE`] when the output change itself is usable.
    pub features: Vec<String>,
    /// Shape: [n_years, features.len()].
    pub x: Array2<f64>,
    /// Output-adjusted change of the focus commodity.
    pub y: Array1<f64>,
    pub years: Vec<i32>,
}

#[derive(Debug, Clone)]
pub enum FilterOutcome {
    Skip(SkipReason),
    Ready(TrainingTable),
}

/// Selects usable predictors for a fixed focus commodity.
pub struct FeatureFilter<'a> {
    dataset: &'a ChangeDataset,
    focus: &'a str,
    focus_column: usize,
}

impl<'a> FeatureFilter<'a> {
    pub fn new(dataset: &'a ChangeDataset, focus: &'a str) -> Result<Self, FilterError> {
        let focus_column = dataset
            .commodity_position(focus)
            .ok_or_else(|| FilterError::FocusNotFound(focus.to_string()))?;
        Ok(Self {
            dataset,
            focus,
            focus_column,
        })
    }

    pub fn select(&self, industry: &str, years: YearRange) -> Result<FilterOutcome, FilterError> {
        if industry == self.focus {
            return Ok(FilterOutcome::Skip(SkipReason::IndustryIsFocus));
        }

        let rows = self.dataset.rows_in_range(industry, years);
        if rows.is_empty() {
            return Ok(FilterOutcome::Skip(SkipReason::IndustryAbsent));
        }
        if rows
            .iter()
            .any(|row| is_missing_usage(row.changes[self.focus_column]))
        {
            return Ok(FilterOutcome::Skip(SkipReason::IncompleteFocusUsage));
        }

        let mut quantity_changes = Vec::with_capacity(rows.len());
        for row in &rows {
            let qc = row
                .quantity_change
                .ok_or_else(|| FilterError::MissingOutputChange {
                    industry: industry.to_string(),
                    year: row.year,
                })?;
            quantity_changes.push(qc);
        }

        // A column is usable only when the industry used it in every year of the range.
        let commodities = self.dataset.commodities();
        let usable: Vec<usize> = (0..commodities.len())
            .filter(|&c| c != self.focus_column)
            .filter(|&c| rows.iter().all(|row| !is_missing_usage(row.changes[c])))
            .collect();
        let output_usable = quantity_changes.iter().all(|&qc| !is_missing_usage(qc));

        let mut features: Vec<String> = usable.iter().map(|&c| commodities[c].clone()).collect();
        if output_usable {
            features.push(OUTPUT_FEATURE.to_string());
        }

        let n = rows.len();
        let mut x = Array2::zeros((n, features.len()));
        let mut y = Array1::zeros(n);
        for (i, row) in rows.iter().enumerate() {
            let qc = quantity_changes[i];
            for (j, &c) in usable.iter().enumerate() {
                x[[i, j]] = row.changes[c] - qc;
            }
            if output_usable {
                x[[i, usable.len()]] = qc;
            }
            y[i] = row.changes[self.focus_column] - qc;
        }

        Ok(FilterOutcome::Ready(TrainingTable {
            features,
            x,
            y,
            years: rows.iter().map(|row| row.year).collect(),
        }))
    }
}
