//! Counterfactual perturbation of a fitted model.
//!
//! Boosted trees are piecewise constant, so derivatives are estimated instead of taken:
//! each predictor is swept over a fixed grid while every other predictor stays at its
//! zero baseline, and a least-squares line through the resulting predictions gives the
//! sensitivity coefficient.

use crate::config::TestGridConfig;
use crate::learner::Regressor;
use ndarray::Array1;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GridError {
    #[error("The perturbation grid needs at least 2 points, got {0}.")]
    TooFewPoints(usize),
    #[error("Perturbation grid bounds must be finite with lower < upper, got [{lower}, {upper}].")]
    InvalidBounds { lower: f64, upper: f64 },
    #[error("Rounding to {0} decimals is not supported.")]
    TooManyDecimals(u32),
    #[error("After rounding, every perturbation grid point has the same value.")]
    Degenerate,
}

/// Evenly spaced perturbation values, inclusive of both bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct TestGrid {
    values: Vec<f64>,
}

impl TestGrid {
    pub fn new(lower: f64, upper: f64, count: usize, decimals: u32) -> Result<Self, GridError> {
        if count < 2 {
            return Err(GridError::TooFewPoints(count));
        }
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(GridError::InvalidBounds { lower, upper });
        }
        if decimals > 15 {
            return Err(GridError::TooManyDecimals(decimals));
        }

        let scale = 10f64.powi(decimals as i32);
        let step = (upper - lower) / (count - 1) as f64;
        let values: Vec<f64> = (0..count)
            .map(|i| {
                let raw = if i + 1 == count {
                    upper
                } else {
                    lower + step * i as f64
                };
                (raw * scale).round() / scale
            })
            .collect();

        if values.iter().all(|&v| v == values[0]) {
            return Err(GridError::Degenerate);
        }
        Ok(Self { values })
    }

    pub fn from_config(config: &TestGridConfig) -> Result<Self, GridError> {
        Self::new(config.lower, config.upper, config.count, config.decimals)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordinary least-squares line `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Fits a line through `(x, y)`. A constant `x` has no defined slope and yields a
/// horizontal line through the mean of `y`.
pub fn least_squares_line(x: &[f64], y: &[f64]) -> LinearFit {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len() as f64;
    if x.is_empty() {
        return LinearFit {
            slope: 0.0,
            intercept: 0.0,
        };
    }
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        sxy += dx * (yi - y_mean);
        sxx += dx * dx;
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
    }
}

/// Response of the model to one predictor.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSensitivity {
    pub feature: String,
    pub fit: LinearFit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityReport {
    /// Model prediction at the all-zero feature vector.
    pub baseline: f64,
    /// One entry per predictor, in feature order.
    pub features: Vec<FeatureSensitivity>,
}

pub struct SensitivityAnalyzer {
    grid: TestGrid,
}

impl SensitivityAnalyzer {
    pub fn new(grid: TestGrid) -> Self {
        Self { grid }
    }

    /// Sweeps every predictor in turn. Costs `features.len() * grid.len()` predictions.
    pub fn analyze<M: Regressor>(&self, model: &M, features: &[String]) -> SensitivityReport {
        let mut row = Array1::<f64>::zeros(features.len());
        let baseline = model.predict_row(row.view());
        let grid = self.grid.values();
        let mut responses = vec![0.0; grid.len()];

        let features = features
            .iter()
            .enumerate()
            .map(|(j, feature)| {
                for (response, &value) in responses.iter_mut().zip(grid) {
                    row[j] = value;
                    *response = model.predict_row(row.view());
                }
                row[j] = 0.0;
                FeatureSensitivity {
                    feature: feature.clone(),
                    fit: least_squares_line(grid, &responses),
                }
            })
            .collect();

        SensitivityReport { baseline, features }
    }
}
