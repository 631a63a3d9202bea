//! The regression capability used by the trainer and the sensitivity analyzer.
//!
//! Sensitivity and classification only need "a fitted function that maps feature rows to
//! predictions". [`Learner`] fits such a function for a parameter set, and [`GridSearch`]
//! picks the best parameter set by repeated k-fold cross-validation. The boosted-tree
//! learner in [`boost`] is the production implementation.

pub mod boost;
pub mod cv;
pub mod tree;

pub use boost::{BoostedTrees, BoostingParams, GradientBoosting};
pub use cv::{CandidateScore, GridSearch, SearchOutcome};

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LearnError {
    #[error("Cannot fit a model on an empty training set.")]
    EmptyTrainingSet,
    #[error("Design matrix has {rows} rows but the target has {targets} values.")]
    ShapeMismatch { rows: usize, targets: usize },
    #[error("Training data contains non-finite values.")]
    NonFiniteInput,
    #[error("Fitting produced a non-finite prediction.")]
    NonFinitePrediction,
    #[error("No hyperparameter candidates were supplied to the search.")]
    NoCandidates,
    #[error("{found} rows cannot be split into {folds} cross-validation folds.")]
    TooFewRowsForFolds { found: usize, folds: usize },
    #[error("Cross-validation needs at least one repeat.")]
    NoRepeats,
}

/// A fitted regression function.
pub trait Regressor {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64;

    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.axis_iter(Axis(0)).map(|row| self.predict_row(row)).collect()
    }
}

/// Something that can fit a [`Regressor`] for a given hyperparameter set.
pub trait Learner: Sync {
    type Params: Clone + fmt::Debug + Send + Sync;
    type Model: Regressor + Send;

    fn fit(
        &self,
        params: &Self::Params,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        seed: u64,
    ) -> Result<Self::Model, LearnError>;

    /// Predictions on `x_valid` for every candidate, in candidate order. Learners that
    /// can share work between candidates override this.
    fn validation_predictions(
        &self,
        candidates: &[Self::Params],
        x_train: ArrayView2<f64>,
        y_train: ArrayView1<f64>,
        x_valid: ArrayView2<f64>,
        seed: u64,
    ) -> Result<Vec<Array1<f64>>, LearnError> {
        candidates
            .iter()
            .map(|params| {
                let model = self.fit(params, x_train, y_train, seed)?;
                Ok(model.predict(x_valid))
            })
            .collect()
    }
}

/// Shared input validation for learners.
pub(crate) fn check_training_input(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<(), LearnError> {
    if x.nrows() != y.len() {
        return Err(LearnError::ShapeMismatch {
            rows: x.nrows(),
            targets: y.len(),
        });
    }
    if y.is_empty() {
        return Err(LearnError::EmptyTrainingSet);
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(LearnError::NonFiniteInput);
    }
    Ok(())
}

/// Root-mean-square error between predictions and targets.
pub fn rmse(predicted: ArrayView1<f64>, actual: ArrayView1<f64>) -> f64 {
    debug_assert_eq!(predicted.len(), actual.len());
    if actual.is_empty() {
        return 0.0;
    }
    let sse: f64 = predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a) * (p - a))
        .sum();
    (sse / actual.len() as f64).sqrt()
}
