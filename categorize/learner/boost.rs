//! Gradient-boosted regression trees under squared-error loss.

use super::tree::{RegressionTree, SortedColumns, TreeGrower, TreeParams};
use super::{LearnError, Learner, Regressor, check_training_input};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One point of the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub gamma: f64,
    pub min_child_weight: f64,
    /// Fraction of rows sampled (without replacement) for each tree.
    pub subsample: f64,
    /// Fraction of columns sampled for each tree.
    pub colsample_bytree: f64,
    pub reg_lambda: f64,
}

impl BoostingParams {
    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            gamma: self.gamma,
            min_child_weight: self.min_child_weight,
            reg_lambda: self.reg_lambda,
            learning_rate: self.learning_rate,
        }
    }

    /// True when the two parameter sets grow identical tree sequences and differ at
    /// most in how many rounds they keep.
    fn same_trees_as(&self, other: &Self) -> bool {
        self.tree_params() == other.tree_params()
            && self.subsample == other.subsample
            && self.colsample_bytree == other.colsample_bytree
    }
}

/// A fitted ensemble: the base score plus the sum of every tree's output.
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedTrees {
    base_score: f64,
    trees: Vec<RegressionTree>,
}

impl BoostedTrees {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for BoostedTrees {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

/// Boosting state over one training matrix. Each call to [`BoostingRun::step`] grows the
/// next tree, so a run can be stopped and inspected after any number of rounds.
struct BoostingRun<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    params: BoostingParams,
    sorted: SortedColumns,
    rng: StdRng,
    base_score: f64,
    prediction: Vec<f64>,
    grad: Vec<f64>,
    hess: Vec<f64>,
}

impl<'a> BoostingRun<'a> {
    fn new(params: BoostingParams, x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>, seed: u64) -> Self {
        let n = y.len();
        let base_score = y.mean().unwrap_or(0.0);
        Self {
            x,
            y,
            params,
            sorted: SortedColumns::new(x),
            rng: StdRng::seed_from_u64(seed),
            base_score,
            prediction: vec![base_score; n],
            grad: vec![0.0; n],
            hess: vec![1.0; n],
        }
    }

    fn step(&mut self) -> RegressionTree {
        for (i, g) in self.grad.iter_mut().enumerate() {
            *g = self.prediction[i] - self.y[i];
        }
        let rows = self.sample_rows();
        let features = self.sample_features();

        let tree = TreeGrower::new(self.x.view(), &self.sorted, self.params.tree_params()).grow(
            &self.grad,
            &self.hess,
            rows,
            &features,
        );
        for (i, row) in self.x.axis_iter(Axis(0)).enumerate() {
            self.prediction[i] += tree.predict_row(row);
        }
        tree
    }

    fn sample_rows(&mut self) -> Vec<usize> {
        let n = self.y.len();
        if self.params.subsample >= 1.0 {
            return (0..n).collect();
        }
        let p = self.params.subsample;
        (0..n).filter(|_| self.rng.gen_bool(p)).collect()
    }

    fn sample_features(&mut self) -> Vec<usize> {
        let p = self.x.ncols();
        if self.params.colsample_bytree >= 1.0 || p == 0 {
            return (0..p).collect();
        }
        let k = ((p as f64 * self.params.colsample_bytree).round() as usize).clamp(1, p);
        let mut chosen = index::sample(&mut self.rng, p, k).into_vec();
        chosen.sort_unstable();
        chosen
    }
}

/// The production [`Learner`]: XGBoost-style boosting with exact greedy splits.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientBoosting;

impl Learner for GradientBoosting {
    type Params = BoostingParams;
    type Model = BoostedTrees;

    fn fit(
        &self,
        params: &BoostingParams,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        seed: u64,
    ) -> Result<BoostedTrees, LearnError> {
        check_training_input(x, y)?;
        let mut run = BoostingRun::new(*params, x.view(), y.view(), seed);
        let trees: Vec<RegressionTree> = (0..params.n_estimators).map(|_| run.step()).collect();
        if run.prediction.iter().any(|p| !p.is_finite()) {
            return Err(LearnError::NonFinitePrediction);
        }
        Ok(BoostedTrees {
            base_score: run.base_score,
            trees,
        })
    }

    /// Candidates that only differ in `n_estimators` share a single boosting run; the
    /// validation predictions are read off at each requested round count.
    fn validation_predictions(
        &self,
        candidates: &[BoostingParams],
        x_train: ArrayView2<f64>,
        y_train: ArrayView1<f64>,
        x_valid: ArrayView2<f64>,
        seed: u64,
    ) -> Result<Vec<Array1<f64>>, LearnError> {
        check_training_input(x_train, y_train)?;
        let mut out: Vec<Option<Array1<f64>>> = vec![None; candidates.len()];

        for (lead, params) in candidates.iter().enumerate() {
            if out[lead].is_some() {
                continue;
            }
            let members: Vec<usize> = (lead..candidates.len())
                .filter(|&i| out[i].is_none() && candidates[i].same_trees_as(params))
                .collect();
            let max_rounds = members
                .iter()
                .map(|&i| candidates[i].n_estimators)
                .max()
                .unwrap_or(0);

            let mut run = BoostingRun::new(*params, x_train.view(), y_train.view(), seed);
            let mut valid_prediction = Array1::from_elem(x_valid.nrows(), run.base_score);
            let mut checkpoint = |rounds: usize, prediction: &Array1<f64>| {
                for &i in &members {
                    if candidates[i].n_estimators == rounds {
                        out[i] = Some(prediction.clone());
                    }
                }
            };

            checkpoint(0, &valid_prediction);
            for round in 1..=max_rounds {
                let tree = run.step();
                for (v, row) in valid_prediction.iter_mut().zip(x_valid.axis_iter(Axis(0))) {
                    *v += tree.predict_row(row);
                }
                checkpoint(round, &valid_prediction);
            }
        }

        out.into_iter()
            .map(|prediction| match prediction {
                Some(p) if p.iter().all(|v| v.is_finite()) => Ok(p),
                _ => Err(LearnError::NonFinitePrediction),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::rmse;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn params(n_estimators: usize) -> BoostingParams {
        BoostingParams {
            n_estimators,
            max_depth: 2,
            learning_rate: 0.1,
            gamma: 0.0,
            min_child_weight: 1.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_lambda: 1.0,
        }
    }

    fn linear_data(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, 3), |_| rng.gen_range(-0.5..0.5));
        let y = x.column(0).mapv(|v| 2.0 * v) - x.column(1);
        (x, y)
    }

    #[test]
    fn zero_rounds_predicts_the_mean() {
        let (x, y) = linear_data(20, 1);
        let model = GradientBoosting.fit(&params(0), x.view(), y.view(), 0).unwrap();
        assert_eq!(model.n_trees(), 0);
        let mean = y.mean().unwrap();
        assert_abs_diff_eq!(model.predict_row(x.row(3)), mean, epsilon = 1e-12);
    }

    #[test]
    fn more_rounds_reduce_training_error() {
        let (x, y) = linear_data(60, 2);
        let short = GradientBoosting.fit(&params(10), x.view(), y.view(), 0).unwrap();
        let long = GradientBoosting.fit(&params(200), x.view(), y.view(), 0).unwrap();
        let short_err = rmse(short.predict(x.view()).view(), y.view());
        let long_err = rmse(long.predict(x.view()).view(), y.view());
        assert!(long_err < short_err, "{long_err} !< {short_err}");
        assert!(long_err < 0.1);
    }

    #[test]
    fn fitting_is_deterministic_for_a_seed() {
        let (x, y) = linear_data(40, 3);
        let mut p = params(30);
        p.subsample = 0.7;
        p.colsample_bytree = 0.5;
        let a = GradientBoosting.fit(&p, x.view(), y.view(), 11).unwrap();
        let b = GradientBoosting.fit(&p, x.view(), y.view(), 11).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn staged_predictions_match_independent_fits() {
        let (x, y) = linear_data(50, 4);
        let (x_valid, _) = linear_data(10, 5);
        let mut candidates = vec![params(5), params(20), params(40)];
        let mut deeper = params(20);
        deeper.max_depth = 3;
        candidates.push(deeper);

        let staged = GradientBoosting
            .validation_predictions(&candidates, x.view(), y.view(), x_valid.view(), 9)
            .unwrap();
        assert_eq!(staged.len(), candidates.len());
        for (params, predictions) in candidates.iter().zip(&staged) {
            let model = GradientBoosting.fit(params, x.view(), y.view(), 9).unwrap();
            let direct = model.predict(x_valid.view());
            for (a, b) in predictions.iter().zip(direct.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rejects_non_finite_input() {
        let x = ndarray::array![[0.0], [f64::INFINITY]];
        let y = ndarray::array![1.0, 2.0];
        assert_eq!(
            GradientBoosting.fit(&params(3), x.view(), y.view(), 0),
            Err(LearnError::NonFiniteInput)
        );
    }
}
