//! Per-pair model training: grid search over the configured candidates, refit of the
//! winner on the full table.

use crate::config::CategorizeConfig;
use crate::learner::{GradientBoosting, GridSearch, LearnError, Learner};
use ndarray::{ArrayView1, ArrayView2};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Only {rows} training rows are available but cross-validation needs at least {folds}.")]
    InsufficientRows { rows: usize, folds: usize },
    #[error("Model fitting failed: {0}")]
    Learn(LearnError),
    #[error("Failed to build the cross-validation worker pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
}

impl From<LearnError> for TrainError {
    fn from(err: LearnError) -> Self {
        match err {
            LearnError::TooFewRowsForFolds { found, folds } => {
                TrainError::InsufficientRows { rows: found, folds }
            }
            other => TrainError::Learn(other),
        }
    }
}

/// The selected model of one pair together with its cross-validated RMSE.
#[derive(Debug, Clone)]
pub struct TrainedModel<M, P> {
    pub model: M,
    pub rmse: f64,
    pub params: P,
}

pub struct ModelTrainer<L: Learner> {
    learner: L,
    candidates: Vec<L::Params>,
    search: GridSearch,
    pool: ThreadPool,
}

impl<L: Learner> ModelTrainer<L> {
    /// `jobs` bounds the number of worker threads used by the search.
    pub fn new(
        learner: L,
        candidates: Vec<L::Params>,
        search: GridSearch,
        jobs: usize,
    ) -> Result<Self, TrainError> {
        if candidates.is_empty() {
            return Err(TrainError::Learn(LearnError::NoCandidates));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .thread_name(|i| format!("cv-worker-{i}"))
            .build()?;
        Ok(Self {
            learner,
            candidates,
            search,
            pool,
        })
    }

    pub fn candidates(&self) -> &[L::Params] {
        &self.candidates
    }

    pub fn train(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<TrainedModel<L::Model, L::Params>, TrainError> {
        let outcome = self
            .search
            .search(&self.learner, &self.candidates, x, y, &self.pool)?;
        Ok(TrainedModel {
            model: outcome.model,
            rmse: outcome.best_rmse,
            params: outcome.best_params,
        })
    }
}

impl ModelTrainer<GradientBoosting> {
    /// Boosted-tree trainer over the configured grid. An unset seed is drawn once here,
    /// so every pair of a run shares it.
    pub fn from_config(config: &CategorizeConfig) -> Result<Self, TrainError> {
        let seed = match config.cv.seed {
            Some(seed) => seed,
            None => {
                let drawn = rand::random::<u64>();
                log::info!("No cross-validation seed configured; drew {drawn}.");
                drawn
            }
        };
        let candidates = config.search.candidates();
        log::info!(
            "Searching {} hyperparameter candidates with {}x repeated {}-fold cross-validation on {} threads.",
            candidates.len(),
            config.cv.repeats,
            config.cv.folds,
            config.effective_jobs()
        );
        Self::new(
            GradientBoosting,
            candidates,
            GridSearch::new(config.cv.folds, config.cv.repeats, seed),
            config.effective_jobs(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RoundsRange, SearchConfig};
    use crate::learner::Regressor;
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn small_config() -> CategorizeConfig {
        CategorizeConfig {
            jobs: 2,
            search: SearchConfig {
                n_estimators: RoundsRange {
                    start: 20,
                    stop: 120,
                    step: 20,
                },
                learning_rate: vec![0.1],
                ..SearchConfig::default()
            },
            ..CategorizeConfig::default()
        }
    }

    #[test]
    fn trains_a_usable_model() {
        let mut rng = StdRng::seed_from_u64(5);
        let x = Array2::from_shape_fn((40, 2), |_| rng.gen_range(-0.4..0.4));
        let y: Array1<f64> = x.column(0).to_owned();

        let trainer = ModelTrainer::from_config(&small_config()).unwrap();
        assert_eq!(trainer.candidates().len(), 5);
        let trained = trainer.train(x.view(), y.view()).unwrap();
        assert!(trained.rmse.is_finite());
        assert!(trained.rmse < 0.2, "cv rmse {}", trained.rmse);

        let low = trained.model.predict_row(ndarray::array![-0.3, 0.0].view());
        let high = trained.model.predict_row(ndarray::array![0.3, 0.0].view());
        assert!(high > low);
    }

    #[test]
    fn too_few_rows_is_reported_as_insufficient() {
        let x = Array2::<f64>::zeros((3, 1));
        let y = Array1::<f64>::zeros(3);
        let trainer = ModelTrainer::from_config(&small_config()).unwrap();
        assert!(matches!(
            trainer.train(x.view(), y.view()),
            Err(TrainError::InsufficientRows { rows: 3, folds: 4 })
        ));
    }

    #[test]
    fn unseeded_configs_still_build() {
        let mut config = small_config();
        config.cv.seed = None;
        let trainer = ModelTrainer::from_config(&config).unwrap();
        assert_eq!(trainer.candidates().len(), 5);
    }
}
