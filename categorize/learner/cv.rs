//! Hyperparameter selection by repeated k-fold cross-validation.

use super::{LearnError, Learner, rmse};
use ndarray::{ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::ThreadPool;
use rayon::prelude::*;

/// Train/validation row indices for one cross-validation split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Cross-validated score of one candidate.
#[derive(Debug, Clone)]
pub struct CandidateScore<P> {
    pub params: P,
    /// RMSE on the validation rows of every split, in split order.
    pub split_rmse: Vec<f64>,
    pub mean_rmse: f64,
}

/// Winner of a search, refit on the full training set.
#[derive(Debug, Clone)]
pub struct SearchOutcome<M, P> {
    pub model: M,
    pub best_params: P,
    pub best_index: usize,
    /// Mean cross-validated RMSE of the winning candidate.
    pub best_rmse: f64,
    pub scores: Vec<CandidateScore<P>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSearch {
    pub folds: usize,
    pub repeats: usize,
    pub seed: u64,
}

impl GridSearch {
    pub fn new(folds: usize, repeats: usize, seed: u64) -> Self {
        Self {
            folds,
            repeats,
            seed,
        }
    }

    /// `repeats` independent shuffles of `0..n`, each cut into `folds` contiguous folds.
    /// The first `n % folds` folds of a shuffle hold one extra row.
    pub fn splits(&self, n: usize) -> Result<Vec<FoldSplit>, LearnError> {
        if self.repeats == 0 {
            return Err(LearnError::NoRepeats);
        }
        if self.folds < 2 || n < self.folds {
            return Err(LearnError::TooFewRowsForFolds {
                found: n,
                folds: self.folds,
            });
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut splits = Vec::with_capacity(self.folds * self.repeats);

        for _ in 0..self.repeats {
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(&mut rng);

            let base = n / self.folds;
            let extra = n % self.folds;
            let mut start = 0;
            for fold in 0..self.folds {
                let size = base + usize::from(fold < extra);
                let mut valid = order[start..start + size].to_vec();
                let mut train: Vec<usize> = order[..start]
                    .iter()
                    .chain(&order[start + size..])
                    .copied()
                    .collect();
                valid.sort_unstable();
                train.sort_unstable();
                splits.push(FoldSplit { train, valid });
                start += size;
            }
        }
        Ok(splits)
    }

    /// Scores every candidate across all splits on `pool`, then refits the best one on
    /// the full data. Ties keep the earliest candidate.
    pub fn search<L: Learner>(
        &self,
        learner: &L,
        candidates: &[L::Params],
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        pool: &ThreadPool,
    ) -> Result<SearchOutcome<L::Model, L::Params>, LearnError> {
        if candidates.is_empty() {
            return Err(LearnError::NoCandidates);
        }
        let splits = self.splits(y.len())?;

        let per_split: Vec<Vec<f64>> = pool.install(|| {
            splits
                .par_iter()
                .enumerate()
                .map(|(i, split)| -> Result<Vec<f64>, LearnError> {
                    let x_train = x.select(Axis(0), &split.train);
                    let y_train = y.select(Axis(0), &split.train);
                    let x_valid = x.select(Axis(0), &split.valid);
                    let y_valid = y.select(Axis(0), &split.valid);
                    let predictions = learner.validation_predictions(
                        candidates,
                        x_train.view(),
                        y_train.view(),
                        x_valid.view(),
                        self.split_seed(i),
                    )?;
                    Ok(predictions
                        .iter()
                        .map(|p| rmse(p.view(), y_valid.view()))
                        .collect())
                })
                .collect::<Result<Vec<Vec<f64>>, LearnError>>()
        })?;

        let scores: Vec<CandidateScore<L::Params>> = candidates
            .iter()
            .enumerate()
            .map(|(c, params)| {
                let split_rmse: Vec<f64> = per_split.iter().map(|row| row[c]).collect();
                let mean_rmse = split_rmse.iter().sum::<f64>() / split_rmse.len() as f64;
                CandidateScore {
                    params: params.clone(),
                    split_rmse,
                    mean_rmse,
                }
            })
            .collect();

        let mut best_index = 0;
        for (i, score) in scores.iter().enumerate().skip(1) {
            if score.mean_rmse < scores[best_index].mean_rmse {
                best_index = i;
            }
        }
        let best_rmse = scores[best_index].mean_rmse;
        if !best_rmse.is_finite() {
            return Err(LearnError::NonFinitePrediction);
        }

        for score in &scores {
            log::debug!("cv rmse {:.6} for {:?}", score.mean_rmse, score.params);
        }
        log::debug!(
            "best candidate #{best_index} with cv rmse {best_rmse:.6}: {:?}",
            candidates[best_index]
        );

        let model = learner.fit(&candidates[best_index], x, y, self.seed)?;
        Ok(SearchOutcome {
            model,
            best_params: candidates[best_index].clone(),
            best_index,
            best_rmse,
            scores,
        })
    }

    fn split_seed(&self, split: usize) -> u64 {
        self.seed.wrapping_add(split as u64 + 1)
    }
}
