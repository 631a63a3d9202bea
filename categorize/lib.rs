#![deny(dead_code)]
#![deny(unused_imports)]

pub mod classify;
pub mod config;
pub mod data;
pub mod filter;
pub mod learner;
pub mod pipeline;
pub mod progress;
pub mod results;
pub mod sensitivity;
pub mod trainer;
pub mod types;

use thiserror::Error;

/// Any failure that aborts a run. Skipped pairs are not errors.
#[derive(Error, Debug)]
pub enum CategorizeError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Data(#[from] data::DataError),
    #[error(transparent)]
    Filter(#[from] filter::FilterError),
    #[error(transparent)]
    Train(#[from] trainer::TrainError),
    #[error(transparent)]
    Grid(#[from] sensitivity::GridError),
    #[error(transparent)]
    Results(#[from] results::ResultsError),
}
