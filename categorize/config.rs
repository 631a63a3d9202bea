//! Run configuration for the categorization engine.
//!
//! The configuration is a plain serde structure persisted as TOML. Every field has a
//! default, so a partial file (or no file at all) yields a complete configuration.
//! Command-line flags are applied on top of the loaded values by the binary.

use crate::learner::boost::BoostingParams;
use crate::types::YearRange;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Codes that exist in only one IO-table vintage because a single older category was
/// split into several newer ones. Dropping them aligns the two schemas.
pub const DEFAULT_DROPPED_COMMODITIES: [&str; 14] = [
    "44RT", "441", "445", "452", "4A0", "531", "HS", "ORE", "622HO", "622", "623", "GFG",
    "GFGD", "GFGN",
];

/// Commodity rows that are not industries and are therefore never trained on.
pub const DEFAULT_NON_INDUSTRY_CODES: [&str; 2] = ["Other", "Used"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The complete set of tunables for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorizeConfig {
    // Scalar keys precede the table-valued ones in the serialized TOML.
    /// Commodity whose usage change is predicted from all the others.
    pub focus_commodity: String,
    /// Divides the model RMSE to form the classification noise floor.
    pub rmse_divisor: f64,
    /// Worker threads for the cross-validated search. Zero uses every core.
    pub jobs: usize,
    pub dropped_commodities: Vec<String>,
    pub non_industry_codes: Vec<String>,
    /// Year ranges processed independently for every industry.
    pub year_ranges: Vec<YearRange>,
    pub test_grid: TestGridConfig,
    pub search: SearchConfig,
    pub cv: CvConfig,
}

impl Default for CategorizeConfig {
    fn default() -> Self {
        Self {
            focus_commodity: "324".to_string(),
            rmse_divisor: 4.0,
            jobs: 10,
            dropped_commodities: DEFAULT_DROPPED_COMMODITIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            non_industry_codes: DEFAULT_NON_INDUSTRY_CODES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            year_ranges: vec![YearRange {
                start: 1964,
                end: 2016,
            }],
            test_grid: TestGridConfig::default(),
            search: SearchConfig::default(),
            cv: CvConfig::default(),
        }
    }
}

/// Bounds and resolution of the counterfactual perturbation grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestGridConfig {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    /// Grid values are rounded to this many decimal places.
    pub decimals: u32,
}

impl Default for TestGridConfig {
    fn default() -> Self {
        Self {
            lower: -0.5,
            upper: 0.5,
            count: 51,
            decimals: 2,
        }
    }
}

/// Half-open `start..stop` range of boosting-round counts, stepped by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundsRange {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl RoundsRange {
    pub fn values(&self) -> Vec<usize> {
        if self.step == 0 {
            return Vec::new();
        }
        (self.start..self.stop).step_by(self.step).collect()
    }
}

/// The hyperparameter grid. Every combination of the listed values is a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub n_estimators: RoundsRange,
    pub max_depth: Vec<usize>,
    pub learning_rate: Vec<f64>,
    pub gamma: Vec<f64>,
    pub min_child_weight: Vec<f64>,
    pub subsample: Vec<f64>,
    pub colsample_bytree: Vec<f64>,
    pub reg_lambda: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_estimators: RoundsRange {
                start: 50,
                stop: 1550,
                step: 50,
            },
            max_depth: vec![2],
            learning_rate: vec![0.01],
            gamma: vec![0.0],
            min_child_weight: vec![1.0],
            subsample: vec![1.0],
            colsample_bytree: vec![1.0],
            reg_lambda: 1.0,
        }
    }
}

impl SearchConfig {
    /// Expands the grid into concrete candidates. The round count varies fastest, so
    /// the earliest candidate among equal scores is the one with the fewest rounds.
    pub fn candidates(&self) -> Vec<BoostingParams> {
        let rounds = self.n_estimators.values();
        let mut out = Vec::new();
        for &max_depth in &self.max_depth {
            for &learning_rate in &self.learning_rate {
                for &gamma in &self.gamma {
                    for &min_child_weight in &self.min_child_weight {
                        for &subsample in &self.subsample {
                            for &colsample_bytree in &self.colsample_bytree {
                                for &n_estimators in &rounds {
                                    out.push(BoostingParams {
                                        n_estimators,
                                        max_depth,
                                        learning_rate,
                                        gamma,
                                        min_child_weight,
                                        subsample,
                                        colsample_bytree,
                                        reg_lambda: self.reg_lambda,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

/// Repeated k-fold cross-validation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CvConfig {
    pub folds: usize,
    pub repeats: usize,
    /// Seed for fold shuffling and row/column subsampling. `None` draws fresh entropy
    /// on every run, which makes RMSE values (and borderline labels) vary between runs.
    /// A missing key in a TOML file means the default seed; only the CLI can unset it.
    pub seed: Option<u64>,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            folds: 4,
            repeats: 2,
            seed: Some(0),
        }
    }
}

impl CategorizeConfig {
    /// Loads a configuration from a TOML file; absent keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&toml_string)?;
        Ok(config)
    }

    /// Saves the configuration in human-readable TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Number of worker threads to hand to the search pool.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.jobs
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(message.into()))
        }

        if self.focus_commodity.trim().is_empty() {
            return invalid("focus_commodity must not be empty");
        }
        if self.year_ranges.is_empty() {
            return invalid("at least one year range is required");
        }
        if let Some(range) = self.year_ranges.iter().find(|r| r.end < r.start) {
            return invalid(format!("year range {range} ends before it starts"));
        }
        if !(self.rmse_divisor.is_finite() && self.rmse_divisor > 0.0) {
            return invalid(format!(
                "rmse_divisor must be a positive finite number, got {}",
                self.rmse_divisor
            ));
        }

        let grid = &self.test_grid;
        if grid.count < 2 {
            return invalid("test_grid.count must be at least 2");
        }
        if !(grid.lower.is_finite() && grid.upper.is_finite() && grid.lower < grid.upper) {
            return invalid(format!(
                "test_grid bounds must be finite with lower < upper, got [{}, {}]",
                grid.lower, grid.upper
            ));
        }
        if grid.decimals > 15 {
            return invalid("test_grid.decimals must be at most 15");
        }

        let search = &self.search;
        if search.n_estimators.values().is_empty() {
            return invalid("search.n_estimators yields no round counts");
        }
        if search.n_estimators.start == 0 {
            return invalid("search.n_estimators must start at one round or more");
        }
        let axes_empty = search.max_depth.is_empty()
            || search.learning_rate.is_empty()
            || search.gamma.is_empty()
            || search.min_child_weight.is_empty()
            || search.subsample.is_empty()
            || search.colsample_bytree.is_empty();
        if axes_empty {
            return invalid("every hyperparameter axis needs at least one value");
        }
        if search.max_depth.contains(&0) {
            return invalid("search.max_depth values must be at least 1");
        }
        if search.learning_rate.iter().any(|&v| !(v.is_finite() && v > 0.0)) {
            return invalid("search.learning_rate values must be positive");
        }
        let fraction_ok = |v: &f64| v.is_finite() && *v > 0.0 && *v <= 1.0;
        if !search.subsample.iter().all(fraction_ok)
            || !search.colsample_bytree.iter().all(fraction_ok)
        {
            return invalid("sampling fractions must lie in (0, 1]");
        }
        let non_negative = |v: &f64| v.is_finite() && *v >= 0.0;
        if !search.gamma.iter().all(non_negative)
            || !search.min_child_weight.iter().all(non_negative)
            || !non_negative(&search.reg_lambda)
        {
            return invalid("gamma, min_child_weight and reg_lambda must be non-negative");
        }

        if self.cv.folds < 2 {
            return invalid("cv.folds must be at least 2");
        }
        if self.cv.repeats < 1 {
            return invalid("cv.repeats must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_reference_settings() {
        let config = CategorizeConfig::default();
        config.validate().unwrap();

        let candidates = config.search.candidates();
        assert_eq!(candidates.len(), 30);
        assert_eq!(candidates.first().map(|c| c.n_estimators), Some(50));
        assert_eq!(candidates.last().map(|c| c.n_estimators), Some(1500));
        assert!(candidates.iter().all(|c| c.max_depth == 2));
        assert_eq!(config.dropped_commodities.len(), 14);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = CategorizeConfig::default();
        config.focus_commodity = "325".to_string();
        config.cv.seed = Some(1997);
        config.year_ranges = vec![
            YearRange {
                start: 1964,
                end: 1996,
            },
            YearRange {
                start: 1998,
                end: 2016,
            },
        ];

        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();
        let loaded = CategorizeConfig::load(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_file_takes_defaults() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "focus_commodity = \"211\"\nrmse_divisor = 2.0\n").unwrap();
        let loaded = CategorizeConfig::load(file.path()).unwrap();
        assert_eq!(loaded.focus_commodity, "211");
        assert_eq!(loaded.rmse_divisor, 2.0);
        assert_eq!(loaded.cv, CvConfig::default());
        assert_eq!(loaded.test_grid.count, 51);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = CategorizeConfig::default();
        config.rmse_divisor = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CategorizeConfig::default();
        config.search.subsample = vec![1.5];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CategorizeConfig::default();
        config.cv.folds = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = CategorizeConfig::default();
        config.search.n_estimators.step = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_jobs_means_all_cores() {
        let mut config = CategorizeConfig::default();
        config.jobs = 0;
        assert!(config.effective_jobs() >= 1);
        config.jobs = 3;
        assert_eq!(config.effective_jobs(), 3);
    }
}
