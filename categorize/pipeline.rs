//! The run orchestrator: every industry against every year range, one pair at a time.
//!
//! A pair moves through filtering, training, sensitivity analysis and classification
//! before the next pair starts. Skipped pairs are logged and leave no record; any other
//! failure aborts the run. Completed pairs are collected as immutable records and only
//! merged into result tables once every pair has been visited.

use crate::CategorizeError;
use crate::classify::Classifier;
use crate::config::CategorizeConfig;
use crate::data::{ChangeDataset, compare_codes};
use crate::filter::{FeatureFilter, FilterOutcome, SkipReason};
use crate::learner::{GradientBoosting, Learner};
use crate::progress::{PairProgressObserver, PairStage};
use crate::results::{CategorizationTable, CoefficientTable, PairRecord, PredictorResult};
use crate::sensitivity::{SensitivityAnalyzer, TestGrid};
use crate::trainer::ModelTrainer;
use crate::types::{OUTPUT_FEATURE, YearRange};
use itertools::Itertools;

/// A pair that produced no record, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPair {
    pub industry: String,
    pub years: YearRange,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PairOutcome {
    Skipped(SkipReason),
    Completed(PairRecord),
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub records: Vec<PairRecord>,
    pub skipped: Vec<SkippedPair>,
    pub coefficients: CoefficientTable,
    pub categorizations: CategorizationTable,
}

pub struct Categorizer<L: Learner> {
    focus: String,
    year_ranges: Vec<YearRange>,
    non_industry_codes: Vec<String>,
    trainer: ModelTrainer<L>,
    analyzer: SensitivityAnalyzer,
    classifier: Classifier,
}

impl Categorizer<GradientBoosting> {
    /// Builds the boosted-tree engine described by `config`.
    pub fn from_config(config: &CategorizeConfig) -> Result<Self, CategorizeError> {
        config.validate()?;
        let trainer = ModelTrainer::from_config(config)?;
        Self::with_trainer(config, trainer)
    }
}

impl<L: Learner> Categorizer<L> {
    /// Builds an engine around an arbitrary trainer; the rest comes from `config`.
    pub fn with_trainer(
        config: &CategorizeConfig,
        trainer: ModelTrainer<L>,
    ) -> Result<Self, CategorizeError> {
        Ok(Self {
            focus: config.focus_commodity.clone(),
            year_ranges: config.year_ranges.clone(),
            non_industry_codes: config.non_industry_codes.clone(),
            trainer,
            analyzer: SensitivityAnalyzer::new(TestGrid::from_config(&config.test_grid)?),
            classifier: Classifier::new(config.rmse_divisor),
        })
    }

    /// Industries are the dataset's commodity codes that denote producing sectors, in
    /// natural code order.
    pub fn industries(&self, dataset: &ChangeDataset) -> Vec<String> {
        dataset
            .commodities()
            .iter()
            .filter(|code| !self.non_industry_codes.contains(*code))
            .cloned()
            .sorted_by(|a, b| compare_codes(a, b))
            .collect()
    }

    /// Result table columns: every commodity in natural code order, then the output change.
    pub fn result_columns(dataset: &ChangeDataset) -> Vec<String> {
        dataset
            .commodities()
            .iter()
            .cloned()
            .chain(std::iter::once(OUTPUT_FEATURE.to_string()))
            .collect()
    }

    pub fn run(
        &self,
        dataset: &ChangeDataset,
        observer: &mut dyn PairProgressObserver,
    ) -> Result<RunOutput, CategorizeError> {
        let filter = FeatureFilter::new(dataset, &self.focus)?;
        let pairs: Vec<(String, YearRange)> = self
            .industries(dataset)
            .into_iter()
            .cartesian_product(self.year_ranges.iter().copied())
            .collect();
        log::info!(
            "Categorizing {} industry/year-range pairs against focus commodity {}.",
            pairs.len(),
            self.focus
        );

        observer.on_run_start(pairs.len());
        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for (industry, years) in pairs {
            match self.process_pair(&filter, &industry, years, observer)? {
                PairOutcome::Skipped(reason) => {
                    log::info!("Skipping industry {industry} for {years} because {reason}.");
                    observer.on_pair_skipped(&industry, years, reason);
                    skipped.push(SkippedPair {
                        industry,
                        years,
                        reason,
                    });
                }
                PairOutcome::Completed(record) => {
                    observer.on_pair_finish(&industry, years);
                    records.push(record);
                }
            }
        }
        observer.on_run_finish();
        log::info!(
            "Finished: {} pairs categorized, {} skipped.",
            records.len(),
            skipped.len()
        );

        let columns = Self::result_columns(dataset);
        let coefficients = CoefficientTable::coefficients(columns.clone(), &records)?;
        let categorizations = CategorizationTable::categorizations(columns, &records)?;
        Ok(RunOutput {
            records,
            skipped,
            coefficients,
            categorizations,
        })
    }

    /// Runs one pair to completion.
    pub fn process_pair(
        &self,
        filter: &FeatureFilter<'_>,
        industry: &str,
        years: YearRange,
        observer: &mut dyn PairProgressObserver,
    ) -> Result<PairOutcome, CategorizeError> {
        observer.on_stage(industry, years, PairStage::Filtering);
        let table = match filter.select(industry, years)? {
            FilterOutcome::Skip(reason) => return Ok(PairOutcome::Skipped(reason)),
            FilterOutcome::Ready(table) => table,
        };

        observer.on_stage(industry, years, PairStage::Training);
        let trained = self.trainer.train(table.x.view(), table.y.view())?;
        log::info!(
            "Industry {industry} {years}: {} rows, {} predictors, cv rmse {:.6} with {:?}.",
            table.y.len(),
            table.features.len(),
            trained.rmse,
            trained.params
        );

        observer.on_stage(industry, years, PairStage::Analyzing);
        let report = self.analyzer.analyze(&trained.model, &table.features);

        observer.on_stage(industry, years, PairStage::Classifying);
        let predictors = report
            .features
            .into_iter()
            .map(|sensitivity| PredictorResult {
                label: self.classifier.classify(sensitivity.fit.slope, trained.rmse),
                coefficient: sensitivity.fit.slope,
                feature: sensitivity.feature,
            })
            .collect();

        Ok(PairOutcome::Completed(PairRecord {
            industry: industry.to_string(),
            years,
            rmse: trained.rmse,
            predictors,
        }))
    }
}
