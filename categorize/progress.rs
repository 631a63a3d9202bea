use crate::filter::SkipReason;
use crate::types::YearRange;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::io::IsTerminal;

/// Stages a single (industry, year range) pair moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PairStage {
    Filtering,
    Training,
    Analyzing,
    Classifying,
}

impl PairStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Filtering => "predictor selection",
            Self::Training => "cross-validated training",
            Self::Analyzing => "sensitivity analysis",
            Self::Classifying => "classification",
        }
    }
}

impl fmt::Display for PairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting progress over the pairs of a run.
pub trait PairProgressObserver {
    fn on_run_start(&mut self, total_pairs: usize) {
        let _ = total_pairs;
    }
    fn on_stage(&mut self, industry: &str, years: YearRange, stage: PairStage) {
        let _ = (industry, years, stage);
    }
    fn on_pair_skipped(&mut self, industry: &str, years: YearRange, reason: SkipReason) {
        let _ = (industry, years, reason);
    }
    fn on_pair_finish(&mut self, industry: &str, years: YearRange) {
        let _ = (industry, years);
    }
    fn on_run_finish(&mut self) {}
}

#[derive(Default)]
pub struct NoopPairProgress;

impl PairProgressObserver for NoopPairProgress {}

/// Draws a progress bar over pairs on stderr. Nothing is drawn when stderr is not a
/// terminal.
#[derive(Default)]
pub struct ConsolePairProgress {
    bar: Option<ProgressBar>,
}

impl ConsolePairProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PairProgressObserver for ConsolePairProgress {
    fn on_run_start(&mut self, total_pairs: usize) {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(10)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(total_pairs as u64), draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pairs ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        self.bar = Some(bar);
    }

    fn on_stage(&mut self, industry: &str, years: YearRange, stage: PairStage) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{industry} {years}: {stage}"));
        }
    }

    fn on_pair_skipped(&mut self, _industry: &str, _years: YearRange, _reason: SkipReason) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_pair_finish(&mut self, _industry: &str, _years: YearRange) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn on_run_finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message("done");
        }
    }
}
