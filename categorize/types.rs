// ========================================================================================
//
//                       CORE DATA TYPES FOR THE CATEGORIZATION ENGINE
//
// ========================================================================================
//
// This module holds the small value types that cross module boundaries (`data`,
// `filter`, `pipeline`, `results`). Types used by a single module live in that module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Centered change value marking that an industry did not use a commodity in a year.
/// A raw ratio of zero centers to exactly this value.
pub const MISSING_USAGE_SENTINEL: f64 = -1.0;

/// Name of the raw output-quantity-change predictor, both as a feature and as a
/// result column.
pub const OUTPUT_FEATURE: &str = "quantity_change";

/// Returns true when a centered change value is the missing-usage sentinel.
#[inline]
pub fn is_missing_usage(value: f64) -> bool {
    value == MISSING_USAGE_SENTINEL
}

// ========================================================================================
//                                     YEAR RANGES
// ========================================================================================

/// An inclusive span of years whose substitution patterns are assumed stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum YearRangeError {
    #[error("Year range '{0}' must be written as START:END, e.g. 1964:2016.")]
    Malformed(String),
    #[error("Year range {start}:{end} ends before it starts.")]
    Inverted { start: i32, end: i32 },
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self, YearRangeError> {
        if end < start {
            return Err(YearRangeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    #[inline]
    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    /// The "Y1:Y2" label used in the result tables.
    pub fn label(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for YearRange {
    type Err = YearRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| YearRangeError::Malformed(s.to_string()))?;
        let start: i32 = start
            .trim()
            .parse()
            .map_err(|_| YearRangeError::Malformed(s.to_string()))?;
        let end: i32 = end
            .trim()
            .parse()
            .map_err(|_| YearRangeError::Malformed(s.to_string()))?;
        Self::new(start, end)
    }
}

// ========================================================================================
//                                CLASSIFICATION LABELS
// ========================================================================================

/// The terminal label attached to every (industry, year range, predictor) triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassificationLabel {
    Substitute,
    Complement,
    Neutral,
}

impl ClassificationLabel {
    /// Cell text in the categorization table. Neutral pairs are written as an empty cell.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Substitute => "S",
            Self::Complement => "C",
            Self::Neutral => "",
        }
    }
}

impl fmt::Display for ClassificationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Substitute => "substitute",
            Self::Complement => "complement",
            Self::Neutral => "neutral",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_range_parses_and_labels() {
        let range: YearRange = "1964:2016".parse().unwrap();
        assert_eq!(range, YearRange { start: 1964, end: 2016 });
        assert_eq!(range.label(), "1964:2016");
        assert!(range.contains(1964));
        assert!(range.contains(2016));
        assert!(!range.contains(2017));
    }

    #[test]
    fn single_year_range_is_valid() {
        let range: YearRange = " 1997 : 1997 ".parse().unwrap();
        assert_eq!(range.label(), "1997:1997");
    }

    #[test]
    fn year_range_rejects_bad_input() {
        assert_eq!(
            "2016:1964".parse::<YearRange>(),
            Err(YearRangeError::Inverted {
                start: 2016,
                end: 1964
            })
        );
        assert!(matches!(
            "1964-2016".parse::<YearRange>(),
            Err(YearRangeError::Malformed(_))
        ));
        assert!(matches!(
            "abc:2016".parse::<YearRange>(),
            Err(YearRangeError::Malformed(_))
        ));
    }

    #[test]
    fn sentinel_is_exact() {
        assert!(is_missing_usage(0.0 - 1.0));
        assert!(!is_missing_usage(-0.999_999));
    }
}
