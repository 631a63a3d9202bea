//! Per-pair result records and the two wide result tables built from them.
//!
//! During a run every completed pair appends one immutable [`PairRecord`]. Only after
//! the last pair are the records merged into a coefficient table and a categorization
//! table, one row per pair and one column per commodity. A blank cell means the
//! commodity was not a predictor for that pair; in the categorization table a neutral
//! label is also written blank, so both read back as `None`.

use crate::types::{ClassificationLabel, YearRange};
use ahash::AHashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

const KEY_COLUMNS: [&str; 3] = ["industry", "year", "rmse"];

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Failed to access result table '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Result table '{path}' must start with the columns industry, year, rmse.")]
    MissingKeyColumns { path: PathBuf },
    #[error("Result table '{path}', line {line}: cannot parse '{value}' in column '{column}'.")]
    InvalidCell {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },
    #[error("Result table '{path}', line {line}: expected {expected} cells, found {found}.")]
    RowLength {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("Predictor '{0}' has no column in the result table.")]
    UnknownColumn(String),
}

/// Text form of one table cell.
pub trait Cell: Sized + Clone + PartialEq + Debug {
    fn render(&self) -> String;
    /// Parses a non-empty cell. Blank cells never reach this.
    fn parse(text: &str) -> Option<Self>;
}

impl Cell for f64 {
    fn render(&self) -> String {
        ryu::Buffer::new().format(*self).to_string()
    }

    fn parse(text: &str) -> Option<Self> {
        text.parse().ok()
    }
}

impl Cell for ClassificationLabel {
    fn render(&self) -> String {
        self.symbol().to_string()
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "C" => Some(ClassificationLabel::Complement),
            "S" => Some(ClassificationLabel::Substitute),
            _ => None,
        }
    }
}

/// Outcome for one predictor of a completed pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorResult {
    pub feature: String,
    pub coefficient: f64,
    pub label: ClassificationLabel,
}

/// Everything a completed pair contributes to the result tables.
#[derive(Debug, Clone, PartialEq)]
pub struct PairRecord {
    pub industry: String,
    pub years: YearRange,
    pub rmse: f64,
    pub predictors: Vec<PredictorResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow<T> {
    pub industry: String,
    pub years: YearRange,
    pub rmse: f64,
    /// Aligned with [`ResultTable::columns`].
    pub cells: Vec<Option<T>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable<T> {
    columns: Vec<String>,
    rows: Vec<ResultRow<T>>,
}

pub type CoefficientTable = ResultTable<f64>;
pub type CategorizationTable = ResultTable<ClassificationLabel>;

pub fn coefficient_file_name(focus: &str) -> String {
    format!("coefficient_results_focus{focus}.csv")
}

pub fn categorization_file_name(focus: &str) -> String {
    format!("categorization_results_focus{focus}.csv")
}

impl<T: Cell> ResultTable<T> {
    /// Merges pair records into one row each, keeping record order. `cell` picks the
    /// value a predictor contributes; returning `None` leaves the cell blank.
    pub fn from_records(
        columns: Vec<String>,
        records: &[PairRecord],
        cell: impl Fn(&PredictorResult) -> Option<T>,
    ) -> Result<Self, ResultsError> {
        let position: AHashMap<&str, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let mut cells = vec![None; columns.len()];
            for predictor in &record.predictors {
                let &column = position
                    .get(predictor.feature.as_str())
                    .ok_or_else(|| ResultsError::UnknownColumn(predictor.feature.clone()))?;
                cells[column] = cell(predictor);
            }
            rows.push(ResultRow {
                industry: record.industry.clone(),
                years: record.years,
                rmse: record.rmse,
                cells,
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ResultRow<T>] {
        &self.rows
    }

    /// Looks up one cell; `None` for a blank cell or an unknown row or column.
    pub fn cell(&self, industry: &str, years: YearRange, column: &str) -> Option<&T> {
        let column = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|row| row.industry == industry && row.years == years)
            .and_then(|row| row.cells[column].as_ref())
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), ResultsError> {
        let csv_error = |source| ResultsError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;

        let header = KEY_COLUMNS
            .iter()
            .copied()
            .chain(self.columns.iter().map(String::as_str));
        writer.write_record(header).map_err(csv_error)?;

        for row in &self.rows {
            let mut record = Vec::with_capacity(KEY_COLUMNS.len() + row.cells.len());
            record.push(row.industry.clone());
            record.push(row.years.label());
            record.push(row.rmse.render());
            record.extend(
                row.cells
                    .iter()
                    .map(|cell| cell.as_ref().map(Cell::render).unwrap_or_default()),
            );
            writer.write_record(&record).map_err(csv_error)?;
        }
        writer
            .flush()
            .map_err(|e| csv_error(csv::Error::from(e)))?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self, ResultsError> {
        let csv_error = |source| ResultsError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
        let headers = reader.headers().map_err(csv_error)?.clone();
        if headers.len() < KEY_COLUMNS.len()
            || headers.iter().zip(KEY_COLUMNS).any(|(h, k)| h != k)
        {
            return Err(ResultsError::MissingKeyColumns {
                path: path.to_path_buf(),
            });
        }
        let columns: Vec<String> = headers
            .iter()
            .skip(KEY_COLUMNS.len())
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let invalid = |column: &str, value: &str| ResultsError::InvalidCell {
                path: path.to_path_buf(),
                line,
                column: column.to_string(),
                value: value.to_string(),
            };
            if record.len() != headers.len() {
                return Err(ResultsError::RowLength {
                    path: path.to_path_buf(),
                    line,
                    expected: headers.len(),
                    found: record.len(),
                });
            }

            let year_text = &record[1];
            let years: YearRange = year_text
                .parse()
                .map_err(|_| invalid("year", year_text))?;
            let rmse = <f64 as Cell>::parse(&record[2]).ok_or_else(|| invalid("rmse", &record[2]))?;

            let mut cells = Vec::with_capacity(columns.len());
            for (column, text) in columns.iter().zip(record.iter().skip(KEY_COLUMNS.len())) {
                if text.is_empty() {
                    cells.push(None);
                } else {
                    cells.push(Some(T::parse(text).ok_or_else(|| invalid(column, text))?));
                }
            }
            rows.push(ResultRow {
                industry: record[0].to_string(),
                years,
                rmse,
                cells,
            });
        }
        Ok(Self { columns, rows })
    }
}

impl CoefficientTable {
    pub fn coefficients(columns: Vec<String>, records: &[PairRecord]) -> Result<Self, ResultsError> {
        Self::from_records(columns, records, |p| Some(p.coefficient))
    }
}

impl CategorizationTable {
    /// Neutral predictors are stored blank, matching how they are written.
    pub fn categorizations(columns: Vec<String>, records: &[PairRecord]) -> Result<Self, ResultsError> {
        Self::from_records(columns, records, |p| match p.label {
            ClassificationLabel::Neutral => None,
            label => Some(label),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn columns() -> Vec<String> {
        ["324", "325", "326", "quantity_change"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn records() -> Vec<PairRecord> {
        let predictor = |feature: &str, coefficient: f64, label| PredictorResult {
            feature: feature.to_string(),
            coefficient,
            label,
        };
        vec![
            PairRecord {
                industry: "211".to_string(),
                years: YearRange::new(1970, 1975).unwrap(),
                rmse: 0.25,
                predictors: vec![
                    predictor("325", 0.1 + 0.2, ClassificationLabel::Complement),
                    predictor("326", -1.0 / 3.0, ClassificationLabel::Substitute),
                    predictor("quantity_change", 1e-9, ClassificationLabel::Neutral),
                ],
            },
            PairRecord {
                industry: "22".to_string(),
                years: YearRange::new(1964, 2016).unwrap(),
                rmse: 0.0,
                predictors: vec![predictor("326", -0.0, ClassificationLabel::Neutral)],
            },
        ]
    }

    #[test]
    fn records_merge_into_rows() {
        let table = CoefficientTable::coefficients(columns(), &records()).unwrap();
        assert_eq!(table.rows().len(), 2);
        let years = YearRange::new(1970, 1975).unwrap();
        assert_eq!(table.cell("211", years, "325"), Some(&(0.1 + 0.2)));
        assert_eq!(table.cell("211", years, "324"), None);

        let labels = CategorizationTable::categorizations(columns(), &records()).unwrap();
        assert_eq!(labels.cell("211", years, "326"), Some(&ClassificationLabel::Substitute));
        assert_eq!(labels.cell("211", years, "quantity_change"), None);
    }

    #[test]
    fn unknown_predictor_is_rejected() {
        let mut bad = records();
        bad[0].predictors[0].feature = "999".to_string();
        assert!(matches!(
            CoefficientTable::coefficients(columns(), &bad),
            Err(ResultsError::UnknownColumn(column)) if column == "999"
        ));
    }

    #[test]
    fn written_tables_read_back_identically() {
        let dir = tempdir().unwrap();

        let coefficients = CoefficientTable::coefficients(columns(), &records()).unwrap();
        let path = dir.path().join(coefficient_file_name("324"));
        coefficients.write_csv(&path).unwrap();
        let reloaded = CoefficientTable::read_csv(&path).unwrap();
        assert_eq!(reloaded, coefficients);
        for (a, b) in reloaded.rows().iter().zip(coefficients.rows()) {
            assert_eq!(a.rmse.to_bits(), b.rmse.to_bits());
            for (x, y) in a.cells.iter().zip(&b.cells) {
                assert_eq!(x.map(f64::to_bits), y.map(f64::to_bits));
            }
        }

        let labels = CategorizationTable::categorizations(columns(), &records()).unwrap();
        let path = dir.path().join(categorization_file_name("324"));
        labels.write_csv(&path).unwrap();
        assert_eq!(CategorizationTable::read_csv(&path).unwrap(), labels);
    }

    #[test]
    fn file_layout_matches_expected_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        CategorizationTable::categorizations(columns(), &records())
            .unwrap()
            .write_csv(&path)
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "industry,year,rmse,324,325,326,quantity_change");
        assert_eq!(lines[1], "211,1970:1975,0.25,,C,S,");
        assert_eq!(lines[2], "22,1964:2016,0.0,,,,");
    }

    #[test]
    fn malformed_header_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "industry,rmse,year\n211,0.1,1970:1975\n").unwrap();
        assert!(matches!(
            CoefficientTable::read_csv(&path),
            Err(ResultsError::MissingKeyColumns { .. })
        ));
    }

    #[test]
    fn unparsable_cell_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "industry,year,rmse,325\n211,1970:1975,0.1,X\n").unwrap();
        assert!(matches!(
            CategorizationTable::read_csv(&path),
            Err(ResultsError::InvalidCell { column, .. }) if column == "325"
        ));
    }
}
