//! Result types: rows, per-file reports, and the run outcome.

use crate::pipeline::classify::StatementTemplate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A single cell value.
///
/// Everything the model returns starts out as [`Cell::Text`]; monetary
/// columns become [`Cell::Number`] after normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            Cell::Number(_) => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

/// One transaction: an insertion-ordered mapping from column name to value.
///
/// The column set depends entirely on the statement template, so rows are
/// not a fixed struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Cell)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column` to `value`, keeping the column's original position if it
    /// already exists.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Cell>) {
        let column = column.into();
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Cell)> {
        self.cells.iter_mut().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Rows extracted from one statement, plus counters used for logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionResult {
    pub rows: Vec<Row>,
    /// Pages sent to the model (all of them in batch mode).
    pub pages_total: usize,
    /// Pages whose call or reply failed (per-page mode only).
    pub pages_failed: usize,
}

impl ExtractionResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of distinct column names across all rows.
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.columns())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Outcome of one statement file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Success,
    Skipped { reason: String },
}

/// Report for one source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementFile {
    pub source: PathBuf,
    pub template: Option<StatementTemplate>,
    pub page_count: usize,
    pub row_count: usize,
    pub column_count: usize,
    /// Worksheet name, set once the file's rows were accepted.
    pub sheet_name: Option<String>,
    pub status: FileStatus,
}

impl StatementFile {
    pub fn pending(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            template: None,
            page_count: 0,
            row_count: 0,
            column_count: 0,
            sheet_name: None,
            status: FileStatus::Pending,
        }
    }

    /// File name for log lines.
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    /// Base name without extension; the worksheet name derives from it.
    pub fn stem(&self) -> String {
        self.source
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name())
    }

    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Success
    }
}

/// How a run ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The folder held no candidate PDFs.
    NothingFound,
    /// Every file was skipped; no workbook was written.
    NothingExtracted { files: Vec<StatementFile> },
    /// At least one file succeeded and the workbook was written.
    Exported {
        path: PathBuf,
        files: Vec<StatementFile>,
    },
}

impl RunOutcome {
    /// Path of the written workbook, if any.
    pub fn artifact(&self) -> Option<&Path> {
        match self {
            RunOutcome::Exported { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn files(&self) -> &[StatementFile] {
        match self {
            RunOutcome::NothingFound => &[],
            RunOutcome::NothingExtracted { files } | RunOutcome::Exported { files, .. } => files,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.files().iter().filter(|f| f.is_success()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_keeps_insertion_order_and_replaces_in_place() {
        let mut row = Row::new();
        row.insert("date", "01/02");
        row.insert("amount", "1.000");
        row.insert("date", "02/02");
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["date", "amount"]);
        assert_eq!(row.get("date"), Some(&Cell::from("02/02")));
    }

    #[test]
    fn column_count_is_distinct() {
        let a: Row = [("date", "1"), ("amount", "2")].into_iter().collect();
        let b: Row = [("date", "3"), ("balance", "4")].into_iter().collect();
        let result = ExtractionResult {
            rows: vec![a, b],
            pages_total: 1,
            pages_failed: 0,
        };
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.column_count(), 3);
    }

    #[test]
    fn outcome_artifact() {
        let out = RunOutcome::Exported {
            path: PathBuf::from("/x/out.xlsx"),
            files: vec![],
        };
        assert_eq!(out.artifact(), Some(Path::new("/x/out.xlsx")));
        assert!(RunOutcome::NothingFound.artifact().is_none());
    }

    #[test]
    fn statement_file_names() {
        let f = StatementFile::pending("/data/Nu_2024_03.pdf");
        assert_eq!(f.file_name(), "Nu_2024_03.pdf");
        assert_eq!(f.stem(), "Nu_2024_03");
        assert!(!f.is_success());
    }

    #[test]
    fn skipped_status_serialises_with_reason() {
        let status = FileStatus::Skipped {
            reason: "wrong password".into(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"status":"skipped","reason":"wrong password"}"#);
    }
}
