//! Consolidation and export: one worksheet per statement, one workbook per run.
//!
//! [`SheetAccumulator`] collects successful statements while the batch runs
//! and turns into an immutable [`ConsolidatedOutput`], which is written
//! exactly once. Writing goes through `<name>.xlsx.tmp` and a rename, and an
//! existing workbook is moved aside to a timestamped backup first, so a run
//! never destroys a previous result and never leaves a half-written one.

use crate::error::ExportError;
use crate::output::{Cell, Row};
use rust_xlsxwriter::{Format, Workbook};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Longest text a single xlsx cell holds.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Longest worksheet name the xlsx format accepts.
pub const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN_SHEET_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Worksheet name for a file stem: forbidden characters become `_`, the
/// result is cut to [`MAX_SHEET_NAME_LEN`] characters.
pub fn sheet_name(stem: &str) -> String {
    let cleaned: String = stem
        .trim()
        .chars()
        .map(|c| if FORBIDDEN_SHEET_CHARS.contains(&c) { '_' } else { c })
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    // Excel also rejects a leading or trailing apostrophe.
    let cleaned = cleaned.trim_matches('\'');
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Make `base` unique against `taken` (compared case-insensitively, as
/// Excel does) by appending `~2`, `~3`, … while staying within the limit.
fn unique_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(&base.to_lowercase()) {
        return base.to_string();
    }
    let mut n = 2usize;
    loop {
        let suffix = format!("~{n}");
        let keep = MAX_SHEET_NAME_LEN - suffix.chars().count();
        let candidate: String = base.chars().take(keep).chain(suffix.chars()).collect();
        if !taken.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// One worksheet: header plus rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Collects successful statements during a run.
#[derive(Debug, Default)]
pub struct SheetAccumulator {
    sheets: Vec<SheetTable>,
    taken: HashSet<String>,
}

impl SheetAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one statement's rows and return the sheet built for them.
    ///
    /// Exact duplicate rows are dropped. Columns are ordered with the
    /// template's `expected` columns first, then any others the model
    /// returned, in first-seen order.
    pub fn push(&mut self, stem: &str, expected: &[&str], rows: Vec<Row>) -> &SheetTable {
        let name = unique_name(&sheet_name(stem), &self.taken);
        self.taken.insert(name.to_lowercase());

        let before = rows.len();
        let mut unique: Vec<Row> = Vec::with_capacity(before);
        for row in rows {
            if !unique.contains(&row) {
                unique.push(row);
            }
        }
        if unique.len() < before {
            debug!("Sheet '{}': dropped {} duplicate row(s)", name, before - unique.len());
        }

        let columns = order_columns(expected, &unique);
        self.sheets.push(SheetTable {
            name,
            columns,
            rows: unique,
        });
        &self.sheets[self.sheets.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Freeze the collected sheets.
    pub fn finish(self) -> ConsolidatedOutput {
        ConsolidatedOutput {
            sheets: self.sheets,
        }
    }
}

fn order_columns(expected: &[&str], rows: &[Row]) -> Vec<String> {
    let present: HashSet<&str> = rows.iter().flat_map(|r| r.columns()).collect();
    let mut columns: Vec<String> = expected
        .iter()
        .filter(|c| present.contains(*c))
        .map(|c| c.to_string())
        .collect();
    for row in rows {
        for col in row.columns() {
            if !columns.iter().any(|c| c == col) {
                columns.push(col.to_string());
            }
        }
    }
    columns
}

/// What [`ConsolidatedOutput::write`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    /// Where the previous workbook was moved, if there was one.
    pub backup: Option<PathBuf>,
}

/// The run's worksheets, in processing order. Read-only once built.
#[derive(Debug, Clone)]
pub struct ConsolidatedOutput {
    sheets: Vec<SheetTable>,
}

impl ConsolidatedOutput {
    pub fn sheets(&self) -> &[SheetTable] {
        &self.sheets
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Write the workbook to `dest`, backing up whatever is there.
    pub fn write(&self, dest: &Path) -> Result<ExportReport, ExportError> {
        if self.is_empty() {
            return Err(ExportError::Empty);
        }

        let tmp = tmp_path_for(dest);
        if let Err(e) = self.save_workbook(&tmp) {
            discard(&tmp);
            return Err(e);
        }

        let backup = match backup_existing(dest) {
            Ok(b) => b,
            Err(e) => {
                discard(&tmp);
                return Err(e);
            }
        };

        std::fs::rename(&tmp, dest).map_err(|source| {
            discard(&tmp);
            ExportError::Finalize {
                path: dest.to_path_buf(),
                source,
            }
        })?;

        info!("Wrote {} worksheet(s) to {}", self.sheets.len(), dest.display());
        Ok(ExportReport {
            path: dest.to_path_buf(),
            backup,
        })
    }

    fn save_workbook(&self, path: &Path) -> Result<(), ExportError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();

        for sheet in &self.sheets {
            let sheet_err = |source| ExportError::Sheet {
                sheet: sheet.name.clone(),
                source,
            };
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(&sheet.name).map_err(sheet_err)?;

            for (col, name) in sheet.columns.iter().enumerate() {
                worksheet
                    .write_string_with_format(0, col as u16, fit_cell(&sheet.name, name), &header)
                    .map_err(sheet_err)?;
            }

            for (r, row) in sheet.rows.iter().enumerate() {
                let xr = (r + 1) as u32;
                for (col, name) in sheet.columns.iter().enumerate() {
                    match row.get(name) {
                        Some(Cell::Text(s)) if !s.is_empty() => {
                            worksheet
                                .write_string(xr, col as u16, fit_cell(&sheet.name, s))
                                .map_err(sheet_err)?;
                        }
                        Some(Cell::Number(n)) => {
                            worksheet.write_number(xr, col as u16, *n).map_err(sheet_err)?;
                        }
                        _ => {}
                    }
                }
            }

            worksheet.set_freeze_panes(1, 0).map_err(sheet_err)?;
            worksheet.autofit();
            debug!("Built sheet '{}' ({} rows)", sheet.name, sheet.rows.len());
        }

        workbook.save(path).map_err(|source| ExportError::Save {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Cut text to [`MAX_CELL_CHARS`] on a char boundary.
fn fit_cell<'a>(sheet: &str, text: &'a str) -> &'a str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((cut, _)) => {
            warn!(
                "Sheet '{}': cell of {} chars cut to {}",
                sheet,
                text.chars().count(),
                MAX_CELL_CHARS
            );
            &text[..cut]
        }
        None => text,
    }
}

/// `out/Extractos.xlsx` → `out/Extractos.xlsx.tmp`.
fn tmp_path_for(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{name}.tmp"))
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Move an existing `dest` to `<stem>.backup-<YYYYmmdd-HHMMSS>.xlsx`.
pub fn backup_existing(dest: &Path) -> Result<Option<PathBuf>, ExportError> {
    if !dest.exists() {
        return Ok(None);
    }
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let backup = backup_path_for(dest, &stamp);
    std::fs::rename(dest, &backup).map_err(|source| ExportError::Backup {
        path: dest.to_path_buf(),
        source,
    })?;
    info!("Existing workbook moved to {}", backup.display());
    Ok(Some(backup))
}

/// First free backup name for `dest` with timestamp `stamp`.
fn backup_path_for(dest: &Path, stamp: &str) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = dest
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "xlsx".to_string());

    let mut candidate = dest.with_file_name(format!("{stem}.backup-{stamp}.{ext}"));
    let mut n = 2;
    while candidate.exists() {
        candidate = dest.with_file_name(format!("{stem}.backup-{stamp}-{n}.{ext}"));
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn sheet_names_are_sanitised_and_truncated() {
        assert_eq!(sheet_name("CTA_AHORROS_2024"), "CTA_AHORROS_2024");
        assert_eq!(sheet_name("a/b:c[d]"), "a_b_c_d_");
        let long = "CTA_AHORROS_1234567890_EXTRACTO_MARZO";
        assert_eq!(sheet_name(long).chars().count(), MAX_SHEET_NAME_LEN);
        assert_eq!(sheet_name("'quoted'"), "quoted");
        assert_eq!(sheet_name("   "), "Sheet");
    }

    #[test]
    fn colliding_names_get_suffixes_within_limit() {
        let mut acc = SheetAccumulator::new();
        let stem = "CTA_AHORROS_1234567890_EXTRACTO_MARZO";
        let a = acc.push(stem, &[], vec![row(&[("a", "1")])]).name.clone();
        let b = acc.push(&format!("{stem}_B"), &[], vec![row(&[("a", "1")])]).name.clone();
        let c = acc.push(&stem.to_lowercase(), &[], vec![row(&[("a", "1")])]).name.clone();
        assert_eq!(a.chars().count(), 31);
        assert!(b.ends_with("~2"), "{b}");
        assert!(c.ends_with("~3"), "{c}");
        assert_eq!(b.chars().count(), 31);
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn duplicates_dropped_and_columns_ordered() {
        let mut acc = SheetAccumulator::new();
        let rows = vec![
            row(&[("extra", "x"), ("amount", "1"), ("date", "01/03")]),
            row(&[("extra", "x"), ("amount", "1"), ("date", "01/03")]),
            row(&[("date", "02/03"), ("note", "n")]),
        ];
        let pushed = acc.push("s", &["date", "description", "amount"], rows);
        assert_eq!(pushed.rows.len(), 2);
        let out = acc.finish();
        let sheet = &out.sheets()[0];
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.columns, vec!["date", "amount", "extra", "note"]);
    }

    #[test]
    fn empty_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SheetAccumulator::new()
            .finish()
            .write(&dir.path().join("out.xlsx"))
            .unwrap_err();
        assert!(matches!(err, ExportError::Empty));
    }

    #[test]
    fn backup_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("Extractos_Consolidados.xlsx");
        let first = backup_path_for(&dest, "20240301-120000");
        assert_eq!(
            first.file_name().unwrap(),
            "Extractos_Consolidados.backup-20240301-120000.xlsx"
        );
        std::fs::write(&first, b"old").unwrap();
        let second = backup_path_for(&dest, "20240301-120000");
        assert_eq!(
            second.file_name().unwrap(),
            "Extractos_Consolidados.backup-20240301-120000-2.xlsx"
        );
    }

    #[test]
    fn write_twice_keeps_a_backup() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.xlsx");

        let mut acc = SheetAccumulator::new();
        acc.push("one", &["date"], vec![row(&[("date", "01/03")])]);
        let out = acc.finish();

        let first = out.write(&dest).unwrap();
        assert!(first.backup.is_none());
        let second = out.write(&dest).unwrap();
        let backup = second.backup.expect("second write must back up the first");
        assert!(backup.exists());
        assert!(dest.exists());
        assert!(!tmp_path_for(&dest).exists());
    }

    #[test]
    fn runaway_cell_is_cut_instead_of_failing_the_workbook() {
        use calamine::{open_workbook, DataType, Reader, Xlsx};

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.xlsx");
        let runaway = "COMPRA ÉXITO ".repeat(3_100);
        assert!(runaway.chars().count() > MAX_CELL_CHARS);

        let mut acc = SheetAccumulator::new();
        acc.push("good", &["date"], vec![row(&[("date", "01/03")])]);
        acc.push(
            "runaway",
            &["date", "description"],
            vec![row(&[("date", "02/03"), ("description", runaway.as_str())])],
        );
        acc.finish().write(&dest).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&dest).unwrap();
        assert_eq!(workbook.sheet_names().to_vec(), vec!["good", "runaway"]);
        let range = workbook.worksheet_range("runaway").unwrap().unwrap();
        match range.get_value((1, 1)) {
            Some(DataType::String(s)) => assert_eq!(s.chars().count(), MAX_CELL_CHARS),
            other => panic!("expected the cut description, got {other:?}"),
        }
    }

    #[test]
    fn fit_cell_leaves_short_text_alone() {
        assert_eq!(fit_cell("s", "PAGO NOMINA"), "PAGO NOMINA");
        let exact = "é".repeat(MAX_CELL_CHARS);
        assert_eq!(fit_cell("s", &exact).len(), exact.len());
    }
}
