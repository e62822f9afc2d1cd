//! Monetary normalisation: Colombian-formatted amounts → `f64`.
//!
//! Statements print `$ 1.234.567,89`, `(45,00)`, `12,5% M.V.` and the model
//! copies them verbatim. Columns whose name marks them as monetary are
//! converted in place; every other column stays text.
//!
//! Unparseable text becomes `0.0`, matching what the spreadsheet shows for a
//! blank amount. [`try_parse_amount`] exposes the strict variant, and
//! [`normalize_rows`] reports how many cells fell back so the caller can log
//! it.

use crate::output::{Cell, Row};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Case-insensitive substrings that mark a monetary column.
pub const MONETARY_MARKERS: &[&str] = &[
    "amount",
    "balance",
    "payment_total",
    "principal",
    "interest",
    "remaining",
];

static RE_CURRENCY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)COP|USD|EUR|[$€£]|\s").unwrap());

static RE_NOT_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9+\-.]").unwrap());

/// Whether `column` holds money (or a rate) and should be converted.
pub fn is_monetary_column(column: &str) -> bool {
    let name = column.to_lowercase().replace('-', "_");
    MONETARY_MARKERS.iter().any(|m| name.contains(m))
}

/// Strict conversion: `None` when nothing numeric is left.
///
/// Steps: blanks and `nan`/`none`/`null` → `0.0`; parentheses mean
/// negative; currency and whitespace are removed; anything from the first
/// remaining letter on is dropped; `.` thousands separators are removed and
/// the `,` decimal separator becomes `.`; leftover symbols such as `%` are
/// stripped.
pub fn try_parse_amount(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || ["nan", "none", "null"].contains(&s.to_lowercase().as_str()) {
        return Some(0.0);
    }

    let (s, parenthesised) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (inner, true),
        None => (s, false),
    };

    let s = RE_CURRENCY.replace_all(s, "");
    let s = match s.find(|c: char| c.is_alphabetic()) {
        Some(pos) => &s[..pos],
        None => &s[..],
    };
    let s = s.replace('.', "").replace(',', ".");
    let mut s = RE_NOT_NUMERIC.replace_all(&s, "").into_owned();

    // "50.000,00-" is how some ledgers print debits.
    if s.len() > 1 && s.ends_with('-') && !s.starts_with('-') {
        s.pop();
        s.insert(0, '-');
    }

    let value: f64 = s.parse().ok()?;
    Some(if parenthesised { -value.abs() } else { value })
}

/// Lenient conversion: unparseable text becomes `0.0`.
pub fn parse_amount(raw: &str) -> f64 {
    try_parse_amount(raw).unwrap_or_else(|| {
        debug!("Unparseable amount '{}', using 0.0", raw);
        0.0
    })
}

/// Convert every monetary text cell in place.
///
/// Returns how many non-blank cells could not be parsed and were set to
/// `0.0`.
pub fn normalize_rows(rows: &mut [Row]) -> usize {
    let mut fallbacks = 0;
    for row in rows.iter_mut() {
        for (column, cell) in row.iter_mut() {
            if !is_monetary_column(column) {
                continue;
            }
            if let Cell::Text(raw) = cell {
                let value = match try_parse_amount(raw) {
                    Some(v) => v,
                    None => {
                        fallbacks += 1;
                        parse_amount(raw)
                    }
                };
                *cell = Cell::Number(value);
            }
        }
    }
    fallbacks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colombian_formats() {
        assert_eq!(parse_amount("1.234,56"), 1234.56);
        assert_eq!(parse_amount("($45,00)"), -45.0);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("N/A"), 0.0);
        assert_eq!(parse_amount("12,5%"), 12.5);
    }

    #[test]
    fn currency_codes_signs_and_suffixes() {
        assert_eq!(parse_amount("$ 2.500.000,00"), 2_500_000.0);
        assert_eq!(parse_amount("COP 1.000"), 1000.0);
        assert_eq!(parse_amount("-50.000,00"), -50_000.0);
        assert_eq!(parse_amount("50.000,00-"), -50_000.0);
        assert_eq!(parse_amount("1,89% M.V."), 1.89);
        assert_eq!(parse_amount("(1.000)"), -1000.0);
    }

    #[test]
    fn blank_markers_are_zero_not_failures() {
        for raw in ["nan", "None", "null", "   "] {
            assert_eq!(try_parse_amount(raw), Some(0.0), "{raw}");
        }
        assert_eq!(try_parse_amount("N/A"), None);
        assert_eq!(try_parse_amount("---"), None);
    }

    #[test]
    fn monetary_column_detection() {
        for col in ["amount", "Balance", "monthly_interest", "payment-total", "billed_principal", "remaining"] {
            assert!(is_monetary_column(col), "{col}");
        }
        for col in ["date", "description", "installments", "rate_monthly"] {
            assert!(!is_monetary_column(col), "{col}");
        }
    }

    #[test]
    fn rows_are_converted_in_place() {
        let mut rows = vec![
            [("date", "01/03"), ("amount", "-1.500,00"), ("balance", "??")]
                .into_iter()
                .collect::<Row>(),
        ];
        let fallbacks = normalize_rows(&mut rows);
        assert_eq!(fallbacks, 1);
        assert_eq!(rows[0].get("date"), Some(&Cell::from("01/03")));
        assert_eq!(rows[0].get("amount"), Some(&Cell::Number(-1500.0)));
        assert_eq!(rows[0].get("balance"), Some(&Cell::Number(0.0)));
    }
}
