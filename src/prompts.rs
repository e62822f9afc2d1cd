//! Extraction prompts, one per statement template.
//!
//! Every prompt ends with the same JSON contract: a single object whose
//! [`ROWS_FIELD`] holds one object per transaction, keyed by the template's
//! column names. The contract line is generated from the column list in
//! [`crate::pipeline::classify`] so the prompt and the worksheet header can
//! never drift apart.
//!
//! Statements are Colombian and printed in Spanish; the instructions name the
//! printed column headers so the model can find the right table, while the
//! JSON keys stay stable English identifiers.

/// Top-level field of the reply that carries the row list.
pub const ROWS_FIELD: &str = "transactions";

/// Savings/checking account ledger (Bancolombia layout), whole statement.
pub const LEDGER_PROMPT: &str = r#"Extract the account movements from this Bancolombia bank statement.

The movements table has the printed columns FECHA, DESCRIPCIÓN, SUCURSAL, DCTO., VALOR, SALDO.

Rules:
- Extract EVERY movement row on every page, in order
- Copy values exactly as printed, including signs, dots and commas
- Ignore balance summaries, headers, footers and advertising"#;

/// Ledger layout, one page at a time.
pub const LEDGER_PAGE_PROMPT: &str = r#"Analyse this single page of a Bancolombia bank statement and extract ONLY the transactions.

Look for the movements table with the printed columns FECHA, DESCRIPCIÓN, SUCURSAL, DCTO., VALOR, SALDO.

Rules:
- Extract ALL transactions visible on this page
- Do not skip any row
- If you see summary information, ignore it
- If the page has no movements table, return an empty list
- Copy values exactly as printed, including the sign"#;

/// Nu credit card: purchases with installment breakdown.
pub const INSTALLMENT_CARD_PROMPT: &str = r#"Extract the transactions from this Nu credit card statement.

The printed columns are: Fecha, Descripción, Valor, Cuotas, Valor del mes, Interés del mes, Total a pagar, Restante.

Rules:
- Ignore headers and advertising
- Copy values exactly as printed"#;

/// Davivienda co-branded (Rappi) credit card.
pub const CO_BRANDED_CARD_PROMPT: &str = r#"Extract the transactions from this Davivienda (Rappi) credit card statement.

Look for "Detalle de transacciones" with the printed columns: Tarjeta, Fecha, Descripción, Valor transacción, Capital facturado, Cuotas, Capital pendiente, Tasa M.V., Tasa E.A.

Rules:
- Ignore headers, payment summaries and advertising
- Copy values exactly as printed"#;

/// Build the JSON contract line for a column set.
///
/// ```text
/// {"transactions": [{"date":"","amount":""}]}
/// ```
pub fn json_contract(columns: &[&str]) -> String {
    let fields = columns
        .iter()
        .map(|c| format!("\"{c}\":\"\""))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{\"{ROWS_FIELD}\": [{{{fields}}}]}}")
}

/// Assemble a full prompt: instructions, the JSON contract, and the
/// "JSON only" footer.
pub fn build_prompt(instructions: &str, columns: &[&str]) -> String {
    format!(
        "{instructions}\n\nFormat:\n{}\n\nRespond ONLY with the JSON, no additional text.",
        json_contract(columns)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_lists_every_column() {
        let line = json_contract(&["date", "amount"]);
        assert_eq!(line, r#"{"transactions": [{"date":"","amount":""}]}"#);
        // The contract itself must be valid JSON.
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert!(v[ROWS_FIELD].is_array());
    }

    #[test]
    fn built_prompt_ends_with_json_only_instruction() {
        let p = build_prompt(LEDGER_PROMPT, &["date"]);
        assert!(p.starts_with("Extract the account movements"));
        assert!(p.contains(r#""date":"""#));
        assert!(p.ends_with("no additional text."));
    }
}
