//! Statement classification: file name → template, template + size → paging.
//!
//! Issuers are recognised from markers in the file name (statements are
//! saved under names like `CTA_AHORROS_2024_03.pdf`, `Nu_marzo.pdf` or
//! `CREDIT_CARD_RAPPI_0324.pdf`). Matching is case-insensitive. A name with
//! no known marker is treated as an account ledger, the most common layout.

use crate::prompts;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Layouts the extractor knows how to read.
///
/// Each variant owns its prompt wording and its column schema; adding an
/// issuer means adding a variant and letting the compiler point at every
/// `match` that needs a new arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementTemplate {
    /// Savings/checking account movements (Bancolombia).
    Ledger,
    /// Credit card with per-purchase installment breakdown (Nu).
    InstallmentCard,
    /// Co-branded credit card (Davivienda / Rappi).
    CoBrandedCard,
}

const LEDGER_COLUMNS: &[&str] = &["date", "description", "branch", "document", "amount", "balance"];

const INSTALLMENT_CARD_COLUMNS: &[&str] = &[
    "date",
    "description",
    "amount",
    "installments",
    "monthly_amount",
    "monthly_interest",
    "payment_total",
    "remaining",
];

const CO_BRANDED_CARD_COLUMNS: &[&str] = &[
    "card",
    "date",
    "description",
    "transaction_amount",
    "billed_principal",
    "installments",
    "pending_principal",
    "rate_monthly",
    "rate_annual",
];

// Whole-token markers; "nu" as a substring would hit "anual", "numero", ...
// Tokens also break at letter/digit and lower/upper transitions, so
// "Nu2024_03" and "EstadoNu" still yield a "nu" token.
const INSTALLMENT_CARD_TOKENS: &[&str] = &["nu", "nubank"];
const CO_BRANDED_CARD_MARKERS: &[&str] = &["credit_card", "rappi", "davivienda"];
const LEDGER_MARKERS: &[&str] = &["cta_ahorros", "cta_corriente", "bancolombia"];

impl StatementTemplate {
    pub const ALL: [StatementTemplate; 3] = [
        StatementTemplate::Ledger,
        StatementTemplate::InstallmentCard,
        StatementTemplate::CoBrandedCard,
    ];

    /// Expected columns, in worksheet order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            StatementTemplate::Ledger => LEDGER_COLUMNS,
            StatementTemplate::InstallmentCard => INSTALLMENT_CARD_COLUMNS,
            StatementTemplate::CoBrandedCard => CO_BRANDED_CARD_COLUMNS,
        }
    }

    /// Prompt for a whole-statement (batch) request.
    pub fn prompt(self) -> String {
        let instructions = match self {
            StatementTemplate::Ledger => prompts::LEDGER_PROMPT,
            StatementTemplate::InstallmentCard => prompts::INSTALLMENT_CARD_PROMPT,
            StatementTemplate::CoBrandedCard => prompts::CO_BRANDED_CARD_PROMPT,
        };
        prompts::build_prompt(instructions, self.columns())
    }

    /// Prompt for a single-page request, if this layout supports paging.
    pub fn page_prompt(self) -> Option<String> {
        match self {
            StatementTemplate::Ledger => Some(prompts::build_prompt(
                prompts::LEDGER_PAGE_PROMPT,
                self.columns(),
            )),
            StatementTemplate::InstallmentCard | StatementTemplate::CoBrandedCard => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatementTemplate::Ledger => "account ledger",
            StatementTemplate::InstallmentCard => "installment card",
            StatementTemplate::CoBrandedCard => "co-branded card",
        }
    }
}

impl fmt::Display for StatementTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of classifying a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub template: StatementTemplate,
    /// The marker that decided it; `None` when the ledger default applied.
    pub marker: Option<&'static str>,
}

/// Classify a statement by its file name (with or without extension).
pub fn classify(file_name: &str) -> Classification {
    let name = file_name.to_lowercase();

    let tokens = name_tokens(file_name);
    if let Some(marker) = INSTALLMENT_CARD_TOKENS
        .iter()
        .find(|m| tokens.iter().any(|t| t == *m))
    {
        return Classification {
            template: StatementTemplate::InstallmentCard,
            marker: Some(*marker),
        };
    }

    if let Some(marker) = CO_BRANDED_CARD_MARKERS.iter().find(|m| name.contains(*m)) {
        return Classification {
            template: StatementTemplate::CoBrandedCard,
            marker: Some(*marker),
        };
    }

    Classification {
        template: StatementTemplate::Ledger,
        marker: LEDGER_MARKERS.iter().find(|m| name.contains(*m)).copied(),
    }
}

/// Lowercased tokens of a file name.
fn name_tokens(file_name: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;
    for c in file_name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }
        if let Some(p) = prev {
            let boundary = (p.is_alphabetic() != c.is_alphabetic())
                || (p.is_lowercase() && c.is_uppercase());
            if boundary && !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
        prev = Some(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// How a statement's pages are sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStrategy {
    /// One request per page; a failing page only loses its own rows.
    PerPage,
    /// One request carrying every page.
    SingleBatch,
}

impl PagingStrategy {
    /// Long statements go page by page when the layout has a page prompt.
    pub fn select(template: StatementTemplate, page_count: usize, threshold: usize) -> Self {
        if page_count > threshold && template.page_prompt().is_some() {
            PagingStrategy::PerPage
        } else {
            PagingStrategy::SingleBatch
        }
    }
}
