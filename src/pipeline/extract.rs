//! Drive the model over a statement's pages according to its paging strategy.

use crate::error::{truncate_detail, StatementError};
use crate::output::ExtractionResult;
use crate::pipeline::classify::{PagingStrategy, StatementTemplate};
use crate::pipeline::llm::ExtractionClient;
use crate::pipeline::repair::parse_reply;
use crate::progress::Reporter;
use edgequake_llm::ImageData;
use std::slice;
use tracing::warn;

/// Extract rows from encoded pages.
///
/// * [`PagingStrategy::PerPage`]: one call per page. A page whose call or
///   reply fails is logged and contributes no rows; the rest continue.
/// * [`PagingStrategy::SingleBatch`]: one call with every page. Any failure
///   fails the whole file.
pub(crate) fn extract_rows(
    client: &ExtractionClient<'_>,
    file: &str,
    template: StatementTemplate,
    strategy: PagingStrategy,
    pages: &[ImageData],
    reporter: &Reporter,
) -> Result<ExtractionResult, StatementError> {
    match strategy {
        PagingStrategy::PerPage => Ok(extract_per_page(client, file, template, pages, reporter)),
        PagingStrategy::SingleBatch => {
            reporter.line(format!("    Sending {} page(s) in one request", pages.len()));
            let reply = client.request(&template.prompt(), pages)?;
            let rows = parse_reply(&reply)?;
            Ok(ExtractionResult {
                rows,
                pages_total: pages.len(),
                pages_failed: 0,
            })
        }
    }
}

fn extract_per_page(
    client: &ExtractionClient<'_>,
    file: &str,
    template: StatementTemplate,
    pages: &[ImageData],
    reporter: &Reporter,
) -> ExtractionResult {
    let prompt = template.page_prompt().unwrap_or_else(|| template.prompt());
    let total = pages.len();
    let mut result = ExtractionResult {
        pages_total: total,
        ..Default::default()
    };

    reporter.line(format!("    Long statement: sending {total} page(s) one at a time"));
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let outcome = client
            .request(&prompt, slice::from_ref(page))
            .and_then(|reply| parse_reply(&reply));
        match outcome {
            Ok(rows) => {
                reporter.line(format!("      page {page_num}/{total}: {} row(s)", rows.len()));
                result.rows.extend(rows);
            }
            Err(e) => {
                let detail = truncate_detail(&e.to_string());
                warn!("{}: page {}/{} skipped: {}", file, page_num, total, detail);
                reporter.line(format!("      page {page_num}/{total}: skipped ({detail})"));
                result.pages_failed += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::MAX_DETAIL_CHARS;
    use crate::pipeline::llm::{ModelError, Sleeper, VisionModel};
    use crate::progress::ProgressCallback;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replies by call order; records how many images each call carried.
    struct PageModel {
        replies: Mutex<Vec<Result<String, ModelError>>>,
        image_counts: Mutex<Vec<usize>>,
    }

    impl PageModel {
        fn new(mut replies: Vec<Result<String, ModelError>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                image_counts: Mutex::new(Vec::new()),
            }
        }
    }

    impl VisionModel for PageModel {
        fn generate(&self, _prompt: &str, images: &[ImageData]) -> Result<String, ModelError> {
            self.image_counts.lock().unwrap().push(images.len());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ModelError::Rejected("no more replies".into())))
        }
    }

    struct NoSleep;
    impl Sleeper for NoSleep {
        fn sleep(&self, _d: Duration) {}
    }

    fn pages(n: usize) -> Vec<ImageData> {
        (0..n).map(|_| ImageData::new("AAAA", "image/png")).collect()
    }

    fn one_try() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        }
    }

    fn row_reply(n: usize) -> Result<String, ModelError> {
        let rows: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"date": "0{i}/03", "amount": "{i}"}}"#))
            .collect();
        Ok(format!(r#"{{"transactions": [{}]}}"#, rows.join(",")))
    }

    #[test]
    fn per_page_failure_loses_only_that_page() {
        let model = PageModel::new(vec![
            row_reply(2),
            Ok("sorry, I cannot read this".into()),
            Err(ModelError::Unavailable("503".into())),
            row_reply(1),
        ]);
        let client = ExtractionClient::new(&model, &NoSleep, one_try());
        let result = extract_rows(
            &client,
            "CTA_AHORROS_marzo.pdf",
            StatementTemplate::Ledger,
            PagingStrategy::PerPage,
            &pages(4),
            &Reporter::default(),
        )
        .unwrap();

        assert_eq!(result.row_count(), 3);
        assert_eq!(result.pages_total, 4);
        assert_eq!(result.pages_failed, 2);
        assert_eq!(*model.image_counts.lock().unwrap(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn batch_sends_every_page_once() {
        let model = PageModel::new(vec![row_reply(5)]);
        let client = ExtractionClient::new(&model, &NoSleep, one_try());
        let result = extract_rows(
            &client,
            "Nu_marzo.pdf",
            StatementTemplate::InstallmentCard,
            PagingStrategy::SingleBatch,
            &pages(3),
            &Reporter::default(),
        )
        .unwrap();
        assert_eq!(result.row_count(), 5);
        assert_eq!(*model.image_counts.lock().unwrap(), vec![3]);
    }

    #[test]
    fn batch_parse_failure_fails_the_file() {
        let model = PageModel::new(vec![Ok("no json here".into())]);
        let client = ExtractionClient::new(&model, &NoSleep, one_try());
        let err = extract_rows(
            &client,
            "rappi_marzo.pdf",
            StatementTemplate::CoBrandedCard,
            PagingStrategy::SingleBatch,
            &pages(2),
            &Reporter::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StatementError::Parse { .. }));
    }

    #[test]
    fn skipped_page_note_is_cut_to_a_readable_length() {
        let model = PageModel::new(vec![
            Err(ModelError::Rejected(format!("400 Bad Request: {}", "x".repeat(2_000)))),
            row_reply(1),
        ]);
        let client = ExtractionClient::new(&model, &NoSleep, one_try());
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink_lines = Arc::clone(&lines);
        let sink: ProgressCallback =
            Arc::new(move |line: &str| sink_lines.lock().unwrap().push(line.to_string()));

        let result = extract_rows(
            &client,
            "CTA_AHORROS_marzo.pdf",
            StatementTemplate::Ledger,
            PagingStrategy::PerPage,
            &pages(2),
            &Reporter::new(Some(sink)),
        )
        .unwrap();
        assert_eq!(result.pages_failed, 1);

        let lines = lines.lock().unwrap();
        let skipped = lines
            .iter()
            .find(|l| l.contains("page 1/2: skipped"))
            .expect("skip line");
        assert!(skipped.contains('\u{2026}'));
        assert!(skipped.chars().count() < MAX_DETAIL_CHARS + 40);
    }
}
