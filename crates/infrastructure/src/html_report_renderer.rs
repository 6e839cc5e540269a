use std::time::Duration;

use async_trait::async_trait;
use evalia_application::{RenderReportInput, ReportRenderer};
use evalia_core::{AppError, AppResult};

/// Renders the compliance artifact as a self-contained HTML document.
///
/// The output is deterministic for a given batch snapshot so the content
/// hash recorded at issuance is reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlReportRenderer;

impl HtmlReportRenderer {
    /// Creates a renderer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn render_document(input: &RenderReportInput) -> AppResult<String> {
        let mut evaluations = input.completed_evaluations.clone();
        evaluations.sort_by_key(|evaluation| evaluation.id());

        let mut document = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Assessment report, wave {ordinal}</title>\n</head>\n<body>\n\
             <h1>Psychosocial assessment report</h1>\n\
             <p>Scope: {scope}</p>\n<p>Wave: {ordinal}</p>\n<p>Batch: {batch_id}</p>\n\
             <p>Completed evaluations: {count}</p>\n<table>\n\
             <tr><th>Evaluation</th><th>Subject</th><th>Responses</th></tr>\n",
            ordinal = input.batch.ordinal(),
            scope = input.batch.scope(),
            batch_id = input.batch.id(),
            count = evaluations.len(),
        );

        for evaluation in &evaluations {
            let responses = serde_json::to_string(evaluation.responses()).map_err(|error| {
                AppError::Internal(format!(
                    "failed to serialize responses of evaluation '{}': {error}",
                    evaluation.id()
                ))
            })?;
            document.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                evaluation.id(),
                evaluation.subject_id(),
                html_escape(&responses),
            ));
        }

        document.push_str("</table>\n</body>\n</html>\n");
        Ok(document)
    }
}

#[async_trait]
impl ReportRenderer for HtmlReportRenderer {
    async fn render(&self, input: RenderReportInput, timeout: Duration) -> AppResult<Vec<u8>> {
        let batch_id = input.batch.id();
        let rendered = tokio::time::timeout(timeout, async move {
            Self::render_document(&input)
        })
        .await
        .map_err(|_| {
            AppError::Internal(format!(
                "report rendering for batch '{batch_id}' timed out after {}s",
                timeout.as_secs()
            ))
        })??;

        Ok(rendered.into_bytes())
    }
}

fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
