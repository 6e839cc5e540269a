use std::time::Duration;

use async_trait::async_trait;
use evalia_core::AppResult;
use evalia_domain::{Batch, Evaluation};

/// Input handed to the artifact renderer: the batch and its completed
/// evaluation data.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReportInput {
    /// The batch being reported.
    pub batch: Batch,
    /// Completed evaluations included in the artifact.
    pub completed_evaluations: Vec<Evaluation>,
}

/// Black-box artifact renderer consumed by the emission coordinator.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Renders the compliance artifact, bounded by the supplied timeout.
    ///
    /// A timeout or failure is retryable: the emission claim is released
    /// and the batch stays completed.
    async fn render(&self, input: RenderReportInput, timeout: Duration) -> AppResult<Vec<u8>>;
}
