use kubegate_tools::ConfirmationRequest;

/// Typed error for confirmation channels.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel closed before an answer arrived.
    #[error("channel closed")]
    ChannelClosed,

    /// Catch-all for frontend-specific errors.
    #[error("{0}")]
    Other(String),
}

/// Where a risky request is shown to a human (or calling agent) for approval.
///
/// Only an explicit `Ok(true)` lets the request run. An error, a closed
/// channel, or `Ok(false)` all leave it unexecuted.
pub trait Confirm: Send {
    /// Ask whether `request` may proceed.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying I/O fails.
    fn confirm(
        &mut self,
        request: &ConfirmationRequest,
    ) -> impl Future<Output = Result<bool, ChannelError>> + Send;
}

/// Approves everything. For callers that opted out of prompting up front,
/// such as `--yes` on the command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    async fn confirm(&mut self, request: &ConfirmationRequest) -> Result<bool, ChannelError> {
        tracing::info!(
            correlation_id = %request.correlation_id,
            "confirmation assumed"
        );
        Ok(true)
    }
}
