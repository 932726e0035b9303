use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Execution context handed to a job and to every collaborator it calls.
///
/// Carries the cancellation token and the tracing span that plays the role of
/// the job's logger. Layers never mutate a context: they derive a child with
/// [`JobContext::with_span`] and pass that down.
#[derive(Clone, Debug)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Span annotated with the fields of every enclosing layer
    /// (job name, invocation number, prune side, ...).
    span: Span,
}

impl JobContext {
    /// Create a new root context.
    pub fn new(cancellation_token: CancellationToken, span: Span) -> Self {
        Self {
            cancellation_token,
            span,
        }
    }

    /// The span collaborators should log under, or use as `parent:` for their own spans.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Same cancellation scope, different span.
    pub fn with_span(&self, span: Span) -> Self {
        Self {
            cancellation_token: self.cancellation_token.clone(),
            span,
        }
    }

    /// Check if cancellation has been requested.
    ///
    /// Collaborators should check this periodically during long-running
    /// replication or pruning work and return early.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }
}
