//! Request shape for one `index()` call (spec §4.7 "Contract").

use codeatlas_core::IndexRequestBundle;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::progress::{NoopProgressObserver, ProgressObserver};

/// Request deadline default (spec §5 "Timeouts").
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(600);

/// One `index(request)` invocation: the validated-on-arrival bundle plus
/// the cross-cutting concerns the orchestrator itself owns (cancellation,
/// deadline, progress).
pub struct IndexRequest {
    pub bundle: IndexRequestBundle,
    pub cancellation: CancellationToken,
    pub deadline: Duration,
    pub progress: Arc<dyn ProgressObserver>,
}

impl IndexRequest {
    pub fn new(bundle: IndexRequestBundle) -> Self {
        Self {
            bundle,
            cancellation: CancellationToken::new(),
            deadline: DEFAULT_DEADLINE,
            progress: Arc::new(NoopProgressObserver),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_progress(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.progress = observer;
        self
    }
}
