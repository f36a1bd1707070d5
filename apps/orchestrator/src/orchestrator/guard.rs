use std::sync::Arc;

use tokio::time::Instant;
use tracing::warn;

use crate::breaker::CircuitBreakerManager;
use crate::tracker::{PerformanceTracker, TaskRecord};

/// Armed for the duration of a provider call. If the call future is dropped
/// before `disarm`, the attempt is recorded as a connection failure from a
/// spawned task so breaker accounting survives caller cancellation.
pub(super) struct AttemptGuard {
    breakers: Arc<CircuitBreakerManager>,
    tracker: Arc<PerformanceTracker>,
    record: Option<TaskRecord>,
    started: Instant,
}

impl AttemptGuard {
    pub(super) fn arm(
        breakers: Arc<CircuitBreakerManager>,
        tracker: Arc<PerformanceTracker>,
        failure_record: TaskRecord,
    ) -> Self {
        Self {
            breakers,
            tracker,
            record: Some(failure_record),
            started: Instant::now(),
        }
    }

    pub(super) fn disarm(mut self) {
        self.record = None;
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        let Some(mut record) = self.record.take() else {
            return;
        };
        record.processing_time_ms = self.started.elapsed().as_millis() as u64;

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "Call to {} was cancelled outside a runtime; failure not recorded",
                record.model_name
            );
            return;
        };

        let breakers = self.breakers.clone();
        let tracker = self.tracker.clone();
        handle.spawn(async move {
            warn!("Call to {} was cancelled; recording a failure", record.model_name);
            if let Err(e) = breakers.record_failure(&record.model_name).await {
                warn!("Failed to record breaker failure for {}: {e}", record.model_name);
            }
            tracker.record_task(record).await;
        });
    }
}
