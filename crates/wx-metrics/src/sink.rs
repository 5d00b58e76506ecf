use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use wx_common::{Outcome as StepOutcome, StepRecord};

use crate::metric::{
    Metric, Unit, METRIC_DATA_AGE, METRIC_ERRORS, METRIC_FAILURE, METRIC_FILES_DOWNLOADED,
    METRIC_FILES_PROCESSED, METRIC_PROCESSING_TIME, METRIC_STEP_DURATION, METRIC_SUCCESS,
    METRIC_TILES_GENERATED,
};
use crate::publisher::MetricsPublisher;

/// The run's final disposition. Exactly one of `Success`/`Failure` is
/// emitted per run, decided once at the very end of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
}

/// Buffers metrics for the lifetime of a run and flushes them to a
/// [`MetricsPublisher`] in one batch. Buffering (rather than publishing as
/// each metric is recorded) keeps the hot path free of network calls.
pub struct MetricSink<P: MetricsPublisher> {
    publisher: P,
    buffer: Mutex<Vec<Metric>>,
    run_id: Uuid,
    model: String,
}

impl<P: MetricsPublisher> MetricSink<P> {
    pub fn new(publisher: P, run_id: Uuid, model: impl Into<String>) -> Self {
        Self {
            publisher,
            buffer: Mutex::new(Vec::new()),
            run_id,
            model: model.into(),
        }
    }

    fn dimensioned(&self, metric: Metric) -> Metric {
        metric
            .with_dimension("run_id", self.run_id.to_string())
            .with_dimension("model", self.model.clone())
    }

    pub async fn record_step(&self, record: &StepRecord) {
        let mut buf = self.buffer.lock().await;
        buf.push(self.dimensioned(
            Metric::new(METRIC_STEP_DURATION, record.duration_s(), Unit::Seconds)
                .with_dimension("step", record.name.as_str()),
        ));
        if record.outcome == StepOutcome::Failed {
            buf.push(self.dimensioned(Metric::new(METRIC_ERRORS, 1.0, Unit::Count)));
        }
    }

    pub async fn record_files_downloaded(&self, count: u64) {
        self.push_counter(METRIC_FILES_DOWNLOADED, count as f64).await;
    }

    pub async fn record_files_processed(&self, count: u64) {
        self.push_counter(METRIC_FILES_PROCESSED, count as f64).await;
    }

    pub async fn record_tiles_generated(&self, count: u64) {
        self.push_counter(METRIC_TILES_GENERATED, count as f64).await;
    }

    /// A dedicated error, outside of a failed `StepRecord` — e.g. a
    /// best-effort retention delete failure, which increments `Errors`
    /// without failing the stage itself.
    pub async fn record_error(&self) {
        self.push_counter(METRIC_ERRORS, 1.0).await;
    }

    /// Data age in seconds: wall-clock time since the cycle's nominal run
    /// time. Always seconds, never minutes, to remove any ambiguity about
    /// the unit at the consuming dashboard.
    pub async fn record_data_age_seconds(&self, seconds: f64) {
        let mut buf = self.buffer.lock().await;
        buf.push(self.dimensioned(Metric::new(METRIC_DATA_AGE, seconds, Unit::Seconds)));
    }

    /// Total wall time for the run, from the moment the context was built
    /// to the moment this is called — not the sum of per-step durations,
    /// which excludes lock acquisition and workspace setup/teardown.
    pub async fn record_processing_time_seconds(&self, seconds: f64) {
        let mut buf = self.buffer.lock().await;
        buf.push(self.dimensioned(Metric::new(METRIC_PROCESSING_TIME, seconds, Unit::Seconds)));
    }

    async fn push_counter(&self, name: &str, value: f64) {
        let mut buf = self.buffer.lock().await;
        buf.push(self.dimensioned(Metric::new(name, value, Unit::Count)));
    }

    /// Appends exactly one terminal outcome metric. Call once, at the end
    /// of the run, regardless of which stage failed.
    pub async fn finish(&self, outcome: RunOutcome) {
        let name = match outcome {
            RunOutcome::Success => METRIC_SUCCESS,
            RunOutcome::Failure => METRIC_FAILURE,
        };
        let mut buf = self.buffer.lock().await;
        buf.push(self.dimensioned(Metric::new(name, 1.0, Unit::Count)));
    }

    /// Flushes the buffer to the publisher. A publish failure is logged
    /// and the metrics are dropped — metrics are best-effort and must
    /// never fail the run.
    pub async fn flush(&self) {
        let batch = {
            let mut buf = self.buffer.lock().await;
            std::mem::take(&mut *buf)
        };
        if batch.is_empty() {
            return;
        }
        if let Err(e) = self.publisher.publish(&batch).await {
            error!(error = %e, count = batch.len(), "metric flush failed, metrics dropped");
        }
    }

    #[cfg(test)]
    pub async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{FailingPublisher, InMemoryPublisher};
    use chrono::Utc;
    use wx_common::StepName;

    fn step(outcome: StepOutcome) -> StepRecord {
        let now = Utc::now();
        StepRecord {
            name: StepName::Download,
            start_ts: now,
            end_ts: now + chrono::Duration::seconds(2),
            outcome,
            artifact_count: 3,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn flush_sends_buffered_metrics_and_clears_buffer() {
        let sink = MetricSink::new(InMemoryPublisher::default(), Uuid::nil(), "hrrr");
        sink.record_step(&step(StepOutcome::Ok)).await;
        sink.record_files_downloaded(5).await;
        sink.finish(RunOutcome::Success).await;
        assert_eq!(sink.buffered_len().await, 3);

        sink.flush().await;
        assert_eq!(sink.buffered_len().await, 0);
        assert_eq!(sink.publisher.published.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn failed_step_also_emits_an_errors_metric() {
        let sink = MetricSink::new(InMemoryPublisher::default(), Uuid::nil(), "hrrr");
        sink.record_step(&step(StepOutcome::Failed)).await;
        assert_eq!(sink.buffered_len().await, 2);
    }

    #[tokio::test]
    async fn finish_emits_exactly_one_terminal_metric() {
        let sink = MetricSink::new(InMemoryPublisher::default(), Uuid::nil(), "gfs-wave");
        sink.finish(RunOutcome::Failure).await;
        sink.flush().await;
        let published = sink.publisher.published.lock().await;
        assert_eq!(published.len(), 1);
    }

    #[tokio::test]
    async fn flush_failure_is_logged_and_does_not_panic() {
        let sink = MetricSink::new(FailingPublisher, Uuid::nil(), "hrrr");
        sink.record_files_processed(1).await;
        sink.flush().await; // must not panic even though FailingPublisher errors
        assert_eq!(sink.buffered_len().await, 0);
    }
}
