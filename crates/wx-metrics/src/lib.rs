//! Metric buffering and publishing for pipeline runs. Production code
//! publishes to AWS CloudWatch; tests swap in an in-memory recorder via
//! the [`MetricsPublisher`] trait.

pub mod metric;
pub mod publisher;
pub mod sink;

pub use metric::{Metric, Unit};
pub use publisher::{CloudWatchPublisher, FailingPublisher, InMemoryPublisher, MetricsPublisher};
pub use sink::{MetricSink, RunOutcome};
