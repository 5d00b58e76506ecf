use async_trait::async_trait;
use aws_sdk_cloudwatch::types::{Dimension, MetricDatum, StandardUnit};
use tracing::warn;

use crate::metric::{Metric, Unit};

/// Where a flushed batch of metrics goes. Production wires
/// [`CloudWatchPublisher`]; tests use an in-memory recorder so assertions
/// never depend on network access.
#[async_trait]
pub trait MetricsPublisher: Send + Sync {
    async fn publish(&self, metrics: &[Metric]) -> anyhow::Result<()>;
}

/// Publishes to AWS CloudWatch under a fixed namespace, chunked to
/// CloudWatch's 20-datum-per-call limit.
pub struct CloudWatchPublisher {
    client: aws_sdk_cloudwatch::Client,
    namespace: String,
}

impl CloudWatchPublisher {
    pub async fn new(namespace: impl Into<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self {
            client: aws_sdk_cloudwatch::Client::new(&config),
            namespace: namespace.into(),
        }
    }

    fn to_datum(metric: &Metric) -> MetricDatum {
        let unit = match metric.unit {
            Unit::Count => StandardUnit::Count,
            Unit::Seconds => StandardUnit::Seconds,
            Unit::None => StandardUnit::None,
        };
        let dimensions: Vec<Dimension> = metric
            .dimensions
            .iter()
            .map(|(k, v)| Dimension::builder().name(k).value(v).build())
            .collect();
        MetricDatum::builder()
            .metric_name(&metric.name)
            .value(metric.value)
            .unit(unit)
            .timestamp(aws_sdk_cloudwatch::primitives::DateTime::from_millis(
                metric.timestamp.timestamp_millis(),
            ))
            .set_dimensions(Some(dimensions))
            .build()
    }
}

#[async_trait]
impl MetricsPublisher for CloudWatchPublisher {
    async fn publish(&self, metrics: &[Metric]) -> anyhow::Result<()> {
        for chunk in metrics.chunks(20) {
            let data: Vec<MetricDatum> = chunk.iter().map(Self::to_datum).collect();
            self.client
                .put_metric_data()
                .namespace(&self.namespace)
                .set_metric_data(Some(data))
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("CloudWatch PutMetricData failed: {e}"))?;
        }
        Ok(())
    }
}

/// Records every published batch in memory. Used by unit and integration
/// tests to assert on what the sink would have sent.
#[derive(Default)]
pub struct InMemoryPublisher {
    pub published: tokio::sync::Mutex<Vec<Metric>>,
}

#[async_trait]
impl MetricsPublisher for InMemoryPublisher {
    async fn publish(&self, metrics: &[Metric]) -> anyhow::Result<()> {
        self.published.lock().await.extend_from_slice(metrics);
        Ok(())
    }
}

/// A publisher that always fails, for exercising the sink's
/// flush-failure-is-logged-not-fatal path.
pub struct FailingPublisher;

#[async_trait]
impl MetricsPublisher for FailingPublisher {
    async fn publish(&self, metrics: &[Metric]) -> anyhow::Result<()> {
        warn!(count = metrics.len(), "FailingPublisher discarding metrics");
        Err(anyhow::anyhow!("publish always fails"))
    }
}
