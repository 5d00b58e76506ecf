use chrono::{DateTime, Utc};

/// The unit a metric value is expressed in. `DataAge` is always `Seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Count,
    Seconds,
    None,
}

/// Metric names the pipeline emits, one dimensioned by `run_id` and `model`.
pub const METRIC_PROCESSING_TIME: &str = "ProcessingTime";
pub const METRIC_DATA_AGE: &str = "DataAge";
pub const METRIC_FILES_DOWNLOADED: &str = "FilesDownloaded";
pub const METRIC_FILES_PROCESSED: &str = "FilesProcessed";
pub const METRIC_TILES_GENERATED: &str = "TilesGenerated";
pub const METRIC_ERRORS: &str = "Errors";
pub const METRIC_SUCCESS: &str = "Success";
pub const METRIC_FAILURE: &str = "Failure";
pub const METRIC_STEP_DURATION: &str = "StepDuration";

#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub unit: Unit,
    pub dimensions: Vec<(String, String)>,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64, unit: Unit) -> Self {
        Self {
            name: name.into(),
            value,
            unit,
            dimensions: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.push((key.into(), value.into()));
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
