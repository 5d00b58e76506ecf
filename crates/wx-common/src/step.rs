use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The six pipeline stages, in the order they always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepName {
    Download,
    Processing,
    Colormap,
    TileGeneration,
    Upload,
    Metadata,
}

impl StepName {
    pub const ORDER: [StepName; 6] = [
        StepName::Download,
        StepName::Processing,
        StepName::Colormap,
        StepName::TileGeneration,
        StepName::Upload,
        StepName::Metadata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Download => "download",
            StepName::Processing => "processing",
            StepName::Colormap => "colormap",
            StepName::TileGeneration => "tile_generation",
            StepName::Upload => "upload",
            StepName::Metadata => "metadata",
        }
    }

    /// Only `Processing` tolerates partial per-file failure; every other
    /// stage is strict and fail-stops the run.
    pub fn is_tolerant(&self) -> bool {
        matches!(self, StepName::Processing)
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Ok,
    Failed,
    Skipped,
}

/// A structured subprocess invocation: program plus argv plus environment
/// overrides. Never assembled as a shell string, so there is no quoting to
/// get wrong and no shell to inject into.
#[derive(Debug, Clone, Default)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, a: impl Into<String>) -> Self {
        self.args.push(a.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// A human-readable `argv[0] arg1 arg2 ...` rendering for logs, never
    /// used to actually invoke the process.
    pub fn display_argv(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One stage's outcome, emitted to both the metric sink and the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: StepName,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub outcome: Outcome,
    pub artifact_count: u64,
    pub error_message: Option<String>,
}

impl StepRecord {
    pub fn duration_s(&self) -> f64 {
        (self.end_ts - self.start_ts).num_milliseconds() as f64 / 1000.0
    }
}

/// Checks that a completed run's `StepRecord`s appear in canonical stage
/// order with non-decreasing timestamps. Used by integration tests to
/// assert the driver never reorders or skips stage bookkeeping.
pub fn validate_step_sequence(records: &[StepRecord]) -> bool {
    let mut expected = StepName::ORDER.iter();
    let mut last_end: Option<DateTime<Utc>> = None;
    for record in records {
        match expected.find(|name| **name == record.name) {
            Some(_) => {}
            None => return false,
        }
        if let Some(prev) = last_end {
            if record.start_ts < prev {
                return false;
            }
        }
        last_end = Some(record.end_ts);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_at(name: StepName, base: DateTime<Utc>, offset_secs: i64) -> StepRecord {
        let start = base + Duration::seconds(offset_secs);
        StepRecord {
            name,
            start_ts: start,
            end_ts: start + Duration::seconds(1),
            outcome: Outcome::Ok,
            artifact_count: 1,
            error_message: None,
        }
    }

    #[test]
    fn command_builder_never_produces_a_shell_string() {
        let cmd = Command::new("grib2-to-cog")
            .arg("--input")
            .arg("file.grib2")
            .env("RUST_LOG", "info");
        assert_eq!(cmd.program, "grib2-to-cog");
        assert_eq!(cmd.args, vec!["--input", "file.grib2"]);
        assert_eq!(cmd.display_argv(), "grib2-to-cog --input file.grib2");
    }

    #[test]
    fn in_order_sequence_validates() {
        let base = Utc::now();
        let records: Vec<_> = StepName::ORDER
            .iter()
            .enumerate()
            .map(|(i, name)| record_at(*name, base, i as i64 * 2))
            .collect();
        assert!(validate_step_sequence(&records));
    }

    #[test]
    fn out_of_order_sequence_fails_validation() {
        let base = Utc::now();
        let records = vec![
            record_at(StepName::Processing, base, 0),
            record_at(StepName::Download, base, 2),
        ];
        assert!(!validate_step_sequence(&records));
    }

    #[test]
    fn only_processing_is_tolerant() {
        assert!(StepName::Processing.is_tolerant());
        assert!(!StepName::Download.is_tolerant());
        assert!(!StepName::Upload.is_tolerant());
    }
}
