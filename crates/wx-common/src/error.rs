use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the pipeline engine and its supporting crates.
///
/// `InvalidCycle`, `AlreadyRunning` and `StageFailed` are the ones the
/// driver inspects to decide exit codes; everything else propagates as a
/// plain strict-stage failure.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cycle hour {hour:02} is not valid for model {model} (valid cycles: {valid:?})")]
    InvalidCycle {
        model: String,
        hour: u32,
        valid: Vec<u32>,
    },

    #[error("another run already holds the workspace lock at {0}")]
    AlreadyRunning(PathBuf),

    #[error("stage {stage} failed: {message}")]
    StageFailed { stage: String, message: String },

    #[error("subprocess for step {step} exited with status {status}: {tail}")]
    StepExitFailure {
        step: String,
        status: i32,
        tail: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
