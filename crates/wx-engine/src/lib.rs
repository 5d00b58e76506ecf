//! The pipeline engine: one driver, data-only model profiles. HRRR and
//! GFS-Wave run through identical engine code and differ only in the
//! `ModelProfile` each binary loads.

pub mod cli;
pub mod driver;
pub mod entrypoint;
pub mod lock;
pub mod subprocess;

pub use cli::PipelineArgs;
pub use driver::{PipelineDriver, RunReport};
pub use entrypoint::run_model;
pub use lock::LockGuard;
