//! Shared data model for the weather tile pipeline engine: run context,
//! model profiles, cycle resolution and step bookkeeping. Every other
//! pipeline crate depends on this one and none of its types know about
//! object storage, subprocesses, or metrics backends.

pub mod context;
pub mod cycle;
pub mod error;
pub mod model_profile;
pub mod step;

pub use context::{Flags, RunContext};
pub use cycle::{resolve_cycle, Cycle, CycleOverride};
pub use error::{PipelineError, Result};
pub use model_profile::{
    debug_assert_disjoint_prefixes, load_profile_or_default, parse_forecast_hour_spec,
    ModelProfile, StorePrefixes,
};
pub use step::{validate_step_sequence, Command, Outcome, StepName, StepRecord};
