//! Scratch workspace lifecycle and opaque subprocess execution. This crate
//! knows nothing about GRIB2, colormaps, or tiles — it only knows how to
//! run a [`wx_common::Command`] and clean up after itself.

pub mod runner;
pub mod workspace;

pub use runner::{StepOutput, StepRunner};
pub use workspace::WorkspaceGuard;
