//! Utility types and functions.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`PathRng`] - Deterministic per-path random numbers
//! - [`init_logging`] - `tracing` subscriber setup

mod error;
mod hash;
mod logging;

pub use error::*;
pub use hash::*;
pub use logging::*;
