//! Render loop orchestration.
//!
//! - [`PathTrace`] - Batched progressive rendering over all integrator queues
//! - [`WorkScheduler`] - Atomic tile distribution within a batch
//! - [`WorkTile`] - Pixel rectangle plus sample range for one queue

mod path_trace;
mod work_scheduler;
mod work_tile;

pub use path_trace::{render_work_tile, BuffersCallback, CancelCallback, PathTrace, PathTraceConfig};
pub use work_scheduler::WorkScheduler;
pub use work_tile::WorkTile;
