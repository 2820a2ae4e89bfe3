//! # PathTrace
//!
//! Progressive render driver for wavefront path tracing devices.
//!
//! A frame is rendered in batches of samples. For every batch the work
//! scheduler splits the frame into pixel-disjoint tiles, every integrator
//! queue of every device pulls tiles concurrently and runs the wavefront
//! kernels over them, accumulating straight into shared full-frame render
//! buffers. Between batches the driver reports progress and honours
//! cancellation.
//!
//! ## Modules
//!
//! - [`util`] - Errors, logging setup, per-path random numbers
//! - [`render`] - Render buffers, passes and the analytic test scene
//! - [`device`] - Device and integrator queue traits, CPU and multi devices
//! - [`integrator`] - Work scheduling and the [`PathTrace`] driver
//! - [`settings`] - JSON render settings
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pathtrace::prelude::*;
//!
//! let scene = Arc::new(Scene::new(SceneParams::default()));
//! let device: Arc<dyn Device> = Arc::new(CpuDevice::with_default_threads(scene));
//!
//! let mut path_trace = PathTrace::new(device, PathTraceConfig::default())?;
//! path_trace.reset(BufferParams::new(320, 240))?;
//! path_trace.set_update_callback(|_, samples| println!("{samples} samples"));
//! path_trace.render_samples(16)?;
//! ```

pub mod util;
pub mod render;
pub mod device;
pub mod integrator;
pub mod settings;

// Re-export commonly used types
pub use util::{Error, Result};
pub use integrator::{PathTrace, PathTraceConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result};
    pub use crate::device::{CpuDevice, Device, DeviceKernel, DeviceQueue, KernelFeatures, MultiDevice};
    pub use crate::integrator::{PathTrace, PathTraceConfig, WorkScheduler, WorkTile};
    pub use crate::render::{BufferParams, PassType, RenderBuffers, Scene, SceneParams};
    pub use crate::settings::RenderSettings;
}
