//! Render data shared between the orchestrator and devices.
//!
//! - [`RenderBuffers`] - Full-frame accumulation buffer
//! - [`BufferParams`] / [`PassType`] - Frame placement and pass layout
//! - [`Scene`] - Analytic scene for the CPU reference device

mod buffers;
pub mod scene;

pub use buffers::{BufferParams, BufferView, PassType, RenderBuffers};
pub use scene::{Scene, SceneParams};
