//! Device abstraction for the path tracing driver.
//!
//! A [`Device`] is either a physical render device or a group of them
//! ([`MultiDevice`]). Every physical device creates [`DeviceQueue`]s, the
//! execution contexts that run wavefront [`DeviceKernel`] stages for one
//! work tile at a time.
//!
//! Device specifics (wavefront size, how a stage is executed) stay behind
//! these traits; the orchestrator only talks to the trait objects.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::integrator::WorkTile;
use crate::render::RenderBuffers;
use crate::util::Result;

mod kernel;
pub mod cpu;
mod multi;

pub use cpu::{CpuDevice, CpuIntegratorQueue};
pub use kernel::DeviceKernel;
pub use multi::MultiDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    Cpu,
    Gpu,
    Multi,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Cpu => f.write_str("CPU"),
            DeviceType::Gpu => f.write_str("GPU"),
            DeviceType::Multi => f.write_str("MULTI"),
        }
    }
}

/// Identification of a device, used for logging and error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    /// Stable identifier, e.g. `"CPU"` or `"GPU_0"`.
    pub id: String,
    /// Human readable name.
    pub description: String,
}

impl DeviceInfo {
    pub fn new(device_type: DeviceType, id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            device_type,
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Kernel capabilities requested for a render session.
///
/// Passed to every queue at creation. Stages of disabled features are still
/// enqueued but do nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelFeatures {
    pub volume: bool,
    pub subsurface: bool,
    /// Direct lighting through shadow rays.
    pub shadows: bool,
}

impl Default for KernelFeatures {
    fn default() -> Self {
        Self {
            volume: true,
            subsurface: true,
            shadows: true,
        }
    }
}

/// A logical render device.
pub trait Device: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    /// Call `f` for every physical device this device fans out to.
    ///
    /// A physical device calls `f` with itself.
    fn foreach_device(&self, f: &mut dyn FnMut(&dyn Device));

    /// Number of integrator queues that can execute concurrently.
    fn concurrent_integrator_queues_num(&self) -> usize;

    /// Upper bound of in-flight path states per queue.
    fn max_num_path_states(&self) -> usize;

    /// Create an integrator queue accumulating into `buffers`.
    fn queue_create_integrator(
        &self,
        buffers: Arc<RenderBuffers>,
        features: &KernelFeatures,
    ) -> Result<Box<dyn DeviceQueue>>;
}

/// Execution context that runs wavefront stages for one work tile at a time.
///
/// A queue is owned by exactly one driver task while a batch runs.
pub trait DeviceQueue: Send {
    /// Prepare device side resources. Called at the start of every
    /// `render_samples()`, must tolerate repeated calls.
    fn init_execution(&mut self) -> Result<()>;

    /// Bind the tile subsequent stages operate on.
    fn set_work_tile(&mut self, tile: &WorkTile) -> Result<()>;

    /// Execute one stage over the wavefront of the bound tile.
    fn enqueue(&mut self, kernel: DeviceKernel) -> Result<()>;

    /// Whether any path state of the bound tile still needs stages.
    fn has_work_remaining(&self) -> bool;

    /// Upper bound of in-flight path states.
    fn max_num_path_states(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_default_all_enabled() {
        let features = KernelFeatures::default();
        assert!(features.volume && features.subsurface && features.shadows);

        let features: KernelFeatures = serde_json::from_str(r#"{ "volume": false }"#).unwrap();
        assert!(!features.volume);
        assert!(features.subsurface);
    }

    #[test]
    fn test_device_type_display() {
        assert_eq!(DeviceType::Cpu.to_string(), "CPU");
        assert_eq!(DeviceType::Multi.to_string(), "MULTI");
    }
}
