//! CPU reference device.
//!
//! Exposes one integrator queue per worker thread. Each queue runs the
//! wavefront stages of its tile sequentially on the thread that drives it.

use std::sync::Arc;

use super::{Device, DeviceInfo, DeviceQueue, DeviceType, KernelFeatures};
use crate::render::{RenderBuffers, Scene};
use crate::util::Result;

mod kernels;
mod queue;
mod state;

pub use queue::CpuIntegratorQueue;
pub use state::{PathState, ShadowPathState};

/// CPU wavefronts are small: enough to keep a thread busy, small enough to
/// stay in cache.
pub const DEFAULT_MAX_NUM_PATH_STATES: usize = 4096;

pub struct CpuDevice {
    info: DeviceInfo,
    scene: Arc<Scene>,
    num_threads: usize,
    max_num_path_states: usize,
}

impl CpuDevice {
    /// Device with `num_threads` concurrent queues.
    pub fn new(scene: Arc<Scene>, num_threads: usize) -> Self {
        Self {
            info: DeviceInfo::new(DeviceType::Cpu, "CPU", format!("CPU ({num_threads} threads)")),
            scene,
            num_threads,
            max_num_path_states: DEFAULT_MAX_NUM_PATH_STATES,
        }
    }

    /// Device with one queue per rayon worker thread.
    pub fn with_default_threads(scene: Arc<Scene>) -> Self {
        Self::new(scene, rayon::current_num_threads())
    }

    pub fn with_max_num_path_states(mut self, max_num_path_states: usize) -> Self {
        self.max_num_path_states = max_num_path_states.max(1);
        self
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }
}

impl Device for CpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn foreach_device(&self, f: &mut dyn FnMut(&dyn Device)) {
        f(self);
    }

    fn concurrent_integrator_queues_num(&self) -> usize {
        self.num_threads
    }

    fn max_num_path_states(&self) -> usize {
        self.max_num_path_states
    }

    fn queue_create_integrator(
        &self,
        buffers: Arc<RenderBuffers>,
        features: &KernelFeatures,
    ) -> Result<Box<dyn DeviceQueue>> {
        Ok(Box::new(CpuIntegratorQueue::new(
            Arc::clone(&self.scene),
            buffers,
            *features,
            self.max_num_path_states,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::SceneParams;

    #[test]
    fn test_queue_creation() {
        let scene = Arc::new(Scene::new(SceneParams::default()));
        let device = CpuDevice::new(scene, 3).with_max_num_path_states(128);
        assert_eq!(device.concurrent_integrator_queues_num(), 3);
        assert_eq!(device.info().device_type, DeviceType::Cpu);
        assert_eq!(device.scene().params().max_bounces, SceneParams::default().max_bounces);

        let buffers = Arc::new(RenderBuffers::empty());
        let queue = device
            .queue_create_integrator(buffers, &KernelFeatures::default())
            .unwrap();
        assert_eq!(queue.max_num_path_states(), 128);
    }

    #[test]
    fn test_foreach_device_visits_self() {
        let scene = Arc::new(Scene::new(SceneParams::default()));
        let device = CpuDevice::new(scene, 2);
        let mut visited = Vec::new();
        device.foreach_device(&mut |d: &dyn Device| visited.push(d.info().id.clone()));
        assert_eq!(visited, vec!["CPU".to_string()]);
    }
}
