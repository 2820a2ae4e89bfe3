//! Per-path integrator state kept in the wavefront.

use glam::Vec3;

use crate::device::DeviceKernel;
use crate::render::scene::{Hit, Ray};
use crate::util::PathRng;

/// One camera path in flight.
#[derive(Debug, Clone)]
pub struct PathState {
    /// Stage that must process this path next, `None` once terminated.
    pub queued_kernel: Option<DeviceKernel>,
    pub pixel_index: usize,
    pub sample: u32,
    pub ray: Ray,
    pub throughput: Vec3,
    pub bounce: u32,
    pub hit: Option<Hit>,
    pub rng: PathRng,
}

impl PathState {
    #[inline]
    pub fn is_queued(&self, kernel: DeviceKernel) -> bool {
        self.queued_kernel == Some(kernel)
    }
}

/// Direct lighting contribution waiting for its visibility test.
#[derive(Debug, Clone)]
pub struct ShadowPathState {
    pub queued_kernel: Option<DeviceKernel>,
    pub pixel_index: usize,
    pub ray: Ray,
    pub t_max: f32,
    pub contribution: Vec3,
}

impl ShadowPathState {
    #[inline]
    pub fn is_queued(&self, kernel: DeviceKernel) -> bool {
        self.queued_kernel == Some(kernel)
    }
}
