//! Wavefront integrator queue executing stages on the calling thread.

use std::sync::Arc;

use super::kernels::{self, KernelContext};
use super::state::{PathState, ShadowPathState};
use crate::device::{DeviceKernel, DeviceQueue, KernelFeatures};
use crate::integrator::WorkTile;
use crate::render::{RenderBuffers, Scene};
use crate::util::{Error, Result};

/// Integrator queue of the CPU device.
///
/// The wavefront holds every (pixel, sample) path of the bound tile. The
/// driver splits tiles so they fit `max_num_path_states`, which is reserved
/// up front; a larger tile bound by hand still renders on a grown wavefront.
pub struct CpuIntegratorQueue {
    scene: Arc<Scene>,
    buffers: Arc<RenderBuffers>,
    features: KernelFeatures,
    max_num_path_states: usize,

    work_tile: Option<WorkTile>,
    states: Vec<PathState>,
    shadow_states: Vec<ShadowPathState>,
}

impl CpuIntegratorQueue {
    pub fn new(
        scene: Arc<Scene>,
        buffers: Arc<RenderBuffers>,
        features: KernelFeatures,
        max_num_path_states: usize,
    ) -> Self {
        Self {
            scene,
            buffers,
            features,
            max_num_path_states,
            work_tile: None,
            states: Vec::new(),
            shadow_states: Vec::new(),
        }
    }

    /// Paths of the bound tile that are still in flight.
    pub fn num_active_paths(&self) -> usize {
        self.states.iter().filter(|s| s.queued_kernel.is_some()).count()
    }

    /// Shadow rays waiting for `INTERSECT_SHADOW` or `SHADOW`.
    pub fn num_active_shadow_paths(&self) -> usize {
        self.shadow_states.len()
    }

    /// Drop terminated paths so later stages walk a smaller wavefront.
    fn compact_states(&mut self) {
        self.states.retain(|s| s.queued_kernel.is_some());
    }
}

impl DeviceQueue for CpuIntegratorQueue {
    fn init_execution(&mut self) -> Result<()> {
        self.work_tile = None;
        self.states.clear();
        self.shadow_states.clear();
        if self.states.capacity() < self.max_num_path_states {
            self.states.reserve(self.max_num_path_states);
        }
        Ok(())
    }

    fn set_work_tile(&mut self, tile: &WorkTile) -> Result<()> {
        let params = self.buffers.params();
        let last_x = tile.x + tile.width as i32 - 1;
        let last_y = tile.y + tile.height as i32 - 1;
        if tile.num_pixels() == 0 || !params.contains(tile.x, tile.y) || !params.contains(last_x, last_y) {
            return Err(Error::TileOutOfBounds {
                x: tile.x,
                y: tile.y,
                width: tile.width,
                height: tile.height,
            });
        }

        self.work_tile = Some(*tile);
        self.states.clear();
        self.shadow_states.clear();
        Ok(())
    }

    fn enqueue(&mut self, kernel: DeviceKernel) -> Result<()> {
        let tile = self
            .work_tile
            .ok_or_else(|| Error::kernel(kernel, "no work tile bound"))?;

        let view = self.buffers.read();
        let ctx = KernelContext {
            scene: &self.scene,
            features: &self.features,
            buffers: &view,
        };

        match kernel {
            DeviceKernel::GenerateCameraRays => {
                kernels::generate_camera_rays(&ctx, &tile, &mut self.states, &mut self.shadow_states)
            }
            DeviceKernel::IntersectClosest => kernels::intersect_closest(&ctx, &mut self.states),
            DeviceKernel::Volume => kernels::volume(&ctx, &mut self.states),
            DeviceKernel::Background => kernels::background(&ctx, &mut self.states),
            DeviceKernel::Surface => kernels::surface(&ctx, &mut self.states, &mut self.shadow_states),
            DeviceKernel::Subsurface => {
                kernels::subsurface(&ctx, &mut self.states, &mut self.shadow_states)
            }
            DeviceKernel::IntersectShadow => kernels::intersect_shadow(&ctx, &mut self.shadow_states),
            DeviceKernel::Shadow => kernels::shadow(&ctx, &mut self.shadow_states),
        }

        drop(view);
        if kernel == DeviceKernel::Shadow {
            self.compact_states();
        }
        Ok(())
    }

    fn has_work_remaining(&self) -> bool {
        self.states.iter().any(|s| s.queued_kernel.is_some())
            || self.shadow_states.iter().any(|s| s.queued_kernel.is_some())
    }

    fn max_num_path_states(&self) -> usize {
        self.max_num_path_states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{BufferParams, SceneParams};

    fn make_queue(params: SceneParams, features: KernelFeatures) -> (CpuIntegratorQueue, Arc<RenderBuffers>) {
        let buffers = Arc::new(RenderBuffers::new(BufferParams::new(8, 8)).unwrap());
        let scene = Arc::new(Scene::new(params));
        let queue = CpuIntegratorQueue::new(scene, Arc::clone(&buffers), features, 256);
        (queue, buffers)
    }

    fn tile(x: i32, y: i32, size: u32, samples: u32) -> WorkTile {
        WorkTile {
            x,
            y,
            width: size,
            height: size,
            start_sample: 0,
            num_samples: samples,
            offset: 0,
            stride: 8,
        }
    }

    fn run_tile(queue: &mut CpuIntegratorQueue, tile: &WorkTile) -> usize {
        queue.set_work_tile(tile).unwrap();
        queue.enqueue(DeviceKernel::GenerateCameraRays).unwrap();
        let mut passes = 0;
        loop {
            for kernel in DeviceKernel::PATH_ITERATION {
                queue.enqueue(kernel).unwrap();
            }
            passes += 1;
            if !queue.has_work_remaining() {
                break;
            }
            assert!(passes < 64, "wavefront did not drain");
        }
        passes
    }

    #[test]
    fn test_enqueue_without_tile_fails() {
        let (mut queue, _) = make_queue(SceneParams::default(), KernelFeatures::default());
        queue.init_execution().unwrap();
        let err = queue.enqueue(DeviceKernel::Surface).unwrap_err();
        assert!(matches!(err, Error::KernelFailed { kernel: DeviceKernel::Surface, .. }));
    }

    #[test]
    fn test_tile_out_of_bounds() {
        let (mut queue, _) = make_queue(SceneParams::default(), KernelFeatures::default());
        assert!(queue.set_work_tile(&tile(6, 6, 4, 1)).is_err());
        assert!(queue.set_work_tile(&tile(-1, 0, 2, 1)).is_err());
        assert!(queue.set_work_tile(&tile(4, 4, 4, 1)).is_ok());
    }

    #[test]
    fn test_camera_rays_seed_wavefront() {
        let (mut queue, _) = make_queue(SceneParams::default(), KernelFeatures::default());
        queue.init_execution().unwrap();
        queue.set_work_tile(&tile(0, 0, 2, 3)).unwrap();
        queue.enqueue(DeviceKernel::GenerateCameraRays).unwrap();
        assert_eq!(queue.num_active_paths(), 2 * 2 * 3);
        assert!(queue.has_work_remaining());
    }

    #[test]
    fn test_tile_drains_and_counts_samples() {
        let (mut queue, buffers) = make_queue(SceneParams::default(), KernelFeatures::default());
        queue.init_execution().unwrap();
        run_tile(&mut queue, &tile(2, 2, 4, 2));

        let view = buffers.read();
        for y in 0..8 {
            for x in 0..8 {
                let inside = (2..6).contains(&x) && (2..6).contains(&y);
                assert_eq!(view.sample_count(x, y), if inside { 2 } else { 0 });
            }
        }
        assert_eq!(queue.num_active_paths(), 0);
        assert_eq!(queue.num_active_shadow_paths(), 0);
    }

    #[test]
    fn test_background_only_scene() {
        let params = SceneParams {
            spheres: Vec::new(),
            ground: None,
            sky_color: glam::Vec3::new(0.25, 0.5, 1.0),
            ..Default::default()
        };
        let (mut queue, buffers) = make_queue(params, KernelFeatures::default());
        queue.init_execution().unwrap();
        let passes = run_tile(&mut queue, &tile(0, 0, 8, 1));
        assert_eq!(passes, 1);

        let pixels = buffers.read().get_combined_pixels();
        for rgba in pixels.chunks_exact(4) {
            assert_eq!(rgba, &[0.25, 0.5, 1.0, 1.0]);
        }
    }

    #[test]
    fn test_fog_attenuates_background() {
        let params = SceneParams {
            spheres: Vec::new(),
            ground: None,
            sky_color: glam::Vec3::ONE,
            fog_density: 0.1,
            fog_distance: 10.0,
            ..Default::default()
        };
        let expected = (-1.0f32).exp();

        let (mut queue, buffers) = make_queue(params.clone(), KernelFeatures::default());
        queue.init_execution().unwrap();
        run_tile(&mut queue, &tile(0, 0, 2, 1));
        let rgba = buffers.read().combined(0, 0);
        assert!((rgba[0] - expected).abs() < 1e-5);

        // Volume disabled: the stage is still enqueued but does nothing.
        let features = KernelFeatures { volume: false, ..Default::default() };
        let (mut queue, buffers) = make_queue(params, features);
        queue.init_execution().unwrap();
        run_tile(&mut queue, &tile(0, 0, 2, 1));
        assert_eq!(buffers.read().combined(0, 0)[0], 1.0);
    }

    #[test]
    fn test_subsurface_emits_shadow_rays_in_same_pass() {
        // Camera looking straight at a subsurface sphere, no sky light.
        let mut params = SceneParams {
            ground: None,
            sky_color: glam::Vec3::ZERO,
            max_bounces: 0,
            ..Default::default()
        };
        params.spheres.truncate(1);
        params.spheres[0].subsurface_radius = 0.05;
        params.camera.position = glam::Vec3::new(-0.6, 0.5, 3.0);
        params.camera.look_at = params.spheres[0].center;
        params.camera.fov_degrees = 5.0;
        params.sun.direction = glam::Vec3::NEG_Z;

        let (mut queue, buffers) = make_queue(params, KernelFeatures::default());
        queue.init_execution().unwrap();
        queue.set_work_tile(&tile(3, 3, 2, 1)).unwrap();
        queue.enqueue(DeviceKernel::GenerateCameraRays).unwrap();
        queue.enqueue(DeviceKernel::IntersectClosest).unwrap();
        queue.enqueue(DeviceKernel::Volume).unwrap();
        queue.enqueue(DeviceKernel::Background).unwrap();
        queue.enqueue(DeviceKernel::Surface).unwrap();
        assert_eq!(queue.num_active_shadow_paths(), 0);

        queue.enqueue(DeviceKernel::Subsurface).unwrap();
        assert_eq!(queue.num_active_shadow_paths(), 4);

        queue.enqueue(DeviceKernel::IntersectShadow).unwrap();
        queue.enqueue(DeviceKernel::Shadow).unwrap();
        assert!(!queue.has_work_remaining());

        let rgba = buffers.read().combined(3, 3);
        assert!(rgba[0] > 0.0);
        assert_eq!(rgba[3], 1.0);
    }
}
