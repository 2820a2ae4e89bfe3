//! Progressive path tracing driver.
//!
//! [`PathTrace`] owns the full-frame render buffers and one integrator queue
//! per concurrent execution slot of every physical device. Samples are
//! rendered in batches: the work scheduler is reset for the batch, every
//! queue pulls tiles on the thread pool until the batch is exhausted, and
//! only after all queues joined the sample counter advances, the progress
//! callback gets a chance to run and cancellation is checked.
//!
//! ## Usage
//! ```ignore
//! let device: Arc<dyn Device> = Arc::new(CpuDevice::with_default_threads(scene));
//! let mut path_trace = PathTrace::new(device, PathTraceConfig::default())?;
//! path_trace.reset(BufferParams::new(640, 480))?;
//! path_trace.set_write_callback(|buffers, samples| save(buffers, samples));
//! path_trace.render_samples(64)?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use super::{WorkScheduler, WorkTile};
use crate::device::{Device, DeviceKernel, DeviceQueue, KernelFeatures};
use crate::render::{BufferParams, RenderBuffers};
use crate::util::{Error, Result};

/// Callback receiving the render buffers and the number of rendered samples.
pub type BuffersCallback = Box<dyn FnMut(&RenderBuffers, u32) + Send>;

/// Polled between batches, returns true to stop rendering.
pub type CancelCallback = Box<dyn FnMut() -> bool + Send>;

/// Tuning of the render loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTraceConfig {
    /// Minimum time between two progress callbacks.
    pub update_interval: Duration,
    /// Samples per scheduler reset after the first batch. The first batch is
    /// always a single sample so the first update arrives early.
    pub samples_per_batch: u32,
    /// Dedicated worker pool size, `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
    /// Kernel capabilities requested from every queue.
    pub features: KernelFeatures,
}

impl Default for PathTraceConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(1),
            samples_per_batch: 1,
            num_threads: None,
            features: KernelFeatures::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct RenderStatus {
    rendered_samples_num: u32,
}

impl RenderStatus {
    fn reset(&mut self) {
        self.rendered_samples_num = 0;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct UpdateStatus {
    /// Time of the last progress callback, `None` before the first one.
    last_update_time: Option<Instant>,
}

impl UpdateStatus {
    fn reset(&mut self) {
        self.last_update_time = None;
    }
}

/// Render driver for one logical device.
pub struct PathTrace {
    device: Arc<dyn Device>,
    config: PathTraceConfig,

    full_render_buffers: Arc<RenderBuffers>,
    /// Created once and reused by every batch of every `render_samples()`.
    integrator_queues: Vec<Box<dyn DeviceQueue>>,
    work_scheduler: WorkScheduler,
    thread_pool: Option<rayon::ThreadPool>,

    start_sample_num: u32,
    render_status: RenderStatus,
    update_status: UpdateStatus,

    update_cb: Option<BuffersCallback>,
    write_cb: Option<BuffersCallback>,
    cancel_cb: Option<CancelCallback>,
}

impl PathTrace {
    /// Create render buffers and all integrator queues of the device.
    ///
    /// Fails if any physical device offers no queues or refuses to create one.
    pub fn new(device: Arc<dyn Device>, config: PathTraceConfig) -> Result<Self> {
        let full_render_buffers = Arc::new(RenderBuffers::empty());

        let mut integrator_queues: Vec<Box<dyn DeviceQueue>> = Vec::new();
        let mut setup_error: Option<Error> = None;

        device.foreach_device(&mut |render_device: &dyn Device| {
            if setup_error.is_some() {
                return;
            }

            let info = render_device.info();
            let num_queues = render_device.concurrent_integrator_queues_num();
            if num_queues == 0 {
                setup_error = Some(Error::NoIntegratorQueues {
                    device: info.description.clone(),
                });
                return;
            }

            debug!("creating {} integrator queues on {}", num_queues, info.description);
            for _ in 0..num_queues {
                match render_device.queue_create_integrator(Arc::clone(&full_render_buffers), &config.features) {
                    Ok(queue) => integrator_queues.push(queue),
                    Err(e) => {
                        setup_error = Some(e);
                        return;
                    }
                }
            }
        });

        if let Some(e) = setup_error {
            return Err(e);
        }
        if integrator_queues.is_empty() {
            return Err(Error::NoIntegratorQueues {
                device: device.info().description.clone(),
            });
        }

        // Every tile must fit the smallest wavefront of all queues.
        let mut work_scheduler = WorkScheduler::new();
        if let Some(max_states) = integrator_queues.iter().map(|q| q.max_num_path_states()).min() {
            work_scheduler.set_max_num_path_states(max_states);
        }
        work_scheduler.set_num_workers(integrator_queues.len());

        let thread_pool = match config.num_threads {
            Some(num_threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(|i| format!("pathtrace-{i}"))
                    .build()
                    .map_err(|e| Error::ThreadPool(e.to_string()))?,
            ),
            None => None,
        };

        info!(
            "path trace on {}: {} integrator queues",
            device.info().description,
            integrator_queues.len()
        );

        Ok(Self {
            device,
            config,
            full_render_buffers,
            integrator_queues,
            work_scheduler,
            thread_pool,
            start_sample_num: 0,
            render_status: RenderStatus::default(),
            update_status: UpdateStatus::default(),
            update_cb: None,
            write_cb: None,
            cancel_cb: None,
        })
    }

    /// Reallocate the render buffers for a new frame. Previous contents are lost.
    pub fn reset(&mut self, full_buffer_params: BufferParams) -> Result<()> {
        self.full_render_buffers.reset(full_buffer_params)
    }

    /// Absolute index of the first sample rendered by the next `render_samples()`.
    pub fn set_start_sample(&mut self, start_sample_num: u32) {
        self.start_sample_num = start_sample_num;
    }

    /// Called after the first batch and then at most once per update interval.
    pub fn set_update_callback(&mut self, cb: impl FnMut(&RenderBuffers, u32) + Send + 'static) {
        self.update_cb = Some(Box::new(cb));
    }

    /// Called exactly once at the end of every successful `render_samples()`.
    pub fn set_write_callback(&mut self, cb: impl FnMut(&RenderBuffers, u32) + Send + 'static) {
        self.write_cb = Some(Box::new(cb));
    }

    /// Polled after every batch.
    pub fn set_cancel_callback(&mut self, cb: impl FnMut() -> bool + Send + 'static) {
        self.cancel_cb = Some(Box::new(cb));
    }

    pub fn set_update_interval(&mut self, interval: Duration) {
        self.config.update_interval = interval;
    }

    /// Render `samples_num` samples on top of the start sample.
    ///
    /// Cancellation is only checked between batches; a batch in flight always
    /// completes. The write callback runs once after the loop, also when
    /// cancelled. A failing queue aborts rendering and its error is returned
    /// once all queues of the batch have joined; the write callback is skipped.
    pub fn render_samples(&mut self, samples_num: u32) -> Result<()> {
        let params = self.full_render_buffers.params();
        if params.num_pixels() == 0 {
            return Err(Error::invalid_params("render buffers are not reset"));
        }
        if self.start_sample_num.checked_add(samples_num).is_none() {
            return Err(Error::invalid_params(format!(
                "sample range {}+{} exceeds the sample index space",
                self.start_sample_num, samples_num
            )));
        }

        self.render_init_execution()?;

        self.render_status.reset();
        self.update_status.reset();

        info!(
            "rendering {} samples from {} at {}x{}",
            samples_num, self.start_sample_num, params.width, params.height
        );

        while self.render_status.rendered_samples_num < samples_num {
            let batch_samples = self.next_batch_size(samples_num);
            self.render_samples_full_pipeline(batch_samples)?;
            self.update_if_needed();

            if self.is_cancel_requested() {
                warn!(
                    "render cancelled after {} of {} samples",
                    self.render_status.rendered_samples_num, samples_num
                );
                break;
            }
        }

        self.write();

        info!("rendered {} samples", self.render_status.rendered_samples_num);
        Ok(())
    }

    fn render_init_execution(&mut self) -> Result<()> {
        for queue in &mut self.integrator_queues {
            queue.init_execution()?;
        }
        Ok(())
    }

    fn next_batch_size(&self, samples_num: u32) -> u32 {
        let rendered = self.render_status.rendered_samples_num;
        let batch = if rendered == 0 {
            1
        } else {
            self.config.samples_per_batch.max(1)
        };
        batch.min(samples_num - rendered)
    }

    /// Render one batch on all queues and wait for them.
    #[tracing::instrument(skip(self), fields(start_sample = tracing::field::Empty))]
    fn render_samples_full_pipeline(&mut self, samples_num: u32) -> Result<()> {
        let params = self.full_render_buffers.params();
        let start_sample = self.start_sample_num + self.render_status.rendered_samples_num;
        tracing::Span::current().record("start_sample", start_sample);

        self.work_scheduler.reset(
            params.full_x,
            params.full_y,
            params.width,
            params.height,
            start_sample,
            samples_num,
        );

        let work_scheduler = &self.work_scheduler;
        let queues = &mut self.integrator_queues;
        let mut dispatch = move || -> Vec<Result<()>> {
            queues
                .into_par_iter()
                .map(|queue| render_queue_samples(queue.as_mut(), work_scheduler))
                .collect()
        };
        let results = match &self.thread_pool {
            Some(pool) => pool.install(dispatch),
            None => dispatch(),
        };

        let mut first_error = None;
        for error in results.into_iter().filter_map(|r| r.err()) {
            warn!("integrator queue failed: {}", error);
            first_error.get_or_insert(error);
        }
        if let Some(error) = first_error {
            return Err(error);
        }

        self.render_status.rendered_samples_num += samples_num;
        debug!(
            "batch done: samples {}..{}",
            start_sample,
            start_sample + samples_num
        );
        Ok(())
    }

    fn is_cancel_requested(&mut self) -> bool {
        match self.cancel_cb.as_mut() {
            Some(cb) => cb(),
            None => false,
        }
    }

    fn update_if_needed(&mut self) {
        let Some(update_cb) = self.update_cb.as_mut() else {
            return;
        };

        let now = Instant::now();

        // The first update always goes through so pixels show up early.
        if let Some(last) = self.update_status.last_update_time {
            if now.duration_since(last) < self.config.update_interval {
                return;
            }
        }

        update_cb(&self.full_render_buffers, self.render_status.rendered_samples_num);
        self.update_status.last_update_time = Some(now);
    }

    fn write(&mut self) {
        if let Some(write_cb) = self.write_cb.as_mut() {
            write_cb(&self.full_render_buffers, self.render_status.rendered_samples_num);
        }
    }

    /// Samples rendered by the last (or current) `render_samples()`.
    pub fn rendered_samples_num(&self) -> u32 {
        self.render_status.rendered_samples_num
    }

    pub fn start_sample(&self) -> u32 {
        self.start_sample_num
    }

    pub fn num_queues(&self) -> usize {
        self.integrator_queues.len()
    }

    pub fn buffers(&self) -> &Arc<RenderBuffers> {
        &self.full_render_buffers
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    pub fn config(&self) -> &PathTraceConfig {
        &self.config
    }
}

/// Driver task of one queue: pull tiles until the batch is exhausted.
///
/// A tile with more work than the wavefront holds runs as several sample
/// chunks on this queue, so its pixels are never shared with another queue.
fn render_queue_samples(queue: &mut dyn DeviceQueue, work_scheduler: &WorkScheduler) -> Result<()> {
    let max_work_items = work_scheduler.max_num_path_states();
    while let Some(work_tile) = work_scheduler.get_work() {
        for chunk in work_tile.sample_chunks(max_work_items) {
            render_work_tile(queue, &chunk)?;
        }
    }
    Ok(())
}

/// Run the wavefront pipeline over one tile until no path is left.
///
/// Camera rays are generated once; later passes only drain the paths in
/// flight. See [`DeviceKernel::PATH_ITERATION`] for the stage order.
pub fn render_work_tile(queue: &mut dyn DeviceQueue, work_tile: &WorkTile) -> Result<()> {
    let _span = tracing::trace_span!("work_tile", x = work_tile.x, y = work_tile.y).entered();

    queue.set_work_tile(work_tile)?;
    queue.enqueue(DeviceKernel::GenerateCameraRays)?;

    let mut num_passes = 0u32;
    loop {
        for kernel in DeviceKernel::PATH_ITERATION {
            queue.enqueue(kernel)?;
        }
        num_passes += 1;

        if !queue.has_work_remaining() {
            break;
        }
    }

    trace!(
        "tile {}x{} at ({}, {}) done in {} passes",
        work_tile.width,
        work_tile.height,
        work_tile.x,
        work_tile.y,
        num_passes
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CpuDevice;
    use crate::render::{Scene, SceneParams};

    fn cpu_path_trace(threads: usize, config: PathTraceConfig) -> PathTrace {
        let scene = Arc::new(Scene::new(SceneParams::default()));
        let device: Arc<dyn Device> = Arc::new(CpuDevice::new(scene, threads));
        PathTrace::new(device, config).unwrap()
    }

    #[test]
    fn test_zero_queues_is_setup_error() {
        let scene = Arc::new(Scene::new(SceneParams::default()));
        let device: Arc<dyn Device> = Arc::new(CpuDevice::new(scene, 0));
        let result = PathTrace::new(device, PathTraceConfig::default());
        assert!(matches!(result, Err(Error::NoIntegratorQueues { .. })));
    }

    #[test]
    fn test_render_requires_reset() {
        let mut path_trace = cpu_path_trace(1, PathTraceConfig::default());
        assert!(path_trace.render_samples(1).is_err());
    }

    #[test]
    fn test_sample_range_overflow_is_rejected() {
        let mut path_trace = cpu_path_trace(1, PathTraceConfig::default());
        path_trace.reset(BufferParams::new(2, 2)).unwrap();
        path_trace.set_start_sample(u32::MAX);

        let result = path_trace.render_samples(2);
        assert!(matches!(result, Err(Error::InvalidBufferParams(_))));
        assert_eq!(path_trace.rendered_samples_num(), 0);
        assert_eq!(path_trace.buffers().read().sample_count(0, 0), 0);

        // The last representable sample index is still renderable.
        path_trace.set_start_sample(u32::MAX - 1);
        path_trace.render_samples(1).unwrap();
        assert_eq!(path_trace.buffers().read().sample_count(1, 1), 1);
    }

    #[test]
    fn test_reset_keeps_buffer_identity() {
        let mut path_trace = cpu_path_trace(1, PathTraceConfig::default());
        let before = Arc::clone(path_trace.buffers());

        path_trace.reset(BufferParams::new(3, 2)).unwrap();
        path_trace.render_samples(1).unwrap();
        path_trace.reset(BufferParams::new(5, 5)).unwrap();

        assert!(Arc::ptr_eq(&before, path_trace.buffers()));
        assert_eq!(before.params(), BufferParams::new(5, 5));
        assert_eq!(before.read().sample_count(0, 0), 0);
    }

    #[test]
    fn test_batch_sizes() {
        let config = PathTraceConfig {
            samples_per_batch: 4,
            ..Default::default()
        };
        let mut path_trace = cpu_path_trace(1, config);
        assert_eq!(path_trace.next_batch_size(10), 1);
        path_trace.render_status.rendered_samples_num = 1;
        assert_eq!(path_trace.next_batch_size(10), 4);
        path_trace.render_status.rendered_samples_num = 8;
        assert_eq!(path_trace.next_batch_size(10), 2);
    }

    #[test]
    fn test_every_pixel_gets_all_samples() {
        let config = PathTraceConfig {
            samples_per_batch: 3,
            num_threads: Some(2),
            ..Default::default()
        };
        let mut path_trace = cpu_path_trace(2, config);
        path_trace.reset(BufferParams::new(9, 7).with_origin(4, -2)).unwrap();
        path_trace.render_samples(7).unwrap();

        assert_eq!(path_trace.rendered_samples_num(), 7);
        let view = path_trace.buffers().read();
        for y in -2..5 {
            for x in 4..13 {
                assert_eq!(view.sample_count(x, y), 7, "pixel ({x}, {y})");
            }
        }
    }
}
