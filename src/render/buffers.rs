//! Full-frame accumulation buffer shared by all integrator queues.
//!
//! Pixels are stored interleaved: every pixel owns `pass_stride()` floats,
//! one slot per pass component. Cells are relaxed atomics so queues on
//! different threads can write through a shared reference. A cell is only
//! ever written by the queue that owns the work tile covering its pixel;
//! the scheduler hands out pixel-disjoint tiles, so no two threads touch
//! the same cell within a batch.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard};

use crate::util::{Error, Result};

/// Passes stored for every pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassType {
    /// Accumulated RGBA radiance.
    Combined,
    /// Number of samples accumulated into the pixel.
    SampleCount,
}

impl PassType {
    /// All passes in storage order.
    pub const ALL: [PassType; 2] = [PassType::Combined, PassType::SampleCount];

    /// Number of floats the pass occupies per pixel.
    pub const fn num_components(self) -> usize {
        match self {
            PassType::Combined => 4,
            PassType::SampleCount => 1,
        }
    }
}

/// Size and placement of the full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferParams {
    /// Frame origin in absolute raster space.
    pub full_x: i32,
    pub full_y: i32,
    /// Frame extent in pixels.
    pub width: u32,
    pub height: u32,
}

impl BufferParams {
    /// Frame of the given size at the raster origin.
    pub fn new(width: u32, height: u32) -> Self {
        Self { full_x: 0, full_y: 0, width, height }
    }

    /// Move the frame origin (border / region renders).
    pub fn with_origin(mut self, full_x: i32, full_y: i32) -> Self {
        self.full_x = full_x;
        self.full_y = full_y;
        self
    }

    /// Check that the parameters describe a non-empty frame.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::invalid_params(format!(
                "frame must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Number of pixels in the frame.
    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Floats per pixel.
    #[inline]
    pub fn pass_stride(&self) -> usize {
        PassType::ALL.iter().map(|p| p.num_components()).sum()
    }

    /// Offset of a pass inside one pixel.
    pub fn pass_offset(&self, pass: PassType) -> usize {
        PassType::ALL
            .iter()
            .take_while(|&&p| p != pass)
            .map(|p| p.num_components())
            .sum()
    }

    /// Total floats in the buffer.
    #[inline]
    pub fn buffer_len(&self) -> usize {
        self.num_pixels() * self.pass_stride()
    }

    /// Whether an absolute raster position lies inside the frame.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.full_x
            && y >= self.full_y
            && ((x - self.full_x) as u32) < self.width
            && ((y - self.full_y) as u32) < self.height
    }

    /// Pixel index of an absolute raster position.
    #[inline]
    pub fn pixel_index(&self, x: i32, y: i32) -> usize {
        debug_assert!(self.contains(x, y));
        (y - self.full_y) as usize * self.width as usize + (x - self.full_x) as usize
    }
}

/// `f32` stored in an `AtomicU32`.
#[derive(Debug, Default)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Non-atomic read-modify-write; callers own the cell (see module docs).
    #[inline]
    fn add(&self, value: f32) {
        self.store(self.load() + value);
    }
}

struct BufferStorage {
    params: BufferParams,
    data: Box<[AtomicF32]>,
}

impl BufferStorage {
    fn allocate(params: BufferParams) -> Self {
        let data = (0..params.buffer_len()).map(|_| AtomicF32::default()).collect();
        Self { params, data }
    }
}

/// Accumulation buffer for the whole frame.
///
/// Outside the crate the frame can only be replaced through
/// `PathTrace::reset`, never from a callback holding `&RenderBuffers`:
///
/// ```compile_fail
/// use pathtrace::render::{BufferParams, RenderBuffers};
///
/// let buffers = RenderBuffers::new(BufferParams::new(8, 8)).unwrap();
/// buffers.reset(BufferParams::new(2, 2)).unwrap();
/// ```
pub struct RenderBuffers {
    storage: RwLock<BufferStorage>,
}

impl RenderBuffers {
    /// Allocate zeroed buffers for the given frame.
    pub fn new(params: BufferParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            storage: RwLock::new(BufferStorage::allocate(params)),
        })
    }

    /// Buffers without storage; `reset()` must be called before rendering.
    pub fn empty() -> Self {
        Self {
            storage: RwLock::new(BufferStorage::allocate(BufferParams::default())),
        }
    }

    /// Replace the frame parameters. All previous contents are discarded.
    pub(crate) fn reset(&self, params: BufferParams) -> Result<()> {
        params.validate()?;
        let mut storage = self.storage.write();
        if storage.params == params {
            storage.data.iter().for_each(|cell| cell.store(0.0));
        } else {
            *storage = BufferStorage::allocate(params);
        }
        tracing::debug!("render buffers reset to {}x{}", params.width, params.height);
        Ok(())
    }

    /// Current frame parameters.
    pub fn params(&self) -> BufferParams {
        self.storage.read().params
    }

    /// Shared access for kernels and callbacks.
    pub fn read(&self) -> BufferView<'_> {
        BufferView {
            storage: self.storage.read(),
        }
    }
}

impl std::fmt::Debug for RenderBuffers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBuffers")
            .field("params", &self.params())
            .finish()
    }
}

/// Read guard over the buffer storage.
///
/// Holding a view blocks `reset()` but not other views.
pub struct BufferView<'a> {
    storage: RwLockReadGuard<'a, BufferStorage>,
}

impl BufferView<'_> {
    /// Frame parameters the storage was allocated for.
    #[inline]
    pub fn params(&self) -> &BufferParams {
        &self.storage.params
    }

    #[inline]
    fn cell_range(&self, pixel_index: usize, pass: PassType) -> std::ops::Range<usize> {
        let params = &self.storage.params;
        let start = pixel_index * params.pass_stride() + params.pass_offset(pass);
        start..start + pass.num_components()
    }

    /// Add `values` to the pass of one pixel.
    ///
    /// Only the queue owning the tile that covers `pixel_index` may call this.
    #[inline]
    pub fn accumulate(&self, pixel_index: usize, pass: PassType, values: &[f32]) {
        let range = self.cell_range(pixel_index, pass);
        for (cell, value) in self.storage.data[range].iter().zip(values) {
            cell.add(*value);
        }
    }

    /// Read the pass values of one pixel.
    pub fn pixel(&self, pixel_index: usize, pass: PassType) -> Vec<f32> {
        let range = self.cell_range(pixel_index, pass);
        self.storage.data[range].iter().map(AtomicF32::load).collect()
    }

    /// Accumulated RGBA of a pixel at absolute raster position.
    pub fn combined(&self, x: i32, y: i32) -> [f32; 4] {
        let index = self.storage.params.pixel_index(x, y);
        let range = self.cell_range(index, PassType::Combined);
        let cells = &self.storage.data[range];
        [cells[0].load(), cells[1].load(), cells[2].load(), cells[3].load()]
    }

    /// Samples accumulated into the pixel at absolute raster position.
    pub fn sample_count(&self, x: i32, y: i32) -> u32 {
        let index = self.storage.params.pixel_index(x, y);
        let range = self.cell_range(index, PassType::SampleCount);
        self.storage.data[range.start].load() as u32
    }

    /// Combined pass divided by each pixel's sample count, row-major RGBA.
    pub fn get_combined_pixels(&self) -> Vec<f32> {
        let params = &self.storage.params;
        let combined = params.pass_offset(PassType::Combined);
        let count = params.pass_offset(PassType::SampleCount);
        let mut pixels = Vec::with_capacity(params.num_pixels() * 4);

        for pixel in self.storage.data.chunks_exact(params.pass_stride()) {
            let samples = pixel[count].load();
            let scale = if samples > 0.0 { 1.0 / samples } else { 0.0 };
            pixels.extend(pixel[combined..combined + 4].iter().map(|c| c.load() * scale));
        }
        pixels
    }
}
