//! Lock-free distribution of work tiles between queue driver threads.
//!
//! After `reset()` the frame is split into a grid of square tiles, every tile
//! covering all samples of the batch. Tiles are claimed through a single
//! atomic counter, so concurrent `get_work()` calls never hand out the same
//! tile twice and tiles never overlap. Pixel disjointness is what lets queues
//! accumulate into the shared render buffers without locking them.
//!
//! Tiles are sized so that `area * min(num_samples, max_num_path_states)`
//! fits the wavefront. When a batch has more samples than that, the claiming
//! queue runs the tile as [`WorkTile::sample_chunks`], one after another.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::WorkTile;

/// Tiles per worker the grid aims for, so that faster queues can pick up the
/// slack of slower ones.
const TILES_PER_WORKER: usize = 4;

/// Hands out tiles of (pixels, samples) work for one batch.
#[derive(Debug)]
pub struct WorkScheduler {
    max_num_path_states: usize,
    num_workers: usize,

    full_x: i32,
    full_y: i32,
    width: u32,
    height: u32,
    start_sample: u32,
    num_samples: u32,

    tile_size: u32,
    num_tiles_x: u32,
    total_tiles: usize,
    next_tile: AtomicUsize,
}

impl Default for WorkScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkScheduler {
    pub fn new() -> Self {
        Self {
            max_num_path_states: usize::MAX,
            num_workers: 1,
            full_x: 0,
            full_y: 0,
            width: 0,
            height: 0,
            start_sample: 0,
            num_samples: 0,
            tile_size: 1,
            num_tiles_x: 0,
            total_tiles: 0,
            next_tile: AtomicUsize::new(0),
        }
    }

    /// Bound the work items (pixels times samples) of a single queue pass.
    ///
    /// Tile area times `min(num_samples, n)` stays within `n`; the sample
    /// range of a tile is split with [`WorkTile::sample_chunks`] using
    /// [`Self::max_num_path_states`]. Takes effect on the next `reset()`.
    pub fn set_max_num_path_states(&mut self, max_num_path_states: usize) {
        self.max_num_path_states = max_num_path_states.max(1);
    }

    /// Number of threads pulling work concurrently.
    ///
    /// Takes effect on the next `reset()`.
    pub fn set_num_workers(&mut self, num_workers: usize) {
        self.num_workers = num_workers.max(1);
    }

    /// Prepare tiles for a new batch of samples over the given frame.
    pub fn reset(
        &mut self,
        full_x: i32,
        full_y: i32,
        width: u32,
        height: u32,
        start_sample: u32,
        num_samples: u32,
    ) {
        self.full_x = full_x;
        self.full_y = full_y;
        self.width = width;
        self.height = height;
        self.start_sample = start_sample;
        self.num_samples = num_samples;

        if width == 0 || height == 0 || num_samples == 0 {
            self.tile_size = 1;
            self.num_tiles_x = 0;
            self.total_tiles = 0;
        } else {
            self.tile_size = self.compute_tile_size();
            self.num_tiles_x = width.div_ceil(self.tile_size);
            let num_tiles_y = height.div_ceil(self.tile_size);
            self.total_tiles = self.num_tiles_x as usize * num_tiles_y as usize;
        }

        *self.next_tile.get_mut() = 0;

        tracing::trace!(
            "work scheduler reset: {}x{} samples {}..{}, {} tiles of {}px",
            width,
            height,
            start_sample,
            start_sample + num_samples,
            self.total_tiles,
            self.tile_size
        );
    }

    fn compute_tile_size(&self) -> u32 {
        let chunk_samples = (self.num_samples as usize).min(self.max_num_path_states);
        let pixels_per_tile = (self.max_num_path_states / chunk_samples).max(1);
        let mut size = isqrt(pixels_per_tile);

        if self.num_workers > 1 {
            let num_pixels = self.width as usize * self.height as usize;
            let target_tiles = self.num_workers * TILES_PER_WORKER;
            size = size.min(isqrt((num_pixels / target_tiles).max(1)));
        }

        size.clamp(1, self.width.max(self.height) as usize) as u32
    }

    /// Claim the next tile. `None` once the batch is exhausted.
    pub fn get_work(&self) -> Option<WorkTile> {
        let index = self.next_tile.fetch_add(1, Ordering::Relaxed);
        if index >= self.total_tiles {
            return None;
        }

        let tile_x = (index % self.num_tiles_x as usize) as u32;
        let tile_y = (index / self.num_tiles_x as usize) as u32;
        let local_x = tile_x * self.tile_size;
        let local_y = tile_y * self.tile_size;

        Some(WorkTile {
            x: self.full_x + local_x as i32,
            y: self.full_y + local_y as i32,
            width: self.tile_size.min(self.width - local_x),
            height: self.tile_size.min(self.height - local_y),
            start_sample: self.start_sample,
            num_samples: self.num_samples,
            offset: -(self.full_x as i64) - self.full_y as i64 * self.width as i64,
            stride: self.width,
        })
    }

    /// Tiles in the current batch.
    #[inline]
    pub fn num_tiles(&self) -> usize {
        self.total_tiles
    }

    /// Edge length of the tiles in the current batch.
    #[inline]
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Work items a single queue pass may hold.
    #[inline]
    pub fn max_num_path_states(&self) -> usize {
        self.max_num_path_states
    }
}

/// Floor of the square root, exact for every `usize`.
fn isqrt(n: usize) -> usize {
    if n < 2 {
        return n;
    }
    // Power of two at or above the root, Newton steps only go down from there.
    let mut x = 1usize << (usize::BITS - n.leading_zeros()).div_ceil(2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Count how often every (x, y, sample) unit was handed out.
    fn coverage(tiles: &[WorkTile]) -> HashMap<(i32, i32, u32), usize> {
        let mut units = HashMap::new();
        for tile in tiles {
            for (x, y) in tile.pixels() {
                for sample in tile.samples() {
                    *units.entry((x, y, sample)).or_insert(0) += 1;
                }
            }
        }
        units
    }

    fn drain(scheduler: &WorkScheduler) -> Vec<WorkTile> {
        std::iter::from_fn(|| scheduler.get_work()).collect()
    }

    fn assert_partition(tiles: &[WorkTile], x0: i32, y0: i32, w: u32, h: u32, s0: u32, ns: u32) {
        let units = coverage(tiles);
        assert_eq!(units.len(), (w * h * ns) as usize, "gaps in coverage");
        for ((x, y, s), count) in units {
            assert_eq!(count, 1, "unit ({x}, {y}, {s}) assigned {count} times");
            assert!(x >= x0 && x < x0 + w as i32);
            assert!(y >= y0 && y < y0 + h as i32);
            assert!(s >= s0 && s < s0 + ns);
        }
    }

    #[test]
    fn test_empty_before_reset() {
        let scheduler = WorkScheduler::new();
        assert!(scheduler.get_work().is_none());
    }

    #[test]
    fn test_partition_grid() {
        let sizes = [(1, 1), (4, 4), (7, 3), (64, 33), (100, 1)];
        let states = [1, 5, 64, 1 << 20, usize::MAX];
        let workers = [1, 2, 7];

        for &(w, h) in &sizes {
            for &max_states in &states {
                for &num_workers in &workers {
                    let mut scheduler = WorkScheduler::new();
                    scheduler.set_max_num_path_states(max_states);
                    scheduler.set_num_workers(num_workers);
                    scheduler.reset(-3, 5, w, h, 10, 2);

                    let tiles = drain(&scheduler);
                    assert_eq!(tiles.len(), scheduler.num_tiles());
                    assert_partition(&tiles, -3, 5, w, h, 10, 2);
                }
            }
        }
    }

    #[test]
    fn test_tile_respects_path_states() {
        let mut scheduler = WorkScheduler::new();
        scheduler.set_max_num_path_states(64);
        scheduler.reset(0, 0, 100, 100, 0, 4);
        // 64 states / 4 samples = 16 pixels -> 4x4 tiles.
        assert_eq!(scheduler.tile_size(), 4);
        for tile in drain(&scheduler) {
            assert!(tile.num_work_items() <= 64);
        }
    }

    #[test]
    fn test_more_samples_than_path_states() {
        let mut scheduler = WorkScheduler::new();
        scheduler.set_max_num_path_states(4);
        scheduler.reset(0, 0, 9, 9, 0, 8);

        let tiles = drain(&scheduler);
        assert_partition(&tiles, 0, 0, 9, 9, 0, 8);

        let chunks: Vec<WorkTile> = tiles
            .iter()
            .flat_map(|t| t.sample_chunks(scheduler.max_num_path_states()))
            .collect();
        assert_partition(&chunks, 0, 0, 9, 9, 0, 8);
        for chunk in &chunks {
            assert!(chunk.num_work_items() <= 4, "{chunk:?}");
        }
    }

    #[test]
    fn test_isqrt_exact() {
        for n in 0..2000usize {
            let r = isqrt(n);
            assert!(r * r <= n && (r + 1) * (r + 1) > n, "isqrt({n}) = {r}");
        }
        for n in [usize::MAX, usize::MAX - 1, (1usize << 53) + 1, 1 << 52] {
            let r = isqrt(n) as u128;
            assert!(r * r <= n as u128 && (r + 1) * (r + 1) > n as u128, "isqrt({n}) = {r}");
        }
    }

    #[test]
    fn test_workers_get_several_tiles() {
        let mut scheduler = WorkScheduler::new();
        scheduler.set_num_workers(2);
        scheduler.reset(0, 0, 4, 4, 0, 1);
        assert!(scheduler.num_tiles() >= 2 * TILES_PER_WORKER);
    }

    #[test]
    fn test_reset_restarts() {
        let mut scheduler = WorkScheduler::new();
        scheduler.reset(0, 0, 8, 8, 0, 1);
        let first = drain(&scheduler);
        assert!(scheduler.get_work().is_none());

        scheduler.reset(0, 0, 8, 8, 1, 1);
        let second = drain(&scheduler);
        assert_eq!(first.len(), second.len());
        assert!(second.iter().all(|t| t.start_sample == 1));
    }

    #[test]
    fn test_zero_samples_yields_nothing() {
        let mut scheduler = WorkScheduler::new();
        scheduler.reset(0, 0, 8, 8, 0, 0);
        assert!(scheduler.get_work().is_none());
    }

    #[test]
    fn test_concurrent_partition() {
        let mut scheduler = WorkScheduler::new();
        scheduler.set_max_num_path_states(16);
        scheduler.set_num_workers(8);
        scheduler.reset(2, 3, 97, 61, 5, 1);

        let scheduler = &scheduler;
        let tiles: Vec<WorkTile> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(move || drain(scheduler)))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("worker panicked"))
                .collect()
        });

        assert_eq!(tiles.len(), scheduler.num_tiles());
        assert_partition(&tiles, 2, 3, 97, 61, 5, 1);
    }
}
