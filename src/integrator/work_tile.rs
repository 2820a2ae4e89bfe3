//! Unit of work handed from the scheduler to one queue.

/// Rectangle of pixels plus the range of samples to render for it.
///
/// Coordinates are absolute raster positions. The buffer index of pixel
/// `(x, y)` is `offset + x + y * stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkTile {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,

    pub start_sample: u32,
    pub num_samples: u32,

    pub offset: i64,
    pub stride: u32,
}

impl WorkTile {
    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Pixels times samples.
    #[inline]
    pub fn num_work_items(&self) -> usize {
        self.num_pixels() * self.num_samples as usize
    }

    /// Pixel index in the full-frame buffer.
    #[inline]
    pub fn buffer_index(&self, x: i32, y: i32) -> usize {
        (self.offset + x as i64 + y as i64 * self.stride as i64) as usize
    }

    /// Absolute raster positions covered by the tile, row by row.
    pub fn pixels(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (0..self.height as i32)
            .flat_map(move |dy| (0..self.width as i32).map(move |dx| (self.x + dx, self.y + dy)))
    }

    /// Sample indices covered by the tile.
    #[inline]
    pub fn samples(&self) -> std::ops::Range<u32> {
        self.start_sample..self.start_sample + self.num_samples
    }

    /// Split the sample range into consecutive tiles of the same pixels with
    /// at most `max_work_items` work items each (at least one sample).
    pub fn sample_chunks(&self, max_work_items: usize) -> impl Iterator<Item = WorkTile> {
        let tile = *self;
        let chunk = (max_work_items / tile.num_pixels().max(1)).clamp(1, tile.num_samples.max(1) as usize) as u32;
        (0..tile.num_samples).step_by(chunk as usize).map(move |offset| WorkTile {
            start_sample: tile.start_sample + offset,
            num_samples: chunk.min(tile.num_samples - offset),
            ..tile
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_index_with_origin() {
        // Frame origin at (10, 5), 8 pixels wide.
        let tile = WorkTile {
            x: 12,
            y: 6,
            width: 2,
            height: 2,
            start_sample: 0,
            num_samples: 1,
            offset: -(10 + 5 * 8),
            stride: 8,
        };
        assert_eq!(tile.buffer_index(10, 5), 0);
        assert_eq!(tile.buffer_index(12, 6), 10);
        assert_eq!(tile.buffer_index(13, 7), 19);
    }

    #[test]
    fn test_pixels_and_samples() {
        let tile = WorkTile {
            x: 1,
            y: 2,
            width: 3,
            height: 2,
            start_sample: 4,
            num_samples: 2,
            offset: 0,
            stride: 3,
        };
        let pixels: Vec<_> = tile.pixels().collect();
        assert_eq!(pixels.len(), 6);
        assert_eq!(pixels[0], (1, 2));
        assert_eq!(pixels[5], (3, 3));
        assert_eq!(tile.samples(), 4..6);
        assert_eq!(tile.num_work_items(), 12);
    }

    #[test]
    fn test_sample_chunks() {
        let tile = WorkTile {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            start_sample: 3,
            num_samples: 7,
            offset: 0,
            stride: 2,
        };

        let chunks: Vec<_> = tile.sample_chunks(8).collect();
        let ranges: Vec<_> = chunks.iter().map(|c| c.samples()).collect();
        assert_eq!(ranges, vec![3..5, 5..7, 7..9, 9..10]);
        assert!(chunks.iter().all(|c| c.num_work_items() <= 8));
        assert!(chunks.iter().all(|c| (c.x, c.y, c.width, c.height) == (0, 0, 2, 2)));

        // Wavefront smaller than one sample of the tile still makes progress.
        assert_eq!(tile.sample_chunks(1).count(), 7);
        // Large wavefront keeps the tile whole.
        assert_eq!(tile.sample_chunks(usize::MAX).collect::<Vec<_>>(), vec![tile]);
    }
}
