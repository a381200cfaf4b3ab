// batch.rs — Host-side image batch container.
//
// A batch is a logically 3D array of pixel samples: `width × height ×
// batch` images of identical dimensions, stored as ONE contiguous buffer
// with no per-image headers and no row padding. Each pixel carries either
// 3 interleaved channels (r, g, b) or 1 (luma / edge magnitude).
//
// Memory layout (width=3, height=2, batch=2, channels=1):
//
//   data index:  0  1  2   3  4  5   6  7  8   9 10 11
//   pixel:       |-row 0-| |-row 1-| |-row 0-| |-row 1-|
//   image:       |----- image 0 ----| |----- image 1 ----|
//
// Sample index: ((b * height + y) * width + x) * channels.
//
// Ownership: an ImageBatch is exclusively owned by whichever pipeline
// stage currently holds it; stages hand whole batches forward, never
// share them.

use std::fmt;

/// Channel count of a raw color batch.
pub const RGB_CHANNELS: usize = 3;
/// Channel count of a grayscale / gradient batch.
pub const LUMA_CHANNELS: usize = 1;

/// A batch of same-dimension 8-bit images in one contiguous buffer.
pub struct ImageBatch {
    /// Interleaved samples, row-major within each image, images
    /// concatenated along the batch axis. Length = width * height *
    /// batch * channels.
    data: Vec<u8>,
    width: usize,
    height: usize,
    batch: usize,
    /// 1 or 3 samples per pixel.
    channels: usize,
}

impl Clone for ImageBatch {
    fn clone(&self) -> Self {
        ImageBatch {
            data: self.data.clone(),
            width: self.width,
            height: self.height,
            batch: self.batch,
            channels: self.channels,
        }
    }
}

impl ImageBatch {
    // --- Constructors ---

    /// Create a zero-initialized batch.
    ///
    /// # Panics
    /// Panics if `channels` is not 1 or 3.
    pub fn new(width: usize, height: usize, batch: usize, channels: usize) -> Self {
        assert!(
            channels == LUMA_CHANNELS || channels == RGB_CHANNELS,
            "channels must be 1 or 3 (got {channels})"
        );
        ImageBatch {
            data: vec![0u8; width * height * batch * channels],
            width,
            height,
            batch,
            channels,
        }
    }

    /// Create a batch from an existing sample vector.
    ///
    /// # Panics
    /// Panics if `channels` is not 1 or 3, or if `data.len()` does not
    /// equal `width * height * batch * channels`.
    pub fn from_vec(
        width: usize,
        height: usize,
        batch: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Self {
        assert!(
            channels == LUMA_CHANNELS || channels == RGB_CHANNELS,
            "channels must be 1 or 3 (got {channels})"
        );
        assert_eq!(
            data.len(),
            width * height * batch * channels,
            "data length ({}) must equal width * height * batch * channels ({})",
            data.len(),
            width * height * batch * channels,
        );
        ImageBatch { data, width, height, batch, channels }
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn batch(&self) -> usize {
        self.batch
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Pixels per image (width * height).
    #[inline]
    pub fn plane(&self) -> usize {
        self.width * self.height
    }

    /// Total buffer length in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn sample_index(&self, b: usize, y: usize, x: usize) -> usize {
        self.bounds_check(b, y, x);
        ((b * self.height + y) * self.width + x) * self.channels
    }

    /// Single-channel sample at (b, y, x).
    ///
    /// # Panics
    /// Panics if the batch is not single-channel or the coordinate is out
    /// of bounds.
    #[inline]
    pub fn luma(&self, b: usize, y: usize, x: usize) -> u8 {
        assert_eq!(self.channels, LUMA_CHANNELS, "luma() on a {}-channel batch", self.channels);
        self.data[self.sample_index(b, y, x)]
    }

    #[inline]
    pub fn set_luma(&mut self, b: usize, y: usize, x: usize, value: u8) {
        assert_eq!(self.channels, LUMA_CHANNELS, "set_luma() on a {}-channel batch", self.channels);
        let idx = self.sample_index(b, y, x);
        self.data[idx] = value;
    }

    /// Three-channel sample at (b, y, x) as [r, g, b].
    ///
    /// # Panics
    /// Panics if the batch is not 3-channel or the coordinate is out of
    /// bounds.
    #[inline]
    pub fn rgb(&self, b: usize, y: usize, x: usize) -> [u8; 3] {
        assert_eq!(self.channels, RGB_CHANNELS, "rgb() on a {}-channel batch", self.channels);
        let idx = self.sample_index(b, y, x);
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    #[inline]
    pub fn set_rgb(&mut self, b: usize, y: usize, x: usize, value: [u8; 3]) {
        assert_eq!(self.channels, RGB_CHANNELS, "set_rgb() on a {}-channel batch", self.channels);
        let idx = self.sample_index(b, y, x);
        self.data[idx..idx + 3].copy_from_slice(&value);
    }

    /// Borrow one image's samples as a flat slice.
    ///
    /// # Panics
    /// Panics if `b >= batch`.
    pub fn image(&self, b: usize) -> &[u8] {
        assert!(b < self.batch, "image {b} out of bounds (batch {})", self.batch);
        let len = self.plane() * self.channels;
        &self.data[b * len..(b + 1) * len]
    }

    /// The whole buffer, all images, in batch order.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    // --- Internal helpers ---

    #[inline]
    fn bounds_check(&self, b: usize, y: usize, x: usize) {
        assert!(
            b < self.batch && y < self.height && x < self.width,
            "sample ({b},{y},{x}) out of bounds for batch {}×{}×{}",
            self.width,
            self.height,
            self.batch,
        );
    }
}

// Debug formatting — prints the first image only; batches can be large.
impl fmt::Debug for ImageBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ImageBatch {{ {}×{}×{}, {}ch }}",
            self.width, self.height, self.batch, self.channels,
        )?;
        for y in 0..self.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                if self.channels == 1 {
                    write!(f, "{}", self.luma(0, y, x))?;
                } else {
                    let [r, g, b] = self.rgb(0, y, x);
                    write!(f, "({r},{g},{b})")?;
                }
            }
            if self.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}
