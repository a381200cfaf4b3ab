// tile.rs — Tile geometry: how the (width, height, batch) index space is
// cut into cooperating groups.
//
// A group is `width × height × batch_slice` workers sharing one staging
// tile. Groups tile the image plane with ceiling division; the batch axis
// is sliced the same way. The part of a tile covered by in-range workers
// is its POPULATED extent: `min(tile_extent, image_extent - origin)`.
// Border clamping in the convolution stages is bounded by the populated
// extent, never the full tile extent, so no tile cell is read that was
// never written.
//
// The CPU reference iterates the exact same decomposition as the GPU
// dispatch, which is what makes byte-for-byte agreement possible.

/// Worker-group dimensions: the tile footprint plus the batch slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    /// Tile width in pixels (workers along x).
    pub width: usize,
    /// Tile height in pixels (workers along y).
    pub height: usize,
    /// Images processed by sibling workers of one group.
    pub batch_slice: usize,
}

impl TileGeometry {
    /// # Panics
    /// Panics if any dimension is zero.
    pub fn new(width: usize, height: usize, batch_slice: usize) -> Self {
        assert!(
            width > 0 && height > 0 && batch_slice > 0,
            "tile dimensions must be nonzero (got {width}×{height}×{batch_slice})"
        );
        TileGeometry { width, height, batch_slice }
    }

    /// Workers per group.
    pub fn group_size(&self) -> usize {
        self.width * self.height * self.batch_slice
    }

    /// Iterate the groups covering a `width × height` image plane, row
    /// major. Groups whose origin is inside the plane always have a
    /// nonzero populated extent.
    pub fn groups(&self, image_width: usize, image_height: usize) -> impl Iterator<Item = TileGroup> + '_ {
        let groups_x = image_width.div_ceil(self.width);
        let groups_y = image_height.div_ceil(self.height);
        let tile_w = self.width;
        let tile_h = self.height;
        (0..groups_y).flat_map(move |gy| {
            (0..groups_x).map(move |gx| {
                let origin_x = gx * tile_w;
                let origin_y = gy * tile_h;
                TileGroup {
                    origin_x,
                    origin_y,
                    populated_w: tile_w.min(image_width - origin_x),
                    populated_h: tile_h.min(image_height - origin_y),
                }
            })
        })
    }
}

/// One group's placement on the image plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGroup {
    /// Global x of the tile's (0, 0) cell.
    pub origin_x: usize,
    /// Global y of the tile's (0, 0) cell.
    pub origin_y: usize,
    /// Tile columns covered by in-range workers.
    pub populated_w: usize,
    /// Tile rows covered by in-range workers.
    pub populated_h: usize,
}

impl TileGroup {
    /// Clamp a tile-local coordinate to the populated extent.
    ///
    /// This is the border policy of the convolution stages: out-of-range
    /// neighbor offsets land on the tile's own edge cell, NOT the image's
    /// global edge. The two coincide only where a group edge falls on an
    /// image edge.
    #[inline]
    pub fn clamp_local(&self, lx: isize, ly: isize) -> (usize, usize) {
        let cx = lx.clamp(0, self.populated_w as isize - 1) as usize;
        let cy = ly.clamp(0, self.populated_h as isize - 1) as usize;
        (cx, cy)
    }
}
