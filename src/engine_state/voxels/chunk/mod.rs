//! # Chunk Module
//!
//! This module provides the `VoxelGrid` holding one chunk column's blocks, and
//! the `ChunkPosition` key used by every chunk-indexed container.
//!
//! ## Storage
//!
//! A grid is a flat array of two-byte [`Block`]s in `(y, z, x)` order, so one
//! horizontal slice is contiguous. Grids are cloned only when a writer touches a
//! grid that a meshing worker still holds a snapshot of.

use std::fmt;

use cgmath::Point3;
use thiserror::Error;

use super::block::{block_side::BlockSide, block_type::BlockType, Block};

/// Width of a chunk along X, in blocks.
pub const CHUNK_WIDTH: usize = 16;
/// Height of a chunk along Y, in blocks. Also the vertical extent of the world.
pub const CHUNK_HEIGHT: usize = 256;
/// Depth of a chunk along Z, in blocks.
pub const CHUNK_DEPTH: usize = 16;
/// Extent of a chunk along each axis, indexed by axis.
pub const CHUNK_EXTENT: [usize; 3] = [CHUNK_WIDTH, CHUNK_HEIGHT, CHUNK_DEPTH];
/// The number of blocks in a single horizontal slice of a chunk.
pub const CHUNK_PLANE_SIZE: usize = CHUNK_WIDTH * CHUNK_DEPTH;
/// The total number of blocks in a chunk.
pub const CHUNK_SIZE: usize = CHUNK_PLANE_SIZE * CHUNK_HEIGHT;

/// Integer (x, z) coordinate of a chunk column.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChunkPosition {
    /// Column index along X
    pub x: i32,
    /// Column index along Z
    pub z: i32,
}

impl ChunkPosition {
    /// Creates a chunk position from column indices.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The chunk containing the given world block coordinates.
    pub fn from_block(world_x: i32, world_z: i32) -> Self {
        Self {
            x: world_x.div_euclid(CHUNK_WIDTH as i32),
            z: world_z.div_euclid(CHUNK_DEPTH as i32),
        }
    }

    /// The chunk containing the given world-space point (e.g. a camera position).
    pub fn containing(view_x: f32, view_z: f32) -> Self {
        Self::from_block(view_x.floor() as i32, view_z.floor() as i32)
    }

    /// Chebyshev (chessboard) distance in chunks.
    pub fn distance(&self, other: ChunkPosition) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// Squared Euclidean distance in chunks, used to order work nearest first.
    pub fn distance_squared(&self, other: ChunkPosition) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dz * dz
    }

    /// The horizontally adjacent chunk on the given side.
    ///
    /// TOP and BOTTOM have no neighbouring chunk, as a chunk spans the full world
    /// height; they return `self`.
    pub fn neighbor(&self, side: BlockSide) -> ChunkPosition {
        let [dx, _, dz] = side.offset();
        ChunkPosition::new(self.x + dx, self.z + dz)
    }

    /// World-space coordinates of this chunk's minimum corner.
    pub fn origin(&self) -> Point3<f32> {
        Point3::new(
            (self.x * CHUNK_WIDTH as i32) as f32,
            0.0,
            (self.z * CHUNK_DEPTH as i32) as f32,
        )
    }

    /// All positions within `radius` (Chebyshev) of this one, nearest first.
    pub fn square_around(&self, radius: i32) -> Vec<ChunkPosition> {
        let mut positions = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
        for x in -radius..=radius {
            for z in -radius..=radius {
                positions.push(ChunkPosition::new(self.x + x, self.z + z));
            }
        }
        positions.sort_by_key(|position| (position.distance_squared(*self), *position));
        positions
    }
}

impl fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Errors produced by direct voxel grid access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    /// The local coordinate lies outside the grid.
    #[error("local coordinate ({x}, {y}, {z}) is outside the chunk")]
    OutOfBounds {
        /// Local X
        x: i32,
        /// Local Y
        y: i32,
        /// Local Z
        z: i32,
    },
}

/// A chunk column's worth of blocks.
///
/// The grid is owned by its chunk and mutated only through [`VoxelGrid::set`],
/// which also flags the grid as needing a new mesh.
#[derive(Clone, Debug)]
pub struct VoxelGrid {
    position: ChunkPosition,
    blocks: Box<[Block]>,
    dirty: bool,
}

impl VoxelGrid {
    /// Creates a new, completely empty grid (all blocks are air).
    pub fn new(position: ChunkPosition) -> Self {
        Self {
            position,
            blocks: vec![Block::AIR; CHUNK_SIZE].into_boxed_slice(),
            dirty: false,
        }
    }

    /// Creates a grid completely filled with one block type.
    pub fn solid(position: ChunkPosition, block_type: BlockType) -> Self {
        Self {
            position,
            blocks: vec![Block::new(block_type); CHUNK_SIZE].into_boxed_slice(),
            dirty: false,
        }
    }

    /// Creates a grid with a 3D checkerboard of `block_type` and air between
    /// `y = 0` and `height`; the worst case for face merging.
    pub fn checkerboard(position: ChunkPosition, block_type: BlockType, height: usize) -> Self {
        let mut grid = Self::new(position);
        for y in 0..height.min(CHUNK_HEIGHT) {
            for z in 0..CHUNK_DEPTH {
                for x in 0..CHUNK_WIDTH {
                    if (x + y + z) % 2 == 0 {
                        grid.blocks[Self::index(x, y, z)] = Block::new(block_type);
                    }
                }
            }
        }
        grid
    }

    /// The chunk this grid belongs to.
    pub fn position(&self) -> ChunkPosition {
        self.position
    }

    #[inline]
    fn index(x: usize, y: usize, z: usize) -> usize {
        (y * CHUNK_DEPTH + z) * CHUNK_WIDTH + x
    }

    #[inline]
    fn in_bounds(x: i32, y: i32, z: i32) -> bool {
        (0..CHUNK_WIDTH as i32).contains(&x)
            && (0..CHUNK_HEIGHT as i32).contains(&y)
            && (0..CHUNK_DEPTH as i32).contains(&z)
    }

    /// Gets the block at local coordinates.
    ///
    /// # Panics
    /// Panics if the coordinates are outside the grid.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Block {
        self.blocks[Self::index(x, y, z)]
    }

    /// Gets the block at possibly out-of-range local coordinates.
    ///
    /// # Returns
    /// `None` when the coordinates are outside the grid.
    #[inline]
    pub fn get_checked(&self, x: i32, y: i32, z: i32) -> Option<Block> {
        if Self::in_bounds(x, y, z) {
            Some(self.get(x as usize, y as usize, z as usize))
        } else {
            None
        }
    }

    /// Sets the block at local coordinates and marks the grid dirty.
    ///
    /// # Returns
    /// The block previously stored in the cell.
    pub fn set(&mut self, x: i32, y: i32, z: i32, block: Block) -> Result<Block, GridError> {
        if !Self::in_bounds(x, y, z) {
            return Err(GridError::OutOfBounds { x, y, z });
        }
        let index = Self::index(x as usize, y as usize, z as usize);
        let previous = std::mem::replace(&mut self.blocks[index], block);
        self.dirty = true;
        Ok(previous)
    }

    /// Writes a block during generation without flagging the grid for remeshing.
    ///
    /// Used by terrain generators, which fill grids before they are ever meshed.
    #[inline]
    pub fn fill_cell(&mut self, x: usize, y: usize, z: usize, block: Block) {
        self.blocks[Self::index(x, y, z)] = block;
    }

    /// Whether the grid changed since the last call to [`VoxelGrid::take_dirty`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears and returns the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Number of non-air cells.
    pub fn solid_count(&self) -> usize {
        self.blocks.iter().filter(|block| !block.is_air()).count()
    }

    /// Height of the topmost non-air block in the column at (x, z), if any.
    pub fn surface_height(&self, x: usize, z: usize) -> Option<usize> {
        (0..CHUNK_HEIGHT).rev().find(|&y| !self.get(x, y, z).is_air())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_position_from_negative_blocks() {
        assert_eq!(ChunkPosition::from_block(-1, -16), ChunkPosition::new(-1, -1));
        assert_eq!(ChunkPosition::from_block(15, 16), ChunkPosition::new(0, 1));
        assert_eq!(ChunkPosition::containing(-0.5, 31.9), ChunkPosition::new(-1, 1));
    }

    #[test]
    fn test_square_around_is_nearest_first() {
        let center = ChunkPosition::new(3, -2);
        let square = center.square_around(2);

        assert_eq!(square.len(), 25);
        assert_eq!(square[0], center);
        assert!(square.iter().all(|position| position.distance(center) <= 2));
        assert!(square
            .windows(2)
            .all(|pair| pair[0].distance_squared(center) <= pair[1].distance_squared(center)));
    }

    #[test]
    fn test_set_marks_dirty_and_returns_previous() {
        let mut grid = VoxelGrid::solid(ChunkPosition::default(), BlockType::STONE);
        assert!(!grid.is_dirty());

        let previous = grid.set(1, 2, 3, Block::AIR).unwrap();

        assert_eq!(previous, Block::new(BlockType::STONE));
        assert!(grid.get(1, 2, 3).is_air());
        assert!(grid.take_dirty());
        assert!(!grid.is_dirty());
    }

    #[test]
    fn test_set_out_of_bounds() {
        let mut grid = VoxelGrid::new(ChunkPosition::default());
        assert_eq!(
            grid.set(0, 256, 0, Block::AIR),
            Err(GridError::OutOfBounds { x: 0, y: 256, z: 0 })
        );
        assert_eq!(grid.get_checked(-1, 0, 0), None);
    }

    #[test]
    fn test_checkerboard_fills_half() {
        let grid = VoxelGrid::checkerboard(ChunkPosition::default(), BlockType::DIRT, 4);
        assert_eq!(grid.solid_count(), CHUNK_PLANE_SIZE * 4 / 2);
        assert_eq!(grid.surface_height(0, 1), Some(3));
    }
}
