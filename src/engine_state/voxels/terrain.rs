//! # Terrain Generation
//!
//! Terrain generators fill a freshly created voxel grid for a chunk position.
//! They run on the generation worker pool, so implementations must be safe to
//! call concurrently for different positions.

use noise::{NoiseFn, Perlin};
use thiserror::Error;

use super::{
    block::{block_type::BlockType, Block},
    chunk::{ChunkPosition, VoxelGrid, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
};

/// Failure reported by a terrain generator.
#[derive(Debug, Error)]
pub enum TerrainError {
    /// The generator could not produce terrain for the chunk.
    #[error("terrain generation failed for chunk {position}: {reason}")]
    Failed {
        /// Chunk that failed
        position: ChunkPosition,
        /// Human readable cause
        reason: String,
    },
}

/// Fills voxel grids with terrain.
pub trait TerrainGenerator: Send + Sync {
    /// Fills `grid` in place with the terrain of chunk column (`chunk_x`, `chunk_z`).
    fn generate(&self, grid: &mut VoxelGrid, chunk_x: i32, chunk_z: i32) -> Result<(), TerrainError>;
}

/// Horizontal scale applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.015;
/// Height around which the terrain undulates.
pub const BASE_HEIGHT: f64 = 64.0;
/// Peak deviation from `BASE_HEIGHT`.
pub const HEIGHT_AMPLITUDE: f64 = 24.0;
/// Columns whose surface is below this height are flooded with water.
pub const WATER_LEVEL: usize = 58;
/// Thickness of the dirt layer below grass.
const DIRT_DEPTH: usize = 4;

/// Rolling hills from a 2D Perlin height map.
///
/// Columns are grass over dirt over stone; surfaces at or below the water line are
/// sand, with water filled up to `WATER_LEVEL`.
pub struct PerlinTerrainGenerator {
    perlin: Perlin,
}

impl PerlinTerrainGenerator {
    /// Creates a generator; the same seed always produces the same world.
    pub fn new(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
        }
    }

    /// Surface height of the world column at world block coordinates (x, z).
    pub fn height_at(&self, world_x: i32, world_z: i32) -> usize {
        let broad = self.perlin.get([
            world_x as f64 * PERLIN_SCALE_FACTOR,
            world_z as f64 * PERLIN_SCALE_FACTOR,
        ]);
        let detail = self.perlin.get([
            world_x as f64 * PERLIN_SCALE_FACTOR * 4.0,
            world_z as f64 * PERLIN_SCALE_FACTOR * 4.0,
        ]);
        let height = BASE_HEIGHT + HEIGHT_AMPLITUDE * (broad + 0.25 * detail);
        height.clamp(1.0, (CHUNK_HEIGHT - 1) as f64) as usize
    }
}

impl TerrainGenerator for PerlinTerrainGenerator {
    fn generate(&self, grid: &mut VoxelGrid, chunk_x: i32, chunk_z: i32) -> Result<(), TerrainError> {
        let stone = Block::new(BlockType::STONE);
        let dirt = Block::new(BlockType::DIRT);
        let grass = Block::new(BlockType::GRASS);
        let sand = Block::new(BlockType::SAND);
        let water = Block::new(BlockType::WATER);

        for z in 0..CHUNK_DEPTH {
            for x in 0..CHUNK_WIDTH {
                let world_x = chunk_x * CHUNK_WIDTH as i32 + x as i32;
                let world_z = chunk_z * CHUNK_DEPTH as i32 + z as i32;
                let surface = self.height_at(world_x, world_z);
                let underwater = surface <= WATER_LEVEL;

                for y in 0..=surface {
                    let block = if y == surface {
                        if underwater {
                            sand
                        } else {
                            grass
                        }
                    } else if y + DIRT_DEPTH >= surface {
                        if underwater {
                            sand
                        } else {
                            dirt
                        }
                    } else {
                        stone
                    };
                    grid.fill_cell(x, y, z, block);
                }

                for y in surface + 1..=WATER_LEVEL {
                    grid.fill_cell(x, y, z, water);
                }
            }
        }

        Ok(())
    }
}

/// Flat terrain of a single block type up to a fixed height.
pub struct FlatTerrainGenerator {
    /// Number of filled layers, starting at `y = 0`
    pub height: usize,
    /// Block used for every filled cell
    pub block_type: BlockType,
}

impl FlatTerrainGenerator {
    /// Creates a generator filling `height` layers with `block_type`.
    pub fn new(height: usize, block_type: BlockType) -> Self {
        Self { height, block_type }
    }
}

impl TerrainGenerator for FlatTerrainGenerator {
    fn generate(&self, grid: &mut VoxelGrid, chunk_x: i32, chunk_z: i32) -> Result<(), TerrainError> {
        if self.height > CHUNK_HEIGHT {
            return Err(TerrainError::Failed {
                position: ChunkPosition::new(chunk_x, chunk_z),
                reason: format!("height {} exceeds the world height", self.height),
            });
        }
        let block = Block::new(self.block_type);
        for y in 0..self.height {
            for z in 0..CHUNK_DEPTH {
                for x in 0..CHUNK_WIDTH {
                    grid.fill_cell(x, y, z, block);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perlin_is_deterministic_per_seed() {
        let generator = PerlinTerrainGenerator::new(7);
        let mut first = VoxelGrid::new(ChunkPosition::new(2, -3));
        let mut second = VoxelGrid::new(ChunkPosition::new(2, -3));

        generator.generate(&mut first, 2, -3).unwrap();
        generator.generate(&mut second, 2, -3).unwrap();

        for z in 0..CHUNK_DEPTH {
            for x in 0..CHUNK_WIDTH {
                assert_eq!(first.surface_height(x, z), second.surface_height(x, z));
            }
        }
    }

    #[test]
    fn test_perlin_columns_are_layered() {
        let generator = PerlinTerrainGenerator::new(1);
        let mut grid = VoxelGrid::new(ChunkPosition::new(0, 0));
        generator.generate(&mut grid, 0, 0).unwrap();

        for z in 0..CHUNK_DEPTH {
            for x in 0..CHUNK_WIDTH {
                let top = grid.surface_height(x, z).unwrap();
                assert!(top >= WATER_LEVEL.min(generator.height_at(x as i32, z as i32)));
                assert_eq!(grid.get(x, 0, z).kind(), Some(BlockType::STONE));
            }
        }
        assert!(!grid.is_dirty());
    }

    #[test]
    fn test_flat_generator_fills_exact_height() {
        let generator = FlatTerrainGenerator::new(10, BlockType::DIRT);
        let mut grid = VoxelGrid::new(ChunkPosition::new(0, 0));
        generator.generate(&mut grid, 0, 0).unwrap();

        assert_eq!(grid.solid_count(), 10 * CHUNK_WIDTH * CHUNK_DEPTH);
        assert_eq!(grid.surface_height(5, 5), Some(9));
    }

    #[test]
    fn test_flat_generator_rejects_impossible_height() {
        let generator = FlatTerrainGenerator::new(CHUNK_HEIGHT + 1, BlockType::DIRT);
        let mut grid = VoxelGrid::new(ChunkPosition::new(4, 4));
        assert!(generator.generate(&mut grid, 4, 4).is_err());
    }
}
