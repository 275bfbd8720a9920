//! # World Module
//!
//! This module provides the `World` struct, the composition the application
//! drives once per frame. It owns the [`ChunkLoader`] and the [`ChunkRenderer`]
//! and is the entry point for block access in world coordinates.
//!
//! ## Frame Order
//!
//! 1. The loader recomputes the wanted set and unloads chunks that left it; their
//!    meshes are released from the renderer
//! 2. Chunks flagged by edits are handed back to the loader for a rebuild
//! 3. A bounded number of finished meshes is uploaded and registered
//! 4. The renderer culls and draws
//!
//! ## Edits
//!
//! Block edits go straight into the resident grid (copy-on-write, so snapshots
//! held by the renderer and workers stay valid). The owning chunk and, for cells
//! on a lateral border, the adjacent chunk are then rebuilt.

use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::{
    config::StreamingConfig,
    engine_state::{
        camera_state::camera::CameraView,
        rendering::{
            atlas::TextureAtlas,
            meshing::{ChunkRenderer, RenderStats},
            render_device::{RenderDevice, RenderError},
        },
    },
};

use super::{
    block::{block_side::BlockSide, Block},
    chunk::{ChunkPosition, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
    chunk_loader::{ChunkLoader, LoaderError},
    terrain::TerrainGenerator,
};

/// Errors raised by block edits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// The chunk holding the block is not resident.
    #[error("chunk {0} is not loaded")]
    ChunkNotLoaded(ChunkPosition),
    /// The block lies outside the world's vertical range.
    #[error("block ({x}, {y}, {z}) is outside the world")]
    OutOfBounds {
        /// World X
        x: i32,
        /// World Y
        y: i32,
        /// World Z
        z: i32,
    },
}

/// Streams, meshes and draws the chunks around a moving viewpoint.
pub struct World {
    loader: ChunkLoader,
    renderer: ChunkRenderer,
}

impl World {
    /// Creates a world and starts its worker pools.
    ///
    /// # Arguments
    /// * `config` - Streaming configuration
    /// * `generator` - Terrain source for new chunks
    /// * `atlas` - Texture layers used by the mesher
    ///
    /// # Errors
    /// Propagates [`LoaderError`] from starting the loader.
    pub fn new(
        config: StreamingConfig,
        generator: Arc<dyn TerrainGenerator>,
        atlas: Arc<dyn TextureAtlas>,
    ) -> Result<Self, LoaderError> {
        Ok(Self {
            loader: ChunkLoader::new(config, generator, atlas)?,
            renderer: ChunkRenderer::new(),
        })
    }

    /// Advances streaming by one frame and draws.
    ///
    /// # Arguments
    /// * `camera` - This frame's eye position and view-projection
    /// * `device` - The render device owned by the calling thread
    ///
    /// # Errors
    /// The first mesh upload failure.
    pub fn frame(
        &mut self,
        camera: &CameraView,
        device: &mut dyn RenderDevice,
    ) -> Result<RenderStats, RenderError> {
        for position in self.loader.update(camera.position.x, camera.position.z) {
            self.renderer.remove_chunk(position, device);
        }

        let max_rebuilds = self.loader.config().max_rebuilds_per_frame;
        for position in self.renderer.take_rebuilds(max_rebuilds) {
            self.loader.request_remesh(position);
        }

        let max_uploads = self.loader.config().max_uploads_per_frame;
        self.loader
            .process_pending_meshes(max_uploads, &mut self.renderer, device)?;

        Ok(self.renderer.render(camera, device))
    }

    /// Reads a block in world coordinates.
    ///
    /// # Returns
    /// `None` if the chunk is not resident or `y` is outside the world.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Option<Block> {
        let (position, local_x, local_z) = Self::locate(x, z);
        self.loader.get_block(position, local_x, y, local_z)
    }

    /// Writes a block in world coordinates and schedules the affected rebuilds.
    ///
    /// # Returns
    /// The block previously stored at that position.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: Block) -> Result<Block, WorldError> {
        if !(0..CHUNK_HEIGHT as i32).contains(&y) {
            return Err(WorldError::OutOfBounds { x, y, z });
        }
        let (position, local_x, local_z) = Self::locate(x, z);

        let previous = self
            .loader
            .set_block(position, local_x, y, local_z, block)
            .ok_or(WorldError::ChunkNotLoaded(position))?
            .map_err(|_| WorldError::OutOfBounds { x, y, z })?;

        self.schedule_rebuild(position);
        for side in Self::border_sides(local_x, local_z) {
            let neighbor = position.neighbor(side);
            if self.loader.is_resident(neighbor) {
                self.schedule_rebuild(neighbor);
            }
        }
        Ok(previous)
    }

    fn schedule_rebuild(&mut self, position: ChunkPosition) {
        // Chunks without a registered mesh yet go straight to the loader.
        if !self.renderer.mark_for_rebuild(position) {
            self.loader.request_remesh(position);
        }
    }

    fn locate(x: i32, z: i32) -> (ChunkPosition, i32, i32) {
        (
            ChunkPosition::from_block(x, z),
            x.rem_euclid(CHUNK_WIDTH as i32),
            z.rem_euclid(CHUNK_DEPTH as i32),
        )
    }

    fn border_sides(local_x: i32, local_z: i32) -> Vec<BlockSide> {
        let mut sides = Vec::new();
        if local_x == 0 {
            sides.push(BlockSide::LEFT);
        } else if local_x == CHUNK_WIDTH as i32 - 1 {
            sides.push(BlockSide::RIGHT);
        }
        if local_z == 0 {
            sides.push(BlockSide::BACK);
        } else if local_z == CHUNK_DEPTH as i32 - 1 {
            sides.push(BlockSide::FRONT);
        }
        sides
    }

    /// The chunk loader streaming this world.
    pub fn loader(&self) -> &ChunkLoader {
        &self.loader
    }

    /// The renderer owning the uploaded chunk meshes.
    pub fn renderer(&self) -> &ChunkRenderer {
        &self.renderer
    }

    /// Stops the workers and releases every GPU mesh. Idempotent.
    pub fn shutdown(&mut self, device: &mut dyn RenderDevice) {
        self.loader.shutdown();
        self.renderer.clear(device);
        info!("World shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use web_time::{Duration, Instant};

    use super::*;
    use crate::engine_state::{
        camera_state::CameraState,
        rendering::{atlas::BlockAtlas, render_device::RecordingDevice},
        voxels::{
            block::block_type::BlockType, chunk_loader::LoaderStats,
            terrain::FlatTerrainGenerator,
        },
    };

    fn flat_world() -> World {
        let config = StreamingConfig {
            render_distance: 1,
            unload_margin: 1,
            max_uploads_per_frame: 2,
            ..StreamingConfig::default()
        };
        World::new(
            config,
            Arc::new(FlatTerrainGenerator::new(64, BlockType::DIRT)),
            Arc::new(BlockAtlas),
        )
        .unwrap()
    }

    fn camera() -> CameraView {
        CameraState::new(800, 600).view()
    }

    /// Longest time streaming may go without any visible progress.
    const STALL_TIMEOUT: Duration = Duration::from_secs(30);

    fn progress(world: &World, device: &RecordingDevice) -> (LoaderStats, usize, usize) {
        (
            world.loader().stats(),
            world.renderer().len(),
            device.creates + device.updates,
        )
    }

    /// Runs frames until `done` holds, failing once streaming stops making progress.
    fn run_until(
        world: &mut World,
        device: &mut RecordingDevice,
        done: impl Fn(&World) -> bool,
    ) {
        let view = camera();
        let mut last = progress(world, device);
        let mut last_progress = Instant::now();
        while !done(world) {
            assert!(
                last_progress.elapsed() < STALL_TIMEOUT,
                "world did not settle: {:?}",
                world.loader().stats()
            );
            world.frame(&view, device).unwrap();
            thread::sleep(Duration::from_millis(5));

            let current = progress(world, device);
            if current != last {
                last = current;
                last_progress = Instant::now();
            }
        }
    }

    fn settled(world: &World) -> bool {
        let stats = world.loader().stats();
        world.renderer().len() == 9
            && stats.generating == 0
            && stats.meshing == 0
            && stats.pending_uploads == 0
    }

    #[test]
    fn test_streams_the_wanted_set() {
        let mut world = flat_world();
        let mut device = RecordingDevice::new();

        run_until(&mut world, &mut device, settled);

        // Top and bottom only once every lateral neighbour is resident.
        assert_eq!(world.renderer().chunk_quad_count(ChunkPosition::new(0, 0)), Some(2));
        assert_eq!(device.live_meshes(), 9);
    }

    #[test]
    fn test_interior_edit_rebuilds_owner() {
        let mut world = flat_world();
        let mut device = RecordingDevice::new();
        run_until(&mut world, &mut device, settled);

        let previous = world.set_block(8, 32, 8, Block::AIR).unwrap();

        assert_eq!(previous, Block::new(BlockType::DIRT));
        assert!(world.renderer().needs_rebuild(ChunkPosition::new(0, 0)));
        run_until(&mut world, &mut device, |world| {
            world.renderer().chunk_quad_count(ChunkPosition::new(0, 0)) == Some(8)
        });
    }

    #[test]
    fn test_border_edit_rebuilds_neighbour() {
        let mut world = flat_world();
        let mut device = RecordingDevice::new();
        run_until(&mut world, &mut device, settled);

        world.set_block(15, 63, 8, Block::AIR).unwrap();

        assert!(world.renderer().needs_rebuild(ChunkPosition::new(1, 0)));
        assert!(!world.renderer().needs_rebuild(ChunkPosition::new(0, 1)));
        run_until(&mut world, &mut device, |world| {
            world.renderer().chunk_quad_count(ChunkPosition::new(1, 0)) == Some(3)
        });
    }

    #[test]
    fn test_block_access() {
        let mut world = flat_world();
        let mut device = RecordingDevice::new();
        run_until(&mut world, &mut device, settled);

        assert_eq!(world.get_block(8, 10, 8), Some(Block::new(BlockType::DIRT)));
        assert_eq!(world.get_block(8, 70, 8), Some(Block::AIR));
        assert_eq!(world.get_block(-1, 10, -1), Some(Block::new(BlockType::DIRT)));
        assert_eq!(world.get_block(8, 300, 8), None);
        assert_eq!(world.get_block(1000, 10, 0), None);

        assert_eq!(
            world.set_block(8, 300, 8, Block::AIR),
            Err(WorldError::OutOfBounds { x: 8, y: 300, z: 8 })
        );
        assert_eq!(
            world.set_block(1000, 10, 0, Block::AIR),
            Err(WorldError::ChunkNotLoaded(ChunkPosition::new(62, 0)))
        );
    }

    #[test]
    fn test_shutdown_releases_meshes() {
        let mut world = flat_world();
        let mut device = RecordingDevice::new();
        run_until(&mut world, &mut device, settled);

        world.shutdown(&mut device);
        world.shutdown(&mut device);

        assert_eq!(device.live_meshes(), 0);
        assert!(world.renderer().is_empty());
        assert_eq!(world.get_block(8, 10, 8), None);
    }
}
