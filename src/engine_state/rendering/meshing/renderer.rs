//! Chunk renderer for the voxel engine.
//!
//! This module owns the set of chunks that are ready to draw and decides, every
//! frame, which of them are submitted.
//!
//! # Architecture
//!
//! The chunk renderer is responsible for:
//! 1. Registering and releasing chunk meshes handed over by the chunk loader
//! 2. Tracking which chunks need a rebuild after an edit
//! 3. Culling chunks against the view frustum and a cheap occlusion heuristic
//! 4. Issuing one draw per surviving chunk, nearest first
//!
//! # Occlusion heuristic
//!
//! Chunks further than [`MIN_OCCLUSION_DISTANCE`] are tested by walking up to
//! [`OCCLUSION_STEPS`] steps of [`OCCLUSION_STEP_LENGTH`] from the eye towards the
//! chunk. The chunk is skipped if a step lands on an opaque voxel of a chunk that
//! was already drawn this frame.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cgmath::{EuclideanSpace, InnerSpace, MetricSpace, Point3, Vector3};
use log::trace;

use crate::engine_state::{
    camera_state::camera::CameraView,
    rendering::render_device::RenderDevice,
    voxels::chunk::{ChunkPosition, VoxelGrid, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH},
};

use super::MeshBuffer;

/// Texture unit the block texture array is bound to.
pub const CHUNK_TEXTURE_UNIT: u32 = 0;
/// Chunks closer than this (in blocks) are never tested for occlusion.
pub const MIN_OCCLUSION_DISTANCE: f32 = 3.0 * CHUNK_WIDTH as f32;
/// Length of one occlusion step in blocks.
pub const OCCLUSION_STEP_LENGTH: f32 = CHUNK_WIDTH as f32;
/// Maximum number of occlusion steps.
pub const OCCLUSION_STEPS: usize = 3;

/// A chunk that is registered for drawing.
#[derive(Debug)]
pub struct RenderChunk {
    /// Snapshot of the voxels the mesh was built from
    pub grid: Arc<VoxelGrid>,
    /// Uploaded geometry
    pub mesh: MeshBuffer,
    /// Set by edits, cleared when the rebuild is handed to the loader
    pub needs_rebuild: bool,
}

/// Counters for one call to [`ChunkRenderer::render`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Chunks registered with the renderer
    pub registered: usize,
    /// Chunks rejected by the view frustum
    pub frustum_culled: usize,
    /// Chunks rejected by the occlusion heuristic
    pub occlusion_culled: usize,
    /// Chunks submitted for drawing
    pub drawn: usize,
}

/// Owns the drawable chunks and submits the visible ones.
#[derive(Debug)]
pub struct ChunkRenderer {
    chunks: HashMap<ChunkPosition, RenderChunk>,
    last_eye: Point3<f32>,
}

impl Default for ChunkRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkRenderer {
    /// Creates an empty renderer.
    pub fn new() -> Self {
        Self {
            chunks: HashMap::new(),
            last_eye: Point3::origin(),
        }
    }

    /// Registers an uploaded mesh for a chunk.
    ///
    /// A previously registered mesh for the same position is swapped out and
    /// its GPU resources released.
    pub fn add_chunk(
        &mut self,
        position: ChunkPosition,
        grid: Arc<VoxelGrid>,
        mesh: MeshBuffer,
        device: &mut dyn RenderDevice,
    ) {
        let chunk = RenderChunk {
            grid,
            mesh,
            needs_rebuild: false,
        };
        if let Some(mut previous) = self.chunks.insert(position, chunk) {
            previous.mesh.cleanup(device);
        }
    }

    /// Unregisters a chunk and releases its GPU resources.
    ///
    /// # Returns
    /// `false` if the chunk was not registered.
    pub fn remove_chunk(&mut self, position: ChunkPosition, device: &mut dyn RenderDevice) -> bool {
        match self.chunks.remove(&position) {
            Some(mut chunk) => {
                chunk.mesh.cleanup(device);
                true
            }
            None => false,
        }
    }

    /// Flags a chunk for a rebuild. Its current mesh keeps drawing until the
    /// new one is registered.
    ///
    /// # Returns
    /// `false` if the chunk is not registered.
    pub fn mark_for_rebuild(&mut self, position: ChunkPosition) -> bool {
        match self.chunks.get_mut(&position) {
            Some(chunk) => {
                chunk.needs_rebuild = true;
                true
            }
            None => false,
        }
    }

    /// Clears and returns up to `max` rebuild flags, nearest to the last rendered eye first.
    pub fn take_rebuilds(&mut self, max: usize) -> Vec<ChunkPosition> {
        let eye_chunk = ChunkPosition::containing(self.last_eye.x, self.last_eye.z);
        let mut flagged: Vec<ChunkPosition> = self
            .chunks
            .iter()
            .filter(|(_, chunk)| chunk.needs_rebuild)
            .map(|(position, _)| *position)
            .collect();
        flagged.sort_by_key(|position| (position.distance_squared(eye_chunk), *position));
        flagged.truncate(max);

        for position in &flagged {
            if let Some(chunk) = self.chunks.get_mut(position) {
                chunk.needs_rebuild = false;
            }
        }
        flagged
    }

    /// Whether a chunk is registered.
    pub fn contains(&self, position: ChunkPosition) -> bool {
        self.chunks.contains_key(&position)
    }

    /// Whether a registered chunk is waiting for a rebuild.
    pub fn needs_rebuild(&self, position: ChunkPosition) -> bool {
        self.chunks
            .get(&position)
            .is_some_and(|chunk| chunk.needs_rebuild)
    }

    /// Quad count of a registered chunk's mesh.
    pub fn chunk_quad_count(&self, position: ChunkPosition) -> Option<usize> {
        self.chunks
            .get(&position)
            .map(|chunk| chunk.mesh.quad_count())
    }

    /// Number of registered chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk is registered.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Releases every registered chunk.
    pub fn clear(&mut self, device: &mut dyn RenderDevice) {
        for (_, mut chunk) in self.chunks.drain() {
            chunk.mesh.cleanup(device);
        }
    }

    /// Culls and draws the registered chunks for one frame.
    ///
    /// # Arguments
    /// * `camera` - Eye position and view-projection for this frame
    /// * `device` - Render device the draws are issued to
    ///
    /// # Returns
    /// How many chunks were considered, culled and drawn.
    pub fn render(&mut self, camera: &CameraView, device: &mut dyn RenderDevice) -> RenderStats {
        self.last_eye = camera.position;
        device.begin_chunk_pass(camera.view_projection, CHUNK_TEXTURE_UNIT);

        let frustum = camera.frustum();
        let mut stats = RenderStats {
            registered: self.chunks.len(),
            ..RenderStats::default()
        };

        let bounds = Vector3::new(CHUNK_WIDTH as f32, CHUNK_HEIGHT as f32, CHUNK_DEPTH as f32);
        let mut visible: Vec<(f32, ChunkPosition)> = Vec::with_capacity(self.chunks.len());
        for position in self.chunks.keys() {
            let min = position.origin();
            if !frustum.intersects_aabb(min, min + bounds) {
                stats.frustum_culled += 1;
                continue;
            }
            let focus = focus_point(*position, camera.position);
            visible.push((camera.position.distance2(focus), *position));
        }
        visible.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let min_occlusion_distance2 = MIN_OCCLUSION_DISTANCE * MIN_OCCLUSION_DISTANCE;
        let mut drawn = HashSet::with_capacity(visible.len());
        for (distance2, position) in visible {
            if distance2 > min_occlusion_distance2
                && self.is_occluded(camera.position, position, &drawn)
            {
                stats.occlusion_culled += 1;
                continue;
            }
            if let Some(chunk) = self.chunks.get(&position) {
                device.set_chunk_transform(position.origin().to_vec());
                chunk.mesh.render(device);
                drawn.insert(position);
                stats.drawn += 1;
            }
        }

        trace!("Chunk pass: {stats:?}");
        stats
    }

    fn is_occluded(
        &self,
        eye: Point3<f32>,
        target: ChunkPosition,
        drawn: &HashSet<ChunkPosition>,
    ) -> bool {
        let to_target = focus_point(target, eye) - eye;
        let distance = to_target.magnitude();
        if distance <= f32::EPSILON {
            return false;
        }
        let direction = to_target / distance;

        (1..=OCCLUSION_STEPS).any(|step| {
            let travelled = step as f32 * OCCLUSION_STEP_LENGTH;
            if travelled >= distance {
                return false;
            }
            let sample = eye + direction * travelled;
            let position = ChunkPosition::containing(sample.x, sample.z);
            if position == target || !drawn.contains(&position) {
                return false;
            }
            self.chunks.get(&position).is_some_and(|chunk| {
                let origin = position.origin();
                chunk
                    .grid
                    .get_checked(
                        (sample.x - origin.x).floor() as i32,
                        sample.y.floor() as i32,
                        (sample.z - origin.z).floor() as i32,
                    )
                    .is_some_and(|block| !block.is_air() && block.is_opaque())
            })
        })
    }
}

/// Centre of a chunk column at the eye's height, clamped to the world.
fn focus_point(position: ChunkPosition, eye: Point3<f32>) -> Point3<f32> {
    let origin = position.origin();
    Point3::new(
        origin.x + CHUNK_WIDTH as f32 / 2.0,
        eye.y.clamp(0.0, CHUNK_HEIGHT as f32 - 1.0),
        origin.z + CHUNK_DEPTH as f32 / 2.0,
    )
}

#[cfg(test)]
mod tests {
    use cgmath::Deg;

    use super::*;
    use crate::engine_state::{
        camera_state::camera::{Camera, Projection},
        rendering::{
            atlas::BlockAtlas,
            meshing::{ChunkNeighbors, GreedyMesher},
            render_device::RecordingDevice,
        },
        voxels::block::block_type::BlockType,
    };

    fn camera_facing_positive_x() -> CameraView {
        let camera = Camera::new(Point3::new(8.0, 100.0, 8.0), Deg(0.0), Deg(0.0));
        camera.view(&Projection::new(800, 600, Deg(70.0), 0.1, 1000.0))
    }

    fn register(
        renderer: &mut ChunkRenderer,
        device: &mut RecordingDevice,
        position: ChunkPosition,
        grid: VoxelGrid,
    ) {
        let mut mesh = GreedyMesher::new(Arc::new(BlockAtlas))
            .mesh(&grid, &ChunkNeighbors::none())
            .unwrap();
        mesh.upload(device).unwrap();
        renderer.add_chunk(position, Arc::new(grid), mesh, device);
    }

    fn floor(position: ChunkPosition) -> VoxelGrid {
        let mut grid = VoxelGrid::new(position);
        grid.fill_cell(0, 0, 0, crate::engine_state::voxels::block::Block::new(BlockType::DIRT));
        grid
    }

    #[test]
    fn test_chunk_behind_camera_is_frustum_culled() {
        let mut device = RecordingDevice::new();
        let mut renderer = ChunkRenderer::new();
        register(&mut renderer, &mut device, ChunkPosition::new(-3, 0), floor(ChunkPosition::new(-3, 0)));
        register(&mut renderer, &mut device, ChunkPosition::new(1, 0), floor(ChunkPosition::new(1, 0)));

        let stats = renderer.render(&camera_facing_positive_x(), &mut device);

        assert_eq!(stats.registered, 2);
        assert_eq!(stats.frustum_culled, 1);
        assert_eq!(stats.drawn, 1);
        assert_eq!(device.passes, 1);
        assert_eq!(device.transforms, vec![Vector3::new(16.0, 0.0, 0.0)]);
    }

    #[test]
    fn test_draws_nearest_first() {
        let mut device = RecordingDevice::new();
        let mut renderer = ChunkRenderer::new();
        for x in [2, 0, 1] {
            let position = ChunkPosition::new(x, 0);
            register(&mut renderer, &mut device, position, floor(position));
        }

        renderer.render(&camera_facing_positive_x(), &mut device);

        let xs: Vec<f32> = device.transforms.iter().map(|origin| origin.x).collect();
        assert_eq!(xs, vec![0.0, 16.0, 32.0]);
    }

    #[test]
    fn test_solid_chunk_occludes_distant_chunk() {
        let mut device = RecordingDevice::new();
        let mut renderer = ChunkRenderer::new();
        let wall = ChunkPosition::new(1, 0);
        let hidden = ChunkPosition::new(5, 0);
        register(&mut renderer, &mut device, wall, VoxelGrid::solid(wall, BlockType::STONE));
        register(&mut renderer, &mut device, hidden, floor(hidden));

        let stats = renderer.render(&camera_facing_positive_x(), &mut device);

        assert_eq!(stats.occlusion_culled, 1);
        assert_eq!(stats.drawn, 1);
    }

    #[test]
    fn test_transparent_chunk_does_not_occlude() {
        let mut device = RecordingDevice::new();
        let mut renderer = ChunkRenderer::new();
        let wall = ChunkPosition::new(1, 0);
        let behind = ChunkPosition::new(5, 0);
        register(&mut renderer, &mut device, wall, VoxelGrid::solid(wall, BlockType::GLASS));
        register(&mut renderer, &mut device, behind, floor(behind));

        let stats = renderer.render(&camera_facing_positive_x(), &mut device);

        assert_eq!(stats.occlusion_culled, 0);
        assert_eq!(stats.drawn, 2);
    }

    #[test]
    fn test_near_chunks_are_never_occlusion_tested() {
        let mut device = RecordingDevice::new();
        let mut renderer = ChunkRenderer::new();
        let wall = ChunkPosition::new(1, 0);
        let near = ChunkPosition::new(2, 0);
        register(&mut renderer, &mut device, wall, VoxelGrid::solid(wall, BlockType::STONE));
        register(&mut renderer, &mut device, near, floor(near));

        let stats = renderer.render(&camera_facing_positive_x(), &mut device);

        assert_eq!(stats.occlusion_culled, 0);
        assert_eq!(stats.drawn, 2);
    }

    #[test]
    fn test_remove_and_replace_release_meshes() {
        let mut device = RecordingDevice::new();
        let mut renderer = ChunkRenderer::new();
        let position = ChunkPosition::new(0, 0);
        register(&mut renderer, &mut device, position, floor(position));
        register(&mut renderer, &mut device, position, floor(position));

        assert_eq!(device.destroys, 1);
        assert_eq!(renderer.len(), 1);

        assert!(renderer.remove_chunk(position, &mut device));
        assert!(!renderer.remove_chunk(position, &mut device));
        assert_eq!(device.live_meshes(), 0);
    }

    #[test]
    fn test_rebuild_flags_are_bounded_and_cleared() {
        let mut device = RecordingDevice::new();
        let mut renderer = ChunkRenderer::new();
        for x in 0..3 {
            let position = ChunkPosition::new(x, 0);
            register(&mut renderer, &mut device, position, floor(position));
            assert!(renderer.mark_for_rebuild(position));
        }
        assert!(!renderer.mark_for_rebuild(ChunkPosition::new(9, 9)));

        let first = renderer.take_rebuilds(2);
        let second = renderer.take_rebuilds(2);

        assert_eq!(first, vec![ChunkPosition::new(0, 0), ChunkPosition::new(1, 0)]);
        assert_eq!(second, vec![ChunkPosition::new(2, 0)]);
        assert!(renderer.take_rebuilds(2).is_empty());
    }
}
