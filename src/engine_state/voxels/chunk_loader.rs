//! # Chunk Loader
//!
//! Decides which chunks must be resident around the viewpoint and drives the two
//! background stages that make them drawable:
//!
//! 1. **Generation**: a terrain generator fills a fresh [`VoxelGrid`], which is
//!    then published into the resident map.
//! 2. **Meshing**: the greedy mesher runs against a snapshot of the grid and its
//!    resident lateral neighbours; the result lands in the pending-mesh map.
//!
//! The render thread drains the pending-mesh map a bounded number of entries per
//! frame, uploads each mesh and hands it to the [`ChunkRenderer`].
//!
//! ## Shared state
//!
//! All maps are [`DashMap`]s. Check-then-act sequences go through the map's entry
//! API so that a position is never generated or meshed twice concurrently:
//! - `generating` holds positions with a generation task queued or running
//! - `meshing` holds positions with a mesh task queued or running; a re-mesh
//!   request for such a position sets its `rerun` flag instead of queueing again
//!
//! An entry lives exactly as long as its task. Unloading a position only marks
//! its in-flight entries `cancelled`; the task discards its result and removes
//! the entry itself. Requesting the position again before that clears the flag
//! and reuses the task already in flight.
//!
//! Inserting a grid into `resident` is the publish point: meshing workers only
//! ever read grids they obtained from that map.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use dashmap::{mapref::entry::Entry, DashMap};
use log::{debug, info};
use parking_lot::Mutex;
use thiserror::Error;
use web_time::Instant;

use crate::{
    config::{ConfigError, StreamingConfig},
    core::MtResource,
    engine_state::{
        rendering::{
            atlas::TextureAtlas,
            meshing::{ChunkRenderer, GreedyMesher, MeshBuffer},
            render_device::{RenderDevice, RenderError},
            tasks::chunk_mesh_generation_task::ChunkMeshGenerationTask,
        },
        task_management::{BoxedTask, WorkerPool},
    },
};

use super::{
    block::{block_side::BlockSide, Block},
    chunk::{ChunkPosition, GridError, VoxelGrid},
    generation_backoff::GenerationBackoff,
    tasks::chunk_generation_task::ChunkGenerationTask,
    terrain::TerrainGenerator,
};

/// Errors raised while starting the loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A worker thread could not be spawned.
    #[error("failed to spawn {pool} worker: {source}")]
    WorkerSpawn {
        /// Name of the pool
        pool: &'static str,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A chunk whose grid has been generated.
pub struct ResidentChunk {
    /// The chunk's voxels. Writers copy-on-write so snapshots held by workers
    /// and the renderer stay untouched.
    pub grid: MtResource<Arc<VoxelGrid>>,
    /// Lateral neighbours present when the latest mesh was built, one bit per
    /// [`BlockSide::lateral_index`].
    pub meshed_neighbors: AtomicU8,
}

impl ResidentChunk {
    pub(crate) fn new(grid: VoxelGrid) -> Self {
        Self {
            grid: MtResource::new(Arc::new(grid)),
            meshed_neighbors: AtomicU8::new(0),
        }
    }

    /// Whether the latest mesh was built without the neighbour on `side`.
    pub fn is_missing_neighbor(&self, side: BlockSide) -> bool {
        side.lateral_index().is_some_and(|index| {
            self.meshed_neighbors.load(Ordering::Acquire) & (1 << index) == 0
        })
    }
}

/// A finished mesh waiting for upload on the render thread.
pub struct PendingMesh {
    /// Grid snapshot the mesh was built from
    pub grid: Arc<VoxelGrid>,
    /// CPU-side geometry
    pub mesh: MeshBuffer,
}

/// Bookkeeping for a position with a generation task queued or running.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenerationState {
    /// The position was unloaded; the result must be discarded
    pub cancelled: bool,
}

/// Bookkeeping for a position with a mesh build queued or running.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeshingState {
    /// Another build was requested while this one was in flight
    pub rerun: bool,
    /// The position was unloaded; the mesh must be discarded
    pub cancelled: bool,
}

/// Snapshot of the loader's pipeline occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Chunks whose grid is resident
    pub resident: usize,
    /// Generation tasks queued or running, cancelled ones included
    pub generating: usize,
    /// Mesh builds queued or running, cancelled ones included
    pub meshing: usize,
    /// Finished meshes waiting for upload
    pub pending_uploads: usize,
}

/// State shared between the loader and its worker tasks.
pub struct LoaderShared {
    pub(crate) resident: DashMap<ChunkPosition, Arc<ResidentChunk>>,
    pub(crate) pending_meshes: DashMap<ChunkPosition, PendingMesh>,
    pub(crate) generating: DashMap<ChunkPosition, GenerationState>,
    pub(crate) meshing: DashMap<ChunkPosition, MeshingState>,
    pub(crate) generator: Arc<dyn TerrainGenerator>,
    pub(crate) mesher: GreedyMesher,
    pub(crate) meshing_queue: Sender<BoxedTask>,
    pub(crate) backoff: Mutex<GenerationBackoff>,
    pub(crate) accepting: AtomicBool,
}

impl LoaderShared {
    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Queues a mesh build for a resident chunk, or flags the build already in
    /// flight to run once more.
    ///
    /// # Returns
    /// `false` if the chunk is not resident or the loader is shutting down.
    pub(crate) fn request_remesh(self: &Arc<Self>, position: ChunkPosition) -> bool {
        if !self.is_accepting() || !self.resident.contains_key(&position) {
            return false;
        }

        let newly_queued = match self.meshing.entry(position) {
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                state.cancelled = false;
                state.rerun = true;
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(MeshingState::default());
                true
            }
        };

        if newly_queued && !self.send_mesh_task(position) {
            self.meshing.remove(&position);
            return false;
        }
        true
    }

    /// Closes out a mesh build, queueing the follow-up build if one was requested.
    pub(crate) fn finish_meshing(self: &Arc<Self>, position: ChunkPosition) {
        let rerun = match self.meshing.entry(position) {
            Entry::Occupied(mut entry) => {
                if entry.get().rerun {
                    entry.get_mut().rerun = false;
                    true
                } else {
                    entry.remove();
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        if rerun && !(self.is_accepting() && self.send_mesh_task(position)) {
            self.meshing.remove(&position);
        }
    }

    /// Marks the in-flight work of an unloaded position as cancelled and drops
    /// its pending mesh. The tasks remove their own entries when they finish.
    pub(crate) fn cancel(&self, position: ChunkPosition) {
        self.pending_meshes.remove(&position);
        if let Some(mut state) = self.meshing.get_mut(&position) {
            state.cancelled = true;
            state.rerun = false;
        }
        if let Some(mut state) = self.generating.get_mut(&position) {
            state.cancelled = true;
        }
    }

    /// Re-meshes resident lateral neighbours of a newly resident chunk whose
    /// latest mesh was built without it.
    pub(crate) fn remesh_stale_neighbors(self: &Arc<Self>, position: ChunkPosition) {
        for side in BlockSide::lateral() {
            let neighbor = position.neighbor(side);
            let stale = self
                .resident
                .get(&neighbor)
                .is_some_and(|chunk| chunk.is_missing_neighbor(side.opposite()));
            if stale {
                debug!("Re-meshing {} after neighbour {} arrived", neighbor, position);
                self.request_remesh(neighbor);
            }
        }
    }

    fn send_mesh_task(self: &Arc<Self>, position: ChunkPosition) -> bool {
        let task = ChunkMeshGenerationTask::new(self.clone(), position);
        self.meshing_queue.send(Box::new(task)).is_ok()
    }
}

/// Streams chunks around a moving viewpoint.
pub struct ChunkLoader {
    config: StreamingConfig,
    shared: Arc<LoaderShared>,
    generation_pool: WorkerPool,
    meshing_pool: WorkerPool,
    center: Option<ChunkPosition>,
    shut_down: bool,
}

impl ChunkLoader {
    /// Starts the generation and meshing pools.
    ///
    /// # Arguments
    /// * `config` - Streaming configuration; validated here
    /// * `generator` - Terrain generator shared by all generation workers
    /// * `atlas` - Texture atlas shared by all meshing workers
    ///
    /// # Errors
    /// [`LoaderError::Config`] for an invalid configuration and
    /// [`LoaderError::WorkerSpawn`] if a worker thread cannot be started.
    pub fn new(
        config: StreamingConfig,
        generator: Arc<dyn TerrainGenerator>,
        atlas: Arc<dyn TextureAtlas>,
    ) -> Result<Self, LoaderError> {
        config.validate()?;

        let generation_pool = WorkerPool::new("chunk-generation", config.generation_threads)
            .map_err(|source| LoaderError::WorkerSpawn {
                pool: "chunk-generation",
                source,
            })?;
        let meshing_pool = WorkerPool::new("chunk-meshing", config.meshing_threads).map_err(
            |source| LoaderError::WorkerSpawn {
                pool: "chunk-meshing",
                source,
            },
        )?;

        let shared = Arc::new(LoaderShared {
            resident: DashMap::new(),
            pending_meshes: DashMap::new(),
            generating: DashMap::new(),
            meshing: DashMap::new(),
            generator,
            mesher: GreedyMesher::new(atlas),
            meshing_queue: meshing_pool.sender(),
            backoff: Mutex::new(GenerationBackoff::new(&config.retry)),
            accepting: AtomicBool::new(true),
        });

        Ok(Self {
            config,
            shared,
            generation_pool,
            meshing_pool,
            center: None,
            shut_down: false,
        })
    }

    /// Recomputes the wanted set for a viewpoint and unloads chunks that left it.
    ///
    /// When the viewpoint's chunk changed, every wanted position that is neither
    /// resident nor in flight is queued for generation, nearest first. Otherwise
    /// only positions whose retry delay just elapsed are re-offered.
    ///
    /// # Returns
    /// The positions that were unloaded; their meshes must be released by the caller.
    pub fn update(&mut self, view_x: f32, view_z: f32) -> Vec<ChunkPosition> {
        if self.shut_down {
            return Vec::new();
        }

        let center = ChunkPosition::containing(view_x, view_z);
        let render_distance = self.config.render_distance as i32;
        let now = Instant::now();

        if self.center != Some(center) {
            self.center = Some(center);
            let queued = center
                .square_around(render_distance)
                .into_iter()
                .filter(|position| self.request_generation(*position, now))
                .count();
            if queued > 0 {
                debug!("Viewpoint entered chunk {}, queued {} chunk(s)", center, queued);
            }
        } else {
            let due = self.shared.backoff.lock().take_due(now);
            for position in due {
                if position.distance(center) <= render_distance {
                    self.request_generation(position, now);
                }
            }
        }

        self.unload_outside(center)
    }

    fn request_generation(&self, position: ChunkPosition, now: Instant) -> bool {
        if self.shared.resident.contains_key(&position)
            || !self.shared.backoff.lock().is_ready(position, now)
        {
            return false;
        }

        match self.shared.generating.entry(position) {
            Entry::Occupied(mut entry) => {
                // Reclaim a task whose position was unloaded and is wanted again.
                let state = entry.get_mut();
                let revived = state.cancelled;
                state.cancelled = false;
                return revived;
            }
            Entry::Vacant(entry) => {
                // Publishing holds the generating entry, so a grid published
                // since the check above is visible here.
                if self.shared.resident.contains_key(&position) {
                    return false;
                }
                entry.insert(GenerationState::default());
            }
        }

        let task = ChunkGenerationTask::new(self.shared.clone(), position);
        if !self.generation_pool.submit(Box::new(task)) {
            self.shared.generating.remove(&position);
            return false;
        }
        true
    }

    fn unload_outside(&self, center: ChunkPosition) -> Vec<ChunkPosition> {
        let limit = self.config.unload_distance();
        let unloaded: Vec<ChunkPosition> = self
            .shared
            .resident
            .iter()
            .map(|entry| *entry.key())
            .filter(|position| position.distance(center) > limit)
            .collect();

        for position in &unloaded {
            self.shared.resident.remove(position);
            self.shared.cancel(*position);
        }
        let abandoned: Vec<ChunkPosition> = self
            .shared
            .generating
            .iter()
            .filter(|entry| !entry.cancelled && entry.key().distance(center) > limit)
            .map(|entry| *entry.key())
            .collect();
        for position in abandoned {
            self.shared.cancel(position);
        }

        if !unloaded.is_empty() {
            debug!("Unloaded {} chunk(s) around {}", unloaded.len(), center);
        }
        unloaded
    }

    /// Uploads up to `max` finished meshes, nearest to the viewpoint first, and
    /// registers them with the renderer.
    ///
    /// Meshes of chunks that were unloaded meanwhile are dropped.
    ///
    /// # Returns
    /// The number of meshes registered.
    ///
    /// # Errors
    /// The first upload failure; the graphics context is unusable after it.
    pub fn process_pending_meshes(
        &self,
        max: usize,
        renderer: &mut ChunkRenderer,
        device: &mut dyn RenderDevice,
    ) -> Result<usize, RenderError> {
        let center = self.center.unwrap_or_default();
        let mut positions: Vec<ChunkPosition> = self
            .shared
            .pending_meshes
            .iter()
            .map(|entry| *entry.key())
            .collect();
        positions.sort_by_key(|position| (position.distance_squared(center), *position));

        let mut registered = 0;
        for position in positions {
            if registered >= max {
                break;
            }
            let Some((_, pending)) = self.shared.pending_meshes.remove(&position) else {
                continue;
            };
            if !self.shared.resident.contains_key(&position) {
                continue;
            }

            let PendingMesh { grid, mut mesh } = pending;
            mesh.upload(device)?;
            renderer.add_chunk(position, grid, mesh, device);
            registered += 1;
        }
        Ok(registered)
    }

    /// Queues a new mesh build for a resident chunk.
    ///
    /// # Returns
    /// `false` if the chunk is not resident.
    pub fn request_remesh(&self, position: ChunkPosition) -> bool {
        self.shared.request_remesh(position)
    }

    /// Snapshot of a resident chunk's grid. Never blocks on generation.
    pub fn get_chunk(&self, x: i32, z: i32) -> Option<Arc<VoxelGrid>> {
        self.shared
            .resident
            .get(&ChunkPosition::new(x, z))
            .map(|chunk| chunk.grid.snapshot())
    }

    /// Reads one cell of a resident chunk.
    pub fn get_block(&self, position: ChunkPosition, x: i32, y: i32, z: i32) -> Option<Block> {
        let chunk = self.shared.resident.get(&position)?.value().clone();
        let grid = chunk.grid.get();
        grid.get_checked(x, y, z)
    }

    /// Writes one cell of a resident chunk, marking its grid dirty.
    ///
    /// # Returns
    /// `None` if the chunk is not resident, otherwise the result of the write.
    pub fn set_block(
        &self,
        position: ChunkPosition,
        x: i32,
        y: i32,
        z: i32,
        block: Block,
    ) -> Option<Result<Block, GridError>> {
        let chunk = self.shared.resident.get(&position)?.value().clone();
        let mut grid = chunk.grid.get_mut();
        Some(Arc::make_mut(&mut *grid).set(x, y, z, block))
    }

    /// Whether a chunk's grid is resident.
    pub fn is_resident(&self, position: ChunkPosition) -> bool {
        self.shared.resident.contains_key(&position)
    }

    /// The viewpoint chunk seen by the latest [`ChunkLoader::update`].
    pub fn center(&self) -> Option<ChunkPosition> {
        self.center
    }

    /// The configuration the loader was started with.
    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Current occupancy of the pipeline.
    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            resident: self.shared.resident.len(),
            generating: self.shared.generating.len(),
            meshing: self.shared.meshing.len(),
            pending_uploads: self.shared.pending_meshes.len(),
        }
    }

    /// Stops accepting work, stops both pools within the configured timeout and
    /// drops every resident chunk and pending mesh. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.shared.accepting.store(false, Ordering::Release);

        let timeout = self.config.shutdown_timeout();
        self.generation_pool.shutdown(timeout);
        self.meshing_pool.shutdown(timeout);

        self.shared.generating.clear();
        self.shared.meshing.clear();
        self.shared.pending_meshes.clear();
        self.shared.resident.clear();
        info!("Chunk loader shut down");
    }
}

impl Drop for ChunkLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::thread;

    use web_time::Duration;

    use super::*;
    use crate::{
        config::RetryConfig,
        engine_state::{
            rendering::{atlas::BlockAtlas, render_device::RecordingDevice},
            task_management::task::Task,
            voxels::{
                block::block_type::BlockType,
                terrain::{FlatTerrainGenerator, TerrainError},
            },
        },
    };

    fn config(render_distance: u32, unload_margin: u32) -> StreamingConfig {
        StreamingConfig {
            render_distance,
            unload_margin,
            shutdown_timeout_ms: 2_000,
            retry: RetryConfig {
                base_delay_ms: 20,
                max_delay_ms: 200,
                tracked_positions: 64,
            },
            ..StreamingConfig::default()
        }
    }

    fn flat_loader(render_distance: u32, unload_margin: u32) -> ChunkLoader {
        ChunkLoader::new(
            config(render_distance, unload_margin),
            Arc::new(FlatTerrainGenerator::new(8, BlockType::DIRT)),
            Arc::new(BlockAtlas),
        )
        .unwrap()
    }

    /// Longest time the pipeline may go without any visible progress.
    const STALL_TIMEOUT: Duration = Duration::from_secs(30);

    /// Calls `update` until `done` holds, failing once the loader stops making progress.
    fn settle(loader: &mut ChunkLoader, view: (f32, f32), done: impl Fn(&ChunkLoader) -> bool) {
        let mut last = loader.stats();
        let mut last_progress = Instant::now();
        while !done(loader) {
            assert!(
                last_progress.elapsed() < STALL_TIMEOUT,
                "loader did not settle: {:?}",
                loader.stats()
            );
            loader.update(view.0, view.1);
            thread::sleep(Duration::from_millis(5));

            let stats = loader.stats();
            if stats != last {
                last = stats;
                last_progress = Instant::now();
            }
        }
    }

    fn idle(loader: &ChunkLoader) -> bool {
        let stats = loader.stats();
        stats.generating == 0 && stats.meshing == 0
    }

    /// Counts calls per position and optionally fails or stalls.
    struct ScriptedGenerator {
        calls: parking_lot::Mutex<HashMap<ChunkPosition, usize>>,
        fail_first_at: Option<ChunkPosition>,
        delay: Duration,
    }

    impl ScriptedGenerator {
        fn new(fail_first_at: Option<ChunkPosition>, delay: Duration) -> Self {
            Self {
                calls: parking_lot::Mutex::new(HashMap::new()),
                fail_first_at,
                delay,
            }
        }

        fn calls(&self, position: ChunkPosition) -> usize {
            self.calls.lock().get(&position).copied().unwrap_or(0)
        }
    }

    impl TerrainGenerator for ScriptedGenerator {
        fn generate(&self, grid: &mut VoxelGrid, chunk_x: i32, chunk_z: i32) -> Result<(), TerrainError> {
            let position = ChunkPosition::new(chunk_x, chunk_z);
            let attempt = {
                let mut calls = self.calls.lock();
                let count = calls.entry(position).or_insert(0);
                *count += 1;
                *count
            };
            thread::sleep(self.delay);
            if self.fail_first_at == Some(position) && attempt == 1 {
                return Err(TerrainError::Failed {
                    position,
                    reason: "scripted failure".into(),
                });
            }
            FlatTerrainGenerator::new(4, BlockType::STONE).generate(grid, chunk_x, chunk_z)
        }
    }

    #[test]
    fn test_wanted_set_converges() {
        let mut loader = flat_loader(2, 1);
        settle(&mut loader, (8.0, 8.0), |loader| {
            loader.stats().resident == 25 && idle(loader)
        });

        let center = ChunkPosition::new(0, 0);
        for position in center.square_around(2) {
            assert!(loader.is_resident(position), "{position} missing");
        }
        assert!(loader.get_chunk(3, 0).is_none());
        assert!(loader.get_chunk(-2, 2).is_some());
    }

    #[test]
    fn test_hysteresis_keeps_chunks_on_small_moves() {
        let mut loader = flat_loader(2, 1);
        settle(&mut loader, (8.0, 8.0), |loader| {
            loader.stats().resident == 25 && idle(loader)
        });

        let unloaded = loader.update(24.0, 8.0);

        assert!(unloaded.is_empty());
        assert!(loader.is_resident(ChunkPosition::new(-2, 0)));
    }

    #[test]
    fn test_moving_far_unloads_everything_outside_the_margin() {
        let mut loader = flat_loader(2, 1);
        settle(&mut loader, (8.0, 8.0), |loader| {
            loader.stats().resident == 25 && idle(loader)
        });

        let mut unloaded = loader.update(10.0 * 16.0 + 8.0, 8.0);
        unloaded.sort();

        assert_eq!(unloaded.len(), 25);
        let far_center = ChunkPosition::new(10, 0);
        settle(&mut loader, (168.0, 8.0), |loader| {
            loader.stats().resident == 25 && idle(loader)
        });
        assert!(far_center
            .square_around(2)
            .into_iter()
            .all(|position| loader.is_resident(position)));
    }

    #[test]
    fn test_no_duplicate_generation() {
        let generator = Arc::new(ScriptedGenerator::new(None, Duration::from_millis(20)));
        let mut loader = ChunkLoader::new(config(1, 1), generator.clone(), Arc::new(BlockAtlas)).unwrap();

        // Bounce between two adjacent chunks while generation is in flight.
        for _ in 0..5 {
            loader.update(8.0, 8.0);
            loader.update(24.0, 8.0);
        }
        settle(&mut loader, (8.0, 8.0), |loader| idle(loader) && loader.stats().resident == 12);

        for x in -1..=2 {
            for z in -1..=1 {
                assert_eq!(generator.calls(ChunkPosition::new(x, z)), 1, "({x}, {z})");
            }
        }
    }

    #[test]
    fn test_returning_before_generation_finishes_reuses_the_task() {
        let generator = Arc::new(ScriptedGenerator::new(None, Duration::from_millis(300)));
        let config = StreamingConfig {
            generation_threads: 32,
            ..config(1, 0)
        };
        let mut loader = ChunkLoader::new(config, generator.clone(), Arc::new(BlockAtlas)).unwrap();

        loader.update(8.0, 8.0);
        assert!(loader.update(10.0 * 16.0 + 8.0, 8.0).is_empty());
        loader.update(8.0, 8.0);
        settle(&mut loader, (8.0, 8.0), |loader| {
            idle(loader) && loader.stats().resident == 9
        });

        for position in ChunkPosition::new(0, 0).square_around(1) {
            assert_eq!(generator.calls(position), 1, "{position}");
            assert!(loader.is_resident(position), "{position} missing");
        }
        assert!(!loader.is_resident(ChunkPosition::new(10, 0)));
    }

    /// Loader state whose mesh tasks stay in the returned queue until run by hand.
    fn detached_shared() -> (Arc<LoaderShared>, crossbeam_channel::Receiver<BoxedTask>) {
        let (meshing_queue, tasks) = crossbeam_channel::unbounded();
        let shared = Arc::new(LoaderShared {
            resident: DashMap::new(),
            pending_meshes: DashMap::new(),
            generating: DashMap::new(),
            meshing: DashMap::new(),
            generator: Arc::new(FlatTerrainGenerator::new(8, BlockType::DIRT)),
            mesher: GreedyMesher::new(Arc::new(BlockAtlas)),
            meshing_queue,
            backoff: Mutex::new(GenerationBackoff::new(&RetryConfig::default())),
            accepting: AtomicBool::new(true),
        });
        (shared, tasks)
    }

    fn resident_chunk(position: ChunkPosition) -> Arc<ResidentChunk> {
        let mut grid = VoxelGrid::new(position);
        FlatTerrainGenerator::new(8, BlockType::DIRT)
            .generate(&mut grid, position.x, position.z)
            .unwrap();
        Arc::new(ResidentChunk::new(grid))
    }

    #[test]
    fn test_cancelled_mesh_build_publishes_nothing() {
        let (shared, tasks) = detached_shared();
        let position = ChunkPosition::new(0, 0);
        shared.resident.insert(position, resident_chunk(position));
        assert!(shared.request_remesh(position));

        shared.cancel(position);
        assert_eq!(shared.meshing.len(), 1);
        tasks.try_recv().unwrap().process();

        assert!(shared.pending_meshes.is_empty());
        assert!(shared.meshing.is_empty());
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_returning_chunk_reuses_the_mesh_build_in_flight() {
        let (shared, tasks) = detached_shared();
        let position = ChunkPosition::new(0, 0);
        shared.resident.insert(position, resident_chunk(position));
        assert!(shared.request_remesh(position));

        // Leave and come back before the first build has run.
        shared.resident.remove(&position);
        shared.cancel(position);
        shared.resident.insert(position, resident_chunk(position));
        assert!(shared.request_remesh(position));
        assert_eq!(tasks.len(), 1);

        tasks.try_recv().unwrap().process();
        assert_eq!(shared.pending_meshes.len(), 1);
        assert_eq!(tasks.len(), 1, "exactly one follow-up build");

        tasks.try_recv().unwrap().process();
        assert_eq!(shared.pending_meshes.len(), 1);
        assert!(shared.meshing.is_empty());
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_failed_generation_is_retried_after_backoff() {
        let failing = ChunkPosition::new(0, 0);
        let generator = Arc::new(ScriptedGenerator::new(Some(failing), Duration::ZERO));
        let mut loader = ChunkLoader::new(config(1, 1), generator.clone(), Arc::new(BlockAtlas)).unwrap();

        settle(&mut loader, (8.0, 8.0), |loader| {
            loader.is_resident(failing) && idle(loader)
        });

        assert_eq!(generator.calls(failing), 2);
        assert_eq!(generator.calls(ChunkPosition::new(1, 1)), 1);
    }

    #[test]
    fn test_pending_meshes_are_uploaded_within_budget() {
        let mut loader = flat_loader(1, 1);
        settle(&mut loader, (8.0, 8.0), |loader| {
            idle(loader) && loader.stats().pending_uploads == 9
        });
        let mut renderer = ChunkRenderer::new();
        let mut device = RecordingDevice::new();

        let first = loader.process_pending_meshes(4, &mut renderer, &mut device).unwrap();

        assert_eq!(first, 4);
        assert_eq!(renderer.len(), 4);
        assert!(renderer.contains(ChunkPosition::new(0, 0)));
        assert_eq!(device.creates, 4);

        let rest = loader.process_pending_meshes(10, &mut renderer, &mut device).unwrap();
        assert_eq!(rest, 5);
        assert_eq!(loader.stats().pending_uploads, 0);
    }

    #[test]
    fn test_interior_chunk_is_remeshed_once_neighbours_arrive() {
        let mut loader = flat_loader(1, 1);
        settle(&mut loader, (8.0, 8.0), |loader| {
            idle(loader) && loader.stats().pending_uploads == 9
        });
        let mut renderer = ChunkRenderer::new();
        let mut device = RecordingDevice::new();
        loader.process_pending_meshes(9, &mut renderer, &mut device).unwrap();

        // Top and bottom only: every side face is hidden by a resident neighbour.
        assert_eq!(renderer.chunk_quad_count(ChunkPosition::new(0, 0)), Some(2));
    }

    #[test]
    fn test_shutdown_is_prompt_and_idempotent() {
        let mut loader = flat_loader(2, 1);
        loader.update(8.0, 8.0);
        let started = Instant::now();

        loader.shutdown();
        loader.shutdown();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(loader.stats(), LoaderStats::default());
        assert!(loader.update(8.0, 8.0).is_empty());
        assert!(!loader.request_remesh(ChunkPosition::new(0, 0)));
    }

    #[test]
    fn test_edits_go_to_resident_grids_only() {
        let mut loader = flat_loader(1, 1);
        settle(&mut loader, (8.0, 8.0), |loader| loader.stats().resident == 9);
        let position = ChunkPosition::new(0, 0);
        let before = loader.get_chunk(0, 0).unwrap();

        let previous = loader.set_block(position, 1, 1, 1, Block::AIR).unwrap().unwrap();

        assert_eq!(previous, Block::new(BlockType::DIRT));
        assert_eq!(loader.get_block(position, 1, 1, 1), Some(Block::AIR));
        assert_eq!(before.get(1, 1, 1), Block::new(BlockType::DIRT));
        assert!(loader.set_block(ChunkPosition::new(7, 7), 0, 0, 0, Block::AIR).is_none());
    }
}
