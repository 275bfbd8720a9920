//! # Chunk Generation Task
//!
//! This module defines the `ChunkGenerationTask` which fills the voxel grid of one
//! chunk on a generation worker and publishes it to the loader's resident map.
//! It is scheduled by the loader whenever a wanted chunk is neither resident nor
//! already in flight.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use web_time::Instant;

use crate::engine_state::{
    task_management::task::Task,
    voxels::{
        chunk::{ChunkPosition, VoxelGrid},
        chunk_loader::{LoaderShared, ResidentChunk},
        terrain::TerrainError,
    },
};

/// A task that generates the terrain of one chunk.
///
/// This task is responsible for:
/// 1. Running the terrain generator for its position
/// 2. Publishing the grid, unless the chunk was unloaded meanwhile; either way
///    it removes its own generating entry
/// 3. Scheduling mesh builds for the chunk and for neighbours meshed without it
pub struct ChunkGenerationTask {
    /// Loader state the result is published into
    shared: Arc<LoaderShared>,
    /// The chunk to generate
    position: ChunkPosition,
}

impl ChunkGenerationTask {
    /// Creates a new chunk generation task.
    ///
    /// # Arguments
    /// * `shared` - The loader state; the position must already be marked as generating
    /// * `position` - The chunk to generate
    pub fn new(shared: Arc<LoaderShared>, position: ChunkPosition) -> Self {
        ChunkGenerationTask { shared, position }
    }

    fn generate(&self) -> Result<VoxelGrid, TerrainError> {
        let mut grid = VoxelGrid::new(self.position);
        let generator = &self.shared.generator;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            generator.generate(&mut grid, self.position.x, self.position.z)
        }));

        match outcome {
            Ok(result) => result.map(|()| grid),
            Err(_) => Err(TerrainError::Failed {
                position: self.position,
                reason: "terrain generator panicked".into(),
            }),
        }
    }

    fn publish(&self, mut grid: VoxelGrid) -> bool {
        grid.take_dirty();
        // The generating entry stays locked until the grid is resident so no
        // other thread can observe the position as neither.
        match self.shared.generating.entry(self.position) {
            Entry::Occupied(entry) => {
                let cancelled = entry.get().cancelled;
                if !cancelled {
                    self.shared
                        .resident
                        .insert(self.position, Arc::new(ResidentChunk::new(grid)));
                }
                entry.remove();
                !cancelled
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Removes the generating entry if the position was unloaded before work started.
    fn take_cancelled(&self) -> bool {
        self.shared
            .generating
            .remove_if(&self.position, |_, state| state.cancelled)
            .is_some()
    }
}

impl Task for ChunkGenerationTask {
    fn description(&self) -> String {
        format!("generate chunk {}", self.position)
    }

    fn process(self: Box<Self>) {
        if !self.shared.is_accepting() || !self.shared.generating.contains_key(&self.position) {
            return;
        }
        if self.take_cancelled() {
            debug!("Skipping chunk {} unloaded before generation", self.position);
            return;
        }

        match self.generate() {
            Ok(grid) => {
                if !self.publish(grid) {
                    debug!("Discarding chunk {} unloaded during generation", self.position);
                    return;
                }
                self.shared.backoff.lock().record_success(self.position);
                self.shared.request_remesh(self.position);
                self.shared.remesh_stale_neighbors(self.position);
            }
            Err(e) => {
                let delay = self
                    .shared
                    .backoff
                    .lock()
                    .record_failure(self.position, Instant::now());
                warn!("{}; retrying in {:?}", e, delay);
                self.shared.generating.remove(&self.position);
            }
        }
    }
}
