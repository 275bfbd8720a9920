//! Task for generating mesh data for chunks in a background thread.
//!
//! This module contains the `ChunkMeshGenerationTask`, which runs the greedy
//! mesher against a snapshot of one resident chunk and its resident lateral
//! neighbours, then leaves the result in the loader's pending-mesh map for the
//! render thread to upload.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, error, warn};

use crate::engine_state::{
    rendering::meshing::ChunkNeighbors,
    task_management::task::Task,
    voxels::{
        block::block_side::BlockSide,
        chunk::{ChunkPosition, VoxelGrid},
        chunk_loader::{LoaderShared, PendingMesh},
    },
};

/// A task that builds the mesh of one chunk in a background thread.
///
/// This task is responsible for:
/// 1. Taking consistent snapshots of the chunk and its neighbours
/// 2. Running the greedy mesher on them
/// 3. Publishing the mesh for upload, unless the chunk was unloaded meanwhile
pub struct ChunkMeshGenerationTask {
    /// Loader state holding the grids and receiving the mesh
    shared: Arc<LoaderShared>,
    /// The chunk to mesh
    position: ChunkPosition,
}

impl ChunkMeshGenerationTask {
    /// Creates a new chunk mesh generation task.
    ///
    /// # Arguments
    /// * `shared` - The loader state; the position must already be marked as meshing
    /// * `position` - The chunk to mesh
    pub fn new(shared: Arc<LoaderShared>, position: ChunkPosition) -> Self {
        ChunkMeshGenerationTask { shared, position }
    }

    /// Snapshots the chunk grid, clearing its dirty flag, plus every resident
    /// lateral neighbour.
    fn snapshot(&self) -> Option<(Arc<VoxelGrid>, ChunkNeighbors)> {
        let chunk = self.shared.resident.get(&self.position)?.value().clone();
        let grid = {
            let mut guard = chunk.grid.get_mut();
            if guard.is_dirty() {
                Arc::make_mut(&mut *guard).take_dirty();
            }
            guard.clone()
        };

        let mut neighbors = ChunkNeighbors::none();
        for side in BlockSide::lateral() {
            let neighbor = self.position.neighbor(side);
            if let Some(chunk) = self.shared.resident.get(&neighbor) {
                neighbors.set(side, chunk.grid.snapshot());
            }
        }
        Some((grid, neighbors))
    }

    fn build(&self) {
        let Some((grid, neighbors)) = self.snapshot() else {
            return;
        };

        let shared = &self.shared;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| shared.mesher.mesh(&grid, &neighbors)));
        match outcome {
            Ok(Ok(mesh)) => {
                // Unloading flags the entry through a write lock, so holding it
                // keeps a cancelled build from publishing.
                let live = shared.meshing.get(&self.position);
                if live.as_ref().map_or(true, |state| state.cancelled) {
                    debug!("Discarding mesh of chunk {} unloaded during meshing", self.position);
                    return;
                }
                let Some(chunk) = shared.resident.get(&self.position) else {
                    return;
                };
                chunk
                    .meshed_neighbors
                    .store(neighbors.present_mask(), Ordering::Release);
                shared
                    .pending_meshes
                    .insert(self.position, PendingMesh { grid, mesh });
            }
            Ok(Err(e)) => warn!("Skipping mesh of chunk {}: {}", self.position, e),
            Err(_) => error!("Mesher panicked on chunk {}", self.position),
        }
    }
}

impl Task for ChunkMeshGenerationTask {
    fn description(&self) -> String {
        format!("mesh chunk {}", self.position)
    }

    fn process(self: Box<Self>) {
        if self.shared.is_accepting() {
            self.build();
        }
        self.shared.finish_meshing(self.position);
    }
}
