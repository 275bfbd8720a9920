//! # Voxel World
//!
//! This module contains the voxel side of chunk streaming: the data model, terrain
//! generation and the loader that keeps the chunks around the viewpoint resident.
//!
//! ## Architecture
//!
//! * **Block**: Voxel types, their transparency and per-face textures
//! * **Chunk**: Chunk positions and the fixed-size voxel grid of one column
//! * **Terrain**: Generators that fill a fresh grid
//! * **Chunk Loader**: Wanted-set tracking, background generation and meshing, unloading
//! * **World**: Drives the loader and the chunk renderer once per frame
//!
//! ## Data Flow
//!
//! 1. The loader queues generation for wanted chunks that are neither resident nor in flight
//! 2. A generated grid becomes resident and is queued for meshing
//! 3. Finished meshes wait in the loader until the render thread uploads them
//! 4. Edits through the world mark chunks for a rebuild, which goes back to step 3
//!
//! ## Thread Safety
//!
//! Grids are shared as `Arc<VoxelGrid>` snapshots. Workers and the renderer only
//! read snapshots; edits replace the resident grid copy-on-write.

pub mod block;
pub mod chunk;
pub mod chunk_loader;
pub mod generation_backoff;
pub mod tasks;
pub mod terrain;
pub mod world;
