//! Mesh generation and drawing for voxel chunks.
//!
//! This module handles the conversion of voxel grids into GPU-friendly meshes and
//! the per-frame drawing of the chunks that own them.
//!
//! # Architecture
//! - `mesh/`: The greedy mesher and the CPU/GPU mesh buffer it produces
//! - `ChunkRenderer`: Registry of uploaded chunk meshes with frustum and
//!   occlusion culling
//!
//! # Performance Considerations
//! - Greedy meshing merges coplanar faces of the same texture, minimising vertex count
//! - One indexed draw per visible chunk, nearest first so depth testing rejects
//!   hidden fragments early
//! - Chunks hidden behind nearer opaque terrain are skipped entirely

mod mesh;
mod renderer;

pub use mesh::*;
pub use renderer::*;
