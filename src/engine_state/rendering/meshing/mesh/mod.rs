//! Mesh generation and manipulation for voxel rendering.
//!
//! This module provides the core functionality for converting voxel data into
//! GPU-friendly meshes. Greedy meshing merges adjacent coplanar faces with the
//! same block type so a chunk is drawn with as few quads as possible.
//!
//! # Architecture
//! - [`GreedyMesher`]: Turns a voxel grid plus its lateral neighbours into a mesh
//! - [`MeshBuffer`]: Vertex and index lists with the GPU handle they upload to
//! - [`Face`]: One merged rectangle and the vertices it expands to

mod face;
mod greedy;
#[allow(clippy::module_inception)]
mod mesh;

pub use face::{plane_axes, Face, DEFAULT_AMBIENT_OCCLUSION};
pub use greedy::{is_face_visible, sample_block, ChunkNeighbors, GreedyMesher, MeshingError};
pub use mesh::{MeshBuffer, QUAD_INDICES};
