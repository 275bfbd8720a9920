//! # Render Device
//!
//! The narrow GPU capability the chunk pipeline draws through. Mesh buffers and
//! the chunk renderer only ever talk to a [`RenderDevice`]; the wgpu
//! implementation lives in the pipeline manager.
//!
//! The trait is not `Send`: whoever owns the device owns the render thread, and
//! no GPU object can be created, written or destroyed anywhere else.

use cgmath::{Matrix4, Vector3};
use thiserror::Error;

use super::vertex::Vertex;

/// Opaque handle to a vertex/index buffer pair owned by a render device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuMeshId(pub u64);

/// Errors raised on the render thread.
///
/// Any of these indicates a broken graphics environment and is propagated to
/// the application instead of being recovered from.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The window could not be created.
    #[error("failed to create window: {0}")]
    Window(String),
    /// The drawing surface could not be created or configured.
    #[error("failed to create surface: {0}")]
    Surface(String),
    /// No suitable graphics adapter was found.
    #[error("failed to find a graphics adapter: {0}")]
    Adapter(String),
    /// The logical device could not be created.
    #[error("failed to create device: {0}")]
    Device(String),
    /// The next swapchain texture could not be acquired.
    #[error("failed to acquire surface texture: {0}")]
    SurfaceAcquire(String),
    /// A shader file could not be read.
    #[error("failed to load shader {path}: {source}")]
    Shader {
        /// Path of the shader file
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// A mesh handle was used after being destroyed, or never existed.
    #[error("unknown mesh handle {0:?}")]
    UnknownMesh(GpuMeshId),
    /// A named buffer was used before it was created.
    #[error("unknown buffer '{0}'")]
    UnknownBuffer(&'static str),
    /// Indices referencing past the end of the vertex list were submitted.
    #[error("mesh upload rejected: {0}")]
    InvalidMesh(String),
}

/// GPU capability used by the chunk pipeline.
///
/// All methods must be called from the thread that owns the device.
pub trait RenderDevice {
    /// Creates buffers sized to `vertices`/`indices` and uploads them.
    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<GpuMeshId, RenderError>;

    /// Overwrites the contents of an existing mesh, growing its buffers when needed.
    fn update_mesh(
        &mut self,
        id: GpuMeshId,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), RenderError>;

    /// Releases the buffers of a mesh. Unknown handles are ignored.
    fn destroy_mesh(&mut self, id: GpuMeshId);

    /// Binds the chunk pipeline for this frame.
    ///
    /// # Arguments
    /// * `view_projection` - Combined camera view and projection matrix
    /// * `texture_unit` - Texture unit the block texture array is bound to
    fn begin_chunk_pass(&mut self, view_projection: Matrix4<f32>, texture_unit: u32);

    /// Sets the world transform applied to subsequent draws.
    fn set_chunk_transform(&mut self, origin: Vector3<f32>);

    /// Issues one indexed draw of the first `index_count` indices of a mesh.
    fn draw_mesh(&mut self, id: GpuMeshId, index_count: u32);
}

#[cfg(test)]
pub(crate) use recording::RecordingDevice;

#[cfg(test)]
mod recording {
    use std::collections::HashMap;

    use super::*;

    /// In-memory render device that records every call.
    #[derive(Debug, Default)]
    pub struct RecordingDevice {
        pub next_id: u64,
        pub meshes: HashMap<GpuMeshId, (usize, usize)>,
        pub creates: usize,
        pub updates: usize,
        pub destroys: usize,
        pub passes: usize,
        pub transforms: Vec<Vector3<f32>>,
        pub draws: Vec<(GpuMeshId, u32)>,
        pub fail_uploads: bool,
    }

    impl RecordingDevice {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn live_meshes(&self) -> usize {
            self.meshes.len()
        }

        pub fn reset_frame(&mut self) {
            self.transforms.clear();
            self.draws.clear();
        }
    }

    impl RenderDevice for RecordingDevice {
        fn create_mesh(
            &mut self,
            vertices: &[Vertex],
            indices: &[u32],
        ) -> Result<GpuMeshId, RenderError> {
            if self.fail_uploads {
                return Err(RenderError::InvalidMesh("recording device rejects uploads".into()));
            }
            let id = GpuMeshId(self.next_id);
            self.next_id += 1;
            self.creates += 1;
            self.meshes.insert(id, (vertices.len(), indices.len()));
            Ok(id)
        }

        fn update_mesh(
            &mut self,
            id: GpuMeshId,
            vertices: &[Vertex],
            indices: &[u32],
        ) -> Result<(), RenderError> {
            if self.fail_uploads {
                return Err(RenderError::InvalidMesh("recording device rejects uploads".into()));
            }
            let entry = self.meshes.get_mut(&id).ok_or(RenderError::UnknownMesh(id))?;
            *entry = (vertices.len(), indices.len());
            self.updates += 1;
            Ok(())
        }

        fn destroy_mesh(&mut self, id: GpuMeshId) {
            if self.meshes.remove(&id).is_some() {
                self.destroys += 1;
            }
        }

        fn begin_chunk_pass(&mut self, _view_projection: Matrix4<f32>, _texture_unit: u32) {
            self.passes += 1;
        }

        fn set_chunk_transform(&mut self, origin: Vector3<f32>) {
            self.transforms.push(origin);
        }

        fn draw_mesh(&mut self, id: GpuMeshId, index_count: u32) {
            self.draws.push((id, index_count));
        }
    }
}
