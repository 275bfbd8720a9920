//! CPU-side chunk geometry and its GPU buffer lifecycle.
//!
//! A [`MeshBuffer`] is filled by the greedy mesher on a worker thread, handed to
//! the render thread, and from then on only touched there: uploads, draws and
//! the release of its GPU handle all go through a [`RenderDevice`].

use crate::engine_state::rendering::{
    render_device::{GpuMeshId, RenderDevice, RenderError},
    Vertex,
};

/// Indices of the two triangles of a quad, relative to its first vertex.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Vertex and index lists for one chunk plus the GPU handle they were uploaded to.
///
/// Geometry is always a whole number of quads: 4 vertices and 6 indices each.
#[derive(Debug, Default)]
pub struct MeshBuffer {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    gpu: Option<GpuMeshId>,
    uploaded_index_count: u32,
    dirty: bool,
}

impl MeshBuffer {
    /// Creates an empty buffer with no GPU handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one quad as 4 vertices and the 6 indices of its two triangles.
    pub fn add_quad(&mut self, quad: [Vertex; 4]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&quad);
        self.indices.extend(QUAD_INDICES.iter().map(|index| base + index));
        self.dirty = true;
    }

    /// Sends the CPU geometry to the GPU.
    ///
    /// The first upload of a non-empty buffer creates its GPU buffers; later
    /// uploads overwrite them, and do nothing when the geometry is empty or
    /// unchanged since the last upload.
    ///
    /// # Errors
    /// Any device failure, which means the graphics context is unusable.
    pub fn upload(&mut self, device: &mut dyn RenderDevice) -> Result<(), RenderError> {
        match self.gpu {
            Some(id) => {
                if self.indices.is_empty() || !self.dirty {
                    return Ok(());
                }
                device.update_mesh(id, &self.vertices, &self.indices)?;
            }
            None => {
                if self.indices.is_empty() {
                    return Ok(());
                }
                self.gpu = Some(device.create_mesh(&self.vertices, &self.indices)?);
            }
        }
        self.uploaded_index_count = self.indices.len() as u32;
        self.dirty = false;
        Ok(())
    }

    /// Issues a single indexed draw of the uploaded geometry.
    ///
    /// Does nothing when the buffer was never uploaded or holds no quads.
    pub fn render(&self, device: &mut dyn RenderDevice) {
        match self.gpu {
            Some(id) if self.uploaded_index_count > 0 && !self.indices.is_empty() => {
                device.draw_mesh(id, self.uploaded_index_count);
            }
            _ => {}
        }
    }

    /// Drops the CPU geometry ahead of a rebuild. The GPU handle is kept and
    /// reused by the next upload.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.dirty = true;
    }

    /// Releases the GPU handle. Safe to call any number of times.
    pub fn cleanup(&mut self, device: &mut dyn RenderDevice) {
        if let Some(id) = self.gpu.take() {
            device.destroy_mesh(id);
        }
        self.uploaded_index_count = 0;
    }

    /// Number of quads in the CPU geometry.
    pub fn quad_count(&self) -> usize {
        self.vertices.len() / 4
    }

    /// Number of vertices in the mesh.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of indices in the mesh.
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether the mesh has nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether the buffer currently owns a GPU handle.
    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }

    /// The CPU-side vertex data.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// The CPU-side index data.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Point3, Vector3};

    use super::*;
    use crate::engine_state::rendering::render_device::RecordingDevice;

    fn quad() -> [Vertex; 4] {
        let vertex = |x: f32, y: f32| {
            Vertex::new(Point3::new(x, y, 0.0), [x, y], Vector3::unit_z(), 0, 1.0)
        };
        [vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(1.0, 1.0), vertex(0.0, 1.0)]
    }

    #[test]
    fn test_add_quad_offsets_indices() {
        let mut mesh = MeshBuffer::new();
        mesh.add_quad(quad());
        mesh.add_quad(quad());

        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.indices(), &[0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]);
        assert_eq!(mesh.quad_count(), 2);
    }

    #[test]
    fn test_empty_mesh_is_never_uploaded_or_drawn() {
        let mut device = RecordingDevice::new();
        let mut mesh = MeshBuffer::new();

        mesh.upload(&mut device).unwrap();
        mesh.render(&mut device);

        assert!(!mesh.is_uploaded());
        assert_eq!(device.creates, 0);
        assert!(device.draws.is_empty());
    }

    #[test]
    fn test_upload_is_idempotent() {
        let mut device = RecordingDevice::new();
        let mut mesh = MeshBuffer::new();
        mesh.add_quad(quad());

        mesh.upload(&mut device).unwrap();
        mesh.upload(&mut device).unwrap();

        assert_eq!(device.creates, 1);
        assert_eq!(device.updates, 0);

        mesh.render(&mut device);
        assert_eq!(device.draws, vec![(GpuMeshId(0), 6)]);
    }

    #[test]
    fn test_rebuild_reuses_handle() {
        let mut device = RecordingDevice::new();
        let mut mesh = MeshBuffer::new();
        mesh.add_quad(quad());
        mesh.upload(&mut device).unwrap();

        mesh.clear();
        mesh.upload(&mut device).unwrap();
        assert_eq!(device.updates, 0);

        mesh.add_quad(quad());
        mesh.add_quad(quad());
        mesh.upload(&mut device).unwrap();

        assert_eq!(device.creates, 1);
        assert_eq!(device.updates, 1);
        mesh.render(&mut device);
        assert_eq!(device.draws, vec![(GpuMeshId(0), 12)]);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut device = RecordingDevice::new();
        let mut mesh = MeshBuffer::new();
        mesh.add_quad(quad());
        mesh.upload(&mut device).unwrap();

        mesh.cleanup(&mut device);
        mesh.cleanup(&mut device);
        mesh.render(&mut device);

        assert_eq!(device.destroys, 1);
        assert_eq!(device.live_meshes(), 0);
        assert!(device.draws.is_empty());
    }

    #[test]
    fn test_upload_failure_propagates() {
        let mut device = RecordingDevice::new();
        device.fail_uploads = true;
        let mut mesh = MeshBuffer::new();
        mesh.add_quad(quad());

        assert!(mesh.upload(&mut device).is_err());
        assert!(!mesh.is_uploaded());
    }
}
