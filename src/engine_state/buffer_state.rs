//! # Buffer State Module
//!
//! This module provides a centralized registry for the GPU buffers of the chunk
//! pipeline: a handful of named uniform buffers plus one vertex/index buffer pair
//! per uploaded chunk mesh.
//!
//! ## Key Features
//!
//! * Named buffers for uniforms shared by every draw
//! * Mesh buffer pairs addressed by [`GpuMeshId`] handles
//! * Buffer usage analytics and memory tracking
//! * Bounds-checked writes that fail with a [`RenderError`] instead of panicking
//!
//! ## Mesh Buffers
//!
//! Mesh buffers are allocated with headroom (the next power of two of the
//! requested size) so a rebuilt chunk that grows a little is rewritten in place.
//! A mesh that outgrows its buffers gets new ones; the old ones are destroyed.

use std::collections::HashMap;

use bytemuck::NoUninit;
use log::trace;
use wgpu::{util::DeviceExt, Buffer, BufferAddress, BufferUsages, Device, Queue};

use super::rendering::{
    render_device::{GpuMeshId, RenderError},
    Vertex,
};

/// Analytics data for a GPU buffer
///
/// Tracks memory allocation, usage, and write operations for a buffer
/// to help identify optimization opportunities.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferAnalytics {
    /// Total memory allocated for the buffer in bytes
    pub allocated_memory: u64,
    /// Actual memory used in the buffer in bytes (based on writes)
    pub used_memory: u64,
    /// Number of times the buffer has been written to
    pub times_written: u64,
}

/// The vertex and index buffers of one uploaded mesh.
#[derive(Debug)]
pub struct MeshBuffers {
    /// GPU buffer holding the vertices
    pub vertex_buffer: Buffer,
    /// GPU buffer holding the indices
    pub index_buffer: Buffer,
    /// Number of vertices the vertex buffer can hold
    pub vertex_capacity: usize,
    /// Number of indices the index buffer can hold
    pub index_capacity: usize,
    /// Number of valid vertices in the vertex buffer
    pub vertex_count: u32,
    /// Number of valid indices in the index buffer
    pub index_count: u32,
}

impl MeshBuffers {
    fn allocated_memory(&self) -> u64 {
        byte_size::<Vertex>(self.vertex_capacity) + byte_size::<u32>(self.index_capacity)
    }

    fn used_memory(&self) -> u64 {
        byte_size::<Vertex>(self.vertex_count as usize) + byte_size::<u32>(self.index_count as usize)
    }
}

/// Central registry for the GPU buffers of the chunk pipeline
///
/// # Examples
///
/// ```ignore
/// let mut buffer_state = BufferState::new();
///
/// buffer_state.create_buffer_init(
///     &device,
///     CAMERA_BUFFER_NAME,
///     wgpu::util::BufferInitDescriptor {
///         label: Some("Camera Buffer"),
///         contents: bytemuck::bytes_of(&camera_uniform),
///         usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
///     },
/// );
///
/// let mesh = buffer_state.create_mesh(&device, &queue, &vertices, &indices)?;
/// ```
#[derive(Debug, Default)]
pub struct BufferState {
    /// Map of buffer names to buffer objects
    buffers: HashMap<&'static str, Buffer>,
    /// Analytics data for each named buffer
    buffer_analytics: HashMap<&'static str, BufferAnalytics>,
    /// Uploaded meshes
    meshes: HashMap<GpuMeshId, MeshBuffers>,
    next_mesh_id: u64,
}

impl BufferState {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty named buffer, replacing any buffer of the same name.
    ///
    /// # Arguments
    ///
    /// * `device` - The GPU device
    /// * `buffer_name` - Unique name for the buffer
    /// * `buffer_descriptor` - Buffer configuration descriptor
    pub fn create_buffer(
        &mut self,
        device: &Device,
        buffer_name: &'static str,
        buffer_descriptor: wgpu::BufferDescriptor,
    ) {
        let buffer_analytics = BufferAnalytics {
            allocated_memory: buffer_descriptor.size,
            used_memory: 0,
            times_written: 0,
        };
        let buffer = device.create_buffer(&buffer_descriptor);

        if let Some(previous) = self.buffers.insert(buffer_name, buffer) {
            previous.destroy();
        }
        self.buffer_analytics.insert(buffer_name, buffer_analytics);
    }

    /// Creates a named buffer initialized with data.
    ///
    /// # Arguments
    ///
    /// * `device` - The GPU device
    /// * `buffer_name` - Unique name for the buffer
    /// * `init_descriptor` - Buffer initialization descriptor with data
    pub fn create_buffer_init(
        &mut self,
        device: &Device,
        buffer_name: &'static str,
        init_descriptor: wgpu::util::BufferInitDescriptor,
    ) {
        let buffer_analytics = BufferAnalytics {
            allocated_memory: init_descriptor.contents.len() as u64,
            used_memory: init_descriptor.contents.len() as u64,
            times_written: 1,
        };
        let buffer = device.create_buffer_init(&init_descriptor);

        if let Some(previous) = self.buffers.insert(buffer_name, buffer) {
            previous.destroy();
        }
        self.buffer_analytics.insert(buffer_name, buffer_analytics);
    }

    /// Writes raw byte data to a named buffer
    ///
    /// # Arguments
    ///
    /// * `queue` - The GPU queue the write is scheduled on
    /// * `buffer_name` - Name of the buffer to write to
    /// * `offset` - Byte offset in the buffer to start writing
    /// * `data` - Raw byte data to write
    ///
    /// # Errors
    ///
    /// [`RenderError::UnknownBuffer`] if the buffer does not exist and
    /// [`RenderError::InvalidMesh`] if the write would exceed its bounds.
    pub fn write_buffer(
        &mut self,
        queue: &Queue,
        buffer_name: &'static str,
        offset: BufferAddress,
        data: &[u8],
    ) -> Result<(), RenderError> {
        let buffer = self
            .buffers
            .get(buffer_name)
            .ok_or(RenderError::UnknownBuffer(buffer_name))?;
        let buffer_analytics = self.buffer_analytics.entry(buffer_name).or_default();

        let data_size = data.len() as u64;
        if offset + data_size > buffer_analytics.allocated_memory {
            return Err(RenderError::InvalidMesh(format!(
                "write of {} bytes at {} exceeds buffer '{}'",
                data_size, offset, buffer_name
            )));
        }

        queue.write_buffer(buffer, offset, data);
        buffer_analytics.used_memory = buffer_analytics.used_memory.max(offset + data_size);
        buffer_analytics.times_written += 1;
        Ok(())
    }

    /// Gets a named buffer
    pub fn get_buffer(&self, buffer_name: &'static str) -> Option<&Buffer> {
        self.buffers.get(buffer_name)
    }

    /// Size in bytes of a named buffer, 0 if it does not exist.
    pub fn buffer_size(&self, buffer_name: &'static str) -> u64 {
        self.buffer_analytics
            .get(buffer_name)
            .map_or(0, |analytics| analytics.allocated_memory)
    }

    /// Uploads a new mesh into freshly allocated buffers.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidMesh`] if an index points past the vertex list.
    pub fn create_mesh(
        &mut self,
        device: &Device,
        queue: &Queue,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<GpuMeshId, RenderError> {
        validate_mesh(vertices, indices)?;

        let id = GpuMeshId(self.next_mesh_id);
        self.next_mesh_id += 1;

        let buffers = allocate_mesh(device, id, vertices.len(), indices.len());
        self.meshes.insert(id, buffers);
        self.write_mesh(queue, id, vertices, indices)?;
        trace!("Created mesh {:?} with {} indices", id, indices.len());
        Ok(id)
    }

    /// Rewrites a mesh, reallocating its buffers if the new geometry does not fit.
    ///
    /// # Errors
    ///
    /// [`RenderError::UnknownMesh`] for a destroyed or foreign handle and
    /// [`RenderError::InvalidMesh`] if an index points past the vertex list.
    pub fn update_mesh(
        &mut self,
        device: &Device,
        queue: &Queue,
        id: GpuMeshId,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        validate_mesh(vertices, indices)?;

        let mesh = self.meshes.get(&id).ok_or(RenderError::UnknownMesh(id))?;
        if vertices.len() > mesh.vertex_capacity || indices.len() > mesh.index_capacity {
            let buffers = allocate_mesh(device, id, vertices.len(), indices.len());
            if let Some(previous) = self.meshes.insert(id, buffers) {
                release(previous);
            }
        }
        self.write_mesh(queue, id, vertices, indices)
    }

    /// Destroys the buffers of a mesh. Unknown handles are ignored.
    pub fn destroy_mesh(&mut self, id: GpuMeshId) {
        if let Some(mesh) = self.meshes.remove(&id) {
            release(mesh);
        }
    }

    /// Gets the buffers of an uploaded mesh
    pub fn mesh(&self, id: GpuMeshId) -> Option<&MeshBuffers> {
        self.meshes.get(&id)
    }

    /// Number of uploaded meshes.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Gets the total allocated memory across all buffers
    ///
    /// # Returns
    ///
    /// Total allocated memory in bytes
    pub fn get_total_allocated_memory(&self) -> u64 {
        let meshes: u64 = self.meshes.values().map(MeshBuffers::allocated_memory).sum();
        self.buffer_analytics
            .values()
            .fold(meshes, |acc, analytics| acc + analytics.allocated_memory)
    }

    /// Gets the total used memory across all buffers
    ///
    /// # Returns
    ///
    /// Total used memory in bytes
    pub fn get_total_used_memory(&self) -> u64 {
        let meshes: u64 = self.meshes.values().map(MeshBuffers::used_memory).sum();
        self.buffer_analytics
            .values()
            .fold(meshes, |acc, analytics| acc + analytics.used_memory)
    }

    fn write_mesh(
        &mut self,
        queue: &Queue,
        id: GpuMeshId,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        let mesh = self.meshes.get_mut(&id).ok_or(RenderError::UnknownMesh(id))?;
        write_aligned(queue, &mesh.vertex_buffer, vertices);
        write_aligned(queue, &mesh.index_buffer, indices);
        mesh.vertex_count = vertices.len() as u32;
        mesh.index_count = indices.len() as u32;
        Ok(())
    }
}

fn allocate_mesh(device: &Device, id: GpuMeshId, vertex_len: usize, index_len: usize) -> MeshBuffers {
    let vertex_capacity = buffer_capacity(vertex_len);
    let index_capacity = buffer_capacity(index_len);

    let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("Chunk Vertex Buffer {}", id.0)),
        size: byte_size::<Vertex>(vertex_capacity),
        usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("Chunk Index Buffer {}", id.0)),
        size: byte_size::<u32>(index_capacity),
        usage: BufferUsages::INDEX | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    MeshBuffers {
        vertex_buffer,
        index_buffer,
        vertex_capacity,
        index_capacity,
        vertex_count: 0,
        index_count: 0,
    }
}

fn release(mesh: MeshBuffers) {
    mesh.vertex_buffer.destroy();
    mesh.index_buffer.destroy();
}

/// Checks that every index refers to a vertex of the mesh.
pub fn validate_mesh(vertices: &[Vertex], indices: &[u32]) -> Result<(), RenderError> {
    match indices.iter().find(|&&index| index as usize >= vertices.len()) {
        Some(index) => Err(RenderError::InvalidMesh(format!(
            "index {} out of range for {} vertices",
            index,
            vertices.len()
        ))),
        None => Ok(()),
    }
}

/// Element capacity allocated for `len` elements: the next power of two, at least 4.
pub fn buffer_capacity(len: usize) -> usize {
    len.max(4).next_power_of_two()
}

fn byte_size<T>(len: usize) -> u64 {
    (len * std::mem::size_of::<T>()) as u64
}

/// Writes `data` at offset 0, padding the tail to the 4-byte copy alignment.
fn write_aligned<T: NoUninit>(queue: &Queue, buffer: &Buffer, data: &[T]) {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    if bytes.is_empty() {
        return;
    }
    let remainder = bytes.len() % wgpu::COPY_BUFFER_ALIGNMENT as usize;
    if remainder == 0 {
        queue.write_buffer(buffer, 0, bytes);
    } else {
        let mut padded = bytes.to_vec();
        padded.resize(bytes.len() + wgpu::COPY_BUFFER_ALIGNMENT as usize - remainder, 0);
        queue.write_buffer(buffer, 0, &padded);
    }
}
