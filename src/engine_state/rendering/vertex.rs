//! Vertex data structures and layouts for chunk rendering.
//!
//! This module defines the vertex format produced by the greedy mesher and the
//! matching `wgpu` vertex buffer layout.

use cgmath::{Point3, Vector3};

/// A vertex of a chunk mesh.
///
/// Positions are local to the chunk; the chunk origin is applied by the
/// per-chunk transform at draw time.
///
/// # Memory Layout
/// - Position: [f32; 3] (12 bytes)
/// - Texture Coordinates: [f32; 2] (8 bytes)
/// - Normal: [f32; 3] (12 bytes)
/// - Texture Layer: u32 (4 bytes)
/// - Ambient Occlusion: f32 (4 bytes)
///
/// Total size: 40 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Chunk-local position
    pub position: [f32; 3],
    /// UV coordinates, scaled by the merged quad size so textures tile
    pub tex_coords: [f32; 2],
    /// Outward face normal
    pub normal: [f32; 3],
    /// Layer of the block texture array
    pub texture_layer: u32,
    /// Ambient occlusion factor (1.0 = unoccluded)
    pub ambient_occlusion: f32,
}

impl Vertex {
    /// Creates a new vertex.
    pub fn new(
        position: Point3<f32>,
        tex_coords: [f32; 2],
        normal: Vector3<f32>,
        texture_layer: u32,
        ambient_occlusion: f32,
    ) -> Self {
        Vertex {
            position: position.into(),
            tex_coords,
            normal: normal.into(),
            texture_layer,
            ambient_occlusion,
        }
    }

    /// Returns the vertex buffer layout description for the chunk pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position (vec3<f32>)
    /// - `location = 1`: tex_coords (vec2<f32>)
    /// - `location = 2`: normal (vec3<f32>)
    /// - `location = 3`: texture_layer (u32)
    /// - `location = 4`: ambient_occlusion (f32)
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Uint32,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 9]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}
