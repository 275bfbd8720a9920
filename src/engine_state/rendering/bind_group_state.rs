//! Manages WebGPU bind groups and their layouts.
//!
//! The chunk pipeline uses three bind groups:
//! - group 0: the camera uniform
//! - group 1: the block texture array and its sampler
//! - group 2: the per-chunk origin, a uniform buffer bound with a dynamic offset
//!   so every draw of a frame selects its own slot

use std::num::NonZeroU64;

use wgpu::{BindGroup, BindGroupLayout, Device};

use crate::engine_state::buffer_state::BufferState;

use super::{render_device::RenderError, texture::Texture};

/// Name of the camera uniform buffer
pub const CAMERA_BUFFER_NAME: &str = "Camera Buffer";
/// Name of the chunk origin uniform buffer
pub const CHUNK_ORIGIN_BUFFER_NAME: &str = "Chunk Origin Buffer";

/// Name of the camera bind group
pub const CAMERA_BIND_GROUP: &str = "camera_bind_group";
/// Name of the camera bind group layout
pub const CAMERA_BIND_GROUP_LAYOUT: &str = "camera_bind_group_layout";
/// Name of the texture bind group
pub const TEXTURE_BIND_GROUP: &str = "texture_bind_group";
/// Name of the texture bind group layout
pub const TEXTURE_BIND_GROUP_LAYOUT: &str = "texture_bind_group_layout";
/// Name of the chunk origin bind group
pub const CHUNK_ORIGIN_BIND_GROUP: &str = "chunk_origin_bind_group";
/// Name of the chunk origin bind group layout
pub const CHUNK_ORIGIN_BIND_GROUP_LAYOUT: &str = "chunk_origin_bind_group_layout";

/// Bytes between consecutive chunk origin slots; the minimum uniform offset alignment.
pub const CHUNK_ORIGIN_STRIDE: u64 = 256;
/// Size of one chunk origin as seen by the shader (`vec4<f32>`).
pub const CHUNK_ORIGIN_SIZE: u64 = 16;
/// Slots allocated up front; grows by doubling.
pub const INITIAL_CHUNK_ORIGIN_SLOTS: u32 = 256;

/// Owns the bind groups and layouts of the chunk pipeline.
pub struct BindGroupState {
    camera_bind_group: BindGroup,
    camera_bind_group_layout: BindGroupLayout,
    /// Texture array groups indexed by texture unit
    texture_bind_groups: Vec<BindGroup>,
    texture_bind_group_layout: BindGroupLayout,
    chunk_origin_bind_group: BindGroup,
    chunk_origin_bind_group_layout: BindGroupLayout,
    chunk_origin_slots: u32,
}

impl BindGroupState {
    /// Creates the uniform buffers and every bind group.
    ///
    /// # Arguments
    /// * `device` - The WebGPU device
    /// * `buffer_state` - Registry the uniform buffers are created in
    /// * `block_textures` - The block texture array, bound as texture unit 0
    ///
    /// # Errors
    /// [`RenderError::UnknownBuffer`] if a uniform buffer could not be found after creation.
    pub fn new(
        device: &Device,
        buffer_state: &mut BufferState,
        block_textures: &Texture,
    ) -> Result<Self, RenderError> {
        buffer_state.create_buffer(
            device,
            CAMERA_BUFFER_NAME,
            wgpu::BufferDescriptor {
                label: Some(CAMERA_BUFFER_NAME),
                size: std::mem::size_of::<crate::engine_state::camera_state::camera::CameraUniform>()
                    as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            },
        );
        let (camera_bind_group, camera_bind_group_layout) =
            Self::generate_camera_bindgroups(device, buffer_state)?;

        let texture_bind_group_layout = Self::generate_texture_bind_group_layout(device);
        let texture_bind_groups = vec![Self::generate_texture_bindgroup(
            device,
            &texture_bind_group_layout,
            block_textures,
        )];

        let chunk_origin_bind_group_layout = Self::generate_chunk_origin_bind_group_layout(device);
        let chunk_origin_bind_group = Self::allocate_chunk_origins(
            device,
            buffer_state,
            &chunk_origin_bind_group_layout,
            INITIAL_CHUNK_ORIGIN_SLOTS,
        )?;

        Ok(Self {
            camera_bind_group,
            camera_bind_group_layout,
            texture_bind_groups,
            texture_bind_group_layout,
            chunk_origin_bind_group,
            chunk_origin_bind_group_layout,
            chunk_origin_slots: INITIAL_CHUNK_ORIGIN_SLOTS,
        })
    }

    /// The bind group holding the camera uniform.
    pub fn camera_bind_group(&self) -> &BindGroup {
        &self.camera_bind_group
    }

    /// The texture array bound to `texture_unit`, if any.
    pub fn texture_bind_group(&self, texture_unit: u32) -> Option<&BindGroup> {
        self.texture_bind_groups.get(texture_unit as usize)
    }

    /// The bind group holding the per-chunk origins.
    pub fn chunk_origin_bind_group(&self) -> &BindGroup {
        &self.chunk_origin_bind_group
    }

    /// Layouts in pipeline order (groups 0, 1, 2).
    pub fn layouts(&self) -> [&BindGroupLayout; 3] {
        [
            &self.camera_bind_group_layout,
            &self.texture_bind_group_layout,
            &self.chunk_origin_bind_group_layout,
        ]
    }

    /// Grows the chunk origin buffer so it holds at least `slots` origins.
    ///
    /// # Returns
    /// Whether the buffer and its bind group were recreated.
    pub fn ensure_chunk_origin_capacity(
        &mut self,
        device: &Device,
        buffer_state: &mut BufferState,
        slots: u32,
    ) -> Result<bool, RenderError> {
        if slots <= self.chunk_origin_slots {
            return Ok(false);
        }
        let capacity = slots.next_power_of_two();
        self.chunk_origin_bind_group = Self::allocate_chunk_origins(
            device,
            buffer_state,
            &self.chunk_origin_bind_group_layout,
            capacity,
        )?;
        self.chunk_origin_slots = capacity;
        Ok(true)
    }

    /// Creates bind groups for camera uniforms.
    fn generate_camera_bindgroups(
        device: &Device,
        buffer_state: &BufferState,
    ) -> Result<(BindGroup, BindGroupLayout), RenderError> {
        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
                label: Some(CAMERA_BIND_GROUP_LAYOUT),
            });

        let camera_buffer = buffer_state
            .get_buffer(CAMERA_BUFFER_NAME)
            .ok_or(RenderError::UnknownBuffer(CAMERA_BUFFER_NAME))?;
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
            label: Some(CAMERA_BIND_GROUP),
        });

        Ok((camera_bind_group, camera_bind_group_layout))
    }

    fn generate_texture_bind_group_layout(device: &Device) -> BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    // This should match the filterable field of the corresponding Texture entry above.
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some(TEXTURE_BIND_GROUP_LAYOUT),
        })
    }

    fn generate_texture_bindgroup(
        device: &Device,
        layout: &BindGroupLayout,
        texture: &Texture,
    ) -> BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
            label: Some(TEXTURE_BIND_GROUP),
        })
    }

    fn generate_chunk_origin_bind_group_layout(device: &Device) -> BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(CHUNK_ORIGIN_SIZE),
                },
                count: None,
            }],
            label: Some(CHUNK_ORIGIN_BIND_GROUP_LAYOUT),
        })
    }

    /// (Re)creates the chunk origin buffer with `slots` slots and binds its first slot.
    fn allocate_chunk_origins(
        device: &Device,
        buffer_state: &mut BufferState,
        layout: &BindGroupLayout,
        slots: u32,
    ) -> Result<BindGroup, RenderError> {
        buffer_state.create_buffer(
            device,
            CHUNK_ORIGIN_BUFFER_NAME,
            wgpu::BufferDescriptor {
                label: Some(CHUNK_ORIGIN_BUFFER_NAME),
                size: slots as u64 * CHUNK_ORIGIN_STRIDE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            },
        );
        let buffer = buffer_state
            .get_buffer(CHUNK_ORIGIN_BUFFER_NAME)
            .ok_or(RenderError::UnknownBuffer(CHUNK_ORIGIN_BUFFER_NAME))?;

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: NonZeroU64::new(CHUNK_ORIGIN_SIZE),
                }),
            }],
            label: Some(CHUNK_ORIGIN_BIND_GROUP),
        }))
    }
}

/// Packs chunk origins into slot-strided bytes for the origin uniform buffer.
pub fn pack_chunk_origins(origins: &[[f32; 4]]) -> Vec<u8> {
    let mut bytes = vec![0u8; origins.len() * CHUNK_ORIGIN_STRIDE as usize];
    for (slot, origin) in origins.iter().enumerate() {
        let start = slot * CHUNK_ORIGIN_STRIDE as usize;
        bytes[start..start + CHUNK_ORIGIN_SIZE as usize]
            .copy_from_slice(bytemuck::cast_slice(origin));
    }
    bytes
}
