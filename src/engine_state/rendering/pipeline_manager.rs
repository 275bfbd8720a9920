//! Manages the WebGPU render pipeline and associated rendering resources.
//!
//! The pipeline manager is the wgpu implementation of [`RenderDevice`]. The chunk
//! renderer talks to it through that trait during the frame; the draws it issues
//! are recorded and then encoded into a single render pass by
//! [`PipelineManager::present_frame`].
//!
//! # Resource Management
//!
//! - Bind groups for the camera, the block texture array and chunk origins
//! - Mesh vertex/index buffers through the [`BufferState`] registry
//! - The depth texture, recreated on resize
//!
//! # Frame Recording
//!
//! `set_chunk_transform` appends an origin slot, and every following `draw_mesh`
//! references it. At present time all origins are written into the dynamic-offset
//! uniform buffer in one go, so each draw costs one `set_bind_group` with an offset.

use cgmath::{Matrix4, Point3, Vector3};
use log::{debug, warn};
use wgpu::{Device, Queue, RenderPipeline, Surface, SurfaceConfiguration, TextureFormat};

use crate::engine_state::{buffer_state::BufferState, camera_state::camera::CameraUniform};

use super::{
    atlas::BlockAtlas,
    bind_group_state::{
        pack_chunk_origins, BindGroupState, CAMERA_BUFFER_NAME, CHUNK_ORIGIN_BUFFER_NAME,
        CHUNK_ORIGIN_STRIDE,
    },
    render_device::{GpuMeshId, RenderDevice, RenderError},
    texture,
    vertex::Vertex,
};

/// Colour the frame is cleared to.
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.53,
    g: 0.72,
    b: 0.92,
    a: 1.0,
};

/// One recorded indexed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DrawCommand {
    mesh: GpuMeshId,
    index_count: u32,
    origin_slot: u32,
}

/// Everything the chunk renderer issued for the current frame.
#[derive(Debug, Default)]
struct FrameRecording {
    view_projection: Option<Matrix4<f32>>,
    texture_unit: u32,
    origins: Vec<[f32; 4]>,
    draws: Vec<DrawCommand>,
}

impl FrameRecording {
    fn current_origin_slot(&mut self) -> u32 {
        if self.origins.is_empty() {
            self.origins.push([0.0; 4]);
        }
        (self.origins.len() - 1) as u32
    }
}

/// Manages the WebGPU rendering process and associated rendering resources.
pub struct PipelineManager {
    device: Device,
    queue: Queue,
    /// Registry of uniform and mesh buffers
    pub buffer_state: BufferState,
    /// Bind groups used by the chunk pipeline
    pub bind_group_state: BindGroupState,
    /// Depth texture used for depth testing
    pub depth_texture: texture::Texture,
    /// Block texture array, bound as texture unit 0
    #[allow(dead_code)]
    block_textures: texture::Texture,
    render_pipeline: RenderPipeline,
    camera_uniform: CameraUniform,
    eye: Point3<f32>,
    frame: FrameRecording,
}

impl PipelineManager {
    /// Creates a new `PipelineManager` instance.
    ///
    /// # Arguments
    /// * `device` - The WebGPU device
    /// * `queue` - The WebGPU queue for buffer operations
    /// * `config` - Surface configuration containing size and format
    /// * `texture_format` - The texture format to use for rendering
    /// * `shader_string` - The WGSL shader source code for chunk rendering
    /// * `atlas` - Atlas whose layers fill the block texture array
    /// * `texture_seed` - Seed of the procedural texture noise
    ///
    /// # Returns
    /// A new `PipelineManager` instance with all rendering resources initialized
    pub fn new(
        device: Device,
        queue: Queue,
        config: &SurfaceConfiguration,
        texture_format: TextureFormat,
        shader_string: &str,
        atlas: &BlockAtlas,
        texture_seed: u64,
    ) -> Result<Self, RenderError> {
        let mut buffer_state = BufferState::new();

        let block_textures = texture::Texture::create_block_texture_array(
            &device,
            &queue,
            &atlas.layers(),
            texture_seed,
        );
        let bind_group_state = BindGroupState::new(&device, &mut buffer_state, &block_textures)?;

        let depth_texture = texture::Texture::create_depth_texture(&device, config, "DEPTH TEXTURE");

        let depth_stencil = Some(wgpu::DepthStencilState {
            format: texture::Texture::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Chunk Render Pipeline Layout"),
            bind_group_layouts: &bind_group_state.layouts(),
            push_constant_ranges: &[],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Chunk Shader"),
            source: wgpu::ShaderSource::Wgsl(shader_string.into()),
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Chunk Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil,
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            device,
            queue,
            buffer_state,
            bind_group_state,
            depth_texture,
            block_textures,
            render_pipeline,
            camera_uniform: CameraUniform::new(),
            eye: Point3::new(0.0, 0.0, 0.0),
            frame: FrameRecording::default(),
        })
    }

    /// Sets the eye position passed to the shader for distance fog.
    pub fn set_eye(&mut self, eye: Point3<f32>) {
        self.eye = eye;
    }

    /// Encodes the recorded frame into one render pass and presents it.
    ///
    /// A lost or outdated surface is reconfigured and the frame skipped; a
    /// timeout skips the frame. The recording is cleared in every case.
    ///
    /// # Errors
    /// Any other surface acquisition failure, or a uniform write failure.
    pub fn present_frame(
        &mut self,
        surface: &Surface,
        config: &SurfaceConfiguration,
    ) -> Result<(), RenderError> {
        let recording = std::mem::take(&mut self.frame);

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("Surface lost or outdated, reconfiguring");
                surface.configure(&self.device, config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("Timed out acquiring the next frame, skipping it");
                return Ok(());
            }
            Err(e) => return Err(RenderError::SurfaceAcquire(e.to_string())),
        };

        if let Some(view_projection) = recording.view_projection {
            self.camera_uniform
                .update_view_proj_and_pos(view_projection, self.eye);
        }
        self.buffer_state.write_buffer(
            &self.queue,
            CAMERA_BUFFER_NAME,
            0,
            bytemuck::bytes_of(&self.camera_uniform),
        )?;

        if !recording.origins.is_empty() {
            self.bind_group_state.ensure_chunk_origin_capacity(
                &self.device,
                &mut self.buffer_state,
                recording.origins.len() as u32,
            )?;
            self.buffer_state.write_buffer(
                &self.queue,
                CHUNK_ORIGIN_BUFFER_NAME,
                0,
                &pack_chunk_origins(&recording.origins),
            )?;
        }

        let view = frame.texture.create_view(&Default::default());
        let mut encoder = self.device.create_command_encoder(&Default::default());
        {
            let depth_stencil_attachment = Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_texture.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            });
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment,
                ..Default::default()
            });

            match self.bind_group_state.texture_bind_group(recording.texture_unit) {
                Some(texture_bind_group) if !recording.draws.is_empty() => {
                    rpass.set_pipeline(&self.render_pipeline);
                    rpass.set_bind_group(0, self.bind_group_state.camera_bind_group(), &[]);
                    rpass.set_bind_group(1, texture_bind_group, &[]);

                    for draw in &recording.draws {
                        let Some(mesh) = self.buffer_state.mesh(draw.mesh) else {
                            warn!("Skipping draw of unknown mesh {:?}", draw.mesh);
                            continue;
                        };
                        let offset = draw.origin_slot * CHUNK_ORIGIN_STRIDE as u32;
                        rpass.set_bind_group(
                            2,
                            self.bind_group_state.chunk_origin_bind_group(),
                            &[offset],
                        );
                        rpass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                        rpass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        rpass.draw_indexed(0..draw.index_count.min(mesh.index_count), 0, 0..1);
                    }
                }
                Some(_) => {}
                None => warn!("No texture bound to unit {}", recording.texture_unit),
            }
        }

        self.queue.submit([encoder.finish()]);
        frame.present();
        Ok(())
    }

    /// Handles window resize events by recreating the depth texture.
    ///
    /// # Arguments
    /// * `config` - The new surface configuration containing the updated size
    pub fn resize(&mut self, config: &SurfaceConfiguration) {
        self.depth_texture =
            texture::Texture::create_depth_texture(&self.device, config, "DEPTH TEXTURE");
    }

    /// The WebGPU device the pipeline was built on.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl RenderDevice for PipelineManager {
    fn create_mesh(&mut self, vertices: &[Vertex], indices: &[u32]) -> Result<GpuMeshId, RenderError> {
        self.buffer_state
            .create_mesh(&self.device, &self.queue, vertices, indices)
    }

    fn update_mesh(
        &mut self,
        id: GpuMeshId,
        vertices: &[Vertex],
        indices: &[u32],
    ) -> Result<(), RenderError> {
        self.buffer_state
            .update_mesh(&self.device, &self.queue, id, vertices, indices)
    }

    fn destroy_mesh(&mut self, id: GpuMeshId) {
        self.buffer_state.destroy_mesh(id);
    }

    fn begin_chunk_pass(&mut self, view_projection: Matrix4<f32>, texture_unit: u32) {
        self.frame = FrameRecording {
            view_projection: Some(view_projection),
            texture_unit,
            ..FrameRecording::default()
        };
    }

    fn set_chunk_transform(&mut self, origin: Vector3<f32>) {
        self.frame.origins.push([origin.x, origin.y, origin.z, 0.0]);
    }

    fn draw_mesh(&mut self, id: GpuMeshId, index_count: u32) {
        let origin_slot = self.frame.current_origin_slot();
        self.frame.draws.push(DrawCommand {
            mesh: id,
            index_count,
            origin_slot,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draws_reference_latest_origin() {
        let mut frame = FrameRecording::default();

        assert_eq!(frame.current_origin_slot(), 0);
        frame.origins.push([16.0, 0.0, 0.0, 0.0]);
        assert_eq!(frame.current_origin_slot(), 1);
        assert_eq!(frame.origins.len(), 2);
    }
}
