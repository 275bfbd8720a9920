//! Rendering system for the streaming voxel world.
//!
//! This module contains the chunk rendering pipeline: the greedy mesher, the
//! chunk renderer that owns uploaded meshes, and the wgpu resources behind the
//! [`RenderDevice`](render_device::RenderDevice) they draw through.

pub use pipeline_manager::PipelineManager;
use wgpu::{Surface, SurfaceConfiguration};

use atlas::BlockAtlas;
use render_device::RenderError;

pub mod atlas;
mod bind_group_state;
pub mod meshing;
mod pipeline_manager;
pub mod render_device;
pub mod tasks;
mod texture;
pub mod vertex;

// Re-export commonly used types
pub use vertex::Vertex;

/// Owns the window surface and the pipeline that draws into it.
pub struct MeshRendererManager {
    /// The WebGPU surface being rendered to
    pub surface: Surface<'static>,
    /// Configuration for the surface (size, format, etc.)
    pub surface_config: SurfaceConfiguration,
    /// Render device the chunk renderer issues its draws to
    pub pipeline_manager: PipelineManager,
}

impl MeshRendererManager {
    /// Creates a new `MeshRendererManager` instance.
    ///
    /// # Arguments
    /// * `surface` - The WebGPU surface to render to
    /// * `surface_config` - Configuration for the surface
    /// * `device` - The WebGPU device
    /// * `queue` - The WebGPU queue
    /// * `shader_string` - WGSL source code of the chunk shader
    /// * `texture_seed` - Seed of the procedural block textures
    ///
    /// # Returns
    /// A new `MeshRendererManager` instance with all rendering resources initialized
    pub fn new(
        surface: Surface<'static>,
        surface_config: SurfaceConfiguration,
        device: wgpu::Device,
        queue: wgpu::Queue,
        shader_string: &str,
        texture_seed: u64,
    ) -> Result<Self, RenderError> {
        let pipeline_manager = PipelineManager::new(
            device,
            queue,
            &surface_config,
            surface_config.format,
            shader_string,
            &BlockAtlas,
            texture_seed,
        )?;

        Ok(Self {
            surface,
            surface_config,
            pipeline_manager,
        })
    }

    /// Handles window resize events.
    ///
    /// # Arguments
    /// * `size` - The new window size in physical pixels
    pub fn resize_surface(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface_config.width = size.width;
        self.surface_config.height = size.height;

        self.surface
            .configure(self.pipeline_manager.device(), &self.surface_config);
        self.pipeline_manager.resize(&self.surface_config);
    }

    /// Presents everything the chunk renderer drew this frame.
    pub fn present(&mut self) -> Result<(), RenderError> {
        self.pipeline_manager
            .present_frame(&self.surface, &self.surface_config)
    }
}
