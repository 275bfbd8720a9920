//! # Engine State Module
//!
//! The module that owns everything the running application needs per frame.
//!
//! ## Key Components
//!
//! * `EngineState` - Ties the world, the renderer and the camera together
//! * `buffer_state` - Registry of GPU buffers
//! * `camera_state` - Camera, projection and the fly-through that moves them
//! * `rendering` - Greedy mesher, chunk renderer and the wgpu pipeline
//! * `task_management` - Worker pools
//! * `voxels` - Voxel grids, terrain, the chunk loader and the world
//!
//! ## Frame
//!
//! Each redraw advances the camera, runs [`World::frame`](voxels::world::World::frame)
//! against the pipeline manager and presents the recorded pass.

use std::sync::Arc;

use log::info;
use rendering::{atlas::BlockAtlas, render_device::RenderError, MeshRendererManager};
use voxels::{
    chunk_loader::LoaderError,
    terrain::PerlinTerrainGenerator,
    world::World,
};
use web_time::{Duration, Instant};
use wgpu::{Device, Queue, Surface, SurfaceConfiguration};

use camera_state::CameraState;
use thiserror::Error;

use crate::config::StreamingConfig;

pub mod buffer_state;
pub mod camera_state;
pub mod rendering;
pub mod task_management;
pub mod voxels;

/// How often frame statistics are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(2);

/// Errors raised while creating the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graphics pipeline could not be built.
    #[error(transparent)]
    Render(#[from] RenderError),
    /// The chunk loader could not be started.
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

/// The main state container of the running application.
pub struct EngineState {
    /// Camera and fly-through
    pub camera_state: CameraState,
    /// Surface and pipeline manager
    pub render_manager: MeshRendererManager,
    /// The streamed voxel world
    pub world: World,
    frames: u64,
    last_stats: Instant,
}

impl EngineState {
    /// Creates the engine and starts streaming around the initial camera position.
    ///
    /// # Arguments
    /// * `surface` - The rendering surface
    /// * `surface_config` - Configuration for the rendering surface
    /// * `device` - The GPU device
    /// * `queue` - The GPU command queue
    /// * `shader_string` - WGSL source of the chunk shader
    /// * `config` - Streaming configuration
    ///
    /// # Returns
    /// A fully initialized `EngineState` instance
    pub fn new(
        surface: Surface<'static>,
        surface_config: SurfaceConfiguration,
        device: Device,
        queue: Queue,
        shader_string: &str,
        config: StreamingConfig,
    ) -> Result<Self, EngineError> {
        let camera_state = CameraState::new(surface_config.width, surface_config.height);

        let render_manager = MeshRendererManager::new(
            surface,
            surface_config,
            device,
            queue,
            shader_string,
            config.world_seed as u64,
        )?;

        let generator = Arc::new(PerlinTerrainGenerator::new(config.world_seed));
        let world = World::new(config, generator, Arc::new(BlockAtlas))?;

        Ok(Self {
            camera_state,
            render_manager,
            world,
            frames: 0,
            last_stats: Instant::now(),
        })
    }

    /// Resizes the rendering surface when the window size changes
    ///
    /// # Arguments
    /// * `size` - The new physical size of the window
    pub fn resize_surface(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        self.camera_state.resize(size.width, size.height);
        self.render_manager.resize_surface(size);
    }

    /// Advances the camera by `dt`, streams and draws one frame.
    pub fn render(&mut self, dt: Duration) -> Result<(), RenderError> {
        let view = self.camera_state.update(dt);

        let pipeline_manager = &mut self.render_manager.pipeline_manager;
        pipeline_manager.set_eye(view.position);
        let render_stats = self.world.frame(&view, pipeline_manager)?;
        self.render_manager.present()?;

        self.frames += 1;
        if self.last_stats.elapsed() >= STATS_INTERVAL {
            let loader_stats = self.world.loader().stats();
            let buffer_state = &self.render_manager.pipeline_manager.buffer_state;
            info!(
                "{} frames | chunks: {} registered, {} frustum culled, {} occluded, {} drawn | \
                 loader: {} resident, {} generating, {} meshing, {} pending | \
                 meshes: {} ({} / {} bytes)",
                self.frames,
                render_stats.registered,
                render_stats.frustum_culled,
                render_stats.occlusion_culled,
                render_stats.drawn,
                loader_stats.resident,
                loader_stats.generating,
                loader_stats.meshing,
                loader_stats.pending_uploads,
                buffer_state.mesh_count(),
                buffer_state.get_total_used_memory(),
                buffer_state.get_total_allocated_memory(),
            );
            self.frames = 0;
            self.last_stats = Instant::now();
        }
        Ok(())
    }

    /// Stops the workers and releases every GPU mesh.
    pub fn shutdown(&mut self) {
        self.world
            .shutdown(&mut self.render_manager.pipeline_manager);
    }
}
