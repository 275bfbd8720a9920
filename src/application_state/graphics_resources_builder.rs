//! # Graphics Resources Builder
//!
//! This module handles the creation of the graphics resources required by the application.
//!
//! The main components are:
//! - `Graphics`: Holds all graphics-related resources
//! - `GraphicsBuilder`: Helper for graphics initialization
//! - `MaybeGraphics`: Represents the various states of graphics initialization

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use log::info;
use wgpu::{Adapter, Device, Features, Instance, Queue, Surface, SurfaceConfiguration};
use winit::{
    event_loop::{ActiveEventLoop, EventLoopProxy},
    window::Window,
};

use crate::engine_state::rendering::render_device::RenderError;

/// Location of the chunk shader, relative to the working directory.
pub const CHUNK_SHADER_PATH: &str = "assets/shaders/chunk.wgsl";

/// Outcome of graphics initialization, sent back to the event loop.
pub type GraphicsEvent = Result<Graphics, RenderError>;

/// Contains all graphics-related resources required by the application.
#[allow(dead_code)]
pub struct Graphics {
    /// The application window
    pub window: Arc<Window>,
    /// The wgpu instance the surface was created from
    pub instance: Instance,
    /// Surface presenting into the window
    pub surface: Surface<'static>,
    /// Current surface configuration
    pub surface_config: SurfaceConfiguration,
    /// The selected GPU adapter
    pub adapter: Adapter,
    /// Logical GPU device
    pub device: Device,
    /// Command queue of the device
    pub queue: Queue,
    /// WGSL source of the chunk shader
    pub shader_file_string: String,
}

/// Creates the window and initializes the WebGPU context.
///
/// The window and surface are created synchronously; adapter and device
/// requests happen in the returned future.
///
/// # Arguments
/// * `event_loop` - The active event loop used to create the window and surface
///
/// # Returns
/// A `Future` that resolves to the initialized `Graphics`, or the first failure
fn create_graphics(
    event_loop: &ActiveEventLoop,
) -> Result<impl Future<Output = GraphicsEvent> + 'static, RenderError> {
    let window_attrs = Window::default_attributes().with_title("Voxel Streaming");

    let window = Arc::new(
        event_loop
            .create_window(window_attrs)
            .map_err(|e| RenderError::Window(e.to_string()))?,
    );

    // Backends::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        flags: wgpu::InstanceFlags::empty(),
        backend_options: wgpu::BackendOptions::from_env_or_default(),
    });

    let surface = instance
        .create_surface(window.clone())
        .map_err(|e| RenderError::Surface(e.to_string()))?;

    Ok(async move {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Adapter(e.to_string()))?;
        info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RenderError::Device(e.to_string()))?;

        let size = window.inner_size();

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::Surface("surface reports no formats".into()))?;
        let present_mode = surface_caps
            .present_modes
            .first()
            .copied()
            .unwrap_or(wgpu::PresentMode::Fifo);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let shader_string =
            std::fs::read_to_string(Path::new(CHUNK_SHADER_PATH)).map_err(|source| {
                RenderError::Shader {
                    path: CHUNK_SHADER_PATH.to_string(),
                    source,
                }
            })?;

        surface.configure(&device, &surface_config);
        Ok(Graphics {
            window,
            instance,
            surface,
            surface_config,
            adapter,
            device,
            queue,
            shader_file_string: shader_string,
        })
    })
}

/// Helper struct for managing the initialization of graphics resources.
pub struct GraphicsBuilder {
    event_loop_proxy: Option<EventLoopProxy<GraphicsEvent>>,
}

/// Represents the possible states of the graphics initialization process.
pub enum MaybeGraphics {
    /// Initial state before any initialization has been attempted
    #[allow(dead_code)]
    Uninitialized,

    /// State during graphics initialization
    Builder(GraphicsBuilder),

    /// State after graphics resources have been moved to another owner
    Moved,
}

impl GraphicsBuilder {
    /// Creates a new GraphicsBuilder with the specified event loop proxy.
    ///
    /// # Arguments
    /// * `event_loop_proxy` - Used to send the initialized graphics resources back to the main thread
    pub fn new(event_loop_proxy: EventLoopProxy<GraphicsEvent>) -> Self {
        Self {
            event_loop_proxy: Some(event_loop_proxy),
        }
    }

    /// Creates the graphics resources and sends them back through the event loop proxy.
    ///
    /// Failures are sent as well, so the application can report them and exit.
    ///
    /// # Arguments
    /// * `event_loop` - The active event loop used to create the graphics context
    pub fn build_and_send(&mut self, event_loop: &ActiveEventLoop) {
        let Some(event_loop_proxy) = self.event_loop_proxy.take() else {
            // event_loop_proxy is already spent - we already constructed Graphics
            return;
        };

        let gfx = match create_graphics(event_loop) {
            Ok(gfx_fut) => pollster::block_on(gfx_fut),
            Err(e) => Err(e),
        };
        if event_loop_proxy.send_event(gfx).is_err() {
            log::error!("Event loop closed before graphics were ready");
        }
    }
}
