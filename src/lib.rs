#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Streaming
//!
//! Streams an unbounded voxel terrain around a moving viewpoint and draws it
//! with wgpu.
//!
//! ## Key Modules
//!
//! * `config` - Streaming configuration loaded from JSON
//! * `core` - Shared-resource primitives used across threads
//! * `engine_state` - Chunk loader, greedy mesher, chunk renderer and the world
//!   composing them, plus the wgpu pipeline they draw through
//!
//! ## Pipeline
//!
//! * Generation workers fill voxel grids for chunks entering the render distance
//! * Meshing workers turn grids into merged quads
//! * The render thread uploads a bounded number of meshes per frame, culls and draws
//!
//! ## Usage
//!
//! ```ignore
//! fn main() {
//!     voxel_streaming::run();
//! }
//! ```

use application_state::{
    graphics_resources_builder::{GraphicsBuilder, GraphicsEvent, MaybeGraphics},
    ApplicationState,
};
use config::{StreamingConfig, DEFAULT_CONFIG_PATH};
use log::{error, info};
use winit::event_loop::EventLoop;

mod application_state;
pub mod config;
pub mod core;
pub mod engine_state;

/// Opens a window and streams the world around a fly-through camera until it is closed.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config = match StreamingConfig::load_or_default(DEFAULT_CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    let event_loop = match EventLoop::<GraphicsEvent>::with_user_event().build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("Failed to create event loop: {}", e);
            return;
        }
    };

    let mut state = ApplicationState::new(
        MaybeGraphics::Builder(GraphicsBuilder::new(event_loop.create_proxy())),
        config,
    );

    if let Err(e) = event_loop.run_app(&mut state) {
        error!("Event loop terminated: {}", e);
    }
}
