//! # Application State Management
//!
//! This module handles the application's state management, including:
//! - Window and graphics initialization
//! - Application lifecycle events
//! - The transition from initialization to the running engine

pub mod graphics_resources_builder;

use std::sync::Arc;

use graphics_resources_builder::{GraphicsEvent, MaybeGraphics};
use log::{error, info};

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::{config::StreamingConfig, engine_state::EngineState};

/// The main application state container that manages the application's lifecycle.
pub struct ApplicationState {
    /// The current graphics state
    pub graphics: MaybeGraphics,

    /// Configuration handed to the world once graphics are ready
    pub config: Option<StreamingConfig>,

    /// The initialized application state, if the application has started
    pub state: Option<InitializedApplicationState>,
}

/// Represents the fully initialized and running state of the application.
pub struct InitializedApplicationState {
    /// The engine state and per-frame logic
    pub engine_state: EngineState,

    /// Handle to the application window
    pub window: Arc<Window>,

    /// Timestamp of the last frame for delta time calculations
    pub last_frame_time: web_time::Instant,
}

impl ApplicationState {
    /// Creates the application state around a graphics builder.
    pub fn new(graphics: MaybeGraphics, config: StreamingConfig) -> Self {
        Self {
            graphics,
            config: Some(config),
            state: None,
        }
    }

    /// Shuts the world down and stops the event loop.
    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(state) = &mut self.state {
            state.engine_state.shutdown();
        }
        self.state = None;
        event_loop.exit();
    }
}

impl ApplicationHandler<GraphicsEvent> for ApplicationState {
    /// Handles window-related events such as resize, redraw and exit requests.
    ///
    /// # Arguments
    /// * `event_loop` - Reference to the active event loop
    /// * `_window_id` - ID of the window that generated the event
    /// * `event` - The window event to process
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => self.exit(event_loop),
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.engine_state.resize_surface(size);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                let now = web_time::Instant::now();
                let dt = now - state.last_frame_time;
                state.last_frame_time = now;

                if let Err(e) = state.engine_state.render(dt) {
                    error!("Rendering failed: {}", e);
                    self.exit(event_loop);
                }
            }
            _ => (),
        }
    }

    /// Called when the application is resumed after being suspended.
    ///
    /// Triggers graphics initialization if it has not happened yet.
    ///
    /// # Arguments
    /// * `event_loop` - Reference to the active event loop
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let MaybeGraphics::Builder(builder) = &mut self.graphics {
            builder.build_and_send(event_loop);
        }
    }

    /// Receives the graphics initialization result and starts the engine.
    ///
    /// # Arguments
    /// * `event_loop` - Reference to the active event loop
    /// * `graphics` - The initialized graphics resources, or the failure
    fn user_event(&mut self, event_loop: &ActiveEventLoop, graphics: GraphicsEvent) {
        self.graphics = MaybeGraphics::Moved;

        let gfx = match graphics {
            Ok(gfx) => gfx,
            Err(e) => {
                error!("Graphics initialization failed: {}", e);
                event_loop.exit();
                return;
            }
        };
        let config = self.config.take().unwrap_or_default();

        match EngineState::new(
            gfx.surface,
            gfx.surface_config,
            gfx.device,
            gfx.queue,
            &gfx.shader_file_string,
            config,
        ) {
            Ok(engine_state) => {
                info!("Engine initialized");
                self.state = Some(InitializedApplicationState {
                    engine_state,
                    window: gfx.window,
                    last_frame_time: web_time::Instant::now(),
                });
            }
            Err(e) => {
                error!("Engine initialization failed: {}", e);
                event_loop.exit();
            }
        }
    }

    /// Called before the event loop goes to sleep; requests the next frame.
    ///
    /// # Arguments
    /// * `_event_loop` - Reference to the active event loop
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}
