//! # Camera State Management
//!
//! This module handles all camera-related functionality including:
//! - Camera position and orientation tracking
//! - View and projection matrix calculations
//! - Frustum extraction for chunk culling
//! - The automatic fly-through that drives the streaming demo
//!
//! ## Core Components
//! - `Camera`: Represents the camera's position and orientation in 3D space
//! - `Projection`: Manages the camera's projection matrix
//! - `Frustum`: Clipping planes of a view-projection matrix
//! - `CameraState`: Owns the camera and advances it every frame

use cgmath::{Deg, InnerSpace, Point3, Rad, Vector3};
use web_time::Duration;

pub mod camera;
pub mod frustum;

use camera::{Camera, CameraView, Projection};

/// Default flight speed in blocks per second.
pub const FLY_SPEED: f32 = 24.0;
/// Default turn rate in degrees per second.
pub const TURN_RATE: f32 = 4.0;
/// Altitude the fly-through keeps above the world floor.
pub const FLY_ALTITUDE: f32 = 100.0;

/// Manages the camera and the fly-through motion that drives chunk streaming.
///
/// The camera moves forward at a constant speed along its heading while the
/// heading slowly turns, so the view keeps crossing chunk borders in every
/// direction.
#[derive(Debug)]
pub struct CameraState {
    /// The current camera position and orientation
    pub camera: Camera,
    /// The current projection
    pub projection: Projection,
    /// Forward speed in blocks per second
    pub speed: f32,
    /// Heading change per second
    pub turn_rate: Rad<f32>,
}

impl CameraState {
    /// Creates a camera above the origin looking slightly down along +X.
    ///
    /// # Arguments
    /// * `width`, `height` - Initial viewport size in pixels
    pub fn new(width: u32, height: u32) -> Self {
        let camera = Camera::new(Point3::new(8.0, FLY_ALTITUDE, 8.0), Deg(0.0), Deg(-20.0));
        let projection = Projection::new(width, height, Deg(70.0), 0.1, 1000.0);
        Self {
            camera,
            projection,
            speed: FLY_SPEED,
            turn_rate: Deg(TURN_RATE).into(),
        }
    }

    /// Updates the projection for a new viewport size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.resize(width, height);
    }

    /// Advances the fly-through by `dt` and returns the view for this frame.
    pub fn update(&mut self, dt: Duration) -> CameraView {
        let dt = dt.as_secs_f32();
        self.camera.rotate(self.turn_rate * dt, Rad(0.0));

        let (yaw_sin, yaw_cos) = self.camera.yaw.0.sin_cos();
        let heading = Vector3::new(yaw_cos, 0.0, yaw_sin).normalize();
        self.camera.position += heading * self.speed * dt;

        self.view()
    }

    /// The view of the camera without advancing it.
    pub fn view(&self) -> CameraView {
        self.camera.view(&self.projection)
    }
}
