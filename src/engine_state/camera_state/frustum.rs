//! View frustum extraction and bounding box tests.

use cgmath::{InnerSpace, Matrix, Matrix4, Point3, Vector4};

/// The six clipping planes of a view-projection matrix.
///
/// Each plane is stored as `(a, b, c, d)` with a unit normal `(a, b, c)` pointing
/// into the frustum, so `a·x + b·y + c·z + d >= 0` holds for points inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f32>; 6],
}

impl Frustum {
    /// Extracts the planes of a combined view-projection matrix.
    ///
    /// The matrix must map depth into `[0, 1]`, as wgpu clip space does.
    pub fn from_view_projection(view_projection: Matrix4<f32>) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        let mut planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r2,      // near
            r3 - r2, // far
        ];

        for plane in &mut planes {
            let length = plane.truncate().magnitude();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    /// Whether an axis-aligned box is at least partly inside the frustum.
    ///
    /// Conservative: boxes near a frustum corner may pass even when outside.
    pub fn intersects_aabb(&self, min: Point3<f32>, max: Point3<f32>) -> bool {
        self.planes.iter().all(|plane| {
            // Corner furthest along the plane normal.
            let x = if plane.x >= 0.0 { max.x } else { min.x };
            let y = if plane.y >= 0.0 { max.y } else { min.y };
            let z = if plane.z >= 0.0 { max.z } else { min.z };
            plane.x * x + plane.y * y + plane.z * z + plane.w >= 0.0
        })
    }

    /// Whether a point lies inside the frustum.
    pub fn contains_point(&self, point: Point3<f32>) -> bool {
        self.intersects_aabb(point, point)
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, SquareMatrix};

    use super::*;
    use crate::engine_state::camera_state::camera::{Camera, Projection};

    fn looking_down_positive_x() -> Frustum {
        let camera = Camera::new(Point3::new(0.0, 0.0, 0.0), Deg(0.0), Deg(0.0));
        let projection = Projection::new(800, 600, Deg(70.0), 0.1, 500.0);
        Frustum::from_view_projection(projection.calc_matrix() * camera.calc_matrix())
    }

    #[test]
    fn test_point_in_front_is_inside() {
        let frustum = looking_down_positive_x();
        assert!(frustum.contains_point(Point3::new(10.0, 0.0, 0.0)));
        assert!(!frustum.contains_point(Point3::new(-10.0, 0.0, 0.0)));
        assert!(!frustum.contains_point(Point3::new(600.0, 0.0, 0.0)));
    }

    #[test]
    fn test_box_straddling_a_plane_intersects() {
        let frustum = looking_down_positive_x();
        assert!(frustum.intersects_aabb(Point3::new(-5.0, -5.0, -5.0), Point3::new(5.0, 5.0, 5.0)));
        assert!(!frustum.intersects_aabb(
            Point3::new(-40.0, -5.0, -5.0),
            Point3::new(-20.0, 5.0, 5.0)
        ));
    }

    #[test]
    fn test_identity_is_the_clip_cube() {
        let frustum = Frustum::from_view_projection(Matrix4::identity());
        assert!(frustum.contains_point(Point3::new(0.0, 0.0, 0.5)));
        assert!(!frustum.contains_point(Point3::new(0.0, 0.0, -0.5)));
        assert!(!frustum.contains_point(Point3::new(2.0, 0.0, 0.5)));
    }
}
