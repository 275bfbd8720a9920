//! # Block Side Module
//!
//! This module defines the six faces of a voxel block. Each face carries its axis,
//! its direction along that axis, its outward normal and the offset to the voxel
//! it faces, so the mesher and the chunk neighbourhood code switch over a closed
//! set of variants instead of recomputing geometry.

use cgmath::Vector3;

/// Represents the six possible faces of a voxel block.
///
/// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BlockSide {
    /// The front face (facing positive Z)
    FRONT = 0,

    /// The back face (facing negative Z)
    BACK = 1,

    /// The bottom face (facing negative Y)
    BOTTOM = 2,

    /// The top face (facing positive Y)
    TOP = 3,

    /// The left face (facing negative X)
    LEFT = 4,

    /// The right face (facing positive X)
    RIGHT = 5,
}

/// Index of the X axis in `[x, y, z]` arrays.
pub const AXIS_X: usize = 0;
/// Index of the Y axis in `[x, y, z]` arrays.
pub const AXIS_Y: usize = 1;
/// Index of the Z axis in `[x, y, z]` arrays.
pub const AXIS_Z: usize = 2;

impl BlockSide {
    /// Returns an array containing all six block faces in a consistent order.
    ///
    /// The order is: [FRONT, BACK, BOTTOM, TOP, LEFT, RIGHT]
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::FRONT,
            BlockSide::BACK,
            BlockSide::BOTTOM,
            BlockSide::TOP,
            BlockSide::LEFT,
            BlockSide::RIGHT,
        ]
    }

    /// The four faces that point at horizontally adjacent chunks.
    ///
    /// The order matches [`BlockSide::lateral_index`].
    pub fn lateral() -> [BlockSide; 4] {
        [
            BlockSide::RIGHT,
            BlockSide::LEFT,
            BlockSide::FRONT,
            BlockSide::BACK,
        ]
    }

    /// Position of this face in [`BlockSide::lateral`], or `None` for TOP and BOTTOM.
    pub fn lateral_index(self) -> Option<usize> {
        match self {
            BlockSide::RIGHT => Some(0),
            BlockSide::LEFT => Some(1),
            BlockSide::FRONT => Some(2),
            BlockSide::BACK => Some(3),
            BlockSide::TOP | BlockSide::BOTTOM => None,
        }
    }

    /// The axis this face is perpendicular to (`AXIS_X`, `AXIS_Y` or `AXIS_Z`).
    pub fn axis(self) -> usize {
        match self {
            BlockSide::LEFT | BlockSide::RIGHT => AXIS_X,
            BlockSide::BOTTOM | BlockSide::TOP => AXIS_Y,
            BlockSide::BACK | BlockSide::FRONT => AXIS_Z,
        }
    }

    /// Whether the face points along the positive direction of its axis.
    pub fn is_positive(self) -> bool {
        matches!(self, BlockSide::RIGHT | BlockSide::TOP | BlockSide::FRONT)
    }

    /// The face on the other side of the same axis.
    pub fn opposite(self) -> BlockSide {
        match self {
            BlockSide::FRONT => BlockSide::BACK,
            BlockSide::BACK => BlockSide::FRONT,
            BlockSide::BOTTOM => BlockSide::TOP,
            BlockSide::TOP => BlockSide::BOTTOM,
            BlockSide::LEFT => BlockSide::RIGHT,
            BlockSide::RIGHT => BlockSide::LEFT,
        }
    }

    /// Offset from a voxel to the voxel this face looks at.
    pub fn offset(self) -> [i32; 3] {
        let mut offset = [0; 3];
        offset[self.axis()] = if self.is_positive() { 1 } else { -1 };
        offset
    }

    /// The outward unit normal of this face.
    pub fn normal(self) -> Vector3<f32> {
        let [x, y, z] = self.offset();
        Vector3::new(x as f32, y as f32, z as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normals_are_unit_and_opposed() {
        for side in BlockSide::all() {
            let normal = side.normal();
            assert_eq!(normal.x.abs() + normal.y.abs() + normal.z.abs(), 1.0);
            assert_eq!(side.opposite().normal(), -normal);
            assert_eq!(side.opposite().axis(), side.axis());
        }
    }

    #[test]
    fn test_lateral_indices_match_order() {
        for (index, side) in BlockSide::lateral().into_iter().enumerate() {
            assert_eq!(side.lateral_index(), Some(index));
        }
        assert_eq!(BlockSide::TOP.lateral_index(), None);
    }
}
