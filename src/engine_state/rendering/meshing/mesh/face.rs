use cgmath::{Point3, Vector3};

use crate::engine_state::{
    rendering::Vertex,
    voxels::{
        block::block_side::{BlockSide, AXIS_Y},
        chunk::CHUNK_EXTENT,
    },
};

/// Ambient occlusion written to every vertex until per-corner occlusion is computed.
pub const DEFAULT_AMBIENT_OCCLUSION: f32 = 1.0;

/// A merged rectangle of coplanar, same-textured voxel faces.
///
/// A face is defined by four corner points (lower-left, lower-right, upper-right,
/// upper-left) in chunk coordinates. "Right" runs along the first in-plane axis
/// of the face's side and "up" along the second, so `lr - ll` spans the merged
/// width and `ul - ll` the merged height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Face {
    /// Lower-left corner of the face in chunk coordinates
    pub ll: Point3<f32>,
    /// Lower-right corner of the face in chunk coordinates
    pub lr: Point3<f32>,
    /// Upper-right corner of the face in chunk coordinates
    pub ur: Point3<f32>,
    /// Upper-left corner of the face in chunk coordinates
    pub ul: Point3<f32>,
    /// Number of merged cells along the first in-plane axis
    pub width: u32,
    /// Number of merged cells along the second in-plane axis
    pub height: u32,
    /// Which side of the blocks this face represents
    pub block_side: BlockSide,
    /// Layer of the block texture array the face samples
    pub texture_layer: u32,
}

/// The two in-plane axes of a side, in (width, height) order.
pub fn plane_axes(side: BlockSide) -> (usize, usize) {
    let axis = side.axis();
    ((axis + 1) % 3, (axis + 2) % 3)
}

impl Face {
    /// Creates a face covering a rectangle of cells in one layer.
    ///
    /// # Arguments
    /// * `block_side` - Side of the blocks the face belongs to
    /// * `layer` - Index of the cell layer along the side's axis
    /// * `start` - First cell of the rectangle along the (width, height) axes
    /// * `width`, `height` - Size of the rectangle in cells
    /// * `texture_layer` - Texture array layer the face samples
    ///
    /// # Returns
    /// A face lying on the outer plane of the layer: `layer + 1` for sides facing
    /// the positive direction, `layer` otherwise.
    pub fn new(
        block_side: BlockSide,
        layer: usize,
        start: (usize, usize),
        width: usize,
        height: usize,
        texture_layer: u32,
    ) -> Self {
        let axis = block_side.axis();
        let (u, v) = plane_axes(block_side);

        let mut base = [0.0f32; 3];
        base[axis] = (layer + usize::from(block_side.is_positive())) as f32;
        base[u] = start.0 as f32;
        base[v] = start.1 as f32;

        let mut du = Vector3::new(0.0, 0.0, 0.0);
        du[u] = width as f32;
        let mut dv = Vector3::new(0.0, 0.0, 0.0);
        dv[v] = height as f32;

        let ll = Point3::from(base);
        Face {
            ll,
            lr: ll + du,
            ur: ll + du + dv,
            ul: ll + dv,
            width: width as u32,
            height: height as u32,
            block_side,
            texture_layer,
        }
    }

    /// Number of unit voxel faces this face covers.
    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// Whether every corner lies inside the chunk's bounds.
    pub fn is_within_chunk(&self) -> bool {
        [self.ll, self.lr, self.ur, self.ul].iter().all(|corner| {
            (0..3).all(|axis| corner[axis] >= 0.0 && corner[axis] <= CHUNK_EXTENT[axis] as f32)
        })
    }

    /// Generates the four vertices of the face, wound counter-clockwise when
    /// seen from outside the block.
    ///
    /// Texture coordinates run from 0 to the merged size so the texture repeats
    /// once per cell. On vertical sides the texture's V axis follows world Y.
    pub fn generate_vertices(&self) -> [Vertex; 4] {
        let normal = self.block_side.normal();
        let (u, _) = plane_axes(self.block_side);
        let (w, h) = (self.width as f32, self.height as f32);
        let uv = |a: f32, b: f32| if u == AXIS_Y { [b, a] } else { [a, b] };

        let corner = |position: Point3<f32>, tex_coords: [f32; 2]| {
            Vertex::new(
                position,
                tex_coords,
                normal,
                self.texture_layer,
                DEFAULT_AMBIENT_OCCLUSION,
            )
        };

        let ll = corner(self.ll, uv(0.0, 0.0));
        let lr = corner(self.lr, uv(w, 0.0));
        let ur = corner(self.ur, uv(w, h));
        let ul = corner(self.ul, uv(0.0, h));

        if self.block_side.is_positive() {
            [ll, lr, ur, ul]
        } else {
            [ll, ul, ur, lr]
        }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::InnerSpace;

    use super::*;

    #[test]
    fn test_positive_face_sits_on_far_plane() {
        let face = Face::new(BlockSide::TOP, 10, (2, 3), 4, 5, 0);

        assert!(face.ll.y == 11.0 && face.ur.y == 11.0);
        assert_eq!(face.ll, Point3::new(3.0, 11.0, 2.0));
        assert_eq!(face.ur, Point3::new(8.0, 11.0, 6.0));
        assert_eq!(face.area(), 20);
        assert!(face.is_within_chunk());
    }

    #[test]
    fn test_winding_faces_outward() {
        for side in BlockSide::all() {
            let vertices = Face::new(side, 1, (0, 0), 2, 3, 7).generate_vertices();
            let p = |i: usize| Vector3::from(vertices[i].position);
            let winding_normal = (p(1) - p(0)).cross(p(2) - p(0));

            assert!(winding_normal.dot(side.normal()) > 0.0, "{side:?} faces inward");
            assert!(vertices.iter().all(|v| v.texture_layer == 7));
            assert!(vertices.iter().all(|v| v.ambient_occlusion == DEFAULT_AMBIENT_OCCLUSION));
        }
    }

    #[test]
    fn test_uvs_scale_with_merged_size() {
        let vertices = Face::new(BlockSide::FRONT, 0, (0, 0), 6, 2, 0).generate_vertices();
        let max_u = vertices.iter().map(|v| v.tex_coords[0]).fold(0.0, f32::max);
        let max_v = vertices.iter().map(|v| v.tex_coords[1]).fold(0.0, f32::max);
        assert_eq!((max_u, max_v), (6.0, 2.0));
    }
}
