//! Greedy meshing implementation for voxel rendering.
//!
//! This module implements the greedy meshing algorithm which combines adjacent coplanar
//! faces with the same block type into larger quads, significantly reducing the number
//! of vertices needed to render a chunk.
//!
//! For each of the six block sides the chunk is swept layer by layer along the side's
//! axis. Every layer produces a visibility mask over the two in-plane axes, and the
//! mask is consumed by growing maximal rectangles: first along the width axis, then
//! row by row along the height axis.

use std::sync::Arc;

use bitvec::prelude::*;
use log::debug;
use thiserror::Error;
use web_time::Instant;

use crate::engine_state::{
    rendering::atlas::TextureAtlas,
    voxels::{
        block::{block_side::BlockSide, block_type::BlockType, Block, BlockTypeSize},
        chunk::{ChunkPosition, VoxelGrid, CHUNK_DEPTH, CHUNK_EXTENT, CHUNK_HEIGHT, CHUNK_WIDTH},
    },
};

use super::{
    face::{plane_axes, Face},
    mesh::MeshBuffer,
};

/// Errors that abort a mesh build. A failed build never produces partial geometry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshingError {
    /// A cell holds an identifier that no block type uses.
    #[error("unknown block id {id} in chunk {chunk}")]
    UnknownBlockType {
        /// The stored identifier
        id: BlockTypeSize,
        /// Chunk being meshed
        chunk: ChunkPosition,
    },
    /// The atlas has no layer for a face's texture.
    #[error("no texture layer for the {side:?} face of {block_type:?}")]
    UnresolvedTexture {
        /// Block whose face could not be textured
        block_type: BlockType,
        /// The face in question
        side: BlockSide,
    },
}

/// Snapshots of the four horizontally adjacent chunks.
///
/// A missing neighbour is meshed against as if it were all air.
#[derive(Debug, Clone, Default)]
pub struct ChunkNeighbors {
    grids: [Option<Arc<VoxelGrid>>; 4],
}

impl ChunkNeighbors {
    /// No neighbours at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the neighbour on a lateral side. TOP and BOTTOM are ignored.
    pub fn set(&mut self, side: BlockSide, grid: Arc<VoxelGrid>) {
        if let Some(index) = side.lateral_index() {
            self.grids[index] = Some(grid);
        }
    }

    /// The neighbour on a lateral side, if present.
    pub fn get(&self, side: BlockSide) -> Option<&VoxelGrid> {
        side.lateral_index()
            .and_then(|index| self.grids[index].as_deref())
    }

    /// Bit `i` is set when the neighbour at lateral index `i` is present.
    pub fn present_mask(&self) -> u8 {
        self.grids
            .iter()
            .enumerate()
            .filter(|(_, grid)| grid.is_some())
            .fold(0, |mask, (index, _)| mask | (1 << index))
    }
}

/// Whether the face of `near` looking at `far` must be drawn.
///
/// Air never has faces. Any face against air is visible; a face against a
/// transparent block is visible only when the near block is opaque.
#[inline]
pub fn is_face_visible(near: Block, far: Block) -> bool {
    !near.is_air() && (far.is_air() || (far.is_transparent() && near.is_opaque()))
}

/// Reads a block at chunk-local coordinates that may step one cell outside the
/// chunk horizontally, or any distance vertically.
///
/// Cells above or below the world, and cells in absent neighbours, are air.
pub fn sample_block(grid: &VoxelGrid, neighbors: &ChunkNeighbors, x: i32, y: i32, z: i32) -> Block {
    if !(0..CHUNK_HEIGHT as i32).contains(&y) {
        return Block::AIR;
    }
    let side = if x < 0 {
        Some(BlockSide::LEFT)
    } else if x >= CHUNK_WIDTH as i32 {
        Some(BlockSide::RIGHT)
    } else if z < 0 {
        Some(BlockSide::BACK)
    } else if z >= CHUNK_DEPTH as i32 {
        Some(BlockSide::FRONT)
    } else {
        None
    };

    match side {
        None => grid.get(x as usize, y as usize, z as usize),
        Some(side) => neighbors
            .get(side)
            .and_then(|neighbor| {
                neighbor.get_checked(
                    x.rem_euclid(CHUNK_WIDTH as i32),
                    y,
                    z.rem_euclid(CHUNK_DEPTH as i32),
                )
            })
            .unwrap_or(Block::AIR),
    }
}

/// Converts voxel grids into merged quad meshes.
///
/// The mesher holds no per-build state and is shared by every meshing worker.
pub struct GreedyMesher {
    atlas: Arc<dyn TextureAtlas>,
}

impl GreedyMesher {
    /// Creates a mesher resolving face textures through `atlas`.
    pub fn new(atlas: Arc<dyn TextureAtlas>) -> Self {
        Self { atlas }
    }

    /// Builds the mesh of `grid`, culling faces against `neighbors` at the chunk borders.
    ///
    /// # Arguments
    /// * `grid` - The chunk's voxels
    /// * `neighbors` - Snapshots of the lateral neighbours available right now
    ///
    /// # Returns
    /// A mesh with one quad per maximal same-type rectangle of visible faces.
    ///
    /// # Errors
    /// [`MeshingError`] if a visible block has an unknown id or an untextured face.
    pub fn mesh(&self, grid: &VoxelGrid, neighbors: &ChunkNeighbors) -> Result<MeshBuffer, MeshingError> {
        let start = Instant::now();
        let mut mesh = MeshBuffer::new();

        for side in BlockSide::all() {
            self.mesh_side(grid, neighbors, side, &mut mesh)?;
        }

        debug!(
            "Meshed chunk {} into {} quads in {:?}",
            grid.position(),
            mesh.quad_count(),
            start.elapsed()
        );
        Ok(mesh)
    }

    fn mesh_side(
        &self,
        grid: &VoxelGrid,
        neighbors: &ChunkNeighbors,
        side: BlockSide,
        mesh: &mut MeshBuffer,
    ) -> Result<(), MeshingError> {
        let axis = side.axis();
        let (u, v) = plane_axes(side);
        let (width_extent, height_extent) = (CHUNK_EXTENT[u], CHUNK_EXTENT[v]);
        let offset = side.offset();

        let mut visible = bitvec![usize, Lsb0; 0; width_extent * height_extent];
        let mut types: Vec<BlockTypeSize> = vec![0; width_extent * height_extent];
        let mut texture_layers: [Option<u32>; 256] = [None; 256];

        for layer in 0..CHUNK_EXTENT[axis] {
            // Build the visibility mask for this layer.
            let mut any_visible = false;
            for j in 0..height_extent {
                for i in 0..width_extent {
                    let mut cell = [0usize; 3];
                    cell[axis] = layer;
                    cell[u] = i;
                    cell[v] = j;

                    let n = i + j * width_extent;
                    let near = grid.get(cell[0], cell[1], cell[2]);
                    if near.is_air() {
                        visible.set(n, false);
                        continue;
                    }
                    let far = sample_block(
                        grid,
                        neighbors,
                        cell[0] as i32 + offset[0],
                        cell[1] as i32 + offset[1],
                        cell[2] as i32 + offset[2],
                    );
                    let is_visible = is_face_visible(near, far);
                    visible.set(n, is_visible);
                    types[n] = near.block_type;
                    any_visible |= is_visible;
                }
            }
            if !any_visible {
                continue;
            }

            // Consume the mask with maximal rectangles.
            for j in 0..height_extent {
                let mut i = 0;
                while i < width_extent {
                    let n = i + j * width_extent;
                    if !visible[n] {
                        i += 1;
                        continue;
                    }
                    let block_type = types[n];

                    let mut width = 1;
                    while i + width < width_extent
                        && visible[n + width]
                        && types[n + width] == block_type
                    {
                        width += 1;
                    }

                    let mut height = 1;
                    'grow: while j + height < height_extent {
                        let row = n + height * width_extent;
                        for k in 0..width {
                            if !visible[row + k] || types[row + k] != block_type {
                                break 'grow;
                            }
                        }
                        height += 1;
                    }

                    for h in 0..height {
                        let row = n + h * width_extent;
                        visible[row..row + width].fill(false);
                    }

                    let texture_layer = match texture_layers[block_type as usize] {
                        Some(texture_layer) => texture_layer,
                        None => {
                            let texture_layer =
                                self.resolve_texture_layer(grid.position(), block_type, side)?;
                            texture_layers[block_type as usize] = Some(texture_layer);
                            texture_layer
                        }
                    };

                    let face = Face::new(side, layer, (i, j), width, height, texture_layer);
                    mesh.add_quad(face.generate_vertices());

                    i += width;
                }
            }
        }

        Ok(())
    }

    fn resolve_texture_layer(
        &self,
        chunk: ChunkPosition,
        id: BlockTypeSize,
        side: BlockSide,
    ) -> Result<u32, MeshingError> {
        let block_type =
            BlockType::from_id(id).ok_or(MeshingError::UnknownBlockType { id, chunk })?;
        block_type
            .texture_name(side)
            .and_then(|name| self.atlas.resolve_texture_layer(name))
            .ok_or(MeshingError::UnresolvedTexture { block_type, side })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;
    use crate::engine_state::{
        rendering::atlas::BlockAtlas,
        voxels::chunk::CHUNK_PLANE_SIZE,
    };

    /// A unit voxel face: the cell it belongs to and the side it faces.
    type UnitFace = ([usize; 3], usize);

    fn mesher() -> GreedyMesher {
        GreedyMesher::new(Arc::new(BlockAtlas))
    }

    fn side_from_normal(normal: [f32; 3]) -> BlockSide {
        BlockSide::all()
            .into_iter()
            .find(|side| {
                let side_normal: [f32; 3] = side.normal().into();
                side_normal == normal
            })
            .unwrap()
    }

    /// Expands every quad of a mesh back into the unit faces it covers.
    fn covered_faces(mesh: &MeshBuffer) -> Vec<UnitFace> {
        let mut faces = Vec::new();
        for quad in mesh.vertices().chunks(4) {
            let side = side_from_normal(quad[0].normal);
            let axis = side.axis();
            let mut min = [f32::MAX; 3];
            let mut max = [f32::MIN; 3];
            for vertex in quad {
                for a in 0..3 {
                    min[a] = min[a].min(vertex.position[a]);
                    max[a] = max[a].max(vertex.position[a]);
                }
            }
            let layer = if side.is_positive() {
                min[axis] as usize - 1
            } else {
                min[axis] as usize
            };
            let (u, v) = plane_axes(side);
            for i in min[u] as usize..max[u] as usize {
                for j in min[v] as usize..max[v] as usize {
                    let mut cell = [0; 3];
                    cell[axis] = layer;
                    cell[u] = i;
                    cell[v] = j;
                    faces.push((cell, side as usize));
                }
            }
        }
        faces
    }

    /// One face per exposed voxel side, without merging.
    fn naive_faces(grid: &VoxelGrid, neighbors: &ChunkNeighbors) -> Vec<UnitFace> {
        let mut faces = Vec::new();
        for y in 0..CHUNK_HEIGHT {
            for z in 0..CHUNK_DEPTH {
                for x in 0..CHUNK_WIDTH {
                    let near = grid.get(x, y, z);
                    for side in BlockSide::all() {
                        let [dx, dy, dz] = side.offset();
                        let far = sample_block(
                            grid,
                            neighbors,
                            x as i32 + dx,
                            y as i32 + dy,
                            z as i32 + dz,
                        );
                        if is_face_visible(near, far) {
                            faces.push(([x, y, z], side as usize));
                        }
                    }
                }
            }
        }
        faces
    }

    fn grid_from_cells(cells: &[u8]) -> VoxelGrid {
        const PALETTE: [BlockType; 4] = [
            BlockType::AIR,
            BlockType::DIRT,
            BlockType::STONE,
            BlockType::GLASS,
        ];
        let mut grid = VoxelGrid::new(ChunkPosition::new(0, 0));
        for (index, cell) in cells.iter().enumerate() {
            let x = index % CHUNK_WIDTH;
            let z = (index / CHUNK_WIDTH) % CHUNK_DEPTH;
            let y = index / CHUNK_PLANE_SIZE;
            grid.fill_cell(x, y, z, Block::new(PALETTE[*cell as usize % PALETTE.len()]));
        }
        grid
    }

    fn cells_strategy() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(0u8..4, CHUNK_PLANE_SIZE * 8)
    }

    #[test]
    fn test_solid_chunk_is_six_quads() {
        let grid = VoxelGrid::solid(ChunkPosition::new(0, 0), BlockType::STONE);
        let mesh = mesher().mesh(&grid, &ChunkNeighbors::none()).unwrap();

        assert_eq!(mesh.quad_count(), 6);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.index_count(), 36);
    }

    #[test]
    fn test_removing_interior_block_exposes_six_faces() {
        let mut grid = VoxelGrid::solid(ChunkPosition::new(0, 0), BlockType::STONE);
        grid.set(8, 128, 8, Block::AIR).unwrap();

        let mesh = mesher().mesh(&grid, &ChunkNeighbors::none()).unwrap();

        assert_eq!(mesh.quad_count(), 12);
    }

    #[test]
    fn test_empty_chunk_has_no_geometry() {
        let grid = VoxelGrid::new(ChunkPosition::new(0, 0));
        let mesh = mesher().mesh(&grid, &ChunkNeighbors::none()).unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_solid_neighbor_hides_border_face() {
        let grid = VoxelGrid::solid(ChunkPosition::new(0, 0), BlockType::DIRT);
        let mut neighbors = ChunkNeighbors::none();
        neighbors.set(
            BlockSide::RIGHT,
            Arc::new(VoxelGrid::solid(ChunkPosition::new(1, 0), BlockType::STONE)),
        );

        let mesh = mesher().mesh(&grid, &neighbors).unwrap();

        assert_eq!(mesh.quad_count(), 5);
        assert_eq!(neighbors.present_mask(), 0b0001);
        assert!(mesh
            .vertices()
            .iter()
            .all(|vertex| vertex.normal != [1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_transparent_neighbor_rules() {
        let mut grid = VoxelGrid::new(ChunkPosition::new(0, 0));
        grid.fill_cell(4, 10, 4, Block::new(BlockType::STONE));
        grid.fill_cell(5, 10, 4, Block::new(BlockType::GLASS));
        grid.fill_cell(6, 10, 4, Block::new(BlockType::WATER));

        let faces = naive_faces(&grid, &ChunkNeighbors::none());
        let has = |cell: [usize; 3], side: BlockSide| faces.contains(&(cell, side as usize));

        // Stone shows its face against glass, glass never shows one against stone.
        assert!(has([4, 10, 4], BlockSide::RIGHT));
        assert!(!has([5, 10, 4], BlockSide::LEFT));
        // Two transparent blocks hide each other.
        assert!(!has([5, 10, 4], BlockSide::RIGHT));
        assert!(!has([6, 10, 4], BlockSide::LEFT));
    }

    #[test]
    fn test_checkerboard_cannot_merge() {
        let grid = VoxelGrid::checkerboard(ChunkPosition::new(0, 0), BlockType::DIRT, 4);
        let neighbors = ChunkNeighbors::none();

        let mesh = mesher().mesh(&grid, &neighbors).unwrap();

        assert_eq!(mesh.quad_count(), naive_faces(&grid, &neighbors).len());
    }

    #[test]
    fn test_unresolved_texture_fails_the_build() {
        struct EmptyAtlas;
        impl TextureAtlas for EmptyAtlas {
            fn resolve_texture_layer(&self, _texture_name: &str) -> Option<u32> {
                None
            }
            fn layer_count(&self) -> u32 {
                0
            }
        }

        let grid = VoxelGrid::solid(ChunkPosition::new(0, 0), BlockType::SAND);
        let result = GreedyMesher::new(Arc::new(EmptyAtlas)).mesh(&grid, &ChunkNeighbors::none());

        assert!(matches!(
            result,
            Err(MeshingError::UnresolvedTexture { block_type: BlockType::SAND, .. })
        ));
    }

    #[test]
    fn test_unknown_block_id_fails_the_build() {
        let mut grid = VoxelGrid::new(ChunkPosition::new(2, 2));
        grid.fill_cell(0, 0, 0, Block { block_type: 200, metadata: 0 });

        let result = mesher().mesh(&grid, &ChunkNeighbors::none());

        assert_eq!(
            result.err(),
            Some(MeshingError::UnknownBlockType { id: 200, chunk: ChunkPosition::new(2, 2) })
        );
    }

    #[test]
    fn test_grass_faces_use_their_own_layers() {
        let mut grid = VoxelGrid::new(ChunkPosition::new(0, 0));
        grid.fill_cell(0, 0, 0, Block::new(BlockType::GRASS));
        let mesh = mesher().mesh(&grid, &ChunkNeighbors::none()).unwrap();

        let layer_of = |normal: [f32; 3]| {
            mesh.vertices()
                .iter()
                .find(|vertex| vertex.normal == normal)
                .map(|vertex| vertex.texture_layer)
        };
        let atlas = BlockAtlas;
        assert_eq!(layer_of([0.0, 1.0, 0.0]), atlas.resolve_texture_layer("grass_top"));
        assert_eq!(layer_of([0.0, -1.0, 0.0]), atlas.resolve_texture_layer("dirt"));
        assert_eq!(layer_of([0.0, 0.0, 1.0]), atlas.resolve_texture_layer("grass_side"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_quad_topology(cells in cells_strategy()) {
            let grid = grid_from_cells(&cells);
            let mesh = mesher().mesh(&grid, &ChunkNeighbors::none()).unwrap();

            prop_assert_eq!(mesh.vertex_count() % 4, 0);
            prop_assert_eq!(mesh.index_count() % 6, 0);
            prop_assert_eq!(mesh.vertex_count() / 4, mesh.index_count() / 6);
        }

        #[test]
        fn prop_greedy_covers_exactly_the_naive_faces(cells in cells_strategy(), with_neighbor in any::<bool>()) {
            let grid = grid_from_cells(&cells);
            let mut neighbors = ChunkNeighbors::none();
            if with_neighbor {
                neighbors.set(BlockSide::FRONT, Arc::new(grid_from_cells(&cells)));
            }

            let mesh = mesher().mesh(&grid, &neighbors).unwrap();
            let covered = covered_faces(&mesh);
            let naive = naive_faces(&grid, &neighbors);

            // No unit face is covered twice.
            let covered_set: BTreeSet<UnitFace> = covered.iter().copied().collect();
            prop_assert_eq!(covered_set.len(), covered.len());
            let naive_set: BTreeSet<UnitFace> = naive.iter().copied().collect();
            prop_assert_eq!(covered_set, naive_set);
            prop_assert!(mesh.quad_count() <= naive.len());
        }

        #[test]
        fn prop_meshing_is_deterministic(cells in cells_strategy()) {
            let grid = grid_from_cells(&cells);
            let mesher = mesher();

            let first = mesher.mesh(&grid, &ChunkNeighbors::none()).unwrap();
            let second = mesher.mesh(&grid, &ChunkNeighbors::none()).unwrap();

            prop_assert_eq!(first.quad_count(), second.quad_count());
            prop_assert_eq!(first.vertices(), second.vertices());
        }
    }
}
