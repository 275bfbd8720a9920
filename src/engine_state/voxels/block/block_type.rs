//! # Block Type Module
//!
//! This module defines the different types of blocks in the voxel world, their
//! transparency, and the texture each of their faces is drawn with.

use num_derive::FromPrimitive;

use super::{block_side::BlockSide, BlockTypeSize};

/// Enumerates all possible block types in the voxel world.
///
/// The discriminant is the identifier stored in a voxel grid cell. The
/// `FromPrimitive` derive allows conversion back from the stored integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
pub enum BlockType {
    /// An air block, which is non-solid and never produces a face.
    AIR = 0,

    /// A basic dirt block.
    DIRT = 1,

    /// A grass block with different textures on top and sides.
    /// The top is green, sides have grass on dirt, and bottom is plain dirt.
    GRASS = 2,

    /// A wooden log with end grain on top and bottom and bark on the sides.
    WOOD = 3,

    /// A plain white block, mostly used for testing.
    WHITE = 4,

    /// Solid rock found below the dirt layer.
    STONE = 5,

    /// Sand found along the water line.
    SAND = 6,

    /// Clear glass. Transparent.
    GLASS = 7,

    /// Tree foliage. Transparent.
    LEAVES = 8,

    /// Still water. Transparent.
    WATER = 9,
}

impl BlockType {
    /// Converts a stored block identifier into a `BlockType`.
    ///
    /// # Returns
    /// `None` for identifiers that no block type uses.
    pub fn from_id(id: BlockTypeSize) -> Option<Self> {
        num_traits::FromPrimitive::from_u8(id)
    }

    /// The identifier stored in voxel grid cells for this block type.
    pub fn id(self) -> BlockTypeSize {
        self as BlockTypeSize
    }

    /// Whether this is air.
    pub fn is_air(self) -> bool {
        self == BlockType::AIR
    }

    /// Whether light and sight pass through this block.
    ///
    /// A transparent block still produces faces against air, but an opaque block
    /// shows its face against a transparent one.
    pub fn is_transparent(self) -> bool {
        matches!(
            self,
            BlockType::AIR | BlockType::GLASS | BlockType::LEAVES | BlockType::WATER
        )
    }

    /// Name of the texture drawn on the given face of this block.
    ///
    /// The name is resolved to an atlas layer by the texture atlas supplied to
    /// the mesher. Air has no texture.
    pub fn texture_name(self, side: BlockSide) -> Option<&'static str> {
        let name = match self {
            BlockType::AIR => return None,
            BlockType::DIRT => "dirt",
            BlockType::GRASS => match side {
                BlockSide::TOP => "grass_top",
                BlockSide::BOTTOM => "dirt",
                _ => "grass_side",
            },
            BlockType::WOOD => match side {
                BlockSide::TOP | BlockSide::BOTTOM => "wood_top",
                _ => "wood_side",
            },
            BlockType::WHITE => "white",
            BlockType::STONE => "stone",
            BlockType::SAND => "sand",
            BlockType::GLASS => "glass",
            BlockType::LEAVES => "leaves",
            BlockType::WATER => "water",
        };
        Some(name)
    }

    /// Every block type, in identifier order.
    pub fn all() -> [BlockType; 10] {
        [
            BlockType::AIR,
            BlockType::DIRT,
            BlockType::GRASS,
            BlockType::WOOD,
            BlockType::WHITE,
            BlockType::STONE,
            BlockType::SAND,
            BlockType::GLASS,
            BlockType::LEAVES,
            BlockType::WATER,
        ]
    }

    /// Generates a random opaque, non-air block type.
    ///
    /// Used by the test-pattern chunk builders.
    pub fn get_random_type() -> Self {
        const OPAQUE: [BlockType; 6] = [
            BlockType::DIRT,
            BlockType::GRASS,
            BlockType::WOOD,
            BlockType::WHITE,
            BlockType::STONE,
            BlockType::SAND,
        ];
        OPAQUE[fastrand::usize(..OPAQUE.len())]
    }
}
