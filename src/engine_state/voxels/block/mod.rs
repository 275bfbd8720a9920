//! # Block Module
//!
//! This module provides the block data stored in every voxel grid cell, the
//! block type definitions, and the block face enumeration.

use block_type::BlockType;

pub mod block_side;
pub mod block_type;

/// The underlying integer type used to represent block types in memory.
pub type BlockTypeSize = u8;

/// Represents a single voxel cell: a block type identifier plus 8 bits of
/// block-specific metadata.
///
/// # Memory Layout
/// The `#[repr(C)]` attribute keeps the layout at two bytes so a whole grid is a
/// flat, cheaply cloned byte array.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq, Eq, Hash, Default)]
pub struct Block {
    /// The type of this block, encoded as a `BlockTypeSize` for compact storage.
    pub block_type: BlockTypeSize,
    /// Free-form per-block data (orientation, growth stage, ...). Not interpreted by the core.
    pub metadata: u8,
}

impl Block {
    /// The empty cell.
    pub const AIR: Block = Block {
        block_type: BlockType::AIR as BlockTypeSize,
        metadata: 0,
    };

    /// Creates a new block of the specified type with zero metadata.
    pub fn new(block_type: BlockType) -> Self {
        Block {
            block_type: block_type as BlockTypeSize,
            metadata: 0,
        }
    }

    /// Returns a copy of this block carrying the given metadata.
    pub fn with_metadata(self, metadata: u8) -> Self {
        Block { metadata, ..self }
    }

    /// The typed block kind, or `None` if the stored identifier is unknown.
    pub fn kind(&self) -> Option<BlockType> {
        BlockType::from_id(self.block_type)
    }

    /// Whether this cell is air.
    pub fn is_air(&self) -> bool {
        self.block_type == BlockType::AIR as BlockTypeSize
    }

    /// Whether this cell lets neighbouring faces show through.
    ///
    /// Unknown identifiers are treated as opaque.
    pub fn is_transparent(&self) -> bool {
        self.kind().is_some_and(BlockType::is_transparent)
    }

    /// Whether this cell blocks sight completely.
    pub fn is_opaque(&self) -> bool {
        !self.is_transparent()
    }
}

impl From<BlockType> for Block {
    fn from(block_type: BlockType) -> Self {
        Block::new(block_type)
    }
}
