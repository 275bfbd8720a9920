//! Texture atlas lookup.
//!
//! The mesher never knows how textures are packed; it asks a [`TextureAtlas`] to
//! turn a texture name into a layer of the block texture array. The atlas is
//! built once at start-up and shared read-only with every meshing worker.

use phf::phf_map;

use crate::engine_state::voxels::block::{block_side::BlockSide, block_type::BlockType};

/// Resolves texture names to texture array layers.
pub trait TextureAtlas: Send + Sync {
    /// Returns the layer holding `texture_name`, or `None` if the atlas has no such texture.
    fn resolve_texture_layer(&self, texture_name: &str) -> Option<u32>;

    /// Number of layers in the atlas.
    fn layer_count(&self) -> u32;
}

/// A layer of the built-in block atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayer {
    /// Index into the texture array
    pub index: u32,
    /// Base colour the layer is painted with (sRGB, RGBA)
    pub color: [u8; 4],
}

static BLOCK_TEXTURE_LAYERS: phf::Map<&'static str, AtlasLayer> = phf_map! {
    "dirt" => AtlasLayer { index: 0, color: [134, 96, 67, 255] },
    "grass_top" => AtlasLayer { index: 1, color: [106, 170, 64, 255] },
    "grass_side" => AtlasLayer { index: 2, color: [122, 130, 66, 255] },
    "wood_top" => AtlasLayer { index: 3, color: [176, 144, 90, 255] },
    "wood_side" => AtlasLayer { index: 4, color: [102, 81, 50, 255] },
    "white" => AtlasLayer { index: 5, color: [235, 235, 235, 255] },
    "stone" => AtlasLayer { index: 6, color: [125, 125, 125, 255] },
    "sand" => AtlasLayer { index: 7, color: [219, 207, 163, 255] },
    "glass" => AtlasLayer { index: 8, color: [200, 230, 240, 96] },
    "leaves" => AtlasLayer { index: 9, color: [58, 120, 40, 200] },
    "water" => AtlasLayer { index: 10, color: [48, 92, 200, 160] },
};

/// The built-in atlas covering every block type's textures.
///
/// Layers are solid base colours; the GPU side paints each one with a little
/// per-texel noise so merged quads visibly tile.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockAtlas;

impl BlockAtlas {
    /// Every layer of the atlas ordered by layer index.
    pub fn layers(&self) -> Vec<AtlasLayer> {
        let mut layers: Vec<AtlasLayer> = BLOCK_TEXTURE_LAYERS.values().copied().collect();
        layers.sort_by_key(|layer| layer.index);
        layers
    }

    /// Texture names used by block faces that this atlas cannot resolve.
    ///
    /// Empty for a consistent build; checked once at start-up.
    pub fn missing_block_textures(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for block_type in BlockType::all() {
            for side in BlockSide::all() {
                if let Some(name) = block_type.texture_name(side) {
                    if self.resolve_texture_layer(name).is_none() && !missing.contains(&name) {
                        missing.push(name);
                    }
                }
            }
        }
        missing
    }
}

impl TextureAtlas for BlockAtlas {
    fn resolve_texture_layer(&self, texture_name: &str) -> Option<u32> {
        BLOCK_TEXTURE_LAYERS.get(texture_name).map(|layer| layer.index)
    }

    fn layer_count(&self) -> u32 {
        BLOCK_TEXTURE_LAYERS.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_block_face_resolves() {
        assert!(BlockAtlas.missing_block_textures().is_empty());
    }

    #[test]
    fn test_layers_are_dense() {
        let layers = BlockAtlas.layers();
        assert_eq!(layers.len() as u32, BlockAtlas.layer_count());
        for (expected, layer) in layers.iter().enumerate() {
            assert_eq!(layer.index, expected as u32);
        }
    }

    #[test]
    fn test_unknown_texture() {
        assert_eq!(BlockAtlas.resolve_texture_layer("lava"), None);
        assert_eq!(BlockAtlas.resolve_texture_layer("stone"), Some(6));
    }
}
