//! Texture handling for the rendering pipeline.
//!
//! This module creates the GPU textures of the chunk pass: the depth buffer and
//! the 2D texture array holding one layer per atlas entry. Atlas layers are
//! painted procedurally from their base colour with a little per-texel noise, and
//! every mip level is generated on the CPU.

use super::atlas::AtlasLayer;

/// Width and height of one texture array layer in texels.
pub const TEXTURE_DIMENSION: u32 = 16;
/// Number of mip levels down to 1x1.
pub const MIP_LEVEL: u32 = TEXTURE_DIMENSION.ilog2() + 1;
/// Texels of one layer across all mip levels (16² + 8² + 4² + 2² + 1²).
pub const TEXTURE_LENGTH_WITH_MIPMAPS: u32 = 341;
/// Largest brightness offset applied to a texel.
const NOISE_AMPLITUDE: i16 = 14;

/// Represents a GPU texture with associated view and sampler.
pub struct Texture {
    /// The underlying WebGPU texture resource.
    #[allow(dead_code)]
    pub texture: wgpu::Texture,
    /// The texture view used for binding the texture to the pipeline.
    pub view: wgpu::TextureView,
    /// The sampler used for texture filtering and addressing.
    pub sampler: wgpu::Sampler,
}

impl Texture {
    /// The texture format used for depth buffers.
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Creates a new depth texture with the given configuration.
    ///
    /// # Arguments
    /// * `device` - The WebGPU device
    /// * `config` - The surface configuration containing dimensions
    /// * `label` - Debug label for the texture
    ///
    /// # Returns
    /// A new `Texture` instance configured as a depth buffer
    pub fn create_depth_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        };

        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Creates the block texture array, one layer per atlas entry.
    ///
    /// # Arguments
    /// * `device` - The WebGPU device
    /// * `queue` - The WebGPU queue used to upload the texels
    /// * `layers` - Atlas layers ordered by layer index
    /// * `seed` - Seed of the per-texel noise
    ///
    /// # Returns
    /// A texture with a `D2Array` view and a repeating sampler, so merged quads tile
    pub fn create_block_texture_array(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layers: &[AtlasLayer],
        seed: u64,
    ) -> Self {
        let layer_count = layers.len().max(1) as u32;
        let texture = {
            use wgpu::util::DeviceExt;

            device.create_texture_with_data(
                queue,
                &wgpu::TextureDescriptor {
                    label: Some("Block Texture Array"),
                    size: wgpu::Extent3d {
                        width: TEXTURE_DIMENSION,
                        height: TEXTURE_DIMENSION,
                        depth_or_array_layers: layer_count,
                    },
                    mip_level_count: MIP_LEVEL,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8UnormSrgb,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                },
                wgpu::util::TextureDataOrder::LayerMajor,
                &block_texture_data(layers, seed),
            )
        };

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Block Texture Array View"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }
}

/// RGBA texels of every layer in layer-major order, each layer followed by its mips.
///
/// An empty layer list yields a single opaque white layer.
pub fn block_texture_data(layers: &[AtlasLayer], seed: u64) -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let fallback = [AtlasLayer {
        index: 0,
        color: [255, 255, 255, 255],
    }];
    let layers = if layers.is_empty() { &fallback[..] } else { layers };

    let mut data = Vec::with_capacity(layers.len() * TEXTURE_LENGTH_WITH_MIPMAPS as usize * 4);
    for layer in layers {
        let mut level = paint_layer(layer.color, &mut rng);
        let mut size = TEXTURE_DIMENSION as usize;
        data.extend_from_slice(&level);
        while size > 1 {
            level = downsample(&level, size);
            size /= 2;
            data.extend_from_slice(&level);
        }
    }
    data
}

fn paint_layer(color: [u8; 4], rng: &mut fastrand::Rng) -> Vec<u8> {
    let texels = (TEXTURE_DIMENSION * TEXTURE_DIMENSION) as usize;
    let mut level = Vec::with_capacity(texels * 4);
    for _ in 0..texels {
        let offset = rng.i16(-NOISE_AMPLITUDE..=NOISE_AMPLITUDE);
        for channel in &color[..3] {
            level.push((*channel as i16 + offset).clamp(0, 255) as u8);
        }
        level.push(color[3]);
    }
    level
}

/// Box-filters a square RGBA level of `size`² texels down to half its size.
fn downsample(level: &[u8], size: usize) -> Vec<u8> {
    let half = size / 2;
    let mut next = Vec::with_capacity(half * half * 4);
    for y in 0..half {
        for x in 0..half {
            for channel in 0..4 {
                let sum: u32 = [(0, 0), (1, 0), (0, 1), (1, 1)]
                    .iter()
                    .map(|(dx, dy)| level[((2 * y + dy) * size + 2 * x + dx) * 4 + channel] as u32)
                    .sum();
                next.push((sum / 4) as u8);
            }
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::atlas::BlockAtlas;

    #[test]
    fn test_texture_data_covers_every_mip() {
        let layers = BlockAtlas.layers();

        let data = block_texture_data(&layers, 7);

        assert_eq!(
            data.len(),
            layers.len() * TEXTURE_LENGTH_WITH_MIPMAPS as usize * 4
        );
        assert_eq!(MIP_LEVEL, 5);
    }

    #[test]
    fn test_texture_data_keeps_alpha_and_is_seeded() {
        let glass = AtlasLayer {
            index: 0,
            color: [200, 230, 240, 96],
        };

        let first = block_texture_data(&[glass], 1);
        let second = block_texture_data(&[glass], 1);

        assert_eq!(first, second);
        assert!(first.chunks(4).all(|texel| texel[3] == 96));
    }

    #[test]
    fn test_downsample_averages_blocks() {
        let mut level = vec![0u8; 2 * 2 * 4];
        for texel in level.chunks_mut(4) {
            texel.copy_from_slice(&[100, 100, 100, 255]);
        }
        level[0] = 200;

        assert_eq!(downsample(&level, 2), vec![125, 100, 100, 255]);
    }

    #[test]
    fn test_empty_atlas_gets_one_layer() {
        assert_eq!(
            block_texture_data(&[], 0).len(),
            TEXTURE_LENGTH_WITH_MIPMAPS as usize * 4
        );
    }
}
