//! Bake the final mesh's textures and assemble the material instance

use crate::assets::{MaterialInstanceAsset, TextureAsset, texture_name};
use crate::bake::texture_size::effective_supersample;
use crate::bake::{BakeCache, BakeSettings, GUTTER_TEXELS, PhotoCapture, bake_textures, requested_channels};
use crate::mesh::TriangleMesh;
use crate::options::ApproximationOptions;

/// Converted textures and the material that binds them, not yet emitted
#[derive(Debug, Clone)]
pub struct BakedMaterial {
    pub textures: Vec<TextureAsset>,
    pub material: MaterialInstanceAsset,
    pub supersample: u32,
    pub infill_holes: usize,
}

/// Bake every requested channel of `mesh` at `texture_size`
pub fn bake_material(
    mesh: &TriangleMesh,
    photos: &dyn PhotoCapture,
    options: &ApproximationOptions,
    texture_size: u32,
) -> BakedMaterial {
    let supersample = effective_supersample(texture_size, options.anti_alias_multi_sampling);
    let cache = BakeCache::build(mesh, texture_size * supersample);
    tracing::debug!(
        "Bake cache: {} of {} texels covered",
        cache.covered_count(),
        cache.samples().len()
    );

    let settings = BakeSettings {
        channels: requested_channels(options),
        texture_size,
        supersample,
        gutter_texels: GUTTER_TEXELS,
    };
    let output = bake_textures(mesh, &cache, photos, &settings);
    let infill_holes = output.infill.as_ref().map_or(0, |map| map.steps().len());

    let base = options.asset_base_name();
    let mut material = MaterialInstanceAsset::new(options);
    let textures = output
        .textures
        .iter()
        .map(|baked| {
            let texture = TextureAsset::from_baked(texture_name(base, baked.channel), baked.channel, &baked.image);
            material.bind(&options.texture_parameters, &texture);
            texture
        })
        .collect();

    BakedMaterial {
        textures,
        material,
        supersample,
        infill_holes,
    }
}
