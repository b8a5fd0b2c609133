//! Output texture size and supersampling limits

use crate::mesh::TriangleMesh;
use crate::options::{ApproximationOptions, TextureSizePolicy};

/// Largest texture size derived from texel density
pub const MAX_TEXTURE_SIZE: u32 = 8192;

/// Largest intermediate (supersampled) bake resolution
pub const MAX_SUPERSAMPLED_SIZE: u32 = 16384;

/// UV units per meter of surface, from summed UV and world areas (cm^2)
pub fn texel_ratio(uv_area: f64, world_area: f64) -> f64 {
    (uv_area / world_area).sqrt() * 100.0
}

/// Power-of-two size whose texel density lands closest to `target_density`
/// (texels per meter), clamped to [`MAX_TEXTURE_SIZE`]
pub fn texture_size_for_density(uv_area: f64, world_area: f64, target_density: f64) -> u32 {
    if uv_area <= 0.0 || world_area <= 0.0 || target_density <= 0.0 {
        return 1;
    }
    let ratio = texel_ratio(uv_area, world_area);
    let ideal = (target_density / ratio).max(1.0);
    let floor = round_down_pow2(ideal);
    let ceil = floor.saturating_mul(2).max(1);
    let ceil = if (floor as f64) >= ideal { floor } else { ceil };
    let size = if (ceil as f64 * ratio - target_density).abs() < (floor as f64 * ratio - target_density).abs() {
        ceil
    } else {
        floor
    };
    if size > MAX_TEXTURE_SIZE {
        tracing::warn!("Texel density needs a {size} texture, clamping to {MAX_TEXTURE_SIZE}");
        return MAX_TEXTURE_SIZE;
    }
    size
}

fn round_down_pow2(value: f64) -> u32 {
    if value >= f64::from(1u32 << 31) {
        return 1 << 31;
    }
    let v = value as u32;
    if v == 0 { 1 } else { 1 << (31 - v.leading_zeros()) }
}

/// Summed UV-space area of a mesh with a UV overlay
pub fn uv_area(mesh: &TriangleMesh) -> f64 {
    let Some(attributes) = mesh.attributes() else {
        return 0.0;
    };
    (0..mesh.triangle_count())
        .filter_map(|t| attributes.uvs.corner_values(t))
        .map(|[a, b, c]| f64::from((b - a).perp_dot(c - a).abs() * 0.5))
        .sum()
}

/// Final texture size under the configured policy
pub fn select_texture_size(options: &ApproximationOptions, mesh: &TriangleMesh) -> u32 {
    match options.texture_size_policy {
        TextureSizePolicy::TextureSize => options.texture_image_size,
        TextureSizePolicy::TexelDensity => {
            texture_size_for_density(uv_area(mesh), mesh.area(), f64::from(options.mesh_texel_density))
        }
    }
}

/// Supersample factor actually used; oversized intermediates fall back to 1
pub fn effective_supersample(texture_size: u32, factor: u32) -> u32 {
    let factor = factor.max(1);
    if u64::from(texture_size) * u64::from(factor) > u64::from(MAX_SUPERSAMPLED_SIZE) {
        tracing::warn!(
            "Supersampled bake of {texture_size} x {factor} exceeds {MAX_SUPERSAMPLED_SIZE}, disabling supersampling"
        );
        return 1;
    }
    factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supersample_clamp() {
        assert_eq!(effective_supersample(8192, 4), 1);
        assert_eq!(effective_supersample(4096, 4), 4);
        assert_eq!(effective_supersample(8192, 2), 2);
        assert_eq!(effective_supersample(1024, 0), 1);
    }

    #[test]
    fn test_density_picks_nearest_power_of_two() {
        // 1 m^2 of surface filling the whole UV square: one UV unit per meter
        let world = 10_000.0;
        assert_eq!(texture_size_for_density(1.0, world, 512.0), 512);
        assert_eq!(texture_size_for_density(1.0, world, 600.0), 512);
        assert_eq!(texture_size_for_density(1.0, world, 800.0), 1024);
        // A quarter of the UV square halves the UV units per meter
        assert_eq!(texture_size_for_density(0.25, world, 1024.0), 2048);
    }

    #[test]
    fn test_density_clamps_to_max() {
        assert_eq!(texture_size_for_density(1.0, 10_000.0, 1.0e9), MAX_TEXTURE_SIZE);
    }

    #[test]
    fn test_round_down_pow2() {
        assert_eq!(round_down_pow2(1.0), 1);
        assert_eq!(round_down_pow2(5.9), 4);
        assert_eq!(round_down_pow2(1024.0), 1024);
    }
}
