//! UV-space rasterization and per-channel baking

use glam::{Vec2, Vec3, Vec4};
use rayon::prelude::*;

use super::{
    DEFAULT_NORMAL, FloatImage, GutterMap, INVALID_COLOR, InfillMap, PhotoCapture, TextureChannel,
};
use crate::geometry::{barycentric_2d, plane_basis};
use crate::mesh::{MeshAttributes, TriangleMesh};
use crate::spatial::MeshBvh;

/// Ray origin offset, as a fraction of the mesh's smallest extent
const RAY_OFFSET_TOLERANCE: f32 = 1e-4;

/// Smallest ray origin offset in world units
const MIN_RAY_OFFSET: f32 = 1e-3;

/// Surface data under one texel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakeSample {
    pub triangle: u32,
    pub barycentric: Vec3,
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

impl BakeSample {
    /// World-space direction expressed in this texel's tangent frame
    pub fn to_tangent_space(&self, world: Vec3) -> Vec3 {
        Vec3::new(
            world.dot(self.tangent),
            world.dot(self.bitangent),
            world.dot(self.normal),
        )
        .normalize_or(Vec3::Z)
    }
}

/// The final mesh rasterized into UV space at bake resolution
#[derive(Debug, Clone)]
pub struct BakeCache {
    size: u32,
    samples: Vec<Option<BakeSample>>,
}

impl BakeCache {
    /// Rasterize every UV triangle at texel centers; earlier triangles win ties
    pub fn build(mesh: &TriangleMesh, size: u32) -> Self {
        let texel_count = (size as usize) * (size as usize);
        let Some(attributes) = mesh.attributes() else {
            return Self {
                size,
                samples: vec![None; texel_count],
            };
        };

        let scale = size as f32;
        let mut rows: Vec<Vec<u32>> = vec![Vec::new(); size as usize];
        for t in 0..mesh.triangle_count() {
            let Some(uv) = attributes.uvs.corner_values(t) else {
                continue;
            };
            let lo = uv.iter().map(|p| p.y * scale).fold(f32::INFINITY, f32::min);
            let hi = uv.iter().map(|p| p.y * scale).fold(f32::NEG_INFINITY, f32::max);
            let first = (lo - 0.5).ceil().max(0.0);
            let last = (hi - 0.5).floor().min(scale - 1.0);
            if !(first <= last) {
                continue;
            }
            for y in first as usize..=last as usize {
                rows[y].push(t as u32);
            }
        }

        let rows: Vec<Vec<Option<BakeSample>>> = rows
            .par_iter()
            .enumerate()
            .map(|(y, triangles)| rasterize_row(mesh, attributes, triangles, y as u32, size))
            .collect();

        Self {
            size,
            samples: rows.into_iter().flatten().collect(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn samples(&self) -> &[Option<BakeSample>] {
        &self.samples
    }

    /// Texels that lie on some UV chart
    pub fn coverage(&self) -> Vec<bool> {
        self.samples.iter().map(Option::is_some).collect()
    }

    pub fn covered_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_some()).count()
    }
}

fn rasterize_row(
    mesh: &TriangleMesh,
    attributes: &MeshAttributes,
    triangles: &[u32],
    y: u32,
    size: u32,
) -> Vec<Option<BakeSample>> {
    let scale = size as f32;
    let mut row = vec![None; size as usize];
    let center_y = y as f32 + 0.5;
    for &t in triangles {
        let Some(uv) = attributes.uvs.corner_values(t as usize) else {
            continue;
        };
        let [a, b, c] = uv.map(|p| p * scale);
        let lo = a.x.min(b.x).min(c.x);
        let hi = a.x.max(b.x).max(c.x);
        let first = (lo - 0.5).ceil().max(0.0);
        let last = (hi - 0.5).floor().min(scale - 1.0);
        if !(first <= last) {
            continue;
        }
        for x in first as usize..=last as usize {
            if row[x].is_some() {
                continue;
            }
            let p = Vec2::new(x as f32 + 0.5, center_y);
            let Some(bary) = barycentric_2d(a, b, c, p) else {
                continue;
            };
            if bary.min_element() < -1e-4 {
                continue;
            }
            row[x] = Some(surface_sample(mesh, attributes, t as usize, bary));
        }
    }
    row
}

fn surface_sample(mesh: &TriangleMesh, attributes: &MeshAttributes, t: usize, bary: Vec3) -> BakeSample {
    let [p0, p1, p2] = mesh.triangle_positions(t);
    let position = p0 * bary.x + p1 * bary.y + p2 * bary.z;

    let normal = attributes
        .normals
        .corner_values(t)
        .map(|[n0, n1, n2]| n0 * bary.x + n1 * bary.y + n2 * bary.z)
        .and_then(|n| n.try_normalize())
        .unwrap_or_else(|| mesh.triangle_normal(t));

    let (tangent, bitangent) = match attributes.tangents.get(t) {
        Some([t0, t1, t2]) => {
            let raw = t0.truncate() * bary.x + t1.truncate() * bary.y + t2.truncate() * bary.z;
            let tangent = (raw - normal * normal.dot(raw)).normalize_or_zero();
            if tangent == Vec3::ZERO {
                plane_basis(normal)
            } else {
                let sign = if t0.w < 0.0 { -1.0 } else { 1.0 };
                (tangent, normal.cross(tangent) * sign)
            }
        }
        None => plane_basis(normal),
    };

    BakeSample {
        triangle: t as u32,
        barycentric: bary,
        position,
        normal,
        tangent,
        bitangent,
    }
}

/// Per-run bake parameters
#[derive(Debug, Clone)]
pub struct BakeSettings {
    /// Textures to produce; base color, when present, drives the infill
    pub channels: Vec<TextureChannel>,
    /// Final texture size
    pub texture_size: u32,
    /// Bake resolution multiplier, already clamped
    pub supersample: u32,
    /// Gutter width around charts at final resolution
    pub gutter_texels: u32,
}

/// One finished channel at final resolution
#[derive(Debug, Clone)]
pub struct BakedTexture {
    pub channel: TextureChannel,
    pub image: FloatImage,
}

/// Everything a bake produced
#[derive(Debug, Clone, Default)]
pub struct BakeOutput {
    pub textures: Vec<BakedTexture>,
    /// The infill shared by all infilled channels, at bake resolution
    pub infill: Option<InfillMap>,
}

impl BakeOutput {
    pub fn texture(&self, channel: TextureChannel) -> Option<&BakedTexture> {
        self.textures.iter().find(|t| t.channel == channel)
    }
}

/// Bake every requested channel from `photos` onto `mesh`'s UV layout
///
/// `cache` must have been built from `mesh` at `texture_size * supersample`.
pub fn bake_textures(
    mesh: &TriangleMesh,
    cache: &BakeCache,
    photos: &dyn PhotoCapture,
    settings: &BakeSettings,
) -> BakeOutput {
    let size = cache.size();
    debug_assert_eq!(size, settings.texture_size * settings.supersample.max(1));

    let bvh = MeshBvh::build(mesh);
    let bounds = mesh.bounds();
    let epsilon = (RAY_OFFSET_TOLERANCE * bounds.min_dim()).max(MIN_RAY_OFFSET);
    let visible = move |position: Vec3, camera: Vec3| {
        let to_camera = camera - position;
        let distance = to_camera.length();
        if distance <= epsilon {
            return true;
        }
        let dir = to_camera / distance;
        !bvh.any_hit(position + dir * epsilon, dir, distance - epsilon)
    };

    let covered = cache.coverage();
    let gutter = GutterMap::compute(size, size, &covered, settings.gutter_texels * settings.supersample.max(1));

    // Base color (or the first infilled channel) defines the holes
    let mut order = settings.channels.clone();
    order.sort_by_key(|&c| c != TextureChannel::BaseColor);

    let mut output = BakeOutput::default();
    for channel in order {
        let capture = channel.capture_channel();
        let mut image = FloatImage::filled(size, size, Vec4::ZERO);
        image
            .pixels
            .par_iter_mut()
            .zip(cache.samples().par_iter())
            .for_each(|(pixel, sample)| {
                let Some(sample) = sample else {
                    return;
                };
                let origin = sample.position + sample.normal * epsilon;
                let value = photos.sample(capture, origin, sample.normal, &visible);
                *pixel = match (channel, value) {
                    (TextureChannel::Normal, Some(world)) => sample.to_tangent_space(world.truncate()).extend(1.0),
                    (TextureChannel::Normal, None) => DEFAULT_NORMAL,
                    (_, Some(value)) => value,
                    (_, None) => INVALID_COLOR,
                };
            });

        if channel.is_infilled() {
            let infill = output.infill.get_or_insert_with(|| {
                let holes: Vec<bool> = image
                    .pixels
                    .iter()
                    .zip(&covered)
                    .map(|(&p, &c)| c && p == INVALID_COLOR)
                    .collect();
                let known: Vec<bool> = holes.iter().zip(&covered).map(|(&h, &c)| c && !h).collect();
                let map = InfillMap::compute(size, size, &holes, &known);
                tracing::debug!(
                    "Infill: {} hole texels, {} unreachable",
                    map.steps().len(),
                    map.unreachable().len()
                );
                map
            });
            fill_channel_only_holes(&mut image, &covered, infill);
            infill.apply(&mut image);
            // Shared holes with nothing to fill from
            for pixel in &mut image.pixels {
                if *pixel == INVALID_COLOR {
                    *pixel = Vec4::W;
                }
            }
        }

        gutter.apply(&mut image);
        output.textures.push(BakedTexture {
            channel,
            image: image.downsample(settings.supersample),
        });
    }
    output
}

/// Fill texels this channel missed but the defining channel saw
///
/// They are filled from this channel's own valid texels, before the shared
/// infill reads them as sources. Ones with nothing in reach become black.
fn fill_channel_only_holes(image: &mut FloatImage, covered: &[bool], shared: &InfillMap) {
    let mut shared_hole = vec![false; image.pixels.len()];
    for pixel in shared.hole_pixels().chain(shared.unreachable().iter().copied()) {
        shared_hole[pixel] = true;
    }
    let holes: Vec<bool> = image
        .pixels
        .iter()
        .zip(covered)
        .zip(&shared_hole)
        .map(|((&p, &c), &s)| c && !s && p == INVALID_COLOR)
        .collect();
    if !holes.contains(&true) {
        return;
    }

    let known: Vec<bool> = (0..holes.len())
        .map(|i| covered[i] && !shared_hole[i] && !holes[i])
        .collect();
    let map = InfillMap::compute(image.width, image.height, &holes, &known);
    tracing::debug!(
        "Channel-only infill: {} texels, {} unreachable",
        map.steps().len(),
        map.unreachable().len()
    );
    map.apply(image);
    for &pixel in map.unreachable() {
        image.pixels[pixel] = Vec4::W;
    }
}
