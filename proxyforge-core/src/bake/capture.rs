//! Multi-view photo capture of the original scene

use glam::{Vec3, Vec4};
use hashbrown::HashMap;
use rayon::prelude::*;

use super::FloatImage;
use crate::geometry::plane_basis;
use crate::options::ApproximationOptions;
use crate::scene::{SceneAggregator, SceneHit};

/// Per-pixel data a capture view can record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureChannel {
    BaseColor,
    Roughness,
    Metallic,
    Specular,
    /// Metallic, roughness, specular in RGB
    PackedMrs,
    Emissive,
    WorldNormal,
}

impl CaptureChannel {
    fn value(self, hit: &SceneHit) -> Vec4 {
        let m = &hit.material;
        match self {
            CaptureChannel::BaseColor => m.base_color,
            CaptureChannel::Roughness => Vec4::new(m.roughness, m.roughness, m.roughness, 1.0),
            CaptureChannel::Metallic => Vec4::new(m.metallic, m.metallic, m.metallic, 1.0),
            CaptureChannel::Specular => Vec4::new(m.specular, m.specular, m.specular, 1.0),
            CaptureChannel::PackedMrs => Vec4::new(m.metallic, m.roughness, m.specular, 1.0),
            CaptureChannel::Emissive => m.emissive.extend(1.0),
            CaptureChannel::WorldNormal => hit.normal.extend(1.0),
        }
    }
}

/// Capture parameters for one run
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub resolution: u32,
    pub field_of_view_degrees: f32,
    pub near_plane: f32,
    pub channels: Vec<CaptureChannel>,
    /// Log every view as it is captured
    pub debug: bool,
}

impl CaptureConfig {
    pub fn from_options(options: &ApproximationOptions, channels: Vec<CaptureChannel>) -> Self {
        Self {
            resolution: options.render_capture_resolution,
            field_of_view_degrees: options.field_of_view_degrees,
            near_plane: options.near_plane_dist,
            channels,
            debug: options.enable_render_capture_debug,
        }
    }
}

/// Visibility predicate: `(surface point, camera position) -> visible`
pub type VisibilityFn<'a> = &'a (dyn Fn(Vec3, Vec3) -> bool + Sync);

/// A set of captured views that can be sampled at world positions
pub trait PhotoCapture: Send + Sync {
    /// Whether this backend can render `channel` at all
    fn supports_channel(&self, channel: CaptureChannel) -> bool;

    /// Render every view of `scene` for the configured channels
    fn capture(&mut self, scene: &dyn SceneAggregator, config: &CaptureConfig);

    /// Value of `channel` at `position` from the best view that sees it
    fn sample(&self, channel: CaptureChannel, position: Vec3, normal: Vec3, visible: VisibilityFn) -> Option<Vec4>;
}

/// Pinhole camera looking at the scene from outside
#[derive(Debug, Clone, Copy)]
struct Camera {
    position: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
    tan_half_fov: f32,
    near: f32,
    far: f32,
    resolution: u32,
}

impl Camera {
    fn ray(&self, x: u32, y: u32) -> Vec3 {
        let res = self.resolution as f32;
        let sx = ((x as f32 + 0.5) / res * 2.0 - 1.0) * self.tan_half_fov;
        let sy = ((y as f32 + 0.5) / res * 2.0 - 1.0) * self.tan_half_fov;
        (self.forward + self.right * sx + self.up * sy).normalize()
    }

    fn project(&self, p: Vec3) -> Option<(u32, u32)> {
        let rel = p - self.position;
        let z = rel.dot(self.forward);
        if z <= self.near {
            return None;
        }
        let sx = rel.dot(self.right) / (z * self.tan_half_fov);
        let sy = rel.dot(self.up) / (z * self.tan_half_fov);
        if sx.abs() >= 1.0 || sy.abs() >= 1.0 {
            return None;
        }
        let res = self.resolution as f32;
        let x = (((sx + 1.0) * 0.5 * res) as u32).min(self.resolution - 1);
        let y = (((sy + 1.0) * 0.5 * res) as u32).min(self.resolution - 1);
        Some((x, y))
    }
}

struct CaptureView {
    camera: Camera,
    /// Hit distance per pixel, infinite where the ray missed
    depth: Vec<f32>,
    images: HashMap<CaptureChannel, FloatImage>,
}

/// The 14 view directions: 6 axis-aligned and 8 corner diagonals
fn view_directions() -> Vec<Vec3> {
    let mut dirs = vec![Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
    for sx in [-1.0, 1.0] {
        for sy in [-1.0, 1.0] {
            for sz in [-1.0, 1.0] {
                dirs.push(Vec3::new(sx, sy, sz).normalize());
            }
        }
    }
    dirs
}

/// Reference [`PhotoCapture`] that renders views by ray casting the scene
#[derive(Default)]
pub struct RaycastPhotoSet {
    views: Vec<CaptureView>,
    unsupported: Vec<CaptureChannel>,
}

impl RaycastPhotoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `channels` as unavailable, as a renderer missing debug view modes would
    pub fn with_unsupported_channels(mut self, channels: &[CaptureChannel]) -> Self {
        self.unsupported.extend_from_slice(channels);
        self
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    fn render_view(scene: &dyn SceneAggregator, camera: Camera, channels: &[CaptureChannel]) -> CaptureView {
        let res = camera.resolution;
        let hits: Vec<Option<SceneHit>> = (0..res * res)
            .into_par_iter()
            .map(|i| {
                let dir = camera.ray(i % res, i / res);
                scene.cast_ray(camera.position + dir * camera.near, dir, camera.far)
            })
            .collect();

        let depth = hits
            .iter()
            .map(|h| h.as_ref().map_or(f32::INFINITY, |h| h.t))
            .collect();
        let images = channels
            .iter()
            .map(|&channel| {
                let mut image = FloatImage::filled(res, res, Vec4::ZERO);
                for (pixel, hit) in image.pixels.iter_mut().zip(&hits) {
                    if let Some(hit) = hit {
                        *pixel = channel.value(hit);
                    }
                }
                (channel, image)
            })
            .collect();
        CaptureView { camera, depth, images }
    }
}

impl PhotoCapture for RaycastPhotoSet {
    fn supports_channel(&self, channel: CaptureChannel) -> bool {
        !self.unsupported.contains(&channel)
    }

    fn capture(&mut self, scene: &dyn SceneAggregator, config: &CaptureConfig) {
        self.views.clear();
        let bounds = scene.bounding_box();
        if bounds.is_empty() || config.resolution == 0 {
            return;
        }
        let channels: Vec<CaptureChannel> = config
            .channels
            .iter()
            .copied()
            .filter(|&c| self.supports_channel(c))
            .collect();

        let center = bounds.center();
        let radius = (bounds.diagonal_length() * 0.5).max(1e-3);
        let half_fov = (config.field_of_view_degrees.to_radians() * 0.5).clamp(0.01, 1.5);
        let distance = radius / half_fov.sin() + config.near_plane;
        for (i, dir) in view_directions().into_iter().enumerate() {
            let forward = -dir;
            let (right, up) = plane_basis(forward);
            let camera = Camera {
                position: center + dir * distance,
                forward,
                right,
                up,
                tan_half_fov: half_fov.tan(),
                near: config.near_plane.min(distance - radius).max(0.0),
                far: distance + radius,
                resolution: config.resolution,
            };
            if config.debug {
                tracing::info!(
                    "Capture view {i}: position {:?}, direction {:?}",
                    camera.position,
                    forward
                );
            }
            self.views.push(Self::render_view(scene, camera, &channels));
        }
    }

    fn sample(&self, channel: CaptureChannel, position: Vec3, normal: Vec3, visible: VisibilityFn) -> Option<Vec4> {
        let mut best: Option<(f32, Vec4)> = None;
        for view in &self.views {
            let Some(image) = view.images.get(&channel) else {
                continue;
            };
            let Some((x, y)) = view.camera.project(position) else {
                continue;
            };
            if !view.depth[image.index(x, y)].is_finite() {
                continue;
            }
            let alignment = normal.dot((view.camera.position - position).normalize_or_zero());
            if alignment <= 0.0 || best.is_some_and(|(a, _)| a >= alignment) {
                continue;
            }
            if !visible(position, view.camera.position) {
                continue;
            }
            best = Some((alignment, image.get(x, y)));
        }
        best.map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriangleMesh;
    use crate::scene::{MeshScene, SceneObject, SurfaceMaterial};

    fn red_cube_scene() -> MeshScene {
        let material = SurfaceMaterial {
            base_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
            roughness: 0.25,
            ..SurfaceMaterial::default()
        };
        let mut scene = MeshScene::new();
        scene.add_objects(vec![
            SceneObject::new("cube", TriangleMesh::cube(Vec3::splat(-50.0), Vec3::splat(100.0))).with_material(material),
        ]);
        scene.build(&ApproximationOptions::default());
        scene.build_spatial_evaluation_cache();
        scene
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            resolution: 32,
            field_of_view_degrees: 30.0,
            near_plane: 1.0,
            channels: vec![CaptureChannel::BaseColor, CaptureChannel::Roughness],
            debug: false,
        }
    }

    #[test]
    fn test_fourteen_views() {
        assert_eq!(view_directions().len(), 14);
        let mut photos = RaycastPhotoSet::new();
        photos.capture(&red_cube_scene(), &config());
        assert_eq!(photos.view_count(), 14);
    }

    #[test]
    fn test_sample_reads_material() {
        let mut photos = RaycastPhotoSet::new();
        photos.capture(&red_cube_scene(), &config());
        let always = |_: Vec3, _: Vec3| true;
        let color = photos
            .sample(CaptureChannel::BaseColor, Vec3::new(0.0, 0.0, 50.0), Vec3::Z, &always)
            .unwrap();
        assert_eq!(color, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let roughness = photos
            .sample(CaptureChannel::Roughness, Vec3::new(50.0, 10.0, 0.0), Vec3::X, &always)
            .unwrap();
        assert_eq!(roughness.x, 0.25);
        // Not captured
        assert!(photos
            .sample(CaptureChannel::Emissive, Vec3::new(0.0, 0.0, 50.0), Vec3::Z, &always)
            .is_none());
    }

    #[test]
    fn test_visibility_predicate_rejects_views() {
        let mut photos = RaycastPhotoSet::new();
        photos.capture(&red_cube_scene(), &config());
        let never = |_: Vec3, _: Vec3| false;
        assert!(photos
            .sample(CaptureChannel::BaseColor, Vec3::new(0.0, 0.0, 50.0), Vec3::Z, &never)
            .is_none());
    }

    #[test]
    fn test_unsupported_channels() {
        let photos = RaycastPhotoSet::new().with_unsupported_channels(&[CaptureChannel::Emissive]);
        assert!(!photos.supports_channel(CaptureChannel::Emissive));
        assert!(photos.supports_channel(CaptureChannel::BaseColor));
    }
}
