//! Visibility-based removal of hidden triangles
//!
//! A triangle survives if any of its sample points can send a ray to
//! infinity without hitting the mesh (or the optional downward occluder).
//! The removal selection is then cleaned up ring-wise so that isolated
//! slivers disappear and the visible silhouette is not eaten into.

use glam::{Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rayon::prelude::*;

use crate::geometry::{Aabb, GroundPlane, plane_basis};
use crate::mesh::TriangleMesh;
use crate::options::ApproximationOptions;
use crate::spatial::MeshBvh;

/// Sample points sit this fraction of the mesh extent off the surface
const SAMPLE_OFFSET_FRACTION: f32 = 1e-4;

/// Vertex samples are pulled toward the centroid by this fraction
const VERTEX_INSET: f32 = 0.01;

/// Sampling and cleanup parameters
#[derive(Debug, Clone)]
pub struct OcclusionSettings {
    pub extra_samples: u32,
    pub random_rays: u32,
    pub expand_rings: u32,
    pub contract_rings: u32,
    pub add_downward_occluder: bool,
    /// Also remove every triangle entirely on or below this plane
    pub discard_below: Option<GroundPlane>,
}

impl OcclusionSettings {
    pub fn from_options(options: &ApproximationOptions, discard_below: Option<GroundPlane>) -> Self {
        Self {
            extra_samples: options.occlusion_extra_samples,
            random_rays: options.occlusion_random_rays,
            expand_rings: options.occlusion_expand_rings,
            contract_rings: options.occlusion_contract_rings,
            add_downward_occluder: options.add_downward_faces_occluder,
            discard_below,
        }
    }
}

/// Horizontal square below the mesh that blocks downward rays
#[derive(Debug, Clone, Copy)]
struct DownwardOccluder {
    z: f32,
    center: Vec2,
    half_extent: f32,
}

impl DownwardOccluder {
    fn below(bounds: &Aabb) -> Self {
        Self {
            z: bounds.min.z - 1.0,
            center: bounds.center().truncate(),
            half_extent: bounds.max_dim() * 5.0,
        }
    }

    fn blocks(&self, origin: Vec3, dir: Vec3) -> bool {
        if dir.z >= 0.0 || origin.z <= self.z {
            return false;
        }
        let t = (self.z - origin.z) / dir.z;
        let hit = (origin + dir * t).truncate() - self.center;
        hit.abs().max_element() <= self.half_extent
    }
}

struct Visibility<'a> {
    bvh: &'a MeshBvh,
    occluder: Option<DownwardOccluder>,
}

impl Visibility<'_> {
    fn escapes(&self, origin: Vec3, dir: Vec3) -> bool {
        if self.occluder.is_some_and(|o| o.blocks(origin, dir)) {
            return false;
        }
        !self.bvh.any_hit(origin, dir, f32::MAX)
    }
}

/// Cosine-weighted direction in the hemisphere around `n`
fn hemisphere_direction(rng: &mut Pcg32, n: Vec3) -> Vec3 {
    let (u, v) = plane_basis(n);
    let r1: f32 = rng.random();
    let r2: f32 = rng.random();
    let phi = std::f32::consts::TAU * r1;
    let r = r2.sqrt();
    (u * (r * phi.cos()) + v * (r * phi.sin()) + n * (1.0 - r2).max(0.0).sqrt()).normalize_or(n)
}

fn random_barycentric(rng: &mut Pcg32) -> Vec3 {
    let mut a: f32 = rng.random();
    let mut b: f32 = rng.random();
    if a + b > 1.0 {
        a = 1.0 - a;
        b = 1.0 - b;
    }
    Vec3::new(1.0 - a - b, a, b)
}

fn triangle_visible(
    mesh: &TriangleMesh,
    t: usize,
    visibility: &Visibility,
    settings: &OcclusionSettings,
    offset: f32,
) -> bool {
    let [a, b, c] = mesh.triangle_positions(t);
    let n = mesh.triangle_normal(t);
    if n == Vec3::ZERO {
        return true;
    }
    let centroid = (a + b + c) / 3.0;
    let mut rng = Pcg32::seed_from_u64(t as u64);

    let mut samples = vec![
        centroid,
        a.lerp(centroid, VERTEX_INSET),
        b.lerp(centroid, VERTEX_INSET),
        c.lerp(centroid, VERTEX_INSET),
    ];
    for _ in 0..settings.extra_samples {
        let w = random_barycentric(&mut rng);
        samples.push(a * w.x + b * w.y + c * w.z);
    }

    samples.into_iter().any(|p| {
        let origin = p + n * offset;
        if visibility.escapes(origin, n) {
            return true;
        }
        (0..settings.random_rays).any(|_| visibility.escapes(origin, hemisphere_direction(&mut rng, n)))
    })
}

/// Grow the selection by one ring of vertex-adjacent triangles
fn expand_selection(selected: &mut [bool], mesh: &TriangleMesh, vertex_triangles: &[Vec<u32>]) {
    let mut touched = vec![false; mesh.vertex_count()];
    for (t, tri) in mesh.triangles.iter().enumerate() {
        if selected[t] {
            for &v in tri {
                touched[v as usize] = true;
            }
        }
    }
    for (v, tris) in vertex_triangles.iter().enumerate() {
        if touched[v] {
            for &t in tris {
                selected[t as usize] = true;
            }
        }
    }
}

/// Drop selected triangles that touch an unselected one
fn contract_selection(selected: &mut [bool], mesh: &TriangleMesh, vertex_triangles: &[Vec<u32>]) {
    let border: Vec<bool> = vertex_triangles
        .iter()
        .map(|tris| tris.iter().any(|&t| !selected[t as usize]))
        .collect();
    for (t, tri) in mesh.triangles.iter().enumerate() {
        if selected[t] && tri.iter().any(|&v| border[v as usize]) {
            selected[t] = false;
        }
    }
}

/// Remove hidden triangles from `mesh`, returning how many were removed
///
/// Unreferenced vertices are dropped along with the triangles.
pub fn remove_occluded_triangles(mesh: &mut TriangleMesh, settings: &OcclusionSettings) -> usize {
    if mesh.is_empty() {
        return 0;
    }
    let bounds = mesh.bounds();
    let bvh = MeshBvh::build(mesh);
    let visibility = Visibility {
        bvh: &bvh,
        occluder: settings.add_downward_occluder.then(|| DownwardOccluder::below(&bounds)),
    };
    let offset = (bounds.max_dim() * SAMPLE_OFFSET_FRACTION).max(1e-5);

    let mut selected: Vec<bool> = (0..mesh.triangle_count())
        .into_par_iter()
        .map(|t| !triangle_visible(mesh, t, &visibility, settings, offset))
        .collect();
    let occluded = selected.iter().filter(|&&s| s).count();

    let vertex_triangles = mesh.vertex_triangles();
    for _ in 0..settings.expand_rings {
        expand_selection(&mut selected, mesh, &vertex_triangles);
    }
    for _ in 0..settings.contract_rings {
        contract_selection(&mut selected, mesh, &vertex_triangles);
    }

    if let Some(plane) = settings.discard_below {
        for (t, tri) in mesh.triangles.iter().enumerate() {
            if tri.iter().all(|&v| plane.signed_distance(mesh.positions[v as usize]) <= 0.0) {
                selected[t] = true;
            }
        }
    }

    let removed = mesh.remove_triangles(&selected);
    tracing::debug!("Occlusion: {occluded} occluded, {removed} removed after cleanup");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OcclusionSettings {
        OcclusionSettings {
            extra_samples: 8,
            random_rays: 8,
            expand_rings: 1,
            contract_rings: 2,
            add_downward_occluder: false,
            discard_below: None,
        }
    }

    #[test]
    fn test_exposed_cube_keeps_everything() {
        let mut mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::splat(10.0));
        assert_eq!(remove_occluded_triangles(&mut mesh, &settings()), 0);
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn test_enclosed_cube_is_removed() {
        // A small cube fully inside a large one, the inner one facing outward
        let mut mesh = TriangleMesh::cube(Vec3::splat(-50.0), Vec3::splat(100.0));
        mesh.append(&TriangleMesh::cube(Vec3::splat(-5.0), Vec3::splat(10.0)));
        let mut s = settings();
        s.expand_rings = 0;
        s.contract_rings = 0;
        let removed = remove_occluded_triangles(&mut mesh, &s);
        assert_eq!(removed, 12);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(mesh.bounds().min.x < -49.0);
    }

    #[test]
    fn test_cleanup_keeps_disjoint_hidden_part_selected() {
        let mut mesh = TriangleMesh::cube(Vec3::splat(-50.0), Vec3::splat(100.0));
        mesh.append(&TriangleMesh::cube(Vec3::splat(-5.0), Vec3::splat(10.0)));
        // No visible triangle touches the inner cube, so contraction has no border to shrink from
        let removed = remove_occluded_triangles(&mut mesh, &settings());
        assert_eq!(removed, 12);
        assert_eq!(mesh.vertex_count(), 8);
    }

    #[test]
    fn test_contract_selection_shrinks_from_border() {
        let mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        let vertex_triangles = mesh.vertex_triangles();
        let mut selected = vec![true; 12];
        selected[0] = false;
        contract_selection(&mut selected, &mesh, &vertex_triangles);
        // Every triangle shares a vertex with triangle 0 or is unaffected
        let [a, b, c] = mesh.triangles[0];
        for (t, tri) in mesh.triangles.iter().enumerate() {
            let touches = tri.contains(&a) || tri.contains(&b) || tri.contains(&c);
            assert_eq!(selected[t], !touches);
        }
    }

    #[test]
    fn test_downward_occluder_hides_bottom() {
        let mut mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::splat(10.0));
        let mut s = settings();
        s.random_rays = 0;
        s.extra_samples = 0;
        s.expand_rings = 0;
        s.contract_rings = 0;
        s.add_downward_occluder = true;
        let removed = remove_occluded_triangles(&mut mesh, &s);
        assert_eq!(removed, 2);
        assert!(mesh.triangles.iter().all(|tri| tri.iter().any(|&v| mesh.positions[v as usize].z > 0.0)));
    }

    #[test]
    fn test_ground_discard_ignores_visibility() {
        let mut mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::splat(10.0));
        let mut s = settings();
        s.discard_below = Some(GroundPlane::new(0.0));
        let removed = remove_occluded_triangles(&mut mesh, &s);
        assert_eq!(removed, 2);
        for t in 0..mesh.triangle_count() {
            let [a, b, c] = mesh.triangle_positions(t);
            assert!(a.z > 0.0 || b.z > 0.0 || c.z > 0.0);
        }
    }
}
