//! Ground-plane clipping
//!
//! Everything below the plane is cut away. Crossing triangles are bisected
//! with split vertices shared along each cut edge, so the cut boundary is a
//! set of clean loops that [`clip_to_plane`] can optionally cap.

use glam::{Vec2, Vec3};
use hashbrown::HashMap;

use crate::geometry::{GroundPlane, signed_area_2d};
use crate::mesh::TriangleMesh;

/// What happens to the open boundary left by the cut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipMode {
    /// Leave the open cut boundary
    Cut,
    /// Triangulate a downward-facing cap over every cut loop
    CutAndFill,
}

/// Outcome of one clip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipReport {
    pub triangles_before: usize,
    /// Triangles kept from the input, before any cap; cap triangles follow them
    pub body_triangles: usize,
    pub triangles_after: usize,
    pub cap_triangles: usize,
}

struct Splitter<'a> {
    positions: &'a mut Vec<Vec3>,
    distances: &'a [f32],
    height: f32,
    cache: HashMap<(u32, u32), u32>,
}

impl Splitter<'_> {
    /// Vertex where edge `a-b` crosses the plane
    fn split(&mut self, a: u32, b: u32) -> u32 {
        let (da, db) = (self.distances[a as usize], self.distances[b as usize]);
        if da == 0.0 {
            return a;
        }
        if db == 0.0 {
            return b;
        }
        let key = (a.min(b), a.max(b));
        if let Some(&v) = self.cache.get(&key) {
            return v;
        }
        let t = da / (da - db);
        let mut p = self.positions[a as usize].lerp(self.positions[b as usize], t);
        p.z = self.height;
        let v = self.positions.len() as u32;
        self.positions.push(p);
        self.cache.insert(key, v);
        v
    }
}

/// Cut `mesh` at `plane`, keeping the part above it
///
/// Attributes are dropped; callers re-enable them once topology is final.
pub fn clip_to_plane(mesh: &mut TriangleMesh, plane: &GroundPlane, mode: ClipMode) -> ClipReport {
    let triangles_before = mesh.triangle_count();
    mesh.disable_attributes();
    let distances: Vec<f32> = mesh.positions.iter().map(|&p| plane.signed_distance(p)).collect();

    let mut positions = std::mem::take(&mut mesh.positions);
    let mut splitter = Splitter {
        positions: &mut positions,
        distances: &distances,
        height: plane.height,
        cache: HashMap::new(),
    };
    let mut triangles = Vec::with_capacity(mesh.triangles.len());
    for &tri in &mesh.triangles {
        let d = tri.map(|v| distances[v as usize]);
        if d.iter().all(|&x| x >= 0.0) {
            if d.iter().any(|&x| x > 0.0) {
                triangles.push(tri);
            }
            continue;
        }
        if d.iter().all(|&x| x <= 0.0) {
            continue;
        }

        let below = d.iter().filter(|&&x| x < 0.0).count();
        // Rotate so the vertex on its own side comes first
        let odd = (0..3)
            .find(|&i| (d[i] < 0.0) == (below == 1))
            .unwrap_or(0);
        let [a, b, c] = [tri[odd], tri[(odd + 1) % 3], tri[(odd + 2) % 3]];
        let ab = splitter.split(a, b);
        let ca = splitter.split(c, a);
        let pieces: &[[u32; 3]] = if below == 2 {
            &[[a, ab, ca]]
        } else {
            &[[ab, b, c], [ab, c, ca]]
        };
        for &piece in pieces {
            if piece[0] != piece[1] && piece[1] != piece[2] && piece[0] != piece[2] {
                triangles.push(piece);
            }
        }
    }

    mesh.positions = positions;
    mesh.triangles = triangles;
    mesh.compact_vertices();

    let body_triangles = mesh.triangle_count();
    let cap_triangles = match mode {
        ClipMode::Cut => 0,
        ClipMode::CutAndFill => fill_cut_loops(mesh, plane),
    };
    ClipReport {
        triangles_before,
        body_triangles,
        triangles_after: mesh.triangle_count(),
        cap_triangles,
    }
}

/// Chain boundary edges lying on the plane into closed loops
fn cut_loops(mesh: &TriangleMesh, plane: &GroundPlane) -> Vec<Vec<u32>> {
    let on_plane = |v: u32| plane.signed_distance(mesh.positions[v as usize]).abs() <= 1e-4;
    let mut next: HashMap<u32, u32> = HashMap::new();
    for (a, b) in mesh.boundary_edges() {
        if on_plane(a) && on_plane(b) {
            next.insert(a, b);
        }
    }

    let mut loops = Vec::new();
    let mut starts: Vec<u32> = next.keys().copied().collect();
    starts.sort_unstable();
    for start in starts {
        if !next.contains_key(&start) {
            continue;
        }
        let mut chain = vec![start];
        let mut current = start;
        let mut closed = false;
        while let Some(n) = next.remove(&current) {
            if n == start {
                closed = true;
                break;
            }
            chain.push(n);
            current = n;
        }
        if closed && chain.len() >= 3 {
            loops.push(chain);
        }
    }
    loops
}

fn point_in_polygon(p: Vec2, polygon: &[Vec2]) -> bool {
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn polygon_area(polygon: &[Vec2]) -> f32 {
    let origin = polygon[0];
    polygon
        .windows(2)
        .map(|w| signed_area_2d(origin, w[0], w[1]))
        .sum()
}

/// Triangulate caps over the cut loops, returning the number of cap triangles
fn fill_cut_loops(mesh: &mut TriangleMesh, plane: &GroundPlane) -> usize {
    let loops = cut_loops(mesh, plane);
    if loops.is_empty() {
        return 0;
    }
    let flat: Vec<Vec<Vec2>> = loops
        .iter()
        .map(|l| l.iter().map(|&v| mesh.positions[v as usize].truncate()).collect())
        .collect();
    let areas: Vec<f32> = flat.iter().map(|p| polygon_area(p)).collect();

    // The largest loop is an outer boundary; loops winding the other way are holes
    let Some(largest) = (0..loops.len()).max_by(|&a, &b| areas[a].abs().total_cmp(&areas[b].abs())) else {
        return 0;
    };
    let outer_sign = areas[largest].signum();
    let outers: Vec<usize> = (0..loops.len()).filter(|&i| areas[i].signum() == outer_sign).collect();
    let mut holes_of: HashMap<usize, Vec<usize>> = HashMap::new();
    for hole in (0..loops.len()).filter(|&i| areas[i].signum() != outer_sign) {
        let sample = flat[hole][0];
        let owner = outers
            .iter()
            .copied()
            .filter(|&o| point_in_polygon(sample, &flat[o]))
            .min_by(|&a, &b| areas[a].abs().total_cmp(&areas[b].abs()));
        match owner {
            Some(o) => holes_of.entry(o).or_default().push(hole),
            None => tracing::warn!("Ground cap: hole loop with no enclosing boundary, skipped"),
        }
    }

    let first_cap = mesh.triangle_count();
    for &outer in &outers {
        let mut ring: Vec<usize> = vec![outer];
        ring.extend(holes_of.get(&outer).into_iter().flatten().copied());

        let mut data = Vec::new();
        let mut hole_indices = Vec::new();
        let mut vertices = Vec::new();
        for (k, &l) in ring.iter().enumerate() {
            if k > 0 {
                hole_indices.push(vertices.len());
            }
            for (&v, p) in loops[l].iter().zip(&flat[l]) {
                data.push(f64::from(p.x));
                data.push(f64::from(p.y));
                vertices.push(v);
            }
        }

        let indices = match earcutr::earcut(&data, &hole_indices, 2) {
            Ok(indices) => indices,
            Err(err) => {
                tracing::warn!("Ground cap triangulation failed: {err:?}");
                continue;
            }
        };
        for corner in indices.chunks_exact(3) {
            let tri = [vertices[corner[0]], vertices[corner[1]], vertices[corner[2]]];
            // Caps face down
            let [a, b, c] = tri.map(|v| mesh.positions[v as usize].truncate());
            let tri = if signed_area_2d(a, b, c) > 0.0 {
                [tri[0], tri[2], tri[1]]
            } else {
                tri
            };
            mesh.triangles.push(tri);
        }
    }

    // The triangulator drops collinear loop vertices; stitch them back in
    let mut used = vec![false; mesh.vertex_count()];
    for tri in &mesh.triangles[first_cap..] {
        for &v in tri {
            used[v as usize] = true;
        }
    }
    for &v in loops.iter().flatten() {
        if !used[v as usize] {
            split_cap_edge(mesh, first_cap, v);
        }
    }
    mesh.triangle_count() - first_cap
}

/// Split the cap triangle whose edge passes through vertex `v`
fn split_cap_edge(mesh: &mut TriangleMesh, first_cap: usize, v: u32) {
    let p = mesh.positions[v as usize].truncate();
    for t in first_cap..mesh.triangles.len() {
        let tri = mesh.triangles[t];
        for i in 0..3 {
            let (a, b, c) = (tri[i], tri[(i + 1) % 3], tri[(i + 2) % 3]);
            let pa = mesh.positions[a as usize].truncate();
            let pb = mesh.positions[b as usize].truncate();
            let edge = pb - pa;
            let length_squared = edge.length_squared();
            if length_squared <= 0.0 {
                continue;
            }
            let s = (p - pa).dot(edge) / length_squared;
            let offset = (p - pa).perp_dot(edge).abs() / length_squared.sqrt();
            if s > 0.0 && s < 1.0 && offset <= 1e-4 {
                mesh.triangles[t] = [a, v, c];
                mesh.triangles.push([v, b, c]);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straddling_cube() -> TriangleMesh {
        TriangleMesh::cube(Vec3::new(0.0, 0.0, -5.0), Vec3::splat(10.0))
    }

    #[test]
    fn test_cut_leaves_open_boundary() {
        let mut mesh = straddling_cube();
        let report = clip_to_plane(&mut mesh, &GroundPlane::new(0.0), ClipMode::Cut);
        assert_eq!(report.cap_triangles, 0);
        assert!(!mesh.is_closed());
        assert!(mesh.positions.iter().all(|p| p.z >= 0.0));
        assert!((mesh.bounds().max.z - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_cut_and_fill_closes_mesh() {
        let mut mesh = straddling_cube();
        let report = clip_to_plane(&mut mesh, &GroundPlane::new(0.0), ClipMode::CutAndFill);
        assert!(report.cap_triangles >= 2);
        assert!(mesh.is_closed());
        // Cap triangles point down
        assert_eq!(report.body_triangles + report.cap_triangles, mesh.triangle_count());
        for t in report.body_triangles..mesh.triangle_count() {
            assert!(mesh.triangle_normal(t).z < -0.99);
        }
        // Area: top 100 + four sides of 10x5 + cap 100
        assert!((mesh.area() - 400.0).abs() < 1e-3);
    }

    #[test]
    fn test_fill_handles_holes() {
        // A 20-wide tube with a 10-wide hollow, cut through the middle
        let mut outer = TriangleMesh::cube(Vec3::new(-10.0, -10.0, -5.0), Vec3::new(20.0, 20.0, 10.0));
        let mut inner = TriangleMesh::cube(Vec3::new(-5.0, -5.0, -5.0), Vec3::new(10.0, 10.0, 10.0));
        for tri in &mut inner.triangles {
            tri.swap(1, 2);
        }
        outer.append(&inner);
        let report = clip_to_plane(&mut outer, &GroundPlane::new(0.0), ClipMode::CutAndFill);
        assert!(outer.is_closed());
        assert!(report.cap_triangles > 0);
        let cap = report.body_triangles..outer.triangle_count();
        let cap_area: f32 = cap.clone().map(|t| outer.triangle_area(t)).sum();
        assert!((cap_area - 300.0).abs() < 1e-3);
        assert!(cap.into_iter().all(|t| outer.triangle_normal(t).z < -0.99));
    }

    #[test]
    fn test_fully_above_is_untouched() {
        let mut mesh = TriangleMesh::cube(Vec3::new(0.0, 0.0, 1.0), Vec3::ONE);
        let report = clip_to_plane(&mut mesh, &GroundPlane::new(0.0), ClipMode::CutAndFill);
        assert_eq!(report.triangles_before, 12);
        assert_eq!(report.body_triangles, 12);
        assert_eq!(report.triangles_after, 12);
        assert_eq!(report.cap_triangles, 0);
    }

    #[test]
    fn test_resting_on_plane_drops_bottom() {
        let mut mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        clip_to_plane(&mut mesh, &GroundPlane::new(0.0), ClipMode::Cut);
        assert_eq!(mesh.triangle_count(), 10);
    }
}
