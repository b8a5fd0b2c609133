//! Quadric-error edge-collapse simplification
//!
//! Garland-Heckbert quadrics with boundary constraint planes. Collapses are
//! taken cheapest first from a binary heap; stale heap entries are skipped
//! by comparing per-vertex version stamps. A collapse is rejected when it
//! would break the link condition, flip or degenerate a neighbouring face,
//! or (with a projection target) move the surface farther than the allowed
//! tolerance.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use glam::{DMat3, DVec3, Vec3};
use smallvec::SmallVec;

use crate::error::MeshGenerationError;
use crate::mesh::TriangleMesh;
use crate::options::{ApproximationOptions, SimplificationPolicy, meters_to_units};
use crate::solidify::Cancel;
use crate::spatial::MeshBvh;

/// Square centimeters per square meter
const CM2_PER_M2: f64 = 10_000.0;

/// Minimum cosine between a face normal before and after a collapse
const MIN_NORMAL_COSINE: f32 = 0.2;

/// Weight of the planes that pin open boundaries in place
const BOUNDARY_WEIGHT: f64 = 1000.0;

/// Collapses between cancellation checks
const CANCEL_POLL_INTERVAL: usize = 4096;

/// When to stop collapsing
#[derive(Debug, Clone, Copy)]
pub enum SimplifyTarget<'a> {
    /// Collapse until at most this many triangles remain
    TriangleCount(usize),
    /// Collapse while the surface stays within `tolerance` of `projection`,
    /// never going below `floor` triangles
    GeometricTolerance {
        tolerance: f32,
        projection: &'a MeshBvh,
        floor: usize,
    },
}

/// Symmetric 4x4 quadric, upper triangle row-major
#[derive(Debug, Clone, Copy, Default)]
struct Quadric([f64; 10]);

impl Quadric {
    fn from_plane(n: DVec3, d: f64, weight: f64) -> Self {
        let (a, b, c) = (n.x, n.y, n.z);
        Self(
            [
                a * a,
                a * b,
                a * c,
                a * d,
                b * b,
                b * c,
                b * d,
                c * c,
                c * d,
                d * d,
            ]
            .map(|v| v * weight),
        )
    }

    fn add(&mut self, other: &Quadric) {
        for (a, b) in self.0.iter_mut().zip(other.0) {
            *a += b;
        }
    }

    fn evaluate(&self, p: DVec3) -> f64 {
        let q = &self.0;
        let (x, y, z) = (p.x, p.y, p.z);
        q[0] * x * x + 2.0 * q[1] * x * y + 2.0 * q[2] * x * z + 2.0 * q[3] * x
            + q[4] * y * y
            + 2.0 * q[5] * y * z
            + 2.0 * q[6] * y
            + q[7] * z * z
            + 2.0 * q[8] * z
            + q[9]
    }

    /// Position minimizing the quadric, if the system is well conditioned
    fn minimizer(&self) -> Option<DVec3> {
        let q = &self.0;
        let m = DMat3::from_cols(
            DVec3::new(q[0], q[1], q[2]),
            DVec3::new(q[1], q[4], q[5]),
            DVec3::new(q[2], q[5], q[7]),
        );
        let det = m.determinant();
        if det.abs() < 1e-12 {
            return None;
        }
        Some(m.inverse() * -DVec3::new(q[3], q[6], q[8]))
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    cost: f64,
    v0: u32,
    v1: u32,
    stamp0: u32,
    stamp1: u32,
    position: Vec3,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed so the max-heap pops the cheapest collapse
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.v0.cmp(&self.v0))
            .then_with(|| other.v1.cmp(&self.v1))
    }
}

struct Collapser<'a> {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    triangle_alive: Vec<bool>,
    incident: Vec<SmallVec<[u32; 8]>>,
    quadrics: Vec<Quadric>,
    stamps: Vec<u32>,
    vertex_alive: Vec<bool>,
    alive_triangles: usize,
    heap: BinaryHeap<Candidate>,
    target: SimplifyTarget<'a>,
}

impl<'a> Collapser<'a> {
    fn new(mesh: &TriangleMesh, target: SimplifyTarget<'a>) -> Self {
        let vertex_count = mesh.vertex_count();
        let mut incident: Vec<SmallVec<[u32; 8]>> = vec![SmallVec::new(); vertex_count];
        let mut quadrics = vec![Quadric::default(); vertex_count];

        for (t, tri) in mesh.triangles.iter().enumerate() {
            let [a, b, c] = mesh.triangle_positions(t).map(|p| p.as_dvec3());
            let cross = (b - a).cross(c - a);
            let area = cross.length() * 0.5;
            if area > 0.0 {
                let n = cross / (2.0 * area);
                let plane = Quadric::from_plane(n, -n.dot(a), area);
                for &v in tri {
                    quadrics[v as usize].add(&plane);
                }
            }
            for &v in tri {
                incident[v as usize].push(t as u32);
            }
        }

        // Pin open boundaries with planes perpendicular to their faces
        for (a, b) in mesh.boundary_edges() {
            let pa = mesh.positions[a as usize].as_dvec3();
            let pb = mesh.positions[b as usize].as_dvec3();
            let Some(&t) = incident[a as usize]
                .iter()
                .find(|&&t| mesh.triangles[t as usize].contains(&b))
            else {
                continue;
            };
            let face_normal = mesh.triangle_normal(t as usize).as_dvec3();
            let edge = pb - pa;
            let n = edge.cross(face_normal).normalize_or_zero();
            if n != DVec3::ZERO {
                let plane = Quadric::from_plane(n, -n.dot(pa), BOUNDARY_WEIGHT * edge.length_squared());
                quadrics[a as usize].add(&plane);
                quadrics[b as usize].add(&plane);
            }
        }

        let mut collapser = Self {
            positions: mesh.positions.clone(),
            triangles: mesh.triangles.clone(),
            triangle_alive: vec![true; mesh.triangle_count()],
            incident,
            quadrics,
            stamps: vec![0; vertex_count],
            vertex_alive: vec![true; vertex_count],
            alive_triangles: mesh.triangle_count(),
            heap: BinaryHeap::new(),
            target,
        };
        for tri in &mesh.triangles {
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                // Each interior edge appears twice; push it once
                if a < b || !collapser.has_directed_edge(b, a) {
                    collapser.push_candidate(a, b);
                }
            }
        }
        collapser
    }

    fn has_directed_edge(&self, a: u32, b: u32) -> bool {
        self.incident[a as usize].iter().any(|&t| {
            let tri = self.triangles[t as usize];
            (0..3).any(|i| tri[i] == a && tri[(i + 1) % 3] == b)
        })
    }

    fn push_candidate(&mut self, v0: u32, v1: u32) {
        let mut q = self.quadrics[v0 as usize];
        q.add(&self.quadrics[v1 as usize]);
        let p0 = self.positions[v0 as usize].as_dvec3();
        let p1 = self.positions[v1 as usize].as_dvec3();

        let mut best = (q.evaluate(p0), p0);
        for p in [p1, (p0 + p1) * 0.5].into_iter().chain(q.minimizer()) {
            // Keep the optimum near the edge so it cannot fly off on near-singular systems
            if p.distance_squared(p0.lerp(p1, 0.5)) > p0.distance_squared(p1) * 4.0 {
                continue;
            }
            let cost = q.evaluate(p);
            if cost < best.0 {
                best = (cost, p);
            }
        }

        self.heap.push(Candidate {
            cost: best.0.max(0.0),
            v0,
            v1,
            stamp0: self.stamps[v0 as usize],
            stamp1: self.stamps[v1 as usize],
            position: best.1.as_vec3(),
        });
    }

    fn floor(&self) -> usize {
        match self.target {
            SimplifyTarget::TriangleCount(count) => count,
            SimplifyTarget::GeometricTolerance { floor, .. } => floor,
        }
    }

    fn run(&mut self, cancel: Cancel) -> Result<(), MeshGenerationError> {
        let floor = self.floor();
        let mut collapses = 0usize;
        while self.alive_triangles > floor {
            let Some(candidate) = self.heap.pop() else {
                break;
            };
            let (v0, v1) = (candidate.v0 as usize, candidate.v1 as usize);
            if !self.vertex_alive[v0]
                || !self.vertex_alive[v1]
                || self.stamps[v0] != candidate.stamp0
                || self.stamps[v1] != candidate.stamp1
            {
                continue;
            }
            if self.try_collapse(candidate.v0, candidate.v1, candidate.position) {
                collapses += 1;
                if collapses % CANCEL_POLL_INTERVAL == 0 && cancel() {
                    return Err(MeshGenerationError::Cancelled { stage: "simplify" });
                }
            }
        }
        Ok(())
    }

    fn neighbours(&self, v: u32) -> SmallVec<[u32; 16]> {
        let mut result: SmallVec<[u32; 16]> = SmallVec::new();
        for &t in &self.incident[v as usize] {
            for &w in &self.triangles[t as usize] {
                if w != v && !result.contains(&w) {
                    result.push(w);
                }
            }
        }
        result
    }

    fn try_collapse(&mut self, v0: u32, v1: u32, position: Vec3) -> bool {
        // Faces on the edge, and the vertices opposite it
        let shared: SmallVec<[u32; 4]> = self.incident[v0 as usize]
            .iter()
            .copied()
            .filter(|&t| self.triangles[t as usize].contains(&v1))
            .collect();
        if shared.is_empty() || shared.len() > 2 {
            return false;
        }

        // Link condition: common neighbours are exactly the opposite vertices
        let n0 = self.neighbours(v0);
        let n1 = self.neighbours(v1);
        let common = n0.iter().filter(|w| n1.contains(w)).count();
        if common != shared.len() {
            return false;
        }
        // Collapsing a tetrahedron-like configuration would leave a degenerate sliver
        if self.alive_triangles.saturating_sub(shared.len()) < 2 {
            return false;
        }

        // Faces that move must keep their orientation
        for &v in &[v0, v1] {
            for &t in &self.incident[v as usize] {
                if shared.contains(&t) {
                    continue;
                }
                let tri = self.triangles[t as usize];
                let old = tri.map(|w| self.positions[w as usize]);
                let new = tri.map(|w| if w == v0 || w == v1 { position } else { self.positions[w as usize] });
                let old_n = (old[1] - old[0]).cross(old[2] - old[0]).normalize_or_zero();
                let new_n = (new[1] - new[0]).cross(new[2] - new[0]).normalize_or_zero();
                if new_n == Vec3::ZERO || old_n.dot(new_n) < MIN_NORMAL_COSINE {
                    return false;
                }
            }
        }

        if let SimplifyTarget::GeometricTolerance {
            tolerance,
            projection,
            ..
        } = self.target
        {
            let limit = tolerance * tolerance;
            let within = |p: Vec3| projection.nearest(p).is_some_and(|hit| hit.distance_squared <= limit);
            if !within(position) {
                return false;
            }
            for &v in &[v0, v1] {
                for &t in &self.incident[v as usize] {
                    if shared.contains(&t) {
                        continue;
                    }
                    let tri = self.triangles[t as usize];
                    let centroid = tri
                        .map(|w| if w == v0 || w == v1 { position } else { self.positions[w as usize] })
                        .iter()
                        .sum::<Vec3>()
                        / 3.0;
                    if !within(centroid) {
                        return false;
                    }
                }
            }
        }

        // Commit: v1 merges into v0
        for &t in &shared {
            self.triangle_alive[t as usize] = false;
            self.alive_triangles -= 1;
        }
        let moved: SmallVec<[u32; 8]> = self.incident[v1 as usize]
            .iter()
            .copied()
            .filter(|t| !shared.contains(t))
            .collect();
        for &t in &moved {
            for w in &mut self.triangles[t as usize] {
                if *w == v1 {
                    *w = v0;
                }
            }
        }
        let mut merged: SmallVec<[u32; 8]> = self.incident[v0 as usize]
            .iter()
            .copied()
            .filter(|t| !shared.contains(t))
            .collect();
        merged.extend(moved);
        self.incident[v0 as usize] = merged;
        self.incident[v1 as usize].clear();
        for &w in &n1 {
            if w != v0 {
                self.incident[w as usize].retain(|t| self.triangle_alive[*t as usize]);
            }
        }
        for &w in &n0 {
            self.incident[w as usize].retain(|t| self.triangle_alive[*t as usize]);
        }

        self.positions[v0 as usize] = position;
        let q1 = self.quadrics[v1 as usize];
        self.quadrics[v0 as usize].add(&q1);
        self.vertex_alive[v1 as usize] = false;
        self.stamps[v0 as usize] += 1;
        self.stamps[v1 as usize] += 1;
        self.requeue_around(v0);
        true
    }

    /// Re-push every edge whose faces the last collapse touched
    ///
    /// Stamps of the one-ring are bumped, so earlier entries for these edges
    /// (including ones rejected while the neighbourhood looked different) go
    /// stale and are evaluated again against the new geometry.
    fn requeue_around(&mut self, v0: u32) {
        let ring = self.neighbours(v0);
        for &w in &ring {
            self.stamps[w as usize] += 1;
        }
        for &w in &ring {
            self.push_candidate(v0, w);
        }
        for &w in &ring {
            for x in self.neighbours(w) {
                // Ring-to-ring edges are pushed once, from their lower end
                if x == v0 || (ring.contains(&x) && x < w) {
                    continue;
                }
                self.push_candidate(w, x);
            }
        }
    }

    fn into_mesh(self) -> TriangleMesh {
        let triangles = self
            .triangles
            .into_iter()
            .zip(self.triangle_alive)
            .filter_map(|(tri, alive)| alive.then_some(tri))
            .collect();
        let mut mesh = TriangleMesh::from_parts(self.positions, triangles);
        mesh.compact_vertices();
        mesh
    }
}

/// Simplify `mesh` in place toward `target`
///
/// The triangle count never increases. Attributes are dropped.
pub fn simplify(mesh: &mut TriangleMesh, target: SimplifyTarget, cancel: Cancel) -> Result<(), MeshGenerationError> {
    if mesh.triangle_count() <= target_floor(&target) {
        return Ok(());
    }
    let mut collapser = Collapser::new(mesh, target);
    collapser.run(cancel)?;
    *mesh = collapser.into_mesh();
    Ok(())
}

fn target_floor(target: &SimplifyTarget) -> usize {
    match target {
        SimplifyTarget::TriangleCount(count) => *count,
        SimplifyTarget::GeometricTolerance { floor, .. } => *floor,
    }
}

/// Apply the configured simplification policy
pub fn simplify_with_policy(
    mesh: &mut TriangleMesh,
    options: &ApproximationOptions,
    cancel: Cancel,
) -> Result<(), MeshGenerationError> {
    let before = mesh.triangle_count();
    match options.simplify_policy {
        SimplificationPolicy::FixedTriangleCount => {
            simplify(mesh, SimplifyTarget::TriangleCount(options.fixed_triangle_count as usize), cancel)?;
        }
        SimplificationPolicy::TrianglesPerUnitSqMeter => {
            let area_m2 = mesh.area() / CM2_PER_M2;
            let target = (area_m2 * options.simplification_target_metric).round().max(0.0) as usize;
            simplify(mesh, SimplifyTarget::TriangleCount(target), cancel)?;
        }
        SimplificationPolicy::GeometricTolerance => {
            let tolerance = meters_to_units(options.simplification_target_metric);
            // Coarse pass keeps the tolerance-checked pass tractable
            simplify(
                mesh,
                SimplifyTarget::TriangleCount(options.geometric_prepass_triangle_count as usize),
                cancel,
            )?;
            let projection = MeshBvh::build(mesh);
            simplify(
                mesh,
                SimplifyTarget::GeometricTolerance {
                    tolerance,
                    projection: &projection,
                    floor: options.geometric_final_triangle_floor as usize,
                },
                cancel,
            )?;
        }
    }
    tracing::debug!(
        "Simplified ({:?}) {before} -> {} triangles",
        options.simplify_policy,
        mesh.triangle_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Aabb;
    use crate::solidify::{ScalarGrid, extract_surface};

    fn sphere(radius: f32) -> TriangleMesh {
        let bounds = Aabb::new(Vec3::splat(-radius), Vec3::splat(radius));
        let grid = ScalarGrid::sample(&bounds, 24, |p| radius - p.length(), &|| false).unwrap();
        extract_surface(&grid, &grid.inside_mask())
    }

    #[test]
    fn test_fixed_count() {
        let mut mesh = sphere(50.0);
        let before = mesh.triangle_count();
        simplify(&mut mesh, SimplifyTarget::TriangleCount(200), &|| false).unwrap();
        assert!(mesh.triangle_count() <= 200);
        assert!(mesh.triangle_count() < before);
        assert!(mesh.is_closed());
        assert!(!mesh.has_attributes());
    }

    #[test]
    fn test_fixed_count_reached_on_voxel_cube() {
        let half = 50.0;
        let bounds = Aabb::new(Vec3::splat(-half), Vec3::splat(half));
        let grid = ScalarGrid::sample(&bounds, 32, |p| half - p.abs().max_element(), &|| false).unwrap();
        let mesh = extract_surface(&grid, &grid.inside_mask());
        assert!(mesh.triangle_count() > 2000);

        for target in [2000, 200, 100] {
            let mut simplified = mesh.clone();
            simplify(&mut simplified, SimplifyTarget::TriangleCount(target), &|| false).unwrap();
            assert!(simplified.triangle_count() <= target, "{} > {target}", simplified.triangle_count());
            assert!(simplified.is_closed());
        }
    }

    #[test]
    fn test_never_increases_for_all_policies() {
        for policy in [
            SimplificationPolicy::FixedTriangleCount,
            SimplificationPolicy::TrianglesPerUnitSqMeter,
            SimplificationPolicy::GeometricTolerance,
        ] {
            let mut options = ApproximationOptions::default();
            options.simplify_policy = policy;
            options.fixed_triangle_count = 100_000;
            options.simplification_target_metric = 0.01;
            let mut mesh = sphere(50.0);
            let before = mesh.triangle_count();
            simplify_with_policy(&mut mesh, &options, &|| false).unwrap();
            assert!(mesh.triangle_count() <= before, "{policy:?}");
            assert!(mesh.triangle_count() > 0, "{policy:?}");
        }
    }

    #[test]
    fn test_triangles_per_area_target() {
        // About 12.6 m^2 of surface at 2 triangles per m^2
        let mut mesh = sphere(100.0);
        let mut options = ApproximationOptions::default();
        options.simplify_policy = SimplificationPolicy::TrianglesPerUnitSqMeter;
        options.simplification_target_metric = 2.0;
        let target = (mesh.area() / CM2_PER_M2 * 2.0).round() as usize;
        simplify_with_policy(&mut mesh, &options, &|| false).unwrap();
        assert!(mesh.triangle_count() <= target);
    }

    #[test]
    fn test_geometric_tolerance_bounds_deviation() {
        let original = sphere(50.0);
        let mut mesh = original.clone();
        let projection = MeshBvh::build(&original);
        simplify(
            &mut mesh,
            SimplifyTarget::GeometricTolerance {
                tolerance: 1.0,
                projection: &projection,
                floor: 8,
            },
            &|| false,
        )
        .unwrap();
        assert!(mesh.triangle_count() < original.triangle_count());
        assert!(mesh.triangle_count() >= 8);
        for p in &mesh.positions {
            let hit = projection.nearest(*p).unwrap();
            assert!(hit.distance_squared <= 1.0 + 1e-4);
        }
    }

    #[test]
    fn test_open_boundary_is_pinned() {
        // A finely tessellated flat grid keeps its outline
        let n = 10;
        let mut positions = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                positions.push(Vec3::new(x as f32, y as f32, 0.0));
            }
        }
        let mut triangles = Vec::new();
        let idx = |x: u32, y: u32| y * (n + 1) + x;
        for y in 0..n {
            for x in 0..n {
                triangles.push([idx(x, y), idx(x + 1, y), idx(x + 1, y + 1)]);
                triangles.push([idx(x, y), idx(x + 1, y + 1), idx(x, y + 1)]);
            }
        }
        let mut mesh = TriangleMesh::from_parts(positions, triangles);
        simplify(&mut mesh, SimplifyTarget::TriangleCount(20), &|| false).unwrap();
        assert!(mesh.triangle_count() <= 20);
        let bounds = mesh.bounds();
        assert!(bounds.min.abs_diff_eq(Vec3::ZERO, 1e-3));
        assert!(bounds.max.abs_diff_eq(Vec3::new(10.0, 10.0, 0.0), 1e-3));
    }
}
