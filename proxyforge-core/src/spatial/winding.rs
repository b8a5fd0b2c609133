use std::f32::consts::PI;

use glam::Vec3;

use super::MeshBvh;

/// Far-field acceptance ratio: a cluster is approximated when the query
/// point is farther than `BETA` times the cluster radius
const BETA: f32 = 2.0;

#[derive(Debug, Clone, Copy, Default)]
struct ClusterMoment {
    /// Area-weighted centroid
    center: Vec3,
    /// Sum of area-weighted unit normals
    normal: Vec3,
    radius: f32,
}

/// Generalized winding number evaluator (Barill et al. 2018, first order)
///
/// Returns ~1 inside a closed, outward-oriented surface and ~0 outside,
/// degrading gracefully for open or self-intersecting input.
#[derive(Debug, Clone)]
pub struct FastWindingTree {
    bvh: MeshBvh,
    moments: Vec<ClusterMoment>,
}

impl FastWindingTree {
    pub fn new(bvh: MeshBvh) -> Self {
        let mut moments = vec![ClusterMoment::default(); bvh.nodes.len()];
        if !bvh.nodes.is_empty() {
            compute_moments(&bvh, 0, &mut moments);
        }
        Self { bvh, moments }
    }

    pub fn bvh(&self) -> &MeshBvh {
        &self.bvh
    }

    /// Winding number of `q` with respect to the whole mesh
    pub fn winding_number(&self, q: Vec3) -> f32 {
        if self.bvh.nodes.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        let mut stack = Vec::with_capacity(64);
        stack.push(0u32);
        while let Some(index) = stack.pop() {
            let node = &self.bvh.nodes[index as usize];
            let moment = &self.moments[index as usize];
            let offset = moment.center - q;
            let distance = offset.length();

            if distance > BETA * moment.radius && !node.bounds.contains(q) {
                total += moment.normal.dot(offset) / (4.0 * PI * distance * distance * distance);
            } else if node.is_leaf {
                let start = node.left_or_start as usize;
                for &t in &self.bvh.order[start..start + node.right_or_count as usize] {
                    let [a, b, c] = self.bvh.triangle_positions(t as usize);
                    total += solid_angle(a - q, b - q, c - q) / (4.0 * PI);
                }
            } else {
                stack.push(node.left_or_start);
                stack.push(node.right_or_count);
            }
        }
        total
    }
}

fn compute_moments(bvh: &MeshBvh, index: u32, moments: &mut [ClusterMoment]) -> (Vec3, f32) {
    let node = bvh.nodes[index as usize];
    let mut weighted_center = Vec3::ZERO;
    let mut normal = Vec3::ZERO;
    let mut area_sum = 0.0;

    if node.is_leaf {
        let start = node.left_or_start as usize;
        for &t in &bvh.order[start..start + node.right_or_count as usize] {
            let [a, b, c] = bvh.triangle_positions(t as usize);
            let area_vector = (b - a).cross(c - a) * 0.5;
            let area = area_vector.length();
            weighted_center += (a + b + c) / 3.0 * area;
            normal += area_vector;
            area_sum += area;
        }
    } else {
        for child in [node.left_or_start, node.right_or_count] {
            let (child_weighted, child_area) = compute_moments(bvh, child, moments);
            weighted_center += child_weighted;
            normal += moments[child as usize].normal;
            area_sum += child_area;
        }
    }

    let center = if area_sum > 0.0 {
        weighted_center / area_sum
    } else {
        node.bounds.center()
    };
    // Farthest bounding-box corner bounds every triangle in the cluster
    let radius = (node.bounds.max - center)
        .abs()
        .max((node.bounds.min - center).abs())
        .length();
    moments[index as usize] = ClusterMoment {
        center,
        normal,
        radius,
    };
    (weighted_center, area_sum)
}

/// Signed solid angle subtended by a triangle (Van Oosterom and Strackee)
#[inline]
fn solid_angle(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let la = a.length();
    let lb = b.length();
    let lc = c.length();
    let numerator = a.dot(b.cross(c));
    let denominator = la * lb * lc + a.dot(b) * lc + b.dot(c) * la + c.dot(a) * lb;
    2.0 * numerator.atan2(denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::TriangleMesh;

    #[test]
    fn test_cube_inside_outside() {
        let mut mesh = TriangleMesh::new();
        // Several cubes so the tree has internal nodes
        for i in 0..6 {
            mesh.append(&TriangleMesh::cube(
                Vec3::new(i as f32 * 20.0, 0.0, 0.0),
                Vec3::splat(10.0),
            ));
        }
        let tree = FastWindingTree::new(MeshBvh::build(&mesh));

        assert!((tree.winding_number(Vec3::splat(5.0)) - 1.0).abs() < 0.05);
        assert!((tree.winding_number(Vec3::new(45.0, 5.0, 5.0)) - 1.0).abs() < 0.05);
        assert!(tree.winding_number(Vec3::new(15.0, 5.0, 5.0)).abs() < 0.1);
        assert!(tree.winding_number(Vec3::new(500.0, 500.0, 500.0)).abs() < 0.01);
    }

    #[test]
    fn test_open_surface_is_fractional() {
        let mut cube = TriangleMesh::cube(Vec3::ZERO, Vec3::splat(10.0));
        // Drop the top face
        let mut remove = vec![false; 12];
        remove[2] = true;
        remove[3] = true;
        cube.remove_triangles(&remove);
        let tree = FastWindingTree::new(MeshBvh::build(&cube));
        let w = tree.winding_number(Vec3::new(5.0, 5.0, 5.0));
        assert!(w > 0.2 && w < 0.9);
    }
}
