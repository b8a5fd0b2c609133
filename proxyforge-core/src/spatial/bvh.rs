use glam::Vec3;

use crate::geometry::{self, Aabb};
use crate::mesh::TriangleMesh;

const MAX_LEAF_TRIANGLES: usize = 4;

#[derive(Debug, Clone, Copy)]
pub(crate) struct BvhNode {
    pub bounds: Aabb,
    /// Left child index (internal) or first entry in `order` (leaf)
    pub left_or_start: u32,
    /// Right child index (internal) or triangle count (leaf)
    pub right_or_count: u32,
    pub is_leaf: bool,
}

/// Closest ray intersection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub t: f32,
    pub triangle: u32,
    /// Barycentric weights of the triangle corners at the hit point
    pub barycentric: Vec3,
}

/// Closest surface point to a query position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestHit {
    pub triangle: u32,
    pub point: Vec3,
    pub distance_squared: f32,
}

/// Median-split AABB tree over a snapshot of a mesh
#[derive(Debug, Clone)]
pub struct MeshBvh {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    pub(crate) nodes: Vec<BvhNode>,
    /// Triangle indices in leaf order
    pub(crate) order: Vec<u32>,
}

impl MeshBvh {
    pub fn build(mesh: &TriangleMesh) -> Self {
        Self::from_parts(mesh.positions.clone(), mesh.triangles.clone())
    }

    pub fn from_parts(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        let count = triangles.len();
        let mut bvh = Self {
            positions,
            triangles,
            nodes: Vec::with_capacity(count.max(1) * 2 / MAX_LEAF_TRIANGLES + 1),
            order: (0..count as u32).collect(),
        };
        if count == 0 {
            return bvh;
        }

        let bounds: Vec<Aabb> = (0..count).map(|t| bvh.triangle_bounds(t)).collect();
        let centroids: Vec<Vec3> = bounds.iter().map(Aabb::center).collect();
        let mut order = std::mem::take(&mut bvh.order);
        bvh.build_recursive(&mut order, 0, count, &bounds, &centroids);
        bvh.order = order;
        bvh
    }

    fn build_recursive(
        &mut self,
        order: &mut [u32],
        start: usize,
        end: usize,
        bounds: &[Aabb],
        centroids: &[Vec3],
    ) -> u32 {
        let mut node_bounds = Aabb::EMPTY;
        for &t in &order[start..end] {
            node_bounds = node_bounds.union(&bounds[t as usize]);
        }

        let count = end - start;
        let node_index = self.nodes.len() as u32;
        if count <= MAX_LEAF_TRIANGLES {
            self.nodes.push(BvhNode {
                bounds: node_bounds,
                left_or_start: start as u32,
                right_or_count: count as u32,
                is_leaf: true,
            });
            return node_index;
        }

        // Split at the centroid median along the widest axis
        let mut centroid_bounds = Aabb::EMPTY;
        for &t in &order[start..end] {
            centroid_bounds.include(centroids[t as usize]);
        }
        let extents = centroid_bounds.extents();
        let axis = if extents.x >= extents.y && extents.x >= extents.z {
            0
        } else if extents.y >= extents.z {
            1
        } else {
            2
        };
        let mid = count / 2;
        order[start..end].select_nth_unstable_by(mid, |&a, &b| {
            centroids[a as usize][axis].total_cmp(&centroids[b as usize][axis])
        });

        self.nodes.push(BvhNode {
            bounds: node_bounds,
            left_or_start: 0,
            right_or_count: 0,
            is_leaf: false,
        });
        let left = self.build_recursive(order, start, start + mid, bounds, centroids);
        let right = self.build_recursive(order, start + mid, end, bounds, centroids);
        let node = &mut self.nodes[node_index as usize];
        node.left_or_start = left;
        node.right_or_count = right;
        node_index
    }

    fn triangle_bounds(&self, t: usize) -> Aabb {
        let [a, b, c] = self.triangle_positions(t);
        let mut bounds = Aabb::new(a, a);
        bounds.include(b);
        bounds.include(c);
        bounds
    }

    #[inline]
    pub fn triangle_positions(&self, t: usize) -> [Vec3; 3] {
        let [a, b, c] = self.triangles[t];
        [
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        ]
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn bounds(&self) -> Aabb {
        self.nodes.first().map_or(Aabb::EMPTY, |n| n.bounds)
    }

    /// Closest hit along `dir` within `max_t`
    pub fn cast_ray(&self, origin: Vec3, dir: Vec3, max_t: f32) -> Option<RayHit> {
        if self.nodes.is_empty() {
            return None;
        }
        let inv_dir = dir.recip();
        let mut best: Option<RayHit> = None;
        let mut limit = max_t;
        let mut stack = Vec::with_capacity(64);
        stack.push(0u32);

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if node.bounds.ray_entry(origin, inv_dir, limit).is_none() {
                continue;
            }
            if node.is_leaf {
                let start = node.left_or_start as usize;
                for &t in &self.order[start..start + node.right_or_count as usize] {
                    let [a, b, c] = self.triangle_positions(t as usize);
                    let Some((hit_t, u, v)) = geometry::ray_triangle(origin, dir, a, b, c) else {
                        continue;
                    };
                    if hit_t < limit {
                        limit = hit_t;
                        best = Some(RayHit {
                            t: hit_t,
                            triangle: t,
                            barycentric: Vec3::new(1.0 - u - v, u, v),
                        });
                    }
                }
            } else {
                // Push the farther child first so the nearer one is visited first
                let left = node.left_or_start;
                let right = node.right_or_count;
                let left_t = self.nodes[left as usize].bounds.ray_entry(origin, inv_dir, limit);
                let right_t = self.nodes[right as usize].bounds.ray_entry(origin, inv_dir, limit);
                match (left_t, right_t) {
                    (Some(lt), Some(rt)) if lt <= rt => {
                        stack.push(right);
                        stack.push(left);
                    }
                    (Some(_), Some(_)) => {
                        stack.push(left);
                        stack.push(right);
                    }
                    (Some(_), None) => stack.push(left),
                    (None, Some(_)) => stack.push(right),
                    (None, None) => {}
                }
            }
        }
        best
    }

    /// `true` if anything is hit closer than `max_t`
    pub fn any_hit(&self, origin: Vec3, dir: Vec3, max_t: f32) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let inv_dir = dir.recip();
        let mut stack = Vec::with_capacity(64);
        stack.push(0u32);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if node.bounds.ray_entry(origin, inv_dir, max_t).is_none() {
                continue;
            }
            if node.is_leaf {
                let start = node.left_or_start as usize;
                for &t in &self.order[start..start + node.right_or_count as usize] {
                    let [a, b, c] = self.triangle_positions(t as usize);
                    if matches!(geometry::ray_triangle(origin, dir, a, b, c), Some((hit_t, _, _)) if hit_t < max_t)
                    {
                        return true;
                    }
                }
            } else {
                stack.push(node.left_or_start);
                stack.push(node.right_or_count);
            }
        }
        false
    }

    /// Closest point on the surface to `p`
    pub fn nearest(&self, p: Vec3) -> Option<NearestHit> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<NearestHit> = None;
        let mut best_d2 = f32::INFINITY;
        let mut stack = Vec::with_capacity(64);
        stack.push(0u32);

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if node.bounds.distance_squared(p) >= best_d2 {
                continue;
            }
            if node.is_leaf {
                let start = node.left_or_start as usize;
                for &t in &self.order[start..start + node.right_or_count as usize] {
                    let [a, b, c] = self.triangle_positions(t as usize);
                    let q = geometry::closest_point_on_triangle(p, a, b, c);
                    let d2 = (q - p).length_squared();
                    if d2 < best_d2 {
                        best_d2 = d2;
                        best = Some(NearestHit {
                            triangle: t,
                            point: q,
                            distance_squared: d2,
                        });
                    }
                }
            } else {
                let left = node.left_or_start;
                let right = node.right_or_count;
                let dl = self.nodes[left as usize].bounds.distance_squared(p);
                let dr = self.nodes[right as usize].bounds.distance_squared(p);
                if dl <= dr {
                    stack.push(right);
                    stack.push(left);
                } else {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_of_cubes() -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for x in 0..4 {
            for y in 0..4 {
                mesh.append(&TriangleMesh::cube(
                    Vec3::new(x as f32 * 3.0, y as f32 * 3.0, 0.0),
                    Vec3::ONE,
                ));
            }
        }
        mesh
    }

    #[test]
    fn test_cast_ray_matches_brute_force() {
        let mesh = grid_of_cubes();
        let bvh = MeshBvh::build(&mesh);
        let origin = Vec3::new(-5.0, 6.3, 0.6);
        let hit = bvh.cast_ray(origin, Vec3::X, f32::INFINITY).unwrap();
        assert!((hit.t - 5.0).abs() < 1e-5);

        let brute = (0..mesh.triangle_count())
            .filter_map(|t| {
                let [a, b, c] = mesh.triangle_positions(t);
                geometry::ray_triangle(origin, Vec3::X, a, b, c).map(|(t, _, _)| t)
            })
            .fold(f32::INFINITY, f32::min);
        assert_eq!(hit.t, brute);
        let w = hit.barycentric;
        assert!((w.x + w.y + w.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_any_hit_respects_max_distance() {
        let bvh = MeshBvh::build(&grid_of_cubes());
        let origin = Vec3::new(-5.0, 0.3, 0.6);
        assert!(bvh.any_hit(origin, Vec3::X, 10.0));
        assert!(!bvh.any_hit(origin, Vec3::X, 4.0));
        assert!(!bvh.any_hit(origin, -Vec3::X, 100.0));
    }

    #[test]
    fn test_nearest() {
        let bvh = MeshBvh::build(&grid_of_cubes());
        let hit = bvh.nearest(Vec3::new(0.5, 0.5, 4.0)).unwrap();
        assert!((hit.distance_squared - 9.0).abs() < 1e-4);
        assert!((hit.point.z - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty() {
        let bvh = MeshBvh::build(&TriangleMesh::new());
        assert!(bvh.cast_ray(Vec3::ZERO, Vec3::X, 1.0).is_none());
        assert!(bvh.nearest(Vec3::ZERO).is_none());
        assert!(bvh.bounds().is_empty());
    }
}
