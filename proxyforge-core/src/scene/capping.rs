//! Synthetic base geometry closing the bottom of a scene

use glam::{Vec2, Vec3};

use crate::mesh::TriangleMesh;

/// Convex hull of 2D points (Andrew's monotone chain), counter-clockwise
///
/// Collinear points are dropped. Returns fewer than three points when the
/// input is degenerate.
pub fn convex_hull_2d(points: &[Vec2]) -> Vec<Vec2> {
    let mut sorted: Vec<Vec2> = points.iter().copied().filter(|p| p.is_finite()).collect();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let mut hull: Vec<Vec2> = Vec::with_capacity(sorted.len() * 2);
    for pass in 0..2 {
        let start = hull.len();
        let iter: Box<dyn Iterator<Item = &Vec2>> = if pass == 0 {
            Box::new(sorted.iter())
        } else {
            Box::new(sorted.iter().rev())
        };
        for &p in iter {
            while hull.len() >= start + 2 {
                let a = hull[hull.len() - 2];
                let b = hull[hull.len() - 1];
                if (b - a).perp_dot(p - a) <= 0.0 {
                    hull.pop();
                } else {
                    break;
                }
            }
            hull.push(p);
        }
        // Last point of each chain is the first of the next
        hull.pop();
    }
    hull
}

/// Closed prism over a counter-clockwise polygon between `z0` and `z1`
pub fn extrude_polygon(polygon: &[Vec2], z0: f32, z1: f32) -> TriangleMesh {
    let n = polygon.len();
    if n < 3 || z1 <= z0 {
        return TriangleMesh::new();
    }

    let mut positions = Vec::with_capacity(n * 2);
    positions.extend(polygon.iter().map(|p| Vec3::new(p.x, p.y, z0)));
    positions.extend(polygon.iter().map(|p| Vec3::new(p.x, p.y, z1)));

    let n32 = n as u32;
    let mut triangles = Vec::with_capacity(4 * n);
    for i in 1..n32 - 1 {
        // Bottom faces down, top faces up
        triangles.push([0, i + 1, i]);
        triangles.push([n32, n32 + i, n32 + i + 1]);
    }
    for i in 0..n32 {
        let j = (i + 1) % n32;
        triangles.push([i, j, n32 + j]);
        triangles.push([i, n32 + j, n32 + i]);
    }
    TriangleMesh::from_parts(positions, triangles)
}

/// Hull of every point within `height` of the lowest point, projected to XY
pub fn footprint_hull(points: &[Vec3], height: f32) -> (Vec<Vec2>, f32) {
    let bottom = points.iter().map(|p| p.z).fold(f32::INFINITY, f32::min);
    let footprint: Vec<Vec2> = points
        .iter()
        .filter(|p| p.z <= bottom + height)
        .map(|p| p.truncate())
        .collect();
    (convex_hull_2d(&footprint), bottom)
}
