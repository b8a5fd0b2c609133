//! Surface nets isosurface extraction over a [`ScalarGrid`] solid mask

use glam::{UVec3, Vec3};
use rayon::prelude::*;

use super::ScalarGrid;
use crate::mesh::TriangleMesh;

/// Corner offsets of a cell, bit i of the index selects +1 along axis i
const CORNERS: [UVec3; 8] = [
    UVec3::new(0, 0, 0),
    UVec3::new(1, 0, 0),
    UVec3::new(0, 1, 0),
    UVec3::new(1, 1, 0),
    UVec3::new(0, 0, 1),
    UVec3::new(1, 0, 1),
    UVec3::new(0, 1, 1),
    UVec3::new(1, 1, 1),
];

/// The 12 cell edges as corner index pairs
const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Extract the boundary of `mask` as an outward-facing triangle mesh
///
/// One vertex per boundary cell, placed at the mean of its edge crossings
/// (interpolated from the grid values). Each grid edge crossing the boundary
/// emits a quad over the four cells around it, split on its shorter diagonal.
pub fn extract_surface(grid: &ScalarGrid, mask: &[bool]) -> TriangleMesh {
    let d = grid.dims;
    if d.min_element() < 2 {
        return TriangleMesh::new();
    }
    let cells = d - UVec3::ONE;
    let cell_index = |x: u32, y: u32, z: u32| (x + cells.x * (y + cells.y * z)) as usize;

    // Boundary cell vertices, computed per Z slab
    let slabs: Vec<Vec<(usize, Vec3)>> = (0..cells.z)
        .into_par_iter()
        .map(|z| {
            let mut slab = Vec::new();
            for y in 0..cells.y {
                for x in 0..cells.x {
                    let base = UVec3::new(x, y, z);
                    if let Some(p) = cell_vertex(grid, mask, base) {
                        slab.push((cell_index(x, y, z), p));
                    }
                }
            }
            slab
        })
        .collect();

    let mut vertex_of_cell = vec![u32::MAX; (cells.x * cells.y * cells.z) as usize];
    let mut positions = Vec::new();
    for (index, p) in slabs.into_iter().flatten() {
        vertex_of_cell[index] = positions.len() as u32;
        positions.push(p);
    }

    let mut triangles = Vec::new();
    for z in 0..d.z {
        for y in 0..d.y {
            for x in 0..d.x {
                let p = UVec3::new(x, y, z);
                let inside = mask[grid.index(x, y, z)];
                for axis in 0..3 {
                    let u = (axis + 1) % 3;
                    let v = (axis + 2) % 3;
                    // The four cells around the edge must exist
                    if p[axis] + 1 >= d[axis]
                        || p[u] == 0
                        || p[v] == 0
                        || p[u] + 1 >= d[u]
                        || p[v] + 1 >= d[v]
                    {
                        continue;
                    }
                    let mut q = p;
                    q[axis] += 1;
                    let inside_next = mask[grid.index(q.x, q.y, q.z)];
                    if inside == inside_next {
                        continue;
                    }

                    let mut c00 = p;
                    c00[u] -= 1;
                    c00[v] -= 1;
                    let mut c10 = p;
                    c10[v] -= 1;
                    let c11 = p;
                    let mut c01 = p;
                    c01[u] -= 1;

                    let quad = [c00, c10, c11, c01].map(|c| vertex_of_cell[cell_index(c.x, c.y, c.z)]);
                    if quad.contains(&u32::MAX) {
                        continue;
                    }
                    // Counter-clockwise order faces +axis; flip when the solid is on the far side
                    let quad = if inside {
                        quad
                    } else {
                        [quad[0], quad[3], quad[2], quad[1]]
                    };
                    emit_quad(&positions, quad, &mut triangles);
                }
            }
        }
    }

    TriangleMesh::from_parts(positions, triangles)
}

fn emit_quad(positions: &[Vec3], [a, b, c, d]: [u32; 4], triangles: &mut Vec<[u32; 3]>) {
    let p = |i: u32| positions[i as usize];
    if p(a).distance_squared(p(c)) <= p(b).distance_squared(p(d)) {
        triangles.push([a, b, c]);
        triangles.push([a, c, d]);
    } else {
        triangles.push([a, b, d]);
        triangles.push([b, c, d]);
    }
}

fn cell_vertex(grid: &ScalarGrid, mask: &[bool], base: UVec3) -> Option<Vec3> {
    let mut inside = [false; 8];
    let mut values = [0.0f32; 8];
    let mut points = [Vec3::ZERO; 8];
    for (i, offset) in CORNERS.iter().enumerate() {
        let c = base + *offset;
        let index = grid.index(c.x, c.y, c.z);
        inside[i] = mask[index];
        values[i] = grid.values[index];
        points[i] = grid.point(c.x, c.y, c.z);
    }
    if inside.iter().all(|&b| b) || inside.iter().all(|&b| !b) {
        return None;
    }

    let mut sum = Vec3::ZERO;
    let mut count = 0;
    for &(a, b) in &EDGES {
        if inside[a] == inside[b] {
            continue;
        }
        // Masked-out positive values would interpolate outside the edge
        let t = if (values[a] > 0.0) != (values[b] > 0.0) {
            (values[a] / (values[a] - values[b])).clamp(0.0, 1.0)
        } else {
            0.5
        };
        sum += points[a].lerp(points[b], t);
        count += 1;
    }
    Some(sum / count as f32)
}
