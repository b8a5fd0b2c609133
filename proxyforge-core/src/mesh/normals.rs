//! Normal overlay generation (smooth or split by opening angle)

use glam::Vec3;

use super::TriangleMesh;
use crate::geometry;

/// Range the hard-normal opening angle is clamped to, in degrees
pub const HARD_NORMAL_ANGLE_RANGE: (f32, f32) = (0.001, 89.99);

/// One area-weighted normal per vertex
pub fn compute_smooth_normals(mesh: &mut TriangleMesh) {
    mesh.enable_attributes();
    let triangle_count = mesh.triangle_count();
    let mut sums = vec![Vec3::ZERO; mesh.vertex_count()];
    for tri in &mesh.triangles {
        let [a, b, c] = tri.map(|v| mesh.positions[v as usize]);
        // Unnormalized cross product weights by area
        let n = geometry::triangle_area_vector(a, b, c);
        for &v in tri {
            sums[v as usize] += n;
        }
    }

    let (_, triangles, attributes) = mesh.split_attributes_mut();
    let Some(attributes) = attributes else {
        return;
    };
    let normals = &mut attributes.normals;
    normals.reset(triangle_count);
    for (v, sum) in sums.iter().enumerate() {
        normals.append_element(sum.normalize_or(Vec3::Z), v as u32);
    }
    normals.triangles.copy_from_slice(triangles);
}

/// Split normals wherever adjacent faces meet at more than `angle_deg`
///
/// Faces around each vertex are grouped into fans connected through shared
/// edges whose dihedral angle is below the threshold; every fan gets its own
/// area-weighted normal element.
pub fn compute_hard_normals(mesh: &mut TriangleMesh, angle_deg: f32) {
    let (lo, hi) = HARD_NORMAL_ANGLE_RANGE;
    let angle = angle_deg.clamp(lo, hi);
    if angle != angle_deg {
        tracing::debug!("Hard normal angle {angle_deg} clamped to {angle}");
    }
    let cos_threshold = angle.to_radians().cos();

    mesh.enable_attributes();
    let triangle_count = mesh.triangle_count();
    let face_vectors: Vec<Vec3> = (0..triangle_count)
        .map(|t| {
            let [a, b, c] = mesh.triangle_positions(t);
            geometry::triangle_area_vector(a, b, c)
        })
        .collect();
    let face_normals: Vec<Vec3> = face_vectors.iter().map(|n| n.normalize_or_zero()).collect();
    let incident = mesh.vertex_triangles();

    let (_, triangles, attributes) = mesh.split_attributes_mut();
    let Some(attributes) = attributes else {
        return;
    };
    let normals = &mut attributes.normals;
    normals.reset(triangle_count);

    let mut group = Vec::new();
    for (v, fan) in incident.iter().enumerate() {
        if fan.is_empty() {
            continue;
        }
        // Union-find over the fan, indices local to `fan`
        group.clear();
        group.extend(0..fan.len());
        for i in 0..fan.len() {
            for j in (i + 1)..fan.len() {
                let (ti, tj) = (fan[i] as usize, fan[j] as usize);
                if !shares_edge_at(&triangles[ti], &triangles[tj], v as u32) {
                    continue;
                }
                if face_normals[ti].dot(face_normals[tj]) >= cos_threshold {
                    let (ri, rj) = (find(&mut group, i), find(&mut group, j));
                    group[ri] = rj;
                }
            }
        }

        let mut root_element = vec![u32::MAX; fan.len()];
        for i in 0..fan.len() {
            let root = find(&mut group, i);
            if root_element[root] == u32::MAX {
                let sum: Vec3 = (0..fan.len())
                    .filter(|&k| find(&mut group, k) == root)
                    .map(|k| face_vectors[fan[k] as usize])
                    .sum();
                let fallback = face_normals[fan[i] as usize];
                root_element[root] = normals.append_element(sum.normalize_or(fallback), v as u32);
            }
            let t = fan[i] as usize;
            let corner = triangles[t].iter().position(|&x| x == v as u32).unwrap_or(0);
            normals.triangles[t][corner] = root_element[root];
        }
    }
}

fn find(group: &mut [usize], mut i: usize) -> usize {
    while group[i] != i {
        group[i] = group[group[i]];
        i = group[i];
    }
    i
}

/// Two triangles meeting at `v` also share another vertex
fn shares_edge_at(a: &[u32; 3], b: &[u32; 3], v: u32) -> bool {
    a.iter().any(|&x| x != v && b.contains(&x))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_cube_has_one_normal_per_vertex() {
        let mut cube = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        compute_smooth_normals(&mut cube);
        let normals = &cube.attributes().unwrap().normals;
        assert_eq!(normals.element_count(), 8);
        // Corner normal points diagonally outward
        let corner = normals.elements[6];
        assert!(corner.dot(Vec3::ONE.normalize()) > 0.9);
    }

    #[test]
    fn test_hard_cube_splits_faces() {
        let mut cube = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        compute_hard_normals(&mut cube, 60.0);
        let normals = &cube.attributes().unwrap().normals;
        // Each of the 8 corners touches 3 faces
        assert_eq!(normals.element_count(), 24);
        for t in 0..cube.triangle_count() {
            let face = cube.triangle_normal(t);
            for n in normals.corner_values(t).unwrap() {
                assert!((n - face).length() < 1e-5);
            }
        }
    }

    #[test]
    fn test_hard_angle_is_clamped() {
        let mut cube = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        // 180 would merge everything; clamped to 89.99 it still splits 90 degree edges
        compute_hard_normals(&mut cube, 180.0);
        assert_eq!(cube.attributes().unwrap().normals.element_count(), 24);
    }
}
