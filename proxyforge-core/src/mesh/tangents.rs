//! Per-corner tangent frames from the normal and UV overlays

use glam::{Vec2, Vec3, Vec4};
use hashbrown::HashMap;

use super::TriangleMesh;

/// Compute averaged per-corner tangents (`w` = bitangent handedness)
///
/// Corners that share a vertex, a normal element and a UV element are
/// averaged together, so tangents stay continuous inside charts and split at
/// seams. Returns `false` when the mesh lacks normals or UVs.
pub fn compute_tangents(mesh: &mut TriangleMesh) -> bool {
    let triangle_count = mesh.triangle_count();
    let (positions, triangles, attributes) = mesh.split_attributes_mut();
    let Some(attributes) = attributes else {
        return false;
    };
    if (0..triangle_count).any(|t| !attributes.normals.is_set(t) || !attributes.uvs.is_set(t)) {
        return false;
    }

    let mut face_frames = Vec::with_capacity(triangle_count);
    for t in 0..triangle_count {
        let [a, b, c] = triangles[t].map(|v| positions[v as usize]);
        let uv = attributes.uvs.corner_values(t).unwrap_or([Vec2::ZERO; 3]);
        face_frames.push(face_tangent(a, b, c, uv));
    }

    // (vertex, normal element, uv element) -> accumulated tangent, bitangent
    let mut sums: HashMap<(u32, u32, u32), (Vec3, Vec3)> = HashMap::new();
    for t in 0..triangle_count {
        let (tangent, bitangent) = face_frames[t];
        for corner in 0..3 {
            let key = corner_key(triangles, attributes, t, corner);
            let entry = sums.entry(key).or_insert((Vec3::ZERO, Vec3::ZERO));
            entry.0 += tangent;
            entry.1 += bitangent;
        }
    }

    let mut tangents = vec![[Vec4::ZERO; 3]; triangle_count];
    for (t, frame) in tangents.iter_mut().enumerate() {
        let normals = attributes.normals.corner_values(t).unwrap_or([Vec3::Z; 3]);
        for corner in 0..3 {
            let key = corner_key(triangles, attributes, t, corner);
            let (tangent, bitangent) = sums.get(&key).copied().unwrap_or_default();
            frame[corner] = orthonormal_tangent(normals[corner], tangent, bitangent);
        }
    }
    attributes.tangents = tangents;
    true
}

#[inline]
fn corner_key(
    triangles: &[[u32; 3]],
    attributes: &super::MeshAttributes,
    t: usize,
    corner: usize,
) -> (u32, u32, u32) {
    (
        triangles[t][corner],
        attributes.normals.triangles[t][corner],
        attributes.uvs.triangles[t][corner],
    )
}

/// Area-weighted tangent and bitangent of one triangle
fn face_tangent(a: Vec3, b: Vec3, c: Vec3, uv: [Vec2; 3]) -> (Vec3, Vec3) {
    let e1 = b - a;
    let e2 = c - a;
    let d1 = uv[1] - uv[0];
    let d2 = uv[2] - uv[0];
    let det = d1.perp_dot(d2);
    if det.abs() < 1e-12 {
        return (Vec3::ZERO, Vec3::ZERO);
    }
    let r = 1.0 / det;
    let tangent = (e1 * d2.y - e2 * d1.y) * r;
    let bitangent = (e2 * d1.x - e1 * d2.x) * r;
    // Keep area weighting, drop UV scale
    let area = e1.cross(e2).length();
    (
        tangent.normalize_or_zero() * area,
        bitangent.normalize_or_zero() * area,
    )
}

/// Gram-Schmidt against `n`, with handedness from the bitangent
fn orthonormal_tangent(n: Vec3, tangent: Vec3, bitangent: Vec3) -> Vec4 {
    let t = (tangent - n * n.dot(tangent)).normalize_or_zero();
    let t = if t == Vec3::ZERO {
        n.any_orthonormal_vector()
    } else {
        t
    };
    let sign = if n.cross(t).dot(bitangent) < 0.0 { -1.0 } else { 1.0 };
    t.extend(sign)
}
