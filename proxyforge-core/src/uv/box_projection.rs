//! Box projection: the parameterization that cannot fail

use glam::{Vec2, Vec3};

use super::Parameterization;
use super::charts::{axis_class, class_axis};
use crate::geometry::plane_basis;
use crate::mesh::TriangleMesh;

/// Project every triangle onto the face of a unit box centered on the mesh
/// bounds, picking the face by the dominant normal axis
///
/// Degenerate triangles land on the +Z face.
pub fn box_project(mesh: &TriangleMesh) -> Parameterization {
    let center = mesh.bounds().center();
    let mut chart_of = Vec::with_capacity(mesh.triangle_count());
    let mut corner_uvs = Vec::with_capacity(mesh.triangle_count());
    for t in 0..mesh.triangle_count() {
        let n = mesh.triangle_normal(t);
        let class = if n == Vec3::ZERO { 4 } else { axis_class(n) };
        let (u, v) = plane_basis(class_axis(class));
        chart_of.push(class as u32);
        corner_uvs.push(
            mesh.triangle_positions(t)
                .map(|p| {
                    let local = p - center;
                    Vec2::new(local.dot(u), local.dot(v))
                }),
        );
    }
    Parameterization { chart_of, corner_uvs }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_uses_six_faces() {
        let mesh = TriangleMesh::cube(Vec3::splat(-1.0), Vec3::splat(2.0));
        let layout = box_project(&mesh);
        let mut faces = layout.chart_of.clone();
        faces.sort_unstable();
        faces.dedup();
        assert_eq!(faces.len(), 6);
        for corners in &layout.corner_uvs {
            for uv in corners {
                assert!(uv.abs().cmple(Vec2::splat(1.0 + 1e-5)).all());
            }
        }
    }

    #[test]
    fn test_degenerate_triangles_are_finite() {
        let mesh = TriangleMesh::from_parts(vec![Vec3::ZERO, Vec3::X, Vec3::X * 2.0], vec![[0, 1, 2]]);
        let layout = box_project(&mesh);
        assert_eq!(layout.chart_of, vec![4]);
        assert!(layout.corner_uvs[0].iter().all(|uv| uv.is_finite()));
    }
}
