//! Morphological closing: dilate then erode to bridge small gaps

use glam::Vec3;

use crate::error::MeshGenerationError;
use crate::mesh::TriangleMesh;
use crate::solidify::{Cancel, ScalarGrid, extract_surface};
use crate::spatial::{FastWindingTree, MeshBvh};

/// Signed distance to a mesh: positive inside, negative outside
struct SignedDistance {
    winding: FastWindingTree,
}

impl SignedDistance {
    fn new(mesh: &TriangleMesh) -> Self {
        Self {
            winding: FastWindingTree::new(MeshBvh::build(mesh)),
        }
    }

    fn eval(&self, p: Vec3) -> f32 {
        let distance = self
            .winding
            .bvh()
            .nearest(p)
            .map_or(f32::INFINITY, |hit| hit.distance_squared.sqrt());
        if self.winding.winding_number(p) > 0.5 {
            distance
        } else {
            -distance
        }
    }
}

/// Offset the surface by `offset` (positive grows the solid)
fn offset_surface(
    mesh: &TriangleMesh,
    offset: f32,
    voxel_dimension: u32,
    cancel: Cancel,
) -> Result<TriangleMesh, MeshGenerationError> {
    let field = SignedDistance::new(mesh);
    let bounds = mesh.bounds().expanded(offset.max(0.0));
    let grid = ScalarGrid::sample(&bounds, voxel_dimension, |p| field.eval(p) + offset, cancel)
        .ok_or(MeshGenerationError::Cancelled { stage: "morphology" })?;
    Ok(extract_surface(&grid, &grid.inside_mask()))
}

/// Close gaps narrower than about `2 * distance`
///
/// The result has attributes disabled. An empty result is returned as is;
/// callers keep their previous mesh in that case.
pub fn close_gaps(
    mesh: &TriangleMesh,
    distance: f32,
    voxel_dimension: u32,
    cancel: Cancel,
) -> Result<TriangleMesh, MeshGenerationError> {
    if mesh.is_empty() || distance <= 0.0 {
        return Ok(mesh.clone());
    }

    let dilated = offset_surface(mesh, distance, voxel_dimension, cancel)?;
    tracing::debug!("Dilated by {distance:.2}: {} triangles", dilated.triangle_count());
    if dilated.is_empty() {
        return Ok(dilated);
    }
    if cancel() {
        return Err(MeshGenerationError::Cancelled { stage: "morphology" });
    }

    let closed = offset_surface(&dilated, -distance, voxel_dimension, cancel)?;
    tracing::debug!("Eroded by {distance:.2}: {} triangles", closed.triangle_count());
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_bridges_gap() {
        // Two 40-unit cubes separated by a 4-unit slot
        let mut mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::splat(40.0));
        mesh.append(&TriangleMesh::cube(Vec3::new(44.0, 0.0, 0.0), Vec3::splat(40.0)));

        let closed = close_gaps(&mesh, 5.0, 64, &|| false).unwrap();
        assert!(!closed.is_empty());
        assert!(closed.is_closed());

        // The slot midpoint is now solid
        let winding = FastWindingTree::new(MeshBvh::build(&closed));
        assert!(winding.winding_number(Vec3::new(42.0, 20.0, 20.0)) > 0.5);
        // Overall extent is preserved within a few cells
        let bounds = closed.bounds();
        assert!((bounds.max.x - 84.0).abs() < 4.0);
        assert!(bounds.min.x.abs() < 4.0);
    }

    #[test]
    fn test_zero_distance_is_identity() {
        let mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        let closed = close_gaps(&mesh, 0.0, 64, &|| false).unwrap();
        assert_eq!(closed.triangles, mesh.triangles);
    }

    #[test]
    fn test_cancel() {
        let mesh = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        let err = close_gaps(&mesh, 0.1, 64, &|| true).unwrap_err();
        assert_eq!(err, MeshGenerationError::Cancelled { stage: "morphology" });
    }
}
