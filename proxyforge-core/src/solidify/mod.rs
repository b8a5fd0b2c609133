//! Voxel solidification: winding-number field to watertight mesh
//!
//! The scene's winding number is sampled on a regular grid padded by two
//! cells on every side, so the outer layer is always empty and the extracted
//! surface is closed. Only inside regions connected to a scene seed point
//! survive; isolated specks of winding noise are discarded.

mod surface_nets;

use glam::{UVec3, Vec3};
use rayon::prelude::*;

use crate::error::MeshGenerationError;
use crate::geometry::Aabb;
use crate::mesh::TriangleMesh;
use crate::scene::SceneAggregator;

pub use surface_nets::extract_surface;

/// Lower bound on the grid resolution along the longest axis
pub const MIN_VOXEL_DIMENSION: u32 = 64;

/// Grid layers added around the sampled bounds
const PADDING_CELLS: u32 = 2;

/// Cancellation predicate polled between grid slabs
pub type Cancel<'a> = &'a (dyn Fn() -> bool + Sync);

/// Grid resolution for the given bounds and accuracy
///
/// `max(64, round(diagonal / accuracy) + 1)`, clamped to `clamp`. Hitting the
/// clamp is logged and otherwise ignored.
pub fn voxel_dimension(bounds: &Aabb, accuracy: f32, clamp: u32) -> u32 {
    let clamp = clamp.max(MIN_VOXEL_DIMENSION);
    let target = if accuracy > 0.0 && !bounds.is_empty() {
        (bounds.diagonal_length() as f64 / accuracy as f64).round() + 1.0
    } else {
        0.0
    };
    let target = target.max(MIN_VOXEL_DIMENSION as f64);
    if target > clamp as f64 {
        tracing::warn!(
            "Voxel dimension {target} exceeds clamp, using {clamp} (approximation will be coarser than requested)"
        );
        clamp
    } else {
        target as u32
    }
}

/// Scalar field on a regular grid; positive values are inside
#[derive(Debug, Clone)]
pub struct ScalarGrid {
    pub origin: Vec3,
    pub cell_size: f32,
    /// Grid points per axis
    pub dims: UVec3,
    pub values: Vec<f32>,
}

impl ScalarGrid {
    /// Sample `field` over `bounds` with `voxel_dimension` cells along the longest axis
    ///
    /// Returns `None` when `cancel` fires between slabs.
    pub fn sample<F>(bounds: &Aabb, voxel_dimension: u32, field: F, cancel: Cancel) -> Option<Self>
    where
        F: Fn(Vec3) -> f32 + Sync,
    {
        let cell_size = (bounds.max_dim() / voxel_dimension.max(1) as f32).max(f32::EPSILON);
        let origin = bounds.min - Vec3::splat(PADDING_CELLS as f32 * cell_size);
        let cells = (bounds.extents() / cell_size).ceil().as_uvec3() + UVec3::splat(2 * PADDING_CELLS);
        let dims = cells + UVec3::ONE;

        let slab = (dims.x * dims.y) as usize;
        let slabs: Vec<Option<Vec<f32>>> = (0..dims.z)
            .into_par_iter()
            .map(|z| {
                if cancel() {
                    return None;
                }
                let mut values = Vec::with_capacity(slab);
                for y in 0..dims.y {
                    for x in 0..dims.x {
                        let p = origin + Vec3::new(x as f32, y as f32, z as f32) * cell_size;
                        values.push(field(p));
                    }
                }
                Some(values)
            })
            .collect();

        let mut values = Vec::with_capacity(slab * dims.z as usize);
        for slab_values in slabs {
            values.extend(slab_values?);
        }
        Some(Self {
            origin,
            cell_size,
            dims,
            values,
        })
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (x + self.dims.x * (y + self.dims.y * z)) as usize
    }

    #[inline]
    pub fn point(&self, x: u32, y: u32, z: u32) -> Vec3 {
        self.origin + Vec3::new(x as f32, y as f32, z as f32) * self.cell_size
    }

    /// Grid coordinates of the closest grid point to `p`, if inside the grid
    pub fn nearest_point(&self, p: Vec3) -> Option<UVec3> {
        let local = ((p - self.origin) / self.cell_size).round();
        if local.cmplt(Vec3::ZERO).any() || local.cmpge(self.dims.as_vec3()).any() {
            return None;
        }
        Some(local.as_uvec3())
    }

    /// Solid mask; the outer layer is always empty
    pub fn inside_mask(&self) -> Vec<bool> {
        let mut mask: Vec<bool> = self.values.iter().map(|&v| v > 0.0).collect();
        let d = self.dims;
        for z in 0..d.z {
            for y in 0..d.y {
                for x in 0..d.x {
                    let boundary = x == 0 || y == 0 || z == 0 || x == d.x - 1 || y == d.y - 1 || z == d.z - 1;
                    if boundary {
                        let i = self.index(x, y, z);
                        mask[i] = false;
                    }
                }
            }
        }
        mask
    }
}

/// Keep only the 6-connected inside components that contain a seed
///
/// Seeds landing on an empty grid point look at their 26 neighbours. When no
/// seed reaches any component the mask is left untouched.
pub fn retain_seeded_components(grid: &ScalarGrid, mask: &mut [bool], seeds: &[Vec3]) -> usize {
    let d = grid.dims;
    let mut label = vec![u32::MAX; mask.len()];
    let mut stack = Vec::new();
    let mut seeded = Vec::new();

    for seed in seeds {
        let Some(center) = grid.nearest_point(*seed) else {
            continue;
        };
        let start = neighbourhood(center, d).find(|&(x, y, z)| mask[grid.index(x, y, z)]);
        let Some((x, y, z)) = start else {
            continue;
        };
        let start_index = grid.index(x, y, z);
        if label[start_index] != u32::MAX {
            continue;
        }

        let component = seeded.len() as u32;
        seeded.push(component);
        label[start_index] = component;
        stack.push(UVec3::new(x, y, z));
        while let Some(p) = stack.pop() {
            for (nx, ny, nz) in face_neighbours(p, d) {
                let i = grid.index(nx, ny, nz);
                if mask[i] && label[i] == u32::MAX {
                    label[i] = component;
                    stack.push(UVec3::new(nx, ny, nz));
                }
            }
        }
    }

    if seeded.is_empty() {
        tracing::debug!("No seed reached a solid component, keeping all of them");
        return 0;
    }

    let mut removed = 0;
    for (m, l) in mask.iter_mut().zip(&label) {
        if *m && *l == u32::MAX {
            *m = false;
            removed += 1;
        }
    }
    if removed > 0 {
        tracing::debug!("Discarded {removed} unseeded solid voxels");
    }
    seeded.len()
}

fn neighbourhood(c: UVec3, d: UVec3) -> impl Iterator<Item = (u32, u32, u32)> {
    let offsets = std::iter::once((0i32, 0i32, 0i32)).chain(
        (-1..=1)
            .flat_map(|z| (-1..=1).flat_map(move |y| (-1..=1).map(move |x| (x, y, z))))
            .filter(|&o| o != (0, 0, 0)),
    );
    offsets.filter_map(move |(ox, oy, oz)| {
        let x = c.x as i32 + ox;
        let y = c.y as i32 + oy;
        let z = c.z as i32 + oz;
        let inside = x >= 0 && y >= 0 && z >= 0 && x < d.x as i32 && y < d.y as i32 && z < d.z as i32;
        inside.then_some((x as u32, y as u32, z as u32))
    })
}

fn face_neighbours(p: UVec3, d: UVec3) -> impl Iterator<Item = (u32, u32, u32)> {
    const OFFSETS: [(i32, i32, i32); 6] = [
        (-1, 0, 0),
        (1, 0, 0),
        (0, -1, 0),
        (0, 1, 0),
        (0, 0, -1),
        (0, 0, 1),
    ];
    OFFSETS.into_iter().filter_map(move |(ox, oy, oz)| {
        let x = p.x as i32 + ox;
        let y = p.y as i32 + oy;
        let z = p.z as i32 + oz;
        let inside = x >= 0 && y >= 0 && z >= 0 && x < d.x as i32 && y < d.y as i32 && z < d.z as i32;
        inside.then_some((x as u32, y as u32, z as u32))
    })
}

/// Voxelize the scene's winding number and extract the solid's surface
///
/// The result has attributes disabled and may be empty.
pub fn solidify<S: SceneAggregator + ?Sized>(
    scene: &S,
    voxel_dimension: u32,
    winding_threshold: f32,
    cancel: Cancel,
) -> Result<TriangleMesh, MeshGenerationError> {
    let bounds = scene.bounding_box();
    if bounds.is_empty() {
        return Ok(TriangleMesh::new());
    }

    let grid = ScalarGrid::sample(
        &bounds,
        voxel_dimension,
        |p| scene.fast_winding_number(p) - winding_threshold,
        cancel,
    )
    .ok_or(MeshGenerationError::Cancelled { stage: "solidify" })?;

    let mut mask = grid.inside_mask();
    retain_seeded_components(&grid, &mut mask, &scene.collect_seed_points());
    if cancel() {
        return Err(MeshGenerationError::Cancelled { stage: "solidify" });
    }

    let mesh = extract_surface(&grid, &mask);
    tracing::debug!(
        "Solidified {}x{}x{} grid (cell {:.3}) into {} triangles",
        grid.dims.x,
        grid.dims.y,
        grid.dims.z,
        grid.cell_size,
        mesh.triangle_count()
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ApproximationOptions;
    use crate::scene::{MeshScene, SceneObject};

    #[test]
    fn test_voxel_dimension_bounds() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::splat(100.0));
        // Coarse accuracy still gets the minimum resolution
        assert_eq!(voxel_dimension(&bounds, 100.0, 1024), 64);
        // diagonal 173.2 / 1 + 1
        assert_eq!(voxel_dimension(&bounds, 1.0, 1024), 174);
        assert_eq!(voxel_dimension(&bounds, 0.01, 256), 256);
        // A clamp below the minimum is raised to it
        assert_eq!(voxel_dimension(&bounds, 0.01, 8), 64);
    }

    #[test]
    fn test_voxel_dimension_monotone_in_accuracy() {
        let bounds = Aabb::new(Vec3::new(-40.0, 0.0, 10.0), Vec3::new(300.0, 120.0, 80.0));
        let mut previous = 0;
        for step in 0..200 {
            let accuracy = 50.0 / (1.0 + step as f32 * 0.25);
            let dim = voxel_dimension(&bounds, accuracy, 512);
            assert!(dim >= previous);
            assert!((MIN_VOXEL_DIMENSION..=512).contains(&dim));
            previous = dim;
        }
    }

    #[test]
    fn test_grid_padding_keeps_boundary_empty() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let grid = ScalarGrid::sample(&bounds, 8, |_| 1.0, &|| false).unwrap();
        let mask = grid.inside_mask();
        assert!(!mask[0]);
        assert!(mask[grid.index(4, 4, 4)]);
    }

    #[test]
    fn test_sample_cancelled() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(ScalarGrid::sample(&bounds, 8, |_| 1.0, &|| true).is_none());
    }

    #[test]
    fn test_unseeded_component_removed() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::new(10.0, 1.0, 1.0));
        // Two separate blobs along X
        let field = |p: Vec3| {
            let a = 1.0 - (p - Vec3::new(2.0, 0.5, 0.5)).length();
            let b = 1.0 - (p - Vec3::new(8.0, 0.5, 0.5)).length();
            a.max(b)
        };
        let grid = ScalarGrid::sample(&bounds, 40, field, &|| false).unwrap();
        let mut mask = grid.inside_mask();
        let before = mask.iter().filter(|&&m| m).count();
        let kept = retain_seeded_components(&grid, &mut mask, &[Vec3::new(2.0, 0.5, 0.5)]);
        let after = mask.iter().filter(|&&m| m).count();
        assert_eq!(kept, 1);
        assert!(after > 0 && after < before);

        // No usable seed keeps everything
        let mut mask = grid.inside_mask();
        retain_seeded_components(&grid, &mut mask, &[Vec3::splat(1000.0)]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), before);
    }

    #[test]
    fn test_solidify_cube() {
        let mut scene = MeshScene::new();
        scene.add_objects(vec![SceneObject::new(
            "cube",
            TriangleMesh::cube(Vec3::ZERO, Vec3::splat(100.0)),
        )]);
        scene.build(&ApproximationOptions::default());

        let mesh = solidify(&scene, 64, 0.5, &|| false).unwrap();
        assert!(mesh.triangle_count() > 0);
        assert!(mesh.is_closed());
        assert!(!mesh.has_attributes());
        let bounds = mesh.bounds();
        assert!((bounds.min - Vec3::ZERO).abs().max_element() < 3.0);
        assert!((bounds.max - Vec3::splat(100.0)).abs().max_element() < 3.0);
    }
}
