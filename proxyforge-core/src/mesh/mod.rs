//! Indexed triangle mesh and its attribute overlays
//!
//! The approximation stages pass one owned [`TriangleMesh`] along. Attributes
//! (normals, UVs, tangents) stay disabled through the voxel and topology
//! stages and are enabled once the final topology is known.

mod attributes;
pub mod normals;
pub mod obj;
pub mod tangents;

use glam::{Mat4, Vec3};
use hashbrown::HashMap;

use crate::geometry::{self, Aabb};

pub use attributes::{MeshAttributes, Overlay, UNSET};
pub use normals::{compute_hard_normals, compute_smooth_normals};
pub use obj::{parse_obj, read_obj, write_obj};
pub use tangents::compute_tangents;

/// Indexed triangle mesh with optional attribute overlays
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    /// Vertex positions in world units
    pub positions: Vec<Vec3>,
    /// Counter-clockwise (outward facing) vertex triples
    pub triangles: Vec<[u32; 3]>,
    attributes: Option<MeshAttributes>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            triangles,
            attributes: None,
        }
    }

    /// Axis-aligned box of the given dimensions with its min corner at `min`
    pub fn cube(min: Vec3, size: Vec3) -> Self {
        let max = min + size;
        let positions = vec![
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
        ];
        let triangles = vec![
            // -Z
            [0, 2, 1],
            [0, 3, 2],
            // +Z
            [4, 5, 6],
            [4, 6, 7],
            // -Y
            [0, 1, 5],
            [0, 5, 4],
            // +Y
            [3, 7, 6],
            [3, 6, 2],
            // -X
            [0, 4, 7],
            [0, 7, 3],
            // +X
            [1, 2, 6],
            [1, 6, 5],
        ];
        Self::from_parts(positions, triangles)
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Corner positions of triangle `t`
    #[inline]
    pub fn triangle_positions(&self, t: usize) -> [Vec3; 3] {
        let [a, b, c] = self.triangles[t];
        [
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        ]
    }

    pub fn triangle_normal(&self, t: usize) -> Vec3 {
        let [a, b, c] = self.triangle_positions(t);
        geometry::triangle_normal(a, b, c)
    }

    pub fn triangle_area(&self, t: usize) -> f32 {
        let [a, b, c] = self.triangle_positions(t);
        geometry::triangle_area(a, b, c)
    }

    pub fn triangle_centroid(&self, t: usize) -> Vec3 {
        let [a, b, c] = self.triangle_positions(t);
        (a + b + c) / 3.0
    }

    /// Bounds of the vertices referenced by triangles
    pub fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for tri in &self.triangles {
            for &v in tri {
                bounds.include(self.positions[v as usize]);
            }
        }
        bounds
    }

    /// Total surface area in square world units
    pub fn area(&self) -> f64 {
        (0..self.triangle_count())
            .map(|t| self.triangle_area(t) as f64)
            .sum()
    }

    /// Apply an affine transform to all positions, flipping winding when it mirrors
    pub fn transform(&mut self, matrix: &Mat4) {
        for p in &mut self.positions {
            *p = matrix.transform_point3(*p);
        }
        if matrix.determinant() < 0.0 {
            for tri in &mut self.triangles {
                tri.swap(1, 2);
            }
        }
        // Overlays would no longer match the geometry
        self.attributes = None;
    }

    /// Append another mesh's geometry (attributes are dropped)
    pub fn append(&mut self, other: &TriangleMesh) {
        let offset = self.positions.len() as u32;
        self.positions.extend_from_slice(&other.positions);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|t| [t[0] + offset, t[1] + offset, t[2] + offset]),
        );
        self.attributes = None;
    }

    /// Edges used by exactly one triangle, as directed (a, b) pairs
    pub fn boundary_edges(&self) -> Vec<(u32, u32)> {
        let mut counts: HashMap<(u32, u32), (u32, (u32, u32))> = HashMap::new();
        for tri in &self.triangles {
            for i in 0..3 {
                let a = tri[i];
                let b = tri[(i + 1) % 3];
                let key = (a.min(b), a.max(b));
                let entry = counts.entry(key).or_insert((0, (a, b)));
                entry.0 += 1;
            }
        }
        let mut edges: Vec<(u32, u32)> = counts
            .into_values()
            .filter(|(count, _)| *count == 1)
            .map(|(_, edge)| edge)
            .collect();
        edges.sort_unstable();
        edges
    }

    /// `true` when every edge is shared by at least two triangles
    pub fn is_closed(&self) -> bool {
        !self.triangles.is_empty() && self.boundary_edges().is_empty()
    }

    /// Remove the flagged triangles and any vertices left unreferenced
    ///
    /// Attribute overlays are compacted alongside when enabled.
    pub fn remove_triangles(&mut self, remove: &[bool]) -> usize {
        debug_assert_eq!(remove.len(), self.triangles.len());
        let before = self.triangles.len();
        let keep: Vec<bool> = (0..before)
            .map(|t| !remove.get(t).copied().unwrap_or(false))
            .collect();

        let mut index = 0;
        self.triangles.retain(|_| {
            let k = keep[index];
            index += 1;
            k
        });
        if let Some(attributes) = self.attributes.as_mut() {
            attributes.retain_triangles(&keep);
        }
        self.compact_vertices();
        before - self.triangles.len()
    }

    /// Drop vertices no triangle references, remapping indices
    pub fn compact_vertices(&mut self) {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut positions = Vec::with_capacity(self.positions.len());
        for tri in &mut self.triangles {
            for v in tri.iter_mut() {
                let old = *v as usize;
                if remap[old] == u32::MAX {
                    remap[old] = positions.len() as u32;
                    positions.push(self.positions[old]);
                }
                *v = remap[old];
            }
        }
        self.positions = positions;
        if let Some(attributes) = self.attributes.as_mut() {
            attributes.remap_parents(&remap);
        }
    }

    pub fn has_attributes(&self) -> bool {
        self.attributes.is_some()
    }

    /// Enable empty attribute overlays sized to the current triangles
    pub fn enable_attributes(&mut self) {
        if self.attributes.is_none() {
            self.attributes = Some(MeshAttributes::new(self.triangles.len()));
        }
    }

    pub fn disable_attributes(&mut self) {
        self.attributes = None;
    }

    pub fn attributes(&self) -> Option<&MeshAttributes> {
        self.attributes.as_ref()
    }

    pub fn attributes_mut(&mut self) -> Option<&mut MeshAttributes> {
        self.attributes.as_mut()
    }

    /// Geometry and overlays borrowed together, for passes that read one and write the other
    pub fn split_attributes_mut(&mut self) -> (&[Vec3], &[[u32; 3]], Option<&mut MeshAttributes>) {
        (&self.positions, &self.triangles, self.attributes.as_mut())
    }

    /// Vertex -> incident triangle lists
    pub fn vertex_triangles(&self) -> Vec<Vec<u32>> {
        let mut incident = vec![Vec::new(); self.positions.len()];
        for (t, tri) in self.triangles.iter().enumerate() {
            for &v in tri {
                incident[v as usize].push(t as u32);
            }
        }
        incident
    }

    /// Triangle -> edge-adjacent triangles (`u32::MAX` for boundary edges)
    ///
    /// Entry `i` is the neighbour across edge `(tri[i], tri[(i + 1) % 3])`.
    /// Non-manifold edges keep the first pairing found.
    pub fn edge_neighbours(&self) -> Vec<[u32; 3]> {
        let mut edge_owner: HashMap<(u32, u32), (u32, usize)> = HashMap::new();
        let mut neighbours = vec![[u32::MAX; 3]; self.triangles.len()];
        for (t, tri) in self.triangles.iter().enumerate() {
            for i in 0..3 {
                let a = tri[i];
                let b = tri[(i + 1) % 3];
                let key = (a.min(b), a.max(b));
                match edge_owner.get(&key) {
                    Some(&(other, j)) if neighbours[other as usize][j] == u32::MAX => {
                        neighbours[other as usize][j] = t as u32;
                        neighbours[t][i] = other;
                    }
                    Some(_) => {}
                    None => {
                        edge_owner.insert(key, (t as u32, i));
                    }
                }
            }
        }
        neighbours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_is_closed_and_outward() {
        let cube = TriangleMesh::cube(Vec3::ZERO, Vec3::splat(2.0));
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.is_closed());
        assert!((cube.area() - 24.0).abs() < 1e-5);

        // Every face normal points away from the center
        let center = cube.bounds().center();
        for t in 0..cube.triangle_count() {
            let outward = cube.triangle_centroid(t) - center;
            assert!(cube.triangle_normal(t).dot(outward) > 0.0);
        }
    }

    #[test]
    fn test_remove_triangles_compacts() {
        let mut cube = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        let mut remove = vec![true; 12];
        remove[2] = false;
        remove[3] = false;
        let removed = cube.remove_triangles(&remove);
        assert_eq!(removed, 10);
        assert_eq!(cube.triangle_count(), 2);
        assert_eq!(cube.vertex_count(), 4);
        assert_eq!(cube.boundary_edges().len(), 4);
    }

    #[test]
    fn test_mirror_transform_keeps_outward_winding() {
        let mut cube = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        cube.transform(&Mat4::from_scale(Vec3::new(-1.0, 1.0, 1.0)));
        let center = cube.bounds().center();
        for t in 0..cube.triangle_count() {
            let outward = cube.triangle_centroid(t) - center;
            assert!(cube.triangle_normal(t).dot(outward) > 0.0);
        }
    }

    #[test]
    fn test_edge_neighbours_closed() {
        let cube = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        let neighbours = cube.edge_neighbours();
        assert!(neighbours.iter().flatten().all(|&n| n != u32::MAX));
    }

    #[test]
    fn test_append_offsets_indices() {
        let mut a = TriangleMesh::cube(Vec3::ZERO, Vec3::ONE);
        let b = TriangleMesh::cube(Vec3::splat(3.0), Vec3::ONE);
        a.append(&b);
        assert_eq!(a.vertex_count(), 16);
        assert_eq!(a.triangle_count(), 24);
        assert!(a.triangles[12..].iter().flatten().all(|&v| v >= 8));
    }
}
