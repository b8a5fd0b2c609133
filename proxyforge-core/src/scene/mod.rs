//! Scene aggregation: the input objects as one queryable solid
//!
//! The approximation stages never look at individual objects. They see the
//! scene through [`SceneAggregator`]: a bounding box, interior seed points, a
//! winding-number oracle for voxelization and a material-aware ray cast for
//! photo capture. [`MeshScene`] is the in-process implementation over plain
//! triangle meshes.

pub mod capping;

use std::sync::OnceLock;

use glam::{Mat4, Vec3, Vec4};

use crate::geometry::Aabb;
use crate::mesh::TriangleMesh;
use crate::options::{ApproximationOptions, BaseCappingPolicy, meters_to_units};
use crate::spatial::{FastWindingTree, MeshBvh};

/// Constant surface appearance of one object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMaterial {
    /// Linear RGBA
    pub base_color: Vec4,
    pub roughness: f32,
    pub metallic: f32,
    pub specular: f32,
    /// Linear RGB radiance
    pub emissive: Vec3,
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self {
            base_color: Vec4::new(0.5, 0.5, 0.5, 1.0),
            roughness: 0.5,
            metallic: 0.0,
            specular: 0.5,
            emissive: Vec3::ZERO,
        }
    }
}

/// One input object: local-space mesh, placement and material
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub mesh: TriangleMesh,
    pub transform: Mat4,
    pub material: SurfaceMaterial,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, mesh: TriangleMesh) -> Self {
        Self {
            name: name.into(),
            mesh,
            transform: Mat4::IDENTITY,
            material: SurfaceMaterial::default(),
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_material(mut self, material: SurfaceMaterial) -> Self {
        self.material = material;
        self
    }
}

/// Surface hit returned by [`SceneAggregator::cast_ray`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneHit {
    pub t: f32,
    pub position: Vec3,
    /// Geometric normal of the hit triangle
    pub normal: Vec3,
    pub material: SurfaceMaterial,
}

/// Counts gathered while building the scene
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryStatistics {
    pub object_count: usize,
    pub part_count: usize,
    pub skipped_tiny_parts: usize,
    pub thin_parts: usize,
    pub triangle_count: usize,
    /// Square world units
    pub surface_area: f64,
}

/// Source of scene geometry for the approximation pipeline
pub trait SceneAggregator: Send + Sync {
    fn add_objects(&mut self, objects: Vec<SceneObject>);

    /// Resolve added objects into world-space parts
    fn build(&mut self, options: &ApproximationOptions);

    fn bounding_box(&self) -> Aabb;

    /// One point inside each disjoint part
    fn collect_seed_points(&self) -> Vec<Vec3>;

    /// ~1 inside the solid, ~0 outside
    fn fast_winding_number(&self, p: Vec3) -> f32;

    /// Add a synthetic base under the scene (affects solidification only)
    fn generate_base_closing_mesh(&mut self, policy: BaseCappingPolicy, height: f32, thickness: f32);

    /// Every part (and base) merged into one world-space mesh
    fn accumulated_mesh(&self) -> TriangleMesh;

    /// Build the acceleration structures behind the query methods
    fn build_spatial_evaluation_cache(&self);

    fn geometry_statistics(&self) -> GeometryStatistics;

    /// Closest hit against the original (uncapped) objects
    fn cast_ray(&self, origin: Vec3, dir: Vec3, max_t: f32) -> Option<SceneHit>;
}

#[derive(Debug, Clone)]
struct ScenePart {
    mesh: TriangleMesh,
    material: SurfaceMaterial,
    thin: bool,
}

#[derive(Debug)]
struct SpatialCache {
    /// Closed parts plus bases
    solid: Option<FastWindingTree>,
    /// Open or thin parts, solid within `thin_offset` of their surface
    thin: Option<MeshBvh>,
    /// Original parts for rendering
    render: Option<MeshBvh>,
    /// Render triangle -> part index
    render_part: Vec<u32>,
}

/// [`SceneAggregator`] over in-memory triangle meshes
#[derive(Debug, Default)]
pub struct MeshScene {
    pending: Vec<SceneObject>,
    parts: Vec<ScenePart>,
    bases: Vec<TriangleMesh>,
    thin_offset: f32,
    stats: GeometryStatistics,
    cache: OnceLock<SpatialCache>,
}

impl MeshScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache(&self) -> &SpatialCache {
        self.cache.get_or_init(|| {
            let mut solid = TriangleMesh::new();
            let mut thin = TriangleMesh::new();
            let mut render = TriangleMesh::new();
            let mut render_part = Vec::new();
            for (index, part) in self.parts.iter().enumerate() {
                if part.thin {
                    thin.append(&part.mesh);
                } else {
                    solid.append(&part.mesh);
                }
                render.append(&part.mesh);
                render_part.extend(std::iter::repeat_n(index as u32, part.mesh.triangle_count()));
            }
            for base in &self.bases {
                solid.append(base);
            }

            tracing::debug!(
                "Scene spatial cache: {} solid, {} thin, {} render triangles",
                solid.triangle_count(),
                thin.triangle_count(),
                render.triangle_count()
            );
            SpatialCache {
                solid: (!solid.is_empty()).then(|| FastWindingTree::new(MeshBvh::build(&solid))),
                thin: (!thin.is_empty()).then(|| MeshBvh::build(&thin)),
                render: (!render.is_empty()).then(|| MeshBvh::build(&render)),
                render_part,
            }
        })
    }

    fn invalidate_cache(&mut self) {
        self.cache = OnceLock::new();
    }
}

impl SceneAggregator for MeshScene {
    fn add_objects(&mut self, objects: Vec<SceneObject>) {
        self.pending.extend(objects);
    }

    fn build(&mut self, options: &ApproximationOptions) {
        let tiny_size = meters_to_units(options.tiny_part_size_meters);
        let thicken = meters_to_units(options.auto_thicken_thickness_meters);
        self.thin_offset = 0.5 * thicken;

        for object in std::mem::take(&mut self.pending) {
            self.stats.object_count += 1;
            let mut mesh = object.mesh;
            mesh.transform(&object.transform);
            if mesh.is_empty() {
                continue;
            }

            let bounds = mesh.bounds();
            if options.ignore_tiny_parts && bounds.max_dim() < tiny_size {
                tracing::debug!("Skipping tiny part {} ({:.3} units)", object.name, bounds.max_dim());
                self.stats.skipped_tiny_parts += 1;
                continue;
            }

            let thin = options.auto_thicken_thin_parts
                && (!mesh.is_closed() || bounds.min_dim() < thicken);
            if thin {
                self.stats.thin_parts += 1;
            }
            self.stats.part_count += 1;
            self.stats.triangle_count += mesh.triangle_count();
            self.stats.surface_area += mesh.area();
            self.parts.push(ScenePart {
                mesh,
                material: object.material,
                thin,
            });
        }
        self.invalidate_cache();
    }

    fn bounding_box(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for part in &self.parts {
            bounds = bounds.union(&part.mesh.bounds());
        }
        for base in &self.bases {
            bounds = bounds.union(&base.bounds());
        }
        if self.thin_offset > 0.0 && self.parts.iter().any(|p| p.thin) {
            bounds = bounds.expanded(self.thin_offset);
        }
        bounds
    }

    fn collect_seed_points(&self) -> Vec<Vec3> {
        let mut seeds = Vec::with_capacity(self.parts.len() + self.bases.len());
        for part in &self.parts {
            if let Some(seed) = interior_point(&part.mesh, part.thin) {
                seeds.push(seed);
            }
        }
        for base in &self.bases {
            if let Some(seed) = interior_point(base, false) {
                seeds.push(seed);
            }
        }
        seeds
    }

    fn fast_winding_number(&self, p: Vec3) -> f32 {
        let cache = self.cache();
        let solid = cache.solid.as_ref().map_or(0.0, |tree| tree.winding_number(p));
        if solid >= 1.0 {
            return solid;
        }
        let near_thin = cache.thin.as_ref().is_some_and(|bvh| {
            bvh.nearest(p)
                .is_some_and(|hit| hit.distance_squared <= self.thin_offset * self.thin_offset)
        });
        if near_thin { 1.0 } else { solid }
    }

    fn generate_base_closing_mesh(&mut self, policy: BaseCappingPolicy, height: f32, thickness: f32) {
        let points: Vec<Vec3> = self
            .parts
            .iter()
            .flat_map(|part| part.mesh.positions.iter().copied())
            .collect();
        if points.is_empty() {
            tracing::warn!("Base capping requested for an empty scene");
            return;
        }

        let (hull, bottom) = capping::footprint_hull(&points, height);
        if hull.len() < 3 {
            tracing::warn!("Scene footprint is degenerate, skipping base capping");
            return;
        }
        let top = match policy {
            BaseCappingPolicy::NoBaseCapping => return,
            BaseCappingPolicy::ConvexPolygon => bottom + thickness,
            BaseCappingPolicy::ConvexSolid => bottom + height,
        };
        let base = capping::extrude_polygon(&hull, bottom, top);
        tracing::debug!(
            "Generated {:?} base: {} hull points, z {bottom:.2}..{top:.2}",
            policy,
            hull.len()
        );
        self.bases.push(base);
        self.invalidate_cache();
    }

    fn accumulated_mesh(&self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for part in &self.parts {
            mesh.append(&part.mesh);
        }
        for base in &self.bases {
            mesh.append(base);
        }
        mesh
    }

    fn build_spatial_evaluation_cache(&self) {
        self.cache();
    }

    fn geometry_statistics(&self) -> GeometryStatistics {
        self.stats.clone()
    }

    fn cast_ray(&self, origin: Vec3, dir: Vec3, max_t: f32) -> Option<SceneHit> {
        let cache = self.cache();
        let bvh = cache.render.as_ref()?;
        let hit = bvh.cast_ray(origin, dir, max_t)?;
        let [a, b, c] = bvh.triangle_positions(hit.triangle as usize);
        let part = cache.render_part[hit.triangle as usize] as usize;
        Some(SceneHit {
            t: hit.t,
            position: origin + dir * hit.t,
            normal: crate::geometry::triangle_normal(a, b, c),
            material: self.parts[part].material,
        })
    }
}

/// A point inside a closed part, or on the surface of a thin one
///
/// Casts from the largest triangle's centroid along its inward normal and
/// takes the midpoint to the opposite wall.
fn interior_point(mesh: &TriangleMesh, thin: bool) -> Option<Vec3> {
    let largest = (0..mesh.triangle_count())
        .max_by(|&a, &b| mesh.triangle_area(a).total_cmp(&mesh.triangle_area(b)))?;
    let centroid = mesh.triangle_centroid(largest);
    let normal = mesh.triangle_normal(largest);
    if thin || normal == Vec3::ZERO {
        return Some(centroid);
    }

    let epsilon = 1e-4 * mesh.bounds().diagonal_length().max(1.0);
    let origin = centroid - normal * epsilon;
    let bvh = MeshBvh::build(mesh);
    match bvh.cast_ray(origin, -normal, f32::INFINITY) {
        Some(hit) => Some(origin - normal * (hit.t * 0.5)),
        None => Some(origin),
    }
}
