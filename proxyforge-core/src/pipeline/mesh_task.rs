//! Mesh generation: everything from voxelization to tangents
//!
//! Runs on its own named thread while the calling thread captures photos;
//! [`MeshGenerationTask::wait`] is the single join point.

use std::thread::{self, Scope, ScopedJoinHandle};

use crate::bake::texture_size::select_texture_size;
use crate::clip::{ClipMode, ClipReport, clip_to_plane};
use crate::error::MeshGenerationError;
use crate::geometry::GroundPlane;
use crate::mesh::{TriangleMesh, compute_hard_normals, compute_smooth_normals, compute_tangents};
use crate::morphology::close_gaps;
use crate::occlusion::{OcclusionSettings, remove_occluded_triangles};
use crate::options::{
    ApproximationOptions, ApproximationPolicy, GroundPlaneClippingPolicy, OcclusionPolicy, meters_to_units,
};
use crate::scene::SceneAggregator;
use crate::simplify::simplify_with_policy;
use crate::solidify::{Cancel, solidify, voxel_dimension};
use crate::uv::{UvReport, UvSettings, generate_uvs};

/// Per-stage counts recorded while generating the mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshStageStats {
    pub voxel_dimension: u32,
    pub solid_triangles: usize,
    /// `None` when morphology is off
    pub closed_triangles: Option<usize>,
    pub simplified_triangles: usize,
    pub occluded_removed: usize,
    pub clip: Option<ClipReport>,
    pub final_triangles: usize,
    pub uv: Option<UvReport>,
}

/// Final mesh plus what the texture stage needs to know about it
#[derive(Debug, Clone)]
pub struct GeneratedMesh {
    pub mesh: TriangleMesh,
    /// Output texture size; 0 for collision-only runs
    pub texture_size: u32,
    pub stats: MeshStageStats,
}

fn log_stage(options: &ApproximationOptions, stage: &str, triangles: usize) {
    if options.verbose {
        tracing::info!("{stage}: {triangles} triangles");
    } else {
        tracing::debug!("{stage}: {triangles} triangles");
    }
}

/// Run the whole mesh path against a built scene
///
/// Only an empty solid or cancellation stops it; every other problem is
/// logged and worked around.
pub fn generate_approximation_mesh(
    scene: &dyn SceneAggregator,
    options: &ApproximationOptions,
    cancel: Cancel,
) -> Result<GeneratedMesh, MeshGenerationError> {
    let mut stats = MeshStageStats::default();
    let accuracy = options.approximation_accuracy();

    let bounds = scene.bounding_box();
    let dimension = voxel_dimension(&bounds, accuracy, options.clamp_voxel_dimension);
    stats.voxel_dimension = dimension;
    let mut mesh = solidify(scene, dimension, options.winding_threshold as f32, cancel)?;
    stats.solid_triangles = mesh.triangle_count();
    log_stage(options, "Solidified", mesh.triangle_count());
    if mesh.is_empty() {
        tracing::error!("Solidification produced an empty mesh");
        return Err(MeshGenerationError::EmptySolid);
    }

    if options.apply_morphology {
        let distance = meters_to_units(options.morphology_distance_meters);
        let closed = close_gaps(&mesh, distance, dimension, cancel)?;
        if closed.is_empty() {
            tracing::warn!("Morphological closing produced an empty mesh, keeping the solidified mesh");
        } else {
            mesh = closed;
        }
        stats.closed_triangles = Some(mesh.triangle_count());
        log_stage(options, "Closed", mesh.triangle_count());
    }

    simplify_with_policy(&mut mesh, options, cancel)?;
    stats.simplified_triangles = mesh.triangle_count();
    log_stage(options, "Simplified", mesh.triangle_count());

    let ground = options.ground_clip_height().map(GroundPlane::new);
    if options.occlusion_policy == OcclusionPolicy::VisibilityBased {
        let discard_below =
            if options.ground_plane_clipping_policy == GroundPlaneClippingPolicy::DiscardFullyHiddenFaces {
                if ground.is_none() {
                    tracing::warn!("DiscardFullyHiddenFaces requested without a ground plane, skipping");
                }
                ground
            } else {
                None
            };
        let settings = OcclusionSettings::from_options(options, discard_below);
        stats.occluded_removed = remove_occluded_triangles(&mut mesh, &settings);
        log_stage(options, "Occlusion removed", stats.occluded_removed);
    }

    let clip_mode = match options.ground_plane_clipping_policy {
        GroundPlaneClippingPolicy::CutFaces => Some(ClipMode::Cut),
        GroundPlaneClippingPolicy::CutFacesAndFill => Some(ClipMode::CutAndFill),
        GroundPlaneClippingPolicy::NoClipping | GroundPlaneClippingPolicy::DiscardFullyHiddenFaces => None,
    };
    if let Some(mode) = clip_mode {
        match ground {
            Some(plane) => {
                let report = clip_to_plane(&mut mesh, &plane, mode);
                log_stage(options, "Clipped", report.triangles_after);
                stats.clip = Some(report);
            }
            None => tracing::warn!("Ground clipping requested without a ground plane, skipping"),
        }
    }

    // Topology is final from here on
    mesh.enable_attributes();
    if options.use_hard_normals {
        compute_hard_normals(&mut mesh, options.hard_normal_angle_deg);
    } else {
        compute_smooth_normals(&mut mesh);
    }
    stats.final_triangles = mesh.triangle_count();

    if options.output_type == ApproximationPolicy::CollisionMesh {
        return Ok(GeneratedMesh {
            mesh,
            texture_size: 0,
            stats,
        });
    }

    let uv = generate_uvs(&mut mesh, &UvSettings::from_options(options, options.texture_image_size));
    stats.uv = Some(uv);
    // Density-driven sizes need the packed layout's UV area
    let texture_size = select_texture_size(options, &mesh);
    if !compute_tangents(&mut mesh) {
        tracing::warn!("Tangents unavailable, normal map will use a per-texel fallback frame");
    }

    Ok(GeneratedMesh {
        mesh,
        texture_size,
        stats,
    })
}

/// Handle to mesh generation running on a background thread
pub struct MeshGenerationTask<'scope> {
    handle: ScopedJoinHandle<'scope, Result<GeneratedMesh, MeshGenerationError>>,
}

impl<'scope> MeshGenerationTask<'scope> {
    /// Start mesh generation inside `scope`
    ///
    /// The task is not cancellable once started.
    pub fn spawn<'env>(
        scope: &'scope Scope<'scope, 'env>,
        scene: &'env dyn SceneAggregator,
        options: &'env ApproximationOptions,
    ) -> std::io::Result<Self> {
        let handle = thread::Builder::new()
            .name("proxy-mesh-gen".into())
            .spawn_scoped(scope, move || generate_approximation_mesh(scene, options, &|| false))?;
        Ok(Self { handle })
    }

    /// Whether the mesh is ready, so [`MeshGenerationTask::wait`] would not block
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the mesh is ready
    pub fn wait(self) -> Result<GeneratedMesh, MeshGenerationError> {
        self.handle
            .join()
            .unwrap_or(Err(MeshGenerationError::TaskPanicked))
    }
}
