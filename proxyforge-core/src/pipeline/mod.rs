//! Approximation orchestrator
//!
//! One call takes scene objects and options through:
//!
//! 1. scene build, optional base capping and debug mesh snapshot
//! 2. spatial cache build
//! 3. collision-only: generate and emit the mesh, done
//! 4. otherwise mesh generation on a background thread while photos are
//!    captured here, then join
//! 5. bake, then emit material, textures and mesh
//!
//! Failures come back as an [`ApproximationResult`] code; nothing is emitted
//! after the stage that failed.

mod mesh_task;
mod texture_stage;

pub use mesh_task::{GeneratedMesh, MeshGenerationTask, MeshStageStats, generate_approximation_mesh};
pub use texture_stage::{BakedMaterial, bake_material};

use crate::assets::{AssetHandle, AssetSink, MeshAsset, MeshBuildSettings, debug_mesh_name, mesh_name};
use crate::bake::{CaptureConfig, PhotoCapture, capture_channels, requested_channels};
use crate::error::{ApproximationResult, AssetError, MeshGenerationError};
use crate::options::{ApproximationOptions, ApproximationPolicy, BaseCappingPolicy};
use crate::scene::{SceneAggregator, SceneObject};

/// What one run did, including every degraded-but-continue decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApproximationStats {
    pub mesh: MeshStageStats,
    pub texture_size: u32,
    pub supersample: u32,
    pub infill_holes: usize,
}

/// Result code plus handles to everything emitted
#[derive(Debug, Clone)]
pub struct ApproximationOutcome {
    pub result: ApproximationResult,
    pub textures: Vec<AssetHandle>,
    pub material: Option<AssetHandle>,
    pub mesh: Option<AssetHandle>,
    pub debug_mesh: Option<AssetHandle>,
    pub stats: ApproximationStats,
}

impl ApproximationOutcome {
    fn new() -> Self {
        Self {
            result: ApproximationResult::Success,
            textures: Vec::new(),
            material: None,
            mesh: None,
            debug_mesh: None,
            stats: ApproximationStats::default(),
        }
    }

    fn fail(mut self, result: ApproximationResult) -> Self {
        self.result = result;
        self
    }
}

fn mesh_failure(error: &MeshGenerationError) -> ApproximationResult {
    tracing::error!("Mesh generation failed: {error}");
    ApproximationResult::MeshGenerationFailed
}

fn asset_failure(error: &AssetError) -> ApproximationResult {
    tracing::error!("Asset creation failed: {error}");
    ApproximationResult::UnknownError
}

/// Build a proxy mesh (and, per policy, a baked material) for `objects`
///
/// `scene` receives the objects and is built here; `photos` captures the
/// built scene for baking and is only used for generated-material runs.
pub fn approximate_actors(
    scene: &mut dyn SceneAggregator,
    objects: Vec<SceneObject>,
    photos: &mut dyn PhotoCapture,
    sink: &mut dyn AssetSink,
    options: &ApproximationOptions,
) -> ApproximationOutcome {
    let mut outcome = ApproximationOutcome::new();
    let generate_material = options.output_type == ApproximationPolicy::MeshAndGeneratedMaterial;

    // Cheap check before any expensive work
    let channels = requested_channels(options);
    let captures = capture_channels(&channels);
    if generate_material {
        if let Some(missing) = captures.iter().find(|&&c| !photos.supports_channel(c)) {
            tracing::error!("Capture backend cannot render {missing:?}, cannot generate a material");
            return outcome.fail(ApproximationResult::MaterialGenerationFailed);
        }
    }

    scene.add_objects(objects);
    scene.build(options);
    let statistics = scene.geometry_statistics();
    tracing::info!(
        "Scene: {} objects, {} parts ({} tiny skipped, {} thin), {} triangles, area {:.1}",
        statistics.object_count,
        statistics.part_count,
        statistics.skipped_tiny_parts,
        statistics.thin_parts,
        statistics.triangle_count,
        statistics.surface_area
    );

    if options.base_capping != BaseCappingPolicy::NoBaseCapping {
        scene.generate_base_closing_mesh(
            options.base_capping,
            options.base_capping_height(),
            options.base_capping_thickness(),
        );
    }

    let base = options.asset_base_name().to_string();
    let settings = MeshBuildSettings::from_options(options);
    if options.emit_full_debug_mesh {
        let debug = MeshAsset {
            name: debug_mesh_name(&base),
            mesh: scene.accumulated_mesh(),
            material: None,
            settings,
        };
        match sink.create_static_mesh(debug) {
            Ok(handle) => outcome.debug_mesh = Some(handle),
            Err(error) => return outcome.fail(asset_failure(&error)),
        }
    }

    scene.build_spatial_evaluation_cache();
    let scene: &dyn SceneAggregator = &*scene;

    if !generate_material {
        let generated = match generate_approximation_mesh(scene, options, &|| false) {
            Ok(generated) => generated,
            Err(error) => return outcome.fail(mesh_failure(&error)),
        };
        outcome.stats.mesh = generated.stats;
        let asset = MeshAsset {
            name: mesh_name(&base),
            mesh: generated.mesh,
            material: None,
            settings,
        };
        return match sink.create_static_mesh(asset) {
            Ok(handle) => {
                outcome.mesh = Some(handle);
                outcome
            }
            Err(error) => outcome.fail(asset_failure(&error)),
        };
    }

    let config = CaptureConfig::from_options(options, captures);
    let joined = std::thread::scope(|scope| {
        let task = MeshGenerationTask::spawn(scope, scene, options);
        photos.capture(scene, &config);
        match task {
            Ok(task) => {
                if !task.is_finished() {
                    tracing::debug!("Capture done, waiting for mesh generation");
                }
                task.wait().map_err(|error| mesh_failure(&error))
            }
            Err(error) => {
                tracing::error!("Failed to start mesh generation: {error}");
                Err(ApproximationResult::UnknownError)
            }
        }
    });
    let generated = match joined {
        Ok(generated) => generated,
        Err(result) => return outcome.fail(result),
    };
    outcome.stats.mesh = generated.stats;
    outcome.stats.texture_size = generated.texture_size;

    let baked = bake_material(&generated.mesh, &*photos, options, generated.texture_size);
    outcome.stats.supersample = baked.supersample;
    outcome.stats.infill_holes = baked.infill_holes;

    let material = match sink.create_material(baked.material) {
        Ok(handle) => handle,
        Err(error) => return outcome.fail(asset_failure(&error)),
    };
    debug_assert!(!material.name().is_empty(), "sink returned an unnamed material");
    for texture in baked.textures {
        match sink.create_texture(texture) {
            Ok(handle) => outcome.textures.push(handle),
            Err(error) => return outcome.fail(asset_failure(&error)),
        }
    }
    let asset = MeshAsset {
        name: mesh_name(&base),
        mesh: generated.mesh,
        material: Some(material.name().to_string()),
        settings,
    };
    outcome.material = Some(material);
    match sink.create_static_mesh(asset) {
        Ok(handle) => {
            debug_assert!(!handle.name().is_empty(), "sink returned an unnamed mesh");
            outcome.mesh = Some(handle);
        }
        Err(error) => return outcome.fail(asset_failure(&error)),
    }

    if options.verbose {
        tracing::info!(
            "Approximation done: {} triangles, {} textures at {}",
            outcome.stats.mesh.final_triangles,
            outcome.textures.len(),
            outcome.stats.texture_size
        );
    }
    outcome
}
