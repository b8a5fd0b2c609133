//! End-to-end runs of the approximation pipeline

use glam::{Vec2, Vec3, Vec4};
use proxyforge_core::bake::texture_size::{MAX_TEXTURE_SIZE, effective_supersample};
use proxyforge_core::bake::{
    BakeCache, BakeSettings, CaptureChannel, CaptureConfig, INVALID_COLOR, TextureChannel, bake_textures,
};
use proxyforge_core::mesh::{compute_hard_normals, compute_tangents};
use proxyforge_core::pipeline::generate_approximation_mesh;
use proxyforge_core::prelude::*;

fn cube_objects() -> Vec<SceneObject> {
    let material = SurfaceMaterial {
        base_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
        roughness: 0.5,
        ..SurfaceMaterial::default()
    };
    vec![SceneObject::new("cube", TriangleMesh::cube(Vec3::new(-50.0, -50.0, 0.0), Vec3::splat(100.0))).with_material(material)]
}

/// Small sizes so a full bake stays quick
fn test_options() -> ApproximationOptions {
    ApproximationOptions {
        simplify_policy: SimplificationPolicy::FixedTriangleCount,
        fixed_triangle_count: 300,
        occlusion_extra_samples: 8,
        occlusion_random_rays: 8,
        texture_image_size: 64,
        render_capture_resolution: 64,
        ..ApproximationOptions::default()
    }
}

fn built_scene(options: &ApproximationOptions) -> MeshScene {
    let mut scene = MeshScene::new();
    scene.add_objects(cube_objects());
    scene.build(options);
    scene.build_spatial_evaluation_cache();
    scene
}

#[test]
fn test_collision_only_emits_one_mesh() {
    let options = ApproximationOptions {
        output_type: ApproximationPolicy::CollisionMesh,
        ..test_options()
    };
    let mut scene = MeshScene::new();
    let mut photos = RaycastPhotoSet::new();
    let mut sink = MemoryAssetSink::new();
    let outcome = approximate_actors(&mut scene, cube_objects(), &mut photos, &mut sink, &options);

    assert_eq!(outcome.result, ApproximationResult::Success);
    assert_eq!(sink.meshes.len(), 1);
    assert!(sink.textures.is_empty());
    assert!(sink.materials.is_empty());
    assert!(outcome.material.is_none());
    assert_eq!(sink.meshes[0].material, None);
    // Never captured
    assert_eq!(photos.view_count(), 0);
}

#[test]
fn test_generated_material_run() {
    let options = test_options();
    let mut scene = MeshScene::new();
    let mut photos = RaycastPhotoSet::new();
    let mut sink = MemoryAssetSink::new();
    let outcome = approximate_actors(&mut scene, cube_objects(), &mut photos, &mut sink, &options);

    assert_eq!(outcome.result, ApproximationResult::Success);
    assert_eq!(photos.view_count(), 14);
    let names: Vec<&str> = outcome.textures.iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["T_Proxy_BaseColor", "T_Proxy_MRS", "T_Proxy_Normal"]);
    assert_eq!(sink.materials.len(), 1);
    assert_eq!(sink.materials[0].textures.len(), 3);
    assert!(sink.materials[0].packed_mrs);

    let mesh = sink.mesh("SM_Proxy").unwrap();
    assert_eq!(mesh.material.as_deref(), Some("MI_Proxy"));
    assert!(mesh.mesh.triangle_count() <= 300);

    let base = sink.texture("T_Proxy_BaseColor").unwrap().image.to_rgba8();
    assert_eq!(base.dimensions(), (64, 64));
    // Mostly red once charts and gutters are filled
    let red = base.pixels().filter(|p| p[0] > 200 && p[1] < 40).count();
    assert!(red > 64 * 64 / 4, "only {red} red texels");
    assert_eq!(outcome.stats.texture_size, 64);
    assert_eq!(outcome.stats.supersample, 1);
}

#[test]
fn test_unsupported_channel_fails_before_work() {
    let options = test_options();
    let mut scene = MeshScene::new();
    let mut photos = RaycastPhotoSet::new().with_unsupported_channels(&[CaptureChannel::PackedMrs]);
    let mut sink = MemoryAssetSink::new();
    let outcome = approximate_actors(&mut scene, cube_objects(), &mut photos, &mut sink, &options);

    assert_eq!(outcome.result, ApproximationResult::MaterialGenerationFailed);
    assert!(sink.is_empty());
    assert_eq!(scene.geometry_statistics().object_count, 0);
}

#[test]
fn test_empty_scene_fails_mesh_generation() {
    let options = test_options();
    let mut scene = MeshScene::new();
    let mut photos = RaycastPhotoSet::new();
    let mut sink = MemoryAssetSink::new();
    let outcome = approximate_actors(&mut scene, Vec::new(), &mut photos, &mut sink, &options);

    assert_eq!(outcome.result, ApproximationResult::MeshGenerationFailed);
    assert!(sink.is_empty());
    assert!(outcome.mesh.is_none());
}

#[test]
fn test_debug_mesh_is_the_scene() {
    let options = ApproximationOptions {
        output_type: ApproximationPolicy::CollisionMesh,
        emit_full_debug_mesh: true,
        ..test_options()
    };
    let mut scene = MeshScene::new();
    let mut photos = RaycastPhotoSet::new();
    let mut sink = MemoryAssetSink::new();
    let outcome = approximate_actors(&mut scene, cube_objects(), &mut photos, &mut sink, &options);

    assert!(outcome.result.is_success());
    assert_eq!(outcome.debug_mesh.as_ref().map(|h| h.name()), Some("SM_Proxy_Debug"));
    assert_eq!(sink.mesh("SM_Proxy_Debug").unwrap().mesh.triangle_count(), 12);
}

#[test]
fn test_supersample_clamped_for_huge_textures() {
    assert_eq!(effective_supersample(8192, 4), 1);

    let options = ApproximationOptions {
        anti_alias_multi_sampling: 2,
        ..test_options()
    };
    let mut scene = MeshScene::new();
    let mut photos = RaycastPhotoSet::new();
    let mut sink = MemoryAssetSink::new();
    let outcome = approximate_actors(&mut scene, cube_objects(), &mut photos, &mut sink, &options);
    assert!(outcome.result.is_success());
    assert_eq!(outcome.stats.supersample, 2);
    // Downsampled back to the requested size
    assert_eq!(sink.textures[0].width(), 64);
}

#[test]
fn test_ground_discard_removes_bottom() {
    let options = ApproximationOptions {
        output_type: ApproximationPolicy::CollisionMesh,
        occlusion_policy: OcclusionPolicy::VisibilityBased,
        ground_plane_policy: GroundPlanePolicy::FixedZHeightGroundPlane,
        ground_plane_z_height: 2.0,
        ground_plane_clipping_policy: GroundPlaneClippingPolicy::DiscardFullyHiddenFaces,
        add_downward_faces_occluder: false,
        ..test_options()
    };
    let scene = built_scene(&options);
    let generated = generate_approximation_mesh(&scene, &options, &|| false).unwrap();
    let mesh = &generated.mesh;

    for t in 0..mesh.triangle_count() {
        let below = mesh.triangle_positions(t).iter().all(|p| p.z <= 2.0);
        assert!(!below, "triangle {t} lies on or below the ground");
    }
    assert!(!mesh.is_closed());
    assert!(generated.stats.occluded_removed > 0);
}

#[test]
fn test_clipping_without_plane_is_noop() {
    let base = ApproximationOptions {
        output_type: ApproximationPolicy::CollisionMesh,
        ..test_options()
    };
    let scene = built_scene(&base);
    let reference = generate_approximation_mesh(&scene, &base, &|| false).unwrap();

    for policy in [
        GroundPlaneClippingPolicy::CutFaces,
        GroundPlaneClippingPolicy::CutFacesAndFill,
        GroundPlaneClippingPolicy::DiscardFullyHiddenFaces,
    ] {
        let options = ApproximationOptions {
            ground_plane_clipping_policy: policy,
            ..base.clone()
        };
        let generated = generate_approximation_mesh(&scene, &options, &|| false).unwrap();
        assert_eq!(generated.mesh.triangle_count(), reference.mesh.triangle_count());
        assert_eq!(generated.mesh.vertex_count(), reference.mesh.vertex_count());
        assert!(generated.stats.clip.is_none());
    }
}

#[test]
fn test_uv_fallback_covers_every_triangle() {
    let options = ApproximationOptions {
        uv_max_charts: 1,
        ..test_options()
    };
    let scene = built_scene(&options);
    let generated = generate_approximation_mesh(&scene, &options, &|| false).unwrap();
    assert!(generated.stats.uv.unwrap().used_fallback);

    let mesh = &generated.mesh;
    let uvs = &mesh.attributes().unwrap().uvs;
    for t in 0..mesh.triangle_count() {
        let corners = uvs.corner_values(t).unwrap();
        assert!(corners.iter().all(|uv| uv.is_finite()));
    }
}

#[test]
fn test_texel_density_clamps_texture_size() {
    let options = ApproximationOptions {
        texture_size_policy: TextureSizePolicy::TexelDensity,
        mesh_texel_density: 1.0e9,
        ..test_options()
    };
    let scene = built_scene(&options);
    let generated = generate_approximation_mesh(&scene, &options, &|| false).unwrap();
    assert_eq!(generated.texture_size, MAX_TEXTURE_SIZE);
}

/// Flat quad at z = 0 spanning `[-half, half]^2`, UVs over the unit square
fn flat_quad(half: f32) -> TriangleMesh {
    let mut mesh = TriangleMesh::from_parts(
        vec![
            Vec3::new(-half, -half, 0.0),
            Vec3::new(half, -half, 0.0),
            Vec3::new(half, half, 0.0),
            Vec3::new(-half, half, 0.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    );
    compute_hard_normals(&mut mesh, 60.0);
    let attributes = mesh.attributes_mut().unwrap();
    for (v, uv) in [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y].into_iter().enumerate() {
        attributes.uvs.append_element(uv, v as u32);
    }
    attributes.uvs.triangles = vec![[0, 1, 2], [0, 2, 3]];
    compute_tangents(&mut mesh);
    mesh
}

#[test]
fn test_infill_is_shared_across_channels() {
    // The captured scene only covers the middle of the baked quad
    let options = test_options();
    let material = SurfaceMaterial {
        base_color: Vec4::new(0.2, 0.8, 0.4, 1.0),
        roughness: 0.7,
        metallic: 0.1,
        ..SurfaceMaterial::default()
    };
    let mut scene = MeshScene::new();
    scene.add_objects(vec![SceneObject::new("floor", flat_quad(50.0)).with_material(material)]);
    scene.build(&options);
    scene.build_spatial_evaluation_cache();

    let mut photos = RaycastPhotoSet::new();
    let config = CaptureConfig {
        resolution: 64,
        field_of_view_degrees: 30.0,
        near_plane: 1.0,
        channels: vec![CaptureChannel::BaseColor, CaptureChannel::PackedMrs],
        debug: false,
    };
    photos.capture(&scene, &config);

    let target = flat_quad(100.0);
    let cache = BakeCache::build(&target, 32);
    let settings = BakeSettings {
        channels: vec![TextureChannel::BaseColor, TextureChannel::PackedMrs],
        texture_size: 32,
        supersample: 1,
        gutter_texels: 0,
    };
    let output = bake_textures(&target, &cache, &photos, &settings);
    let infill = output.infill.as_ref().unwrap();
    assert!(!infill.steps().is_empty());
    assert!(infill.unreachable().is_empty());

    let base = &output.texture(TextureChannel::BaseColor).unwrap().image;
    let mrs = &output.texture(TextureChannel::PackedMrs).unwrap().image;
    for step in infill.steps() {
        let expect_base: Vec4 = step.sources.iter().map(|&(n, w)| base.pixels[n] * w).sum();
        let expect_mrs: Vec4 = step.sources.iter().map(|&(n, w)| mrs.pixels[n] * w).sum();
        assert!((base.pixels[step.pixel] - expect_base).length() < 1e-4);
        assert!((mrs.pixels[step.pixel] - expect_mrs).length() < 1e-4);
    }
    // Constant material, so the fill reproduces it everywhere
    for (b, m) in base.pixels.iter().zip(&mrs.pixels) {
        assert_ne!(*b, INVALID_COLOR);
        assert!((*b - Vec4::new(0.2, 0.8, 0.4, 1.0)).length() < 1e-3);
        assert!((*m - Vec4::new(0.1, 0.7, 0.5, 1.0)).length() < 1e-3);
    }
}
