//! Approximation options (loaded from TOML or built in code)
//!
//! Every field has a serde default, so an options file only needs the
//! settings it changes. Distances ending in `_meters` are converted to world
//! units (centimeters) with [`meters_to_units`] at the point of use.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ProxyError;

/// World units per meter
pub const UNITS_PER_METER: f32 = 100.0;

/// Convert a distance in meters to world units
#[inline]
pub fn meters_to_units(meters: f64) -> f32 {
    (meters * UNITS_PER_METER as f64) as f32
}

/// What the run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ApproximationPolicy {
    /// Mesh only, default material, no UVs or textures
    CollisionMesh,
    /// Mesh with UVs plus baked textures and a material instance
    #[default]
    MeshAndGeneratedMaterial,
}

/// Synthetic base geometry added to the scene before voxelization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BaseCappingPolicy {
    #[default]
    NoBaseCapping,
    /// Thin convex slab under the footprint
    ConvexPolygon,
    /// Convex prism from the bottom up to the base height
    ConvexSolid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GroundPlanePolicy {
    #[default]
    NoGroundPlane,
    /// Horizontal plane at `ground_plane_z_height`
    FixedZHeightGroundPlane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GroundPlaneClippingPolicy {
    #[default]
    NoClipping,
    /// Drop triangles entirely on or below the plane during occlusion removal
    DiscardFullyHiddenFaces,
    /// Bisect at the plane and discard the lower part
    CutFaces,
    /// Bisect, discard, and triangulate a cap over the cut
    CutFacesAndFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OcclusionPolicy {
    None,
    #[default]
    VisibilityBased,
}

/// How `simplification_target_metric` / `fixed_triangle_count` are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SimplificationPolicy {
    /// Simplify to `fixed_triangle_count`
    #[default]
    FixedTriangleCount,
    /// `simplification_target_metric` triangles per square meter of surface
    TrianglesPerUnitSqMeter,
    /// `simplification_target_metric` is a max deviation in meters
    GeometricTolerance,
}

/// UV parameterization backend preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UvGenerationPolicy {
    /// XAtlas-style normal-cone region growing
    #[default]
    #[serde(alias = "PreferChartGrowing")]
    PreferXAtlas,
    /// UVAtlas-style dominant-axis charts, split where stretch is too high
    #[serde(alias = "PreferAxisCharts")]
    PreferUVAtlas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TextureSizePolicy {
    /// Use `texture_image_size` directly
    #[default]
    TextureSize,
    /// Derive the size from `mesh_texel_density`
    TexelDensity,
}

/// Full configuration of one approximation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproximationOptions {
    #[serde(default)]
    pub output_type: ApproximationPolicy,

    /// Target world-space accuracy (default: 1.0)
    #[serde(default = "default_accuracy")]
    pub world_space_approximation_accuracy_meters: f64,

    #[serde(default)]
    pub auto_thicken_thin_parts: bool,
    /// Thickness given to thin parts (default: 0.5)
    #[serde(default = "default_thicken_thickness")]
    pub auto_thicken_thickness_meters: f64,

    #[serde(default = "default_true")]
    pub ignore_tiny_parts: bool,
    /// Parts smaller than this are dropped (default: 0.05)
    #[serde(default = "default_tiny_part_size")]
    pub tiny_part_size_meters: f64,

    #[serde(default)]
    pub base_capping: BaseCappingPolicy,
    /// Overrides the derived base thickness when non-zero
    #[serde(default)]
    pub base_thickness_override_meters: f64,
    /// Overrides the derived base height when non-zero
    #[serde(default)]
    pub base_height_override_meters: f64,

    /// Upper bound on voxel grid resolution (default: 1024, min: 64)
    #[serde(default = "default_clamp_voxel_dimension")]
    pub clamp_voxel_dimension: u32,
    /// Winding number above which a point is solid (default: 0.5)
    #[serde(default = "default_winding_threshold")]
    pub winding_threshold: f64,

    #[serde(default)]
    pub apply_morphology: bool,
    /// Gap size closed by morphology (default: 0.1)
    #[serde(default = "default_morphology_distance")]
    pub morphology_distance_meters: f64,

    #[serde(default)]
    pub ground_plane_policy: GroundPlanePolicy,
    /// Height of the ground plane in world units (default: 0.0)
    #[serde(default)]
    pub ground_plane_z_height: f64,
    #[serde(default)]
    pub ground_plane_clipping_policy: GroundPlaneClippingPolicy,

    #[serde(default)]
    pub occlusion_policy: OcclusionPolicy,
    /// Add a downward-facing occluder under the mesh during occlusion removal (default: true)
    #[serde(default = "default_true")]
    pub add_downward_faces_occluder: bool,
    /// Random barycentric samples per triangle (default: 50)
    #[serde(default = "default_occlusion_samples")]
    pub occlusion_extra_samples: u32,
    /// Random rays per sample (default: 50)
    #[serde(default = "default_occlusion_samples")]
    pub occlusion_random_rays: u32,
    /// One-ring expansions of the removal selection (default: 1)
    #[serde(default = "default_expand_rings")]
    pub occlusion_expand_rings: u32,
    /// One-ring border contractions of the removal selection (default: 2)
    #[serde(default = "default_contract_rings")]
    pub occlusion_contract_rings: u32,

    #[serde(default)]
    pub simplify_policy: SimplificationPolicy,
    /// Target for `FixedTriangleCount` (default: 2000)
    #[serde(default = "default_fixed_triangle_count")]
    pub fixed_triangle_count: u32,
    /// Triangles per m^2, or tolerance in meters, depending on policy (default: 0.1)
    #[serde(default = "default_target_metric")]
    pub simplification_target_metric: f64,
    /// Coarse pre-pass count before the geometric tolerance pass (default: 50000)
    #[serde(default = "default_geometric_prepass")]
    pub geometric_prepass_triangle_count: u32,
    /// Safety floor for the geometric tolerance pass (default: 8)
    #[serde(default = "default_geometric_floor")]
    pub geometric_final_triangle_floor: u32,

    #[serde(default)]
    pub uv_policy: UvGenerationPolicy,
    /// Maximum chart stretch accepted by the parameterizer (default: 0.11)
    #[serde(default = "default_uv_stretch")]
    pub uv_stretch_target: f32,
    /// Maximum chart count, 0 = automatic (default: 0)
    #[serde(default)]
    pub uv_max_charts: u32,

    #[serde(default)]
    pub use_hard_normals: bool,
    /// Opening angle for hard normal splits (default: 60.0)
    #[serde(default = "default_hard_normal_angle")]
    pub hard_normal_angle_deg: f32,

    #[serde(default = "default_true")]
    pub bake_base_color: bool,
    #[serde(default = "default_true")]
    pub bake_normal_map: bool,
    #[serde(default)]
    pub bake_emissive: bool,
    #[serde(default = "default_true")]
    pub bake_roughness: bool,
    #[serde(default = "default_true")]
    pub bake_metallic: bool,
    #[serde(default = "default_true")]
    pub bake_specular: bool,
    /// Pack roughness/metallic/specular into one RGB texture (default: true)
    #[serde(default = "default_true")]
    pub use_packed_mrs: bool,

    #[serde(default)]
    pub texture_size_policy: TextureSizePolicy,
    /// Texture resolution for `TextureSize` (default: 1024)
    #[serde(default = "default_texture_size")]
    pub texture_image_size: u32,
    /// Texels per meter for `TexelDensity` (default: 10.0)
    #[serde(default = "default_texel_density")]
    pub mesh_texel_density: f32,
    /// Supersampling factor per axis (default: 1)
    #[serde(default = "default_one")]
    pub anti_alias_multi_sampling: u32,

    /// Photo resolution (default: 1024)
    #[serde(default = "default_texture_size")]
    pub render_capture_resolution: u32,
    /// Photo field of view (default: 30.0)
    #[serde(default = "default_fov")]
    pub field_of_view_degrees: f32,
    /// Photo near plane in world units (default: 1.0)
    #[serde(default = "default_near_plane")]
    pub near_plane_dist: f32,
    /// Log every capture view
    #[serde(default)]
    pub enable_render_capture_debug: bool,

    #[serde(default = "default_true")]
    pub enable_nanite: bool,
    #[serde(default)]
    pub support_ray_tracing: bool,
    #[serde(default)]
    pub allow_distance_field: bool,
    #[serde(default)]
    pub generate_lightmap_uvs: bool,

    /// Parent of the generated material instance
    #[serde(default = "default_base_material")]
    pub base_material: String,
    #[serde(default)]
    pub texture_parameters: TextureParameterNames,

    /// Package path the generated asset names derive from
    #[serde(default = "default_package_name")]
    pub base_package_name: String,

    /// Emit the accumulated input scene as an extra mesh asset
    #[serde(default)]
    pub emit_full_debug_mesh: bool,

    /// Log per-stage statistics at info level
    #[serde(default)]
    pub verbose: bool,
}

/// Material parameter names the generated textures are bound to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureParameterNames {
    #[serde(default = "default_base_color_param")]
    pub base_color: String,
    #[serde(default = "default_normal_param")]
    pub normal: String,
    #[serde(default = "default_emissive_param")]
    pub emissive: String,
    #[serde(default = "default_roughness_param")]
    pub roughness: String,
    #[serde(default = "default_metallic_param")]
    pub metallic: String,
    #[serde(default = "default_specular_param")]
    pub specular: String,
    #[serde(default = "default_packed_mrs_param")]
    pub packed_mrs: String,
}

fn default_accuracy() -> f64 {
    1.0
}
fn default_thicken_thickness() -> f64 {
    0.5
}
fn default_tiny_part_size() -> f64 {
    0.05
}
fn default_clamp_voxel_dimension() -> u32 {
    1024
}
fn default_winding_threshold() -> f64 {
    0.5
}
fn default_morphology_distance() -> f64 {
    0.1
}
fn default_occlusion_samples() -> u32 {
    50
}
fn default_expand_rings() -> u32 {
    1
}
fn default_contract_rings() -> u32 {
    2
}
fn default_fixed_triangle_count() -> u32 {
    2000
}
fn default_target_metric() -> f64 {
    0.1
}
fn default_geometric_prepass() -> u32 {
    50_000
}
fn default_geometric_floor() -> u32 {
    8
}
fn default_uv_stretch() -> f32 {
    0.11
}
fn default_hard_normal_angle() -> f32 {
    60.0
}
fn default_texture_size() -> u32 {
    1024
}
fn default_texel_density() -> f32 {
    10.0
}
fn default_one() -> u32 {
    1
}
fn default_fov() -> f32 {
    30.0
}
fn default_near_plane() -> f32 {
    1.0
}
fn default_base_material() -> String {
    "/Proxy/Materials/M_ProxyBase".to_string()
}
fn default_package_name() -> String {
    "/Game/Proxies/Proxy".to_string()
}
fn default_true() -> bool {
    true
}

fn default_base_color_param() -> String {
    "BaseColor".to_string()
}
fn default_normal_param() -> String {
    "NormalMap".to_string()
}
fn default_emissive_param() -> String {
    "EmissiveHDR".to_string()
}
fn default_roughness_param() -> String {
    "Roughness".to_string()
}
fn default_metallic_param() -> String {
    "Metallic".to_string()
}
fn default_specular_param() -> String {
    "Specular".to_string()
}
fn default_packed_mrs_param() -> String {
    "PackedMRS".to_string()
}

impl Default for TextureParameterNames {
    fn default() -> Self {
        Self {
            base_color: default_base_color_param(),
            normal: default_normal_param(),
            emissive: default_emissive_param(),
            roughness: default_roughness_param(),
            metallic: default_metallic_param(),
            specular: default_specular_param(),
            packed_mrs: default_packed_mrs_param(),
        }
    }
}

impl Default for ApproximationOptions {
    fn default() -> Self {
        Self {
            output_type: ApproximationPolicy::default(),
            world_space_approximation_accuracy_meters: default_accuracy(),
            auto_thicken_thin_parts: false,
            auto_thicken_thickness_meters: default_thicken_thickness(),
            ignore_tiny_parts: default_true(),
            tiny_part_size_meters: default_tiny_part_size(),
            base_capping: BaseCappingPolicy::default(),
            base_thickness_override_meters: 0.0,
            base_height_override_meters: 0.0,
            clamp_voxel_dimension: default_clamp_voxel_dimension(),
            winding_threshold: default_winding_threshold(),
            apply_morphology: false,
            morphology_distance_meters: default_morphology_distance(),
            ground_plane_policy: GroundPlanePolicy::default(),
            ground_plane_z_height: 0.0,
            ground_plane_clipping_policy: GroundPlaneClippingPolicy::default(),
            occlusion_policy: OcclusionPolicy::default(),
            add_downward_faces_occluder: default_true(),
            occlusion_extra_samples: default_occlusion_samples(),
            occlusion_random_rays: default_occlusion_samples(),
            occlusion_expand_rings: default_expand_rings(),
            occlusion_contract_rings: default_contract_rings(),
            simplify_policy: SimplificationPolicy::default(),
            fixed_triangle_count: default_fixed_triangle_count(),
            simplification_target_metric: default_target_metric(),
            geometric_prepass_triangle_count: default_geometric_prepass(),
            geometric_final_triangle_floor: default_geometric_floor(),
            uv_policy: UvGenerationPolicy::default(),
            uv_stretch_target: default_uv_stretch(),
            uv_max_charts: 0,
            use_hard_normals: false,
            hard_normal_angle_deg: default_hard_normal_angle(),
            bake_base_color: default_true(),
            bake_normal_map: default_true(),
            bake_emissive: false,
            bake_roughness: default_true(),
            bake_metallic: default_true(),
            bake_specular: default_true(),
            use_packed_mrs: default_true(),
            texture_size_policy: TextureSizePolicy::default(),
            texture_image_size: default_texture_size(),
            mesh_texel_density: default_texel_density(),
            anti_alias_multi_sampling: default_one(),
            render_capture_resolution: default_texture_size(),
            field_of_view_degrees: default_fov(),
            near_plane_dist: default_near_plane(),
            enable_render_capture_debug: false,
            enable_nanite: default_true(),
            support_ray_tracing: false,
            allow_distance_field: false,
            generate_lightmap_uvs: false,
            base_material: default_base_material(),
            texture_parameters: TextureParameterNames::default(),
            base_package_name: default_package_name(),
            emit_full_debug_mesh: false,
            verbose: false,
        }
    }
}

impl ApproximationOptions {
    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self, ProxyError> {
        let content = std::fs::read_to_string(path).map_err(|source| ProxyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate options from a TOML string
    pub fn parse(content: &str) -> Result<Self, ProxyError> {
        let options: Self = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ProxyError> {
        fn invalid(field: &'static str, reason: &str) -> Result<(), ProxyError> {
            Err(ProxyError::InvalidOption {
                field,
                reason: reason.to_string(),
            })
        }

        if !(self.world_space_approximation_accuracy_meters > 0.0) {
            return invalid("world_space_approximation_accuracy_meters", "must be > 0");
        }
        if self.clamp_voxel_dimension < crate::solidify::MIN_VOXEL_DIMENSION {
            return invalid("clamp_voxel_dimension", "must be >= 64");
        }
        if self.texture_image_size == 0 {
            return invalid("texture_image_size", "must be > 0");
        }
        if self.render_capture_resolution == 0 {
            return invalid("render_capture_resolution", "must be > 0");
        }
        if self.anti_alias_multi_sampling == 0 {
            return invalid("anti_alias_multi_sampling", "must be >= 1");
        }
        if !(self.field_of_view_degrees > 0.0 && self.field_of_view_degrees < 180.0) {
            return invalid("field_of_view_degrees", "must be in (0, 180)");
        }
        if self.texture_size_policy == TextureSizePolicy::TexelDensity
            && !(self.mesh_texel_density > 0.0)
        {
            return invalid("mesh_texel_density", "must be > 0");
        }
        Ok(())
    }

    /// Approximation accuracy in world units
    pub fn approximation_accuracy(&self) -> f32 {
        meters_to_units(self.world_space_approximation_accuracy_meters)
    }

    /// Z height of the configured ground plane, if any
    pub fn ground_clip_height(&self) -> Option<f32> {
        match self.ground_plane_policy {
            GroundPlanePolicy::NoGroundPlane => None,
            GroundPlanePolicy::FixedZHeightGroundPlane => Some(self.ground_plane_z_height as f32),
        }
    }

    /// Base cap thickness: override, else thickening amount, else 1.25x accuracy
    pub fn base_capping_thickness(&self) -> f32 {
        if self.base_thickness_override_meters != 0.0 {
            meters_to_units(self.base_thickness_override_meters)
        } else if self.auto_thicken_thin_parts {
            meters_to_units(self.auto_thicken_thickness_meters)
        } else {
            1.25 * self.approximation_accuracy()
        }
    }

    /// Base cap height: override, else 2x accuracy
    pub fn base_capping_height(&self) -> f32 {
        if self.base_height_override_meters != 0.0 {
            meters_to_units(self.base_height_override_meters)
        } else {
            2.0 * self.approximation_accuracy()
        }
    }

    /// Name of the last package path segment, used to build asset names
    pub fn asset_base_name(&self) -> &str {
        self.base_package_name
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("Proxy")
    }
}
