//! Output assets and the sinks that receive them
//!
//! The pipeline hands finished textures, the material instance and the
//! static meshes to an [`AssetSink`]. Sinks only store or write what they are
//! given; naming and per-channel pixel conversion happen here so every sink
//! sees the same assets.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::bake::{FloatImage, TextureChannel};
use crate::error::AssetError;
use crate::mesh::{TriangleMesh, write_obj};
use crate::options::{ApproximationOptions, TextureParameterNames};

/// Name of an asset created by a sink
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetHandle(String);

impl AssetHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn texture_name(base: &str, channel: TextureChannel) -> String {
    format!("T_{base}_{}", channel.suffix())
}

pub fn material_name(base: &str) -> String {
    format!("MI_{base}")
}

pub fn mesh_name(base: &str) -> String {
    format!("SM_{base}")
}

pub fn debug_mesh_name(base: &str) -> String {
    format!("SM_{base}_Debug")
}

/// Material parameter that receives `channel`
pub fn parameter_name(names: &TextureParameterNames, channel: TextureChannel) -> &str {
    match channel {
        TextureChannel::BaseColor => &names.base_color,
        TextureChannel::Normal => &names.normal,
        TextureChannel::Emissive => &names.emissive,
        TextureChannel::Roughness => &names.roughness,
        TextureChannel::Metallic => &names.metallic,
        TextureChannel::Specular => &names.specular,
        TextureChannel::PackedMrs => &names.packed_mrs,
    }
}

#[inline]
fn linear_to_srgb(value: f32) -> f32 {
    let v = value.clamp(0.0, 1.0);
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

#[inline]
fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// An 8-bit texture ready for a sink
#[derive(Debug, Clone)]
pub struct TextureAsset {
    pub name: String,
    pub channel: TextureChannel,
    /// Whether pixel values are sRGB encoded
    pub srgb: bool,
    pub image: DynamicImage,
}

impl TextureAsset {
    /// Convert a baked float image by channel kind
    ///
    /// Base color becomes sRGB RGBA8, scalar channels become single-channel
    /// L8, and normal, emissive and packed MRS stay linear RGB8. Normals are
    /// remapped from [-1, 1] to [0, 1] first.
    pub fn from_baked(name: impl Into<String>, channel: TextureChannel, baked: &FloatImage) -> Self {
        let (w, h) = (baked.width, baked.height);
        let pixel = |x: u32, y: u32| baked.get(x, y);
        let image = match channel {
            TextureChannel::BaseColor => DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
                let p = pixel(x, y);
                image::Rgba([
                    to_u8(linear_to_srgb(p.x)),
                    to_u8(linear_to_srgb(p.y)),
                    to_u8(linear_to_srgb(p.z)),
                    to_u8(p.w),
                ])
            })),
            TextureChannel::Roughness | TextureChannel::Metallic | TextureChannel::Specular => {
                DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| image::Luma([to_u8(pixel(x, y).x)])))
            }
            TextureChannel::Normal => DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                let n = pixel(x, y).truncate() * 0.5 + 0.5;
                image::Rgb([to_u8(n.x), to_u8(n.y), to_u8(n.z)])
            })),
            TextureChannel::Emissive | TextureChannel::PackedMrs => {
                DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                    let p = pixel(x, y);
                    image::Rgb([to_u8(p.x), to_u8(p.y), to_u8(p.z)])
                }))
            }
        };
        Self {
            name: name.into(),
            channel,
            srgb: channel == TextureChannel::BaseColor,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Instance of the base material with the baked textures bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialInstanceAsset {
    pub name: String,
    pub parent: String,
    /// Whether roughness/metallic/specular come packed in one texture
    pub packed_mrs: bool,
    /// Parameter name -> texture asset name
    pub textures: BTreeMap<String, String>,
}

impl MaterialInstanceAsset {
    pub fn new(options: &ApproximationOptions) -> Self {
        Self {
            name: material_name(options.asset_base_name()),
            parent: options.base_material.clone(),
            packed_mrs: false,
            textures: BTreeMap::new(),
        }
    }

    /// Bind a texture to the parameter for its channel
    pub fn bind(&mut self, names: &TextureParameterNames, texture: &TextureAsset) {
        if texture.channel == TextureChannel::PackedMrs {
            self.packed_mrs = true;
        }
        self.textures
            .insert(parameter_name(names, texture.channel).to_string(), texture.name.clone());
    }
}

/// Static mesh build flags carried over from the options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeshBuildSettings {
    pub enable_nanite: bool,
    pub support_ray_tracing: bool,
    pub allow_distance_field: bool,
    pub generate_lightmap_uvs: bool,
}

impl MeshBuildSettings {
    pub fn from_options(options: &ApproximationOptions) -> Self {
        Self {
            enable_nanite: options.enable_nanite,
            support_ray_tracing: options.support_ray_tracing,
            allow_distance_field: options.allow_distance_field,
            generate_lightmap_uvs: options.generate_lightmap_uvs,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeshAsset {
    pub name: String,
    pub mesh: TriangleMesh,
    /// `None` uses the sink's default material
    pub material: Option<String>,
    pub settings: MeshBuildSettings,
}

/// Receiver for everything a run produces
pub trait AssetSink {
    fn create_texture(&mut self, texture: TextureAsset) -> Result<AssetHandle, AssetError>;

    fn create_material(&mut self, material: MaterialInstanceAsset) -> Result<AssetHandle, AssetError>;

    fn create_static_mesh(&mut self, mesh: MeshAsset) -> Result<AssetHandle, AssetError>;
}

fn check_texture(texture: &TextureAsset) -> Result<(), AssetError> {
    if texture.width() == 0 || texture.height() == 0 {
        return Err(AssetError::Empty(texture.name.clone()));
    }
    Ok(())
}

fn check_mesh(mesh: &MeshAsset) -> Result<(), AssetError> {
    if mesh.mesh.is_empty() {
        return Err(AssetError::Empty(mesh.name.clone()));
    }
    Ok(())
}

/// Keeps every asset in memory
#[derive(Debug, Default)]
pub struct MemoryAssetSink {
    pub textures: Vec<TextureAsset>,
    pub materials: Vec<MaterialInstanceAsset>,
    pub meshes: Vec<MeshAsset>,
}

impl MemoryAssetSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(&self, name: &str) -> Option<&TextureAsset> {
        self.textures.iter().find(|t| t.name == name)
    }

    pub fn mesh(&self, name: &str) -> Option<&MeshAsset> {
        self.meshes.iter().find(|m| m.name == name)
    }

    /// Number of assets of any kind
    pub fn len(&self) -> usize {
        self.textures.len() + self.materials.len() + self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssetSink for MemoryAssetSink {
    fn create_texture(&mut self, texture: TextureAsset) -> Result<AssetHandle, AssetError> {
        check_texture(&texture)?;
        let handle = AssetHandle::new(&texture.name);
        self.textures.push(texture);
        Ok(handle)
    }

    fn create_material(&mut self, material: MaterialInstanceAsset) -> Result<AssetHandle, AssetError> {
        let handle = AssetHandle::new(&material.name);
        self.materials.push(material);
        Ok(handle)
    }

    fn create_static_mesh(&mut self, mesh: MeshAsset) -> Result<AssetHandle, AssetError> {
        check_mesh(&mesh)?;
        let handle = AssetHandle::new(&mesh.name);
        self.meshes.push(mesh);
        Ok(handle)
    }
}

/// On-disk mesh sidecar
#[derive(Serialize)]
struct MeshManifest<'a> {
    mesh: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    material: Option<&'a str>,
    settings: MeshBuildSettings,
}

/// Writes PNG textures, TOML materials and OBJ meshes into one directory
#[derive(Debug, Clone)]
pub struct DirectoryAssetSink {
    dir: PathBuf,
}

impl DirectoryAssetSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str, extension: &str) -> Result<PathBuf, AssetError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| AssetError::Io {
            name: name.to_string(),
            source,
        })?;
        Ok(self.dir.join(format!("{name}.{extension}")))
    }

    fn write_text(&self, name: &str, extension: &str, text: &str) -> Result<(), AssetError> {
        let path = self.path_for(name, extension)?;
        std::fs::write(&path, text).map_err(|source| AssetError::Io {
            name: name.to_string(),
            source,
        })
    }
}

impl AssetSink for DirectoryAssetSink {
    fn create_texture(&mut self, texture: TextureAsset) -> Result<AssetHandle, AssetError> {
        check_texture(&texture)?;
        let path = self.path_for(&texture.name, "png")?;
        texture
            .image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|source| AssetError::Image {
                name: texture.name.clone(),
                source,
            })?;
        tracing::debug!("Wrote {}", path.display());
        Ok(AssetHandle::new(texture.name))
    }

    fn create_material(&mut self, material: MaterialInstanceAsset) -> Result<AssetHandle, AssetError> {
        let text = toml::to_string_pretty(&material).map_err(|source| AssetError::Material {
            name: material.name.clone(),
            source,
        })?;
        self.write_text(&material.name, "toml", &text)?;
        Ok(AssetHandle::new(material.name))
    }

    fn create_static_mesh(&mut self, mesh: MeshAsset) -> Result<AssetHandle, AssetError> {
        check_mesh(&mesh)?;
        let io_error = |source| AssetError::Io {
            name: mesh.name.clone(),
            source,
        };

        let path = self.path_for(&mesh.name, "obj")?;
        let file = File::create(&path).map_err(io_error)?;
        let mut out = BufWriter::new(file);
        write_obj(&mesh.mesh, &mesh.name, &mut out).map_err(io_error)?;
        out.flush().map_err(io_error)?;

        let manifest = MeshManifest {
            mesh: &mesh.name,
            material: mesh.material.as_deref(),
            settings: mesh.settings,
        };
        let text = toml::to_string_pretty(&manifest).map_err(|source| AssetError::Material {
            name: mesh.name.clone(),
            source,
        })?;
        self.write_text(&mesh.name, "toml", &text)?;
        tracing::debug!("Wrote {}", path.display());
        Ok(AssetHandle::new(mesh.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    #[test]
    fn test_names_use_last_package_segment() {
        let options = ApproximationOptions {
            base_package_name: "/Game/Proxies/Castle".to_string(),
            ..ApproximationOptions::default()
        };
        let base = options.asset_base_name();
        assert_eq!(texture_name(base, TextureChannel::BaseColor), "T_Castle_BaseColor");
        assert_eq!(texture_name(base, TextureChannel::PackedMrs), "T_Castle_MRS");
        assert_eq!(material_name(base), "MI_Castle");
        assert_eq!(mesh_name(base), "SM_Castle");
        assert_eq!(debug_mesh_name(base), "SM_Castle_Debug");
    }

    #[test]
    fn test_channel_conversion() {
        let baked = FloatImage::filled(2, 2, Vec4::new(0.5, 0.25, 1.0, 1.0));
        let base = TextureAsset::from_baked("a", TextureChannel::BaseColor, &baked);
        assert!(base.srgb);
        assert!(matches!(base.image, DynamicImage::ImageRgba8(_)));
        // sRGB encoding brightens mid greys
        assert!(base.image.to_rgba8().get_pixel(0, 0)[0] > 128);

        let rough = TextureAsset::from_baked("b", TextureChannel::Roughness, &baked);
        assert!(!rough.srgb);
        assert_eq!(rough.image.to_luma8().get_pixel(1, 1)[0], 128);

        let mrs = TextureAsset::from_baked("c", TextureChannel::PackedMrs, &baked);
        assert_eq!(mrs.image.to_rgb8().get_pixel(0, 1).0, [128, 64, 255]);

        let up = FloatImage::filled(1, 1, Vec4::new(0.0, 0.0, 1.0, 1.0));
        let normal = TextureAsset::from_baked("d", TextureChannel::Normal, &up);
        assert_eq!(normal.image.to_rgb8().get_pixel(0, 0).0, [128, 128, 255]);
    }

    #[test]
    fn test_material_binds_parameters() {
        let options = ApproximationOptions::default();
        let mut material = MaterialInstanceAsset::new(&options);
        let baked = FloatImage::filled(1, 1, Vec4::ONE);
        let texture = TextureAsset::from_baked("T_Proxy_MRS", TextureChannel::PackedMrs, &baked);
        material.bind(&options.texture_parameters, &texture);
        assert!(material.packed_mrs);
        assert_eq!(
            material.textures.get(&options.texture_parameters.packed_mrs),
            Some(&"T_Proxy_MRS".to_string())
        );
    }

    #[test]
    fn test_memory_sink_rejects_empty_mesh() {
        let mut sink = MemoryAssetSink::new();
        let result = sink.create_static_mesh(MeshAsset {
            name: "SM_Empty".to_string(),
            mesh: TriangleMesh::new(),
            material: None,
            settings: MeshBuildSettings::default(),
        });
        assert!(matches!(result, Err(AssetError::Empty(_))));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_directory_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectoryAssetSink::new(dir.path().join("Proxy"));

        let baked = FloatImage::filled(4, 4, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let texture = TextureAsset::from_baked("T_Proxy_BaseColor", TextureChannel::BaseColor, &baked);
        let options = ApproximationOptions::default();
        let mut material = MaterialInstanceAsset::new(&options);
        material.bind(&options.texture_parameters, &texture);

        sink.create_texture(texture).unwrap();
        sink.create_material(material).unwrap();
        let handle = sink
            .create_static_mesh(MeshAsset {
                name: "SM_Proxy".to_string(),
                mesh: TriangleMesh::cube(Vec3::ZERO, Vec3::ONE),
                material: Some("MI_Proxy".to_string()),
                settings: MeshBuildSettings::from_options(&options),
            })
            .unwrap();
        assert_eq!(handle.name(), "SM_Proxy");

        let png = image::open(sink.dir().join("T_Proxy_BaseColor.png")).unwrap();
        assert_eq!(png.width(), 4);
        let material_text = std::fs::read_to_string(sink.dir().join("MI_Proxy.toml")).unwrap();
        let parsed: MaterialInstanceAsset = toml::from_str(&material_text).unwrap();
        assert_eq!(parsed.textures.len(), 1);
        let obj = std::fs::read_to_string(sink.dir().join("SM_Proxy.obj")).unwrap();
        assert_eq!(obj.lines().filter(|l| l.starts_with("f ")).count(), 12);
        let sidecar = std::fs::read_to_string(sink.dir().join("SM_Proxy.toml")).unwrap();
        assert!(sidecar.contains("enable_nanite = true"));
    }
}
