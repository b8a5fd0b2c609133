//! Scene manifest parsing
//!
//! A scene manifest lists OBJ parts with their placement and a constant
//! material, plus an optional inline `[options]` table.

use anyhow::{Context, Result};
use glam::{EulerRot, Mat4, Quat, Vec3, Vec4};
use proxyforge_core::ApproximationOptions;
use proxyforge_core::mesh::read_obj;
use proxyforge_core::scene::{SceneObject, SurfaceMaterial};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// scene.toml manifest structure
#[derive(Debug, Deserialize)]
pub struct SceneManifest {
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
    pub options: Option<ApproximationOptions>,
}

/// One OBJ part
#[derive(Debug, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    /// OBJ path, relative to the manifest
    pub mesh: String,
    #[serde(default)]
    pub translation: [f32; 3],
    /// XYZ Euler angles
    #[serde(default)]
    pub rotation_degrees: [f32; 3],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    #[serde(default)]
    pub material: MaterialEntry,
}

fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// Constant material channels
#[derive(Debug, Deserialize)]
pub struct MaterialEntry {
    #[serde(default = "default_base_color")]
    pub base_color: [f32; 4],
    #[serde(default = "default_half")]
    pub roughness: f32,
    #[serde(default)]
    pub metallic: f32,
    #[serde(default = "default_half")]
    pub specular: f32,
    #[serde(default)]
    pub emissive: [f32; 3],
}

fn default_base_color() -> [f32; 4] {
    [0.5, 0.5, 0.5, 1.0]
}

fn default_half() -> f32 {
    0.5
}

impl Default for MaterialEntry {
    fn default() -> Self {
        Self {
            base_color: default_base_color(),
            roughness: default_half(),
            metallic: 0.0,
            specular: default_half(),
            emissive: [0.0; 3],
        }
    }
}

impl From<&MaterialEntry> for SurfaceMaterial {
    fn from(entry: &MaterialEntry) -> Self {
        SurfaceMaterial {
            base_color: Vec4::from_array(entry.base_color),
            roughness: entry.roughness,
            metallic: entry.metallic,
            specular: entry.specular,
            emissive: Vec3::from_array(entry.emissive),
        }
    }
}

impl ObjectEntry {
    pub fn transform(&self) -> Mat4 {
        let [rx, ry, rz] = self.rotation_degrees.map(f32::to_radians);
        Mat4::from_scale_rotation_translation(
            Vec3::from_array(self.scale),
            Quat::from_euler(EulerRot::XYZ, rx, ry, rz),
            Vec3::from_array(self.translation),
        )
    }
}

impl SceneManifest {
    /// Load manifest from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse manifest from string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse scene manifest")
    }

    /// Options from `options_path` if given, else the inline table, else defaults
    pub fn resolve_options(&self, options_path: Option<&Path>) -> Result<ApproximationOptions> {
        let options = match options_path {
            Some(path) => ApproximationOptions::load(path)
                .with_context(|| format!("Failed to load options: {}", path.display()))?,
            None => self.options.clone().unwrap_or_default(),
        };
        options.validate()?;
        Ok(options)
    }

    /// Validate manifest fields against the directory it lives in
    pub fn validate(&self, base_dir: &Path) -> Result<()> {
        if self.objects.is_empty() {
            anyhow::bail!("Scene manifest lists no objects");
        }
        for object in &self.objects {
            if object.scale.iter().any(|&s| s == 0.0 || !s.is_finite()) {
                anyhow::bail!("Object '{}' has a degenerate scale {:?}", object.name, object.scale);
            }
            let path = base_dir.join(&object.mesh);
            if !path.exists() {
                anyhow::bail!("Mesh for object '{}' not found: {}", object.name, path.display());
            }
        }
        Ok(())
    }

    /// Read every OBJ and place it
    pub fn scene_objects(&self, base_dir: &Path) -> Result<Vec<SceneObject>> {
        self.objects
            .iter()
            .map(|entry| {
                let path: PathBuf = base_dir.join(&entry.mesh);
                let mesh = read_obj(&path)
                    .with_context(|| format!("Failed to load mesh for '{}'", entry.name))?;
                Ok(SceneObject::new(&entry.name, mesh)
                    .with_transform(entry.transform())
                    .with_material(SurfaceMaterial::from(&entry.material)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxyforge_core::options::ApproximationPolicy;

    const CUBE_OBJ: &str = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 0 1\nv 1 0 1\nv 1 1 1\nv 0 1 1\n\
f 1 3 2\nf 1 4 3\nf 5 6 7\nf 5 7 8\nf 1 2 6\nf 1 6 5\nf 4 8 7\nf 4 7 3\nf 1 5 8\nf 1 8 4\nf 2 3 7\nf 2 7 6\n";

    #[test]
    fn test_manifest_minimal() {
        let manifest = SceneManifest::parse(
            r#"
[[objects]]
name = "crate"
mesh = "crate.obj"
"#,
        )
        .unwrap();
        assert_eq!(manifest.objects.len(), 1);
        let object = &manifest.objects[0];
        assert_eq!(object.scale, [1.0, 1.0, 1.0]);
        assert_eq!(object.material.base_color, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(object.transform(), Mat4::IDENTITY);
        assert!(manifest.options.is_none());
    }

    #[test]
    fn test_manifest_inline_options() {
        let manifest = SceneManifest::parse(
            r#"
[[objects]]
name = "wall"
mesh = "wall.obj"
translation = [100.0, 0.0, 0.0]
rotation_degrees = [0.0, 0.0, 90.0]

[objects.material]
base_color = [1.0, 0.0, 0.0, 1.0]
roughness = 0.8

[options]
output_type = "CollisionMesh"
world_space_approximation_accuracy_meters = 0.25
"#,
        )
        .unwrap();
        let options = manifest.resolve_options(None).unwrap();
        assert_eq!(options.output_type, ApproximationPolicy::CollisionMesh);
        assert_eq!(options.world_space_approximation_accuracy_meters, 0.25);

        let object = &manifest.objects[0];
        let moved = object.transform().transform_point3(Vec3::X);
        assert!((moved - Vec3::new(100.0, 1.0, 0.0)).length() < 1e-4);
        assert_eq!(SurfaceMaterial::from(&object.material).roughness, 0.8);
    }

    #[test]
    fn test_options_file_overrides_inline() {
        let dir = tempfile::tempdir().unwrap();
        let options_path = dir.path().join("options.toml");
        std::fs::write(&options_path, "texture_image_size = 256\n").unwrap();
        let manifest = SceneManifest::parse("[options]\ntexture_image_size = 128\n").unwrap();
        let options = manifest.resolve_options(Some(&options_path)).unwrap();
        assert_eq!(options.texture_image_size, 256);
    }

    #[test]
    fn test_printed_defaults_parse_back() {
        let text = toml::to_string_pretty(&ApproximationOptions::default()).unwrap();
        assert_eq!(ApproximationOptions::parse(&text).unwrap(), ApproximationOptions::default());
    }

    #[test]
    fn test_invalid_inline_options_rejected() {
        let manifest = SceneManifest::parse("[options]\nclamp_voxel_dimension = 8\n").unwrap();
        assert!(manifest.resolve_options(None).is_err());
    }

    #[test]
    fn test_validate_and_load_objects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cube.obj"), CUBE_OBJ).unwrap();
        let manifest = SceneManifest::parse(
            r#"
[[objects]]
name = "cube"
mesh = "cube.obj"
scale = [100.0, 100.0, 100.0]
"#,
        )
        .unwrap();
        manifest.validate(dir.path()).unwrap();
        let objects = manifest.scene_objects(dir.path()).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].mesh.triangle_count(), 12);

        let missing = SceneManifest::parse("[[objects]]\nname = \"x\"\nmesh = \"missing.obj\"\n").unwrap();
        assert!(missing.validate(dir.path()).is_err());
        assert!(SceneManifest::parse("").unwrap().validate(dir.path()).is_err());
    }
}
