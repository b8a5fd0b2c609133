//! proxyforge - build proxy meshes from a scene manifest
//!
//! Usage:
//!   proxyforge build scene.toml -o out/
//!   proxyforge check scene.toml
//!   proxyforge defaults > options.toml

mod manifest;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxyforge_core::prelude::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use manifest::SceneManifest;

#[derive(Parser)]
#[command(name = "proxyforge")]
#[command(about = "Generate proxy meshes and baked materials for groups of objects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Approximate every object in a scene manifest
    Build {
        /// Path to scene.toml
        manifest: PathBuf,

        /// Output directory (default: next to the manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Options file, replacing the manifest's [options] table
        #[arg(long)]
        options: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a scene manifest without generating anything
    Check {
        /// Path to scene.toml
        manifest: PathBuf,

        /// Options file to validate alongside
        #[arg(long)]
        options: Option<PathBuf>,
    },

    /// Print the default options as TOML
    Defaults,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match &cli.command {
        Commands::Build { verbose: true, .. } => tracing::Level::DEBUG,
        _ => tracing::Level::INFO,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    match cli.command {
        Commands::Build {
            manifest,
            output,
            options,
            verbose,
        } => build(&manifest, output.as_deref(), options.as_deref(), verbose),
        Commands::Check { manifest, options } => check(&manifest, options.as_deref()),
        Commands::Defaults => {
            let text = toml::to_string_pretty(&ApproximationOptions::default())
                .context("Failed to serialize default options")?;
            print!("{text}");
            Ok(())
        }
    }
}

fn manifest_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

fn check(manifest_path: &Path, options_path: Option<&Path>) -> Result<()> {
    let manifest = SceneManifest::load(manifest_path)?;
    let base_dir = manifest_dir(manifest_path);
    manifest.validate(base_dir)?;
    let options = manifest.resolve_options(options_path)?;

    let objects = manifest.scene_objects(base_dir)?;
    let triangles: usize = objects.iter().map(|object| object.mesh.triangle_count()).sum();
    println!(
        "{}: {} objects, {} triangles, output {:?} as '{}'",
        manifest_path.display(),
        objects.len(),
        triangles,
        options.output_type,
        options.asset_base_name()
    );
    Ok(())
}

fn build(
    manifest_path: &Path,
    output: Option<&Path>,
    options_path: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let manifest = SceneManifest::load(manifest_path)?;
    let base_dir = manifest_dir(manifest_path);
    manifest.validate(base_dir)?;
    let mut options = manifest.resolve_options(options_path)?;
    options.verbose |= verbose;

    let objects = manifest.scene_objects(base_dir)?;
    let output_dir = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| base_dir.join("proxy"))
        .join(options.asset_base_name());
    tracing::info!(
        "Approximating {} objects into {}",
        objects.len(),
        output_dir.display()
    );

    let mut scene = MeshScene::new();
    let mut photos = RaycastPhotoSet::new();
    let mut sink = DirectoryAssetSink::new(&output_dir);
    let outcome = approximate_actors(&mut scene, objects, &mut photos, &mut sink, &options);

    if !outcome.result.is_success() {
        anyhow::bail!("Approximation failed: {}", outcome.result);
    }

    if let Some(debug) = &outcome.debug_mesh {
        println!("  debug mesh: {debug}");
    }
    if let Some(material) = &outcome.material {
        println!("  material:   {material}");
    }
    for texture in &outcome.textures {
        println!("  texture:    {texture}");
    }
    if let Some(mesh) = &outcome.mesh {
        println!("  mesh:       {mesh}");
    }
    println!(
        "Wrote {} triangles to {}",
        outcome.stats.mesh.final_triangles,
        output_dir.display()
    );
    Ok(())
}
