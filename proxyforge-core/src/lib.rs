//! Proxy mesh generation for groups of scene objects
//!
//! Turns a set of objects into one cheap stand-in: the objects are voxelized
//! into a watertight solid, closed, simplified, stripped of hidden faces and
//! clipped at the ground, then unwrapped and textured from renders of the
//! originals.
//!
//! # Example
//! ```no_run
//! use proxyforge_core::prelude::*;
//! use glam::Vec3;
//!
//! let objects = vec![SceneObject::new("crate", TriangleMesh::cube(Vec3::ZERO, Vec3::splat(100.0)))];
//! let mut scene = MeshScene::new();
//! let mut photos = RaycastPhotoSet::new();
//! let mut sink = DirectoryAssetSink::new("out/Proxy");
//! let options = ApproximationOptions::default();
//!
//! let outcome = approximate_actors(&mut scene, objects, &mut photos, &mut sink, &options);
//! assert!(outcome.result.is_success());
//! ```

pub mod assets;
pub mod bake;
pub mod clip;
pub mod error;
pub mod geometry;
pub mod mesh;
pub mod morphology;
pub mod occlusion;
pub mod options;
pub mod pipeline;
pub mod scene;
pub mod simplify;
pub mod solidify;
pub mod spatial;
pub mod uv;

pub use error::{ApproximationResult, AssetError, MeshGenerationError, ProxyError};
pub use options::ApproximationOptions;
pub use pipeline::{ApproximationOutcome, ApproximationStats, approximate_actors};

/// Everything needed to run the pipeline end to end
pub mod prelude {
    pub use crate::assets::{AssetSink, DirectoryAssetSink, MemoryAssetSink};
    pub use crate::bake::{PhotoCapture, RaycastPhotoSet};
    pub use crate::error::ApproximationResult;
    pub use crate::mesh::TriangleMesh;
    pub use crate::options::*;
    pub use crate::pipeline::{ApproximationOutcome, approximate_actors};
    pub use crate::scene::{MeshScene, SceneAggregator, SceneObject, SurfaceMaterial};
}
