//! Spatial queries over triangle meshes
//!
//! - [`MeshBvh`]: ray casts, occlusion tests and nearest-point queries
//! - [`FastWindingTree`]: hierarchical generalized winding numbers, used as the
//!   inside/outside oracle for voxelization

mod bvh;
mod winding;

pub use bvh::{MeshBvh, NearestHit, RayHit};
pub use winding::FastWindingTree;
