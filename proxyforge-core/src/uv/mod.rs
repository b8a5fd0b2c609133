//! UV parameterization and atlas packing
//!
//! A backend chosen by [`UvGenerationPolicy`] splits the mesh into charts and
//! flattens each one. When the backend gives up, box projection takes over;
//! it always succeeds. The resulting layout is then cleaned of bowtie
//! vertices and packed into the unit square.

mod box_projection;
mod charts;
mod pack;

use glam::Vec2;
use hashbrown::HashMap;

pub use box_projection::box_project;
pub use charts::{axis_charts, grow_charts};
pub use pack::{pack_charts, split_bowties};

use crate::mesh::TriangleMesh;
use crate::options::{ApproximationOptions, UvGenerationPolicy};

/// Chart assignment and flattened corner positions, in world units
#[derive(Debug, Clone, Default)]
pub struct Parameterization {
    /// Chart index per triangle
    pub chart_of: Vec<u32>,
    /// UV of each triangle corner before packing
    pub corner_uvs: Vec<[Vec2; 3]>,
}

impl Parameterization {
    pub fn chart_count(&self) -> usize {
        self.chart_of.iter().map(|&c| c as usize + 1).max().unwrap_or(0)
    }

    fn is_finite(&self) -> bool {
        self.corner_uvs.iter().flatten().all(|uv| uv.is_finite())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UvSettings {
    pub policy: UvGenerationPolicy,
    pub stretch_target: f32,
    /// 0 = unlimited
    pub max_charts: u32,
    /// Atlas resolution the packer plans gutters for
    pub pack_resolution: u32,
}

impl UvSettings {
    /// Packing runs at a quarter of the final texture size
    pub fn from_options(options: &ApproximationOptions, texture_size: u32) -> Self {
        Self {
            policy: options.uv_policy,
            stretch_target: options.uv_stretch_target,
            max_charts: options.uv_max_charts,
            pack_resolution: (texture_size / 4).max(1),
        }
    }
}

/// What the UV stage ended up doing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UvReport {
    pub chart_count: usize,
    pub used_fallback: bool,
    pub packing_failed: bool,
    pub bowties_split: usize,
}

/// Run the selected backend
pub fn parameterize(mesh: &TriangleMesh, settings: &UvSettings) -> Option<Parameterization> {
    let result = match settings.policy {
        UvGenerationPolicy::PreferXAtlas => grow_charts(mesh, settings.stretch_target, settings.max_charts),
        UvGenerationPolicy::PreferUVAtlas => axis_charts(mesh, settings.stretch_target, settings.max_charts),
    };
    result.filter(Parameterization::is_finite)
}

/// Write a parameterization into the mesh's UV overlay
///
/// Corners of the same vertex share an element only within one chart.
pub fn apply_parameterization(mesh: &mut TriangleMesh, layout: &Parameterization) {
    mesh.enable_attributes();
    let triangle_count = mesh.triangle_count();
    let (_, triangles, attributes) = mesh.split_attributes_mut();
    let Some(attributes) = attributes else {
        return;
    };
    let uvs = &mut attributes.uvs;
    uvs.reset(triangle_count);
    let mut elements: HashMap<(u32, u32), u32> = HashMap::new();
    for (t, tri) in triangles.iter().enumerate() {
        let chart = layout.chart_of[t];
        for corner in 0..3 {
            let v = tri[corner];
            let value = layout.corner_uvs[t][corner];
            let e = *elements
                .entry((chart, v))
                .or_insert_with(|| uvs.append_element(value, v));
            uvs.triangles[t][corner] = e;
        }
    }
}

/// Parameterize, fall back to box projection if needed, split bowties and pack
pub fn generate_uvs(mesh: &mut TriangleMesh, settings: &UvSettings) -> UvReport {
    let mut report = UvReport::default();
    let layout = match parameterize(mesh, settings) {
        Some(layout) => layout,
        None => {
            tracing::warn!("UV parameterization failed, falling back to box projection");
            report.used_fallback = true;
            box_project(mesh)
        }
    };
    report.chart_count = layout.chart_count();
    apply_parameterization(mesh, &layout);

    let (_, triangles, attributes) = mesh.split_attributes_mut();
    if let Some(attributes) = attributes {
        report.bowties_split = split_bowties(&mut attributes.uvs, triangles);
        if !pack_charts(&mut attributes.uvs, settings.pack_resolution) {
            tracing::warn!("UV packing failed, baking with overlapping charts");
            report.packing_failed = true;
        }
    }
    tracing::debug!(
        "UV layout: {} charts, {} bowties split, fallback: {}",
        report.chart_count,
        report.bowties_split,
        report.used_fallback
    );
    report
}
