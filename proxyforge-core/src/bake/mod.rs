//! Photo capture of the original scene and texture baking onto the final mesh
//!
//! Capture renders the source scene from a ring of exterior views; the baker
//! rasterizes the approximation in UV space and looks every texel up in those
//! views. Hole infill and gutters are recorded once and replayed on every
//! channel so all outputs stay aligned texel for texel.

mod baker;
mod capture;
mod image;
mod infill;
pub mod texture_size;

pub use baker::{BakeCache, BakeOutput, BakeSample, BakeSettings, BakedTexture, bake_textures};
pub use capture::{CaptureChannel, CaptureConfig, PhotoCapture, RaycastPhotoSet, VisibilityFn};
pub use image::FloatImage;
pub use infill::{GutterMap, InfillMap, InfillStep};

use glam::Vec4;

use crate::options::ApproximationOptions;

/// Reserved value for texels no capture view could see
pub const INVALID_COLOR: Vec4 = Vec4::new(0.0, -1.0, 0.0, 1.0);

/// Tangent-space "straight up", written wherever the normal map has no data
pub const DEFAULT_NORMAL: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);

/// Texels of chart gutter around every UV chart, at output resolution
pub const GUTTER_TEXELS: u32 = 4;

/// Output texture kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureChannel {
    BaseColor,
    Normal,
    Emissive,
    Roughness,
    Metallic,
    Specular,
    /// Metallic, roughness, specular in RGB
    PackedMrs,
}

impl TextureChannel {
    /// Asset name suffix
    pub fn suffix(self) -> &'static str {
        match self {
            TextureChannel::BaseColor => "BaseColor",
            TextureChannel::Normal => "Normal",
            TextureChannel::Emissive => "Emissive",
            TextureChannel::Roughness => "Roughness",
            TextureChannel::Metallic => "Metallic",
            TextureChannel::Specular => "Specular",
            TextureChannel::PackedMrs => "MRS",
        }
    }

    /// Which captured data feeds this texture
    pub fn capture_channel(self) -> CaptureChannel {
        match self {
            TextureChannel::BaseColor => CaptureChannel::BaseColor,
            TextureChannel::Normal => CaptureChannel::WorldNormal,
            TextureChannel::Emissive => CaptureChannel::Emissive,
            TextureChannel::Roughness => CaptureChannel::Roughness,
            TextureChannel::Metallic => CaptureChannel::Metallic,
            TextureChannel::Specular => CaptureChannel::Specular,
            TextureChannel::PackedMrs => CaptureChannel::PackedMrs,
        }
    }

    /// Normal maps keep their holes; everything else is infilled
    pub fn is_infilled(self) -> bool {
        self != TextureChannel::Normal
    }

    /// Single-channel scalar output
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            TextureChannel::Roughness | TextureChannel::Metallic | TextureChannel::Specular
        )
    }
}

/// Textures the options ask for, base color first
///
/// With `use_packed_mrs`, any of roughness/metallic/specular is replaced by
/// one packed texture.
pub fn requested_channels(options: &ApproximationOptions) -> Vec<TextureChannel> {
    let mut channels = Vec::new();
    if options.bake_base_color {
        channels.push(TextureChannel::BaseColor);
    }
    let any_mrs = options.bake_roughness || options.bake_metallic || options.bake_specular;
    if options.use_packed_mrs && any_mrs {
        channels.push(TextureChannel::PackedMrs);
    } else {
        if options.bake_roughness {
            channels.push(TextureChannel::Roughness);
        }
        if options.bake_metallic {
            channels.push(TextureChannel::Metallic);
        }
        if options.bake_specular {
            channels.push(TextureChannel::Specular);
        }
    }
    if options.bake_emissive {
        channels.push(TextureChannel::Emissive);
    }
    if options.bake_normal_map {
        channels.push(TextureChannel::Normal);
    }
    channels
}

/// Capture channels needed to bake `channels`
pub fn capture_channels(channels: &[TextureChannel]) -> Vec<CaptureChannel> {
    let mut out: Vec<CaptureChannel> = Vec::with_capacity(channels.len());
    for channel in channels {
        let capture = channel.capture_channel();
        if !out.contains(&capture) {
            out.push(capture);
        }
    }
    out
}
