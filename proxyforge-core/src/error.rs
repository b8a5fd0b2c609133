//! Result codes and error types

use std::path::PathBuf;

/// Overall outcome of one approximation run.
///
/// Any code other than `Success` means the pipeline stopped at that point and
/// attempted no further asset writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApproximationResult {
    /// All requested assets were emitted
    Success,
    /// A collaborator failed in a way the pipeline has no specific code for
    UnknownError,
    /// Solidification produced an empty mesh
    MeshGenerationFailed,
    /// The capture backend cannot render a channel the material needs
    MaterialGenerationFailed,
}

impl ApproximationResult {
    /// `true` only for [`ApproximationResult::Success`]
    pub fn is_success(self) -> bool {
        matches!(self, ApproximationResult::Success)
    }
}

impl std::fmt::Display for ApproximationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ApproximationResult::Success => "Success",
            ApproximationResult::UnknownError => "UnknownError",
            ApproximationResult::MeshGenerationFailed => "MeshGenerationFailed",
            ApproximationResult::MaterialGenerationFailed => "MaterialGenerationFailed",
        };
        f.write_str(text)
    }
}

/// Errors raised while loading configuration or reading/writing geometry
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse options: {0}")]
    OptionsParse(#[from] toml::de::Error),

    #[error("Invalid option `{field}`: {reason}")]
    InvalidOption { field: &'static str, reason: String },

    #[error("Malformed OBJ data at line {line}: {reason}")]
    ObjParse { line: usize, reason: String },
}

/// Reasons the background mesh generation stops without a mesh
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshGenerationError {
    #[error("Solidification produced no triangles")]
    EmptySolid,

    #[error("Mesh generation cancelled during {stage}")]
    Cancelled { stage: &'static str },

    #[error("Mesh generation task panicked")]
    TaskPanicked,
}

/// Errors raised by an [`AssetSink`](crate::assets::AssetSink)
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Failed to write asset {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode texture {name}: {source}")]
    Image {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to serialize material {name}: {source}")]
    Material {
        name: String,
        #[source]
        source: toml::ser::Error,
    },

    #[error("Asset {0} has no content")]
    Empty(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_success_is_success() {
        assert!(ApproximationResult::Success.is_success());
        assert!(!ApproximationResult::UnknownError.is_success());
        assert!(!ApproximationResult::MeshGenerationFailed.is_success());
        assert!(!ApproximationResult::MaterialGenerationFailed.is_success());
    }

    #[test]
    fn test_invalid_option_message() {
        let err = ProxyError::InvalidOption {
            field: "texture_image_size",
            reason: "must be > 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid option `texture_image_size`: must be > 0"
        );
    }
}
