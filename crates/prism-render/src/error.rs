//! Renderer error types.

use crate::draw::{MaterialId, MeshId, TextureId};
use prism_gpu::GpuError;
use thiserror::Error;

/// Errors surfaced by the renderer facade.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Fatal GPU error.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Host-side data was rejected before upload.
    #[error(transparent)]
    Data(#[from] prism_core::Error),

    #[error("Unknown mesh {0:?}")]
    UnknownMesh(MeshId),

    #[error("Unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("Unknown material {0:?}")]
    UnknownMaterial(MaterialId),

    /// Configuration rejected at construction.
    #[error("Invalid renderer configuration: {0}")]
    InvalidConfig(String),

    /// Method called after `destroy`.
    #[error("Renderer already destroyed")]
    Destroyed,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
