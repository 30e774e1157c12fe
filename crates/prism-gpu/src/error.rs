//! GPU error types.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// GPU-related errors.
///
/// Everything in here is fatal. Out-of-date and suboptimal presentation results
/// never become a `GpuError`; see [`crate::swapchain::AcquireOutcome`].
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Vulkan loader could not be opened.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// No memory type matched the filter and property flags.
    #[error("No memory type matches filter {type_filter:#b} with properties {properties:?}")]
    MemoryTypeNotFound {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader binary could not be read.
    #[error("Failed to read shader {path}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shader module creation failed or the binary is not SPIR-V.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Format lacks a capability an operation needs.
    #[error("Format {format:?} does not support {operation}")]
    UnsupportedFormat {
        format: vk::Format,
        operation: &'static str,
    },

    /// A frame fence did not signal in time; treated as a GPU hang.
    #[error("Frame slot {slot} fence not signaled within {timeout_ns} ns (GPU hang)")]
    FenceTimeout { slot: usize, timeout_ns: u64 },

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
