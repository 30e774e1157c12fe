//! Frame loop and rendering for the Prism engine.
//!
//! This crate provides:
//! - The frame scheduler and its GPU backend seam
//! - Render targets, draw planning and command recording
//! - Camera and per-frame uniforms
//! - The `Renderer` facade owning the device and every resource

pub mod backend;
pub mod camera;
pub mod config;
pub mod draw;
pub mod error;
pub mod frame;
pub mod mesh;
pub mod renderer;
pub mod resources;
pub mod targets;

pub use backend::{FrameResources, VulkanBackend, MESH_PIPELINE};
pub use camera::{Camera, FrameUniforms};
pub use config::RendererConfig;
pub use draw::{MaterialId, MeshId, PipelineId, RenderObject, TextureId};
pub use error::{RenderError, Result};
pub use frame::{ChainRebuild, FrameBackend, FrameScheduler, FrameStats, FrameStatus, SlotState};
pub use mesh::GpuMesh;
pub use renderer::Renderer;
pub use resources::{Material, SceneResources};
pub use targets::RenderTargets;
