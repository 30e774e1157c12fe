//! Vulkan abstraction layer for the Prism engine.
//!
//! This crate provides:
//! - Instance creation and adapter selection
//! - The device context (logical device, queues, allocator)
//! - Surface and presentation chain management
//! - Memory allocation via gpu-allocator and staging uploads
//! - Textures with generated mipmaps
//! - Synchronization primitives and deferred release
//! - Descriptor, pipeline and shader helpers

pub mod capabilities;
pub mod command;
pub mod context;
pub mod deferred;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod upload;

pub use capabilities::{AdapterInfo, DeviceRequirements, GpuVendor, QueueFamilyIndices};
pub use command::CommandPool;
pub use context::{DeviceContext, DeviceContextBuilder};
pub use deferred::{DeletionQueue, ReleaseToken};
pub use descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use surface::{wait_for_nonzero_extent, FramebufferSize, Surface, SurfaceSupport};
pub use swapchain::{AcquireOutcome, ChainSettings, PresentOutcome, PresentationChain};
pub use sync::SlotSync;
pub use texture::Texture;
pub use upload::{BufferDevice, VulkanTransfer};

pub use ash::vk;
pub use gpu_allocator::MemoryLocation;
