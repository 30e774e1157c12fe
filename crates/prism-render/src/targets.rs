//! Chain-dependent render targets: multisampled colour and depth.
//!
//! These are sized to the presentation chain and rebuilt with it.

use ash::vk;
use gpu_allocator::MemoryLocation;
use prism_gpu::{DeviceContext, GpuAllocator, GpuImage, Result};

/// An image and the view used to render into it.
pub struct Attachment {
    pub image: GpuImage,
    pub view: vk::ImageView,
}

impl Attachment {
    #[allow(clippy::too_many_arguments)]
    unsafe fn create(
        device: &ash::Device,
        allocator: &mut GpuAllocator,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &str,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image = allocator.create_image(&image_info, MemoryLocation::GpuOnly, name)?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .level_count(1)
                    .layer_count(1),
            );

        match device.create_image_view(&view_info, None) {
            Ok(view) => Ok(Self { image, view }),
            Err(e) => {
                allocator.free_image(&mut image)?;
                Err(e.into())
            }
        }
    }

    unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        device.destroy_image_view(self.view, None);
        allocator.free_image(&mut self.image)
    }
}

/// Attachments rendered into before resolving to the chain image.
pub struct RenderTargets {
    /// Multisampled colour target; `None` when rendering straight into the
    /// chain image.
    pub color: Option<Attachment>,
    pub depth: Attachment,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub extent: vk::Extent2D,
}

impl RenderTargets {
    /// Create targets for a chain of `extent` and `color_format`.
    pub fn new(
        context: &DeviceContext,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let device = context.device();
        let samples = context.msaa_samples();
        let mut allocator = context.allocator().lock();

        let color = if samples == vk::SampleCountFlags::TYPE_1 {
            None
        } else {
            Some(unsafe {
                Attachment::create(
                    device,
                    &mut allocator,
                    extent,
                    color_format,
                    samples,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                    vk::ImageAspectFlags::COLOR,
                    "msaa color target",
                )?
            })
        };

        let depth = match unsafe {
            Attachment::create(
                device,
                &mut allocator,
                extent,
                depth_format,
                samples,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
                "depth target",
            )
        } {
            Ok(depth) => depth,
            Err(e) => {
                if let Some(mut color) = color {
                    unsafe { color.destroy(device, &mut allocator)? };
                }
                return Err(e);
            }
        };

        tracing::debug!(
            "Render targets {}x{}, {:?}, depth {:?}",
            extent.width,
            extent.height,
            samples,
            depth_format
        );

        Ok(Self {
            color,
            depth,
            depth_format,
            samples,
            extent,
        })
    }

    pub fn is_multisampled(&self) -> bool {
        self.color.is_some()
    }

    /// Destroy the targets; the colour target goes first.
    ///
    /// # Safety
    /// No pending GPU work may reference the targets.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        if let Some(mut color) = self.color.take() {
            color.destroy(device, allocator)?;
        }
        self.depth.destroy(device, allocator)
    }
}

/// Aspects a layout transition of a `format` depth image must name.
pub fn depth_barrier_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::DEPTH,
    }
}

fn single_level(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Transition an acquired chain image for rendering. Its old contents are
/// discarded, and the acquire semaphore wait already orders it after the
/// presentation engine's read, so no memory dependency is needed.
pub fn chain_image_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::NONE)
        .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .image(image)
        .subresource_range(single_level(vk::ImageAspectFlags::COLOR))
}

/// The multisampled colour target is shared by every frame slot, so this
/// frame's clear must wait for the previous frame's attachment writes.
pub fn msaa_color_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .image(image)
        .subresource_range(single_level(vk::ImageAspectFlags::COLOR))
}

/// Shared depth target, ordered after the previous frame's depth writes.
pub fn depth_target_barrier(image: vk::Image, format: vk::Format) -> vk::ImageMemoryBarrier2<'static> {
    let stages = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_stage_mask(stages)
        .dst_access_mask(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        )
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .image(image)
        .subresource_range(single_level(depth_barrier_aspect(format)))
}

/// Hand a rendered chain image to the presentation engine.
pub fn present_barrier(image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
        .dst_access_mask(vk::AccessFlags2::NONE)
        .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .image(image)
        .subresource_range(single_level(vk::ImageAspectFlags::COLOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn shared_targets_wait_for_previous_writes() {
        let image = vk::Image::from_raw(7);

        let msaa = msaa_color_barrier(image);
        assert_eq!(msaa.src_access_mask, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(msaa.src_stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert!(msaa.dst_access_mask.contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
        assert_eq!(msaa.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let depth = depth_target_barrier(image, vk::Format::D32_SFLOAT);
        assert_eq!(depth.src_access_mask, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE);
        assert_eq!(depth.subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn chain_image_relies_on_acquire_semaphore() {
        let barrier = chain_image_barrier(vk::Image::from_raw(3));
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::NONE);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.image, vk::Image::from_raw(3));

        let present = present_barrier(vk::Image::from_raw(3));
        assert_eq!(present.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(present.src_access_mask, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn stencil_formats_transition_both_aspects() {
        assert_eq!(
            depth_barrier_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            depth_barrier_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
