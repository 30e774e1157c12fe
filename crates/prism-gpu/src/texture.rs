//! Sampled textures with blit-generated mipmap chains.

use crate::context::DeviceContext;
use crate::deferred::ReleaseToken;
use crate::error::{GpuError, Result};
use crate::memory::{GpuAllocator, GpuImage};
use crate::upload::{create_staging, BufferDevice, VulkanTransfer};
use ash::vk;
use gpu_allocator::MemoryLocation;
use prism_core::PixelBuffer;

/// Format textures are stored in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Extent of every level in the chain, halving each step and clamped to 1.
pub fn mip_extents(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut extents = Vec::with_capacity(mip_level_count(width, height) as usize);
    let (mut w, mut h) = (width.max(1), height.max(1));
    for _ in 0..mip_level_count(width, height) {
        extents.push((w, h));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    extents
}

/// Whether a format's optimal-tiling features allow generating mips by
/// linear-filtered blits.
pub fn supports_linear_blit(features: vk::FormatFeatureFlags) -> bool {
    features.contains(
        vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
            | vk::FormatFeatureFlags::BLIT_SRC
            | vk::FormatFeatureFlags::BLIT_DST,
    )
}

/// A sampled image with its view and sampler.
pub struct Texture {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

impl Texture {
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.image.extent
    }

    /// Release tokens in creation order, for a deletion queue.
    pub fn into_release_tokens(self) -> [ReleaseToken; 3] {
        [
            ReleaseToken::Image(self.image),
            ReleaseToken::ImageView(self.view),
            ReleaseToken::Sampler(self.sampler),
        ]
    }

    /// Destroy the texture immediately.
    ///
    /// # Safety
    /// No pending GPU work may reference the texture.
    pub unsafe fn destroy(mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        device.destroy_sampler(self.sampler, None);
        device.destroy_image_view(self.view, None);
        allocator.free_image(&mut self.image)
    }
}

fn color_range(base_mip_level: u32, level_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(base_mip_level)
        .level_count(level_count)
        .layer_count(1)
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(mip_level)
        .layer_count(1)
}

unsafe fn transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    (old_layout, src_access, src_stage): (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags),
    (new_layout, dst_access, dst_stage): (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags),
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

const TRANSFER_DST: (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags) = (
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    vk::AccessFlags::TRANSFER_WRITE,
    vk::PipelineStageFlags::TRANSFER,
);
const TRANSFER_SRC: (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags) = (
    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    vk::AccessFlags::TRANSFER_READ,
    vk::PipelineStageFlags::TRANSFER,
);
const SHADER_READ: (vk::ImageLayout, vk::AccessFlags, vk::PipelineStageFlags) = (
    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    vk::AccessFlags::SHADER_READ,
    vk::PipelineStageFlags::FRAGMENT_SHADER,
);

/// Record the blit chain. Expects every level in `TRANSFER_DST_OPTIMAL` with
/// level 0 filled; leaves every level in `SHADER_READ_ONLY_OPTIMAL`.
///
/// # Safety
/// `cmd` must be recording and `image` must have `levels` levels.
pub unsafe fn record_mipmap_generation(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    width: u32,
    height: u32,
    levels: u32,
) {
    let extents = mip_extents(width, height);

    for level in 1..levels {
        let (src_w, src_h) = extents[(level - 1) as usize];
        let (dst_w, dst_h) = extents[level as usize];

        transition(device, cmd, image, color_range(level - 1, 1), TRANSFER_DST, TRANSFER_SRC);

        let blit = vk::ImageBlit::default()
            .src_subresource(color_layers(level - 1))
            .src_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: src_w as i32,
                    y: src_h as i32,
                    z: 1,
                },
            ])
            .dst_subresource(color_layers(level))
            .dst_offsets([
                vk::Offset3D::default(),
                vk::Offset3D {
                    x: dst_w as i32,
                    y: dst_h as i32,
                    z: 1,
                },
            ]);

        device.cmd_blit_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[blit],
            vk::Filter::LINEAR,
        );

        transition(device, cmd, image, color_range(level - 1, 1), TRANSFER_SRC, SHADER_READ);
    }

    // The last level was only ever written
    transition(device, cmd, image, color_range(levels - 1, 1), TRANSFER_DST, SHADER_READ);
}

/// Upload pixels into a new mipmapped, sampled texture.
///
/// Blocks until the upload (and mip generation) has finished on the GPU.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn upload_texture(
    context: &DeviceContext,
    transfer: &mut VulkanTransfer<'_>,
    pixels: &PixelBuffer,
    name: &str,
) -> Result<Texture> {
    let (width, height) = (pixels.width, pixels.height);
    let levels = mip_level_count(width, height);

    if levels > 1 && !supports_linear_blit(context.optimal_format_features(TEXTURE_FORMAT)) {
        return Err(GpuError::UnsupportedFormat {
            format: TEXTURE_FORMAT,
            operation: "linear-filtered blit",
        });
    }

    let rgba = pixels.to_rgba8();
    let staging = create_staging(transfer, &rgba, &format!("{name} staging"))?;

    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .extent(vk::Extent3D {
            width,
            height,
            depth: 1,
        })
        .mip_levels(levels)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
        )
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let created = transfer
        .allocator()
        .lock()
        .create_image(&image_info, MemoryLocation::GpuOnly, name);
    let mut image = match created {
        Ok(image) => image,
        Err(e) => {
            transfer.destroy(staging)?;
            return Err(e);
        }
    };

    let recorded = transfer.run_once(|device, cmd| unsafe {
        transition(
            device,
            cmd,
            image.image,
            color_range(0, levels),
            (
                vk::ImageLayout::UNDEFINED,
                vk::AccessFlags::empty(),
                vk::PipelineStageFlags::TOP_OF_PIPE,
            ),
            TRANSFER_DST,
        );

        let region = vk::BufferImageCopy::default()
            .image_subresource(color_layers(0))
            .image_extent(image_info.extent);
        device.cmd_copy_buffer_to_image(
            cmd,
            staging.buffer,
            image.image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        record_mipmap_generation(device, cmd, image.image, width, height, levels);
    });

    transfer.destroy(staging)?;
    if let Err(e) = recorded {
        transfer.allocator().lock().free_image(&mut image)?;
        return Err(e);
    }

    let device = context.device();
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image.image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(TEXTURE_FORMAT)
        .subresource_range(color_range(0, levels));
    let view = match unsafe { device.create_image_view(&view_info, None) } {
        Ok(view) => view,
        Err(e) => {
            transfer.allocator().lock().free_image(&mut image)?;
            return Err(e.into());
        }
    };

    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(context.adapter().max_sampler_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .compare_op(vk::CompareOp::ALWAYS)
        .min_lod(0.0)
        .max_lod(levels as f32);
    let sampler = match unsafe { device.create_sampler(&sampler_info, None) } {
        Ok(sampler) => sampler,
        Err(e) => {
            unsafe { device.destroy_image_view(view, None) };
            transfer.allocator().lock().free_image(&mut image)?;
            return Err(e.into());
        }
    };

    tracing::debug!("Uploaded texture {name}: {width}x{height}, {levels} mip levels");

    Ok(Texture {
        image,
        view,
        sampler,
    })
}
