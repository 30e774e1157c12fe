//! Descriptor set layouts, pools and writes.

use crate::error::Result;
use ash::vk;

/// Accumulates bindings for a descriptor set layout.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorSetLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, binding: u32, ty: vk::DescriptorType, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stages),
        );
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.push(binding, vk::DescriptorType::UNIFORM_BUFFER, stages)
    }

    /// Add a combined image sampler binding.
    pub fn combined_image_sampler(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.push(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stages)
    }

    /// Pool sizes needed to allocate `sets` sets of this layout.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let count = binding.descriptor_count * sets;
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += count,
                None => sizes.push(
                    vk::DescriptorPoolSize::default()
                        .ty(binding.descriptor_type)
                        .descriptor_count(count),
                ),
            }
        }
        sizes
    }

    /// # Safety
    /// `device` must be live.
    pub unsafe fn build(&self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        Ok(device.create_descriptor_set_layout(
            &vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings),
            None,
        )?)
    }
}

/// A descriptor pool sized up front. Sets are never freed individually;
/// the whole pool goes away with `vkDestroyDescriptorPool`.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// # Safety
    /// `device` must be live.
    pub unsafe fn new(device: &ash::Device, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> Result<Self> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        Ok(Self {
            pool: device.create_descriptor_pool(&info, None)?,
        })
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// One set per entry in `layouts`, in the same order.
    ///
    /// # Safety
    /// `device` must own the pool.
    pub unsafe fn allocate(&self, device: &ash::Device, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        Ok(device.allocate_descriptor_sets(
            &vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.pool)
                .set_layouts(layouts),
        )?)
    }
}

fn single_write<'a>(set: vk::DescriptorSet, binding: u32, ty: vk::DescriptorType) -> vk::WriteDescriptorSet<'a> {
    vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(ty)
}

/// Bind the whole of `buffer`'s first `range` bytes as a uniform block.
///
/// # Safety
/// `set` must not be bound by a pending command buffer.
pub unsafe fn write_uniform_buffer(device: &ash::Device, set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer, range: u64) {
    let info = [vk::DescriptorBufferInfo::default().buffer(buffer).range(range)];
    let write = single_write(set, binding, vk::DescriptorType::UNIFORM_BUFFER).buffer_info(&info);
    device.update_descriptor_sets(&[write], &[]);
}

/// Bind `view` through `sampler`. The image must already be in
/// `SHADER_READ_ONLY_OPTIMAL`.
///
/// # Safety
/// `set` must not be bound by a pending command buffer.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let info = [vk::DescriptorImageInfo::default()
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .image_view(view)
        .sampler(sampler)];
    let write = single_write(set, binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER).image_info(&info);
    device.update_descriptor_sets(&[write], &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_sizes_merge_by_type() {
        let builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
            .combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT);

        let sizes = builder.pool_sizes(3);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 6);
    }
}
