//! Deferred resource release for frames in flight.
//!
//! A resource recorded into a frame slot's command buffer may only be destroyed
//! once that slot's fence has signaled. Each slot owns a [`DeletionQueue`] of
//! typed [`ReleaseToken`]s that is flushed right after the slot's fence wait,
//! newest first.

use crate::error::Result;
use crate::memory::{GpuAllocator, GpuBuffer, GpuImage};
use ash::vk;

/// A resource waiting for the GPU to finish with it.
pub enum ReleaseToken {
    Buffer(GpuBuffer),
    Image(GpuImage),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    DescriptorPool(vk::DescriptorPool),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
}

impl ReleaseToken {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Image(_) => "image",
            Self::ImageView(_) => "image view",
            Self::Sampler(_) => "sampler",
            Self::DescriptorPool(_) => "descriptor pool",
            Self::DescriptorSetLayout(_) => "descriptor set layout",
            Self::Pipeline(_) => "pipeline",
            Self::PipelineLayout(_) => "pipeline layout",
        }
    }

    /// Destroy the underlying resource.
    ///
    /// # Safety
    /// No pending GPU work may reference the resource.
    pub unsafe fn release(self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        match self {
            Self::Buffer(mut buffer) => allocator.free_buffer(&mut buffer)?,
            Self::Image(mut image) => allocator.free_image(&mut image)?,
            Self::ImageView(view) => device.destroy_image_view(view, None),
            Self::Sampler(sampler) => device.destroy_sampler(sampler, None),
            Self::DescriptorPool(pool) => device.destroy_descriptor_pool(pool, None),
            Self::DescriptorSetLayout(layout) => device.destroy_descriptor_set_layout(layout, None),
            Self::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
            Self::PipelineLayout(layout) => device.destroy_pipeline_layout(layout, None),
        }
        Ok(())
    }
}

/// Ordered list of pending releases for one frame slot.
#[derive(Default)]
pub struct DeletionQueue {
    tokens: Vec<ReleaseToken>,
}

impl DeletionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a resource for release after the slot's next fence wait.
    pub fn push(&mut self, token: ReleaseToken) {
        self.tokens.push(token);
    }

    /// Number of pending releases.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Take all pending tokens, newest first.
    pub fn drain_lifo(&mut self) -> impl Iterator<Item = ReleaseToken> {
        std::mem::take(&mut self.tokens).into_iter().rev()
    }

    /// Release everything, newest first.
    ///
    /// # Safety
    /// The owning slot's fence must have signaled (or the device must be idle).
    pub unsafe fn flush(&mut self, device: &ash::Device, allocator: &mut GpuAllocator) -> Result<()> {
        let count = self.tokens.len();
        for token in self.drain_lifo() {
            tracing::trace!("Releasing deferred {}", token.kind());
            token.release(device, allocator)?;
        }
        if count > 0 {
            tracing::debug!("Released {count} deferred resources");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn drains_newest_first() {
        let mut queue = DeletionQueue::new();
        queue.push(ReleaseToken::Sampler(vk::Sampler::from_raw(1)));
        queue.push(ReleaseToken::ImageView(vk::ImageView::from_raw(2)));
        queue.push(ReleaseToken::Pipeline(vk::Pipeline::from_raw(3)));
        assert_eq!(queue.len(), 3);

        let order: Vec<u64> = queue
            .drain_lifo()
            .map(|token| match token {
                ReleaseToken::Sampler(s) => s.as_raw(),
                ReleaseToken::ImageView(v) => v.as_raw(),
                ReleaseToken::Pipeline(p) => p.as_raw(),
                _ => unreachable!(),
            })
            .collect();

        assert_eq!(order, vec![3, 2, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn token_kinds() {
        assert_eq!(
            ReleaseToken::DescriptorPool(vk::DescriptorPool::null()).kind(),
            "descriptor pool"
        );
        assert_eq!(
            ReleaseToken::PipelineLayout(vk::PipelineLayout::null()).kind(),
            "pipeline layout"
        );
    }
}
