//! Fences and semaphores for the frame loop.

use crate::error::{GpuError, Result};
use ash::vk;

/// # Safety
/// `device` must be live.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    Ok(device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?)
}

/// A fence created `signaled` lets the first wait on a fresh slot return at once.
///
/// # Safety
/// `device` must be live.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    Ok(device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?)
}

/// Map the result of a fence wait. A timeout is a GPU hang, not a retry.
pub fn check_fence_wait(result: ash::prelude::VkResult<()>, slot: usize, timeout_ns: u64) -> Result<()> {
    result.map_err(|e| match e {
        vk::Result::TIMEOUT => GpuError::FenceTimeout { slot, timeout_ns },
        other => GpuError::from(other),
    })
}

/// Block until `fence` signals or `timeout_ns` elapses.
///
/// # Safety
/// `fence` must belong to `device`.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, slot: usize, timeout_ns: u64) -> Result<()> {
    check_fence_wait(device.wait_for_fences(&[fence], true, timeout_ns), slot, timeout_ns)
}

/// # Safety
/// `fence` must belong to `device` and have no pending submission.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    Ok(device.reset_fences(&[fence])?)
}

/// The synchronization objects owned by one frame slot.
pub struct SlotSync {
    /// Signaled by the presentation engine when the acquired image is ready.
    pub acquire_complete: vk::Semaphore,
    /// Signaled by the graphics queue when the slot's commands finish.
    pub render_complete: vk::Semaphore,
    /// Signaled when the slot's submission retires; created signaled.
    pub in_flight: vk::Fence,
}

impl SlotSync {
    /// # Safety
    /// `device` must be live.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let mut created = CreatedSoFar::new(|semaphore| device.destroy_semaphore(semaphore, None));
        let acquire_complete = created.push(create_semaphore(device)?);
        let render_complete = created.push(create_semaphore(device)?);
        let in_flight = create_fence(device, true)?;
        created.keep();

        Ok(Self {
            acquire_complete,
            render_complete,
            in_flight,
        })
    }

    /// # Safety
    /// The slot's fence must have signaled.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for semaphore in [self.acquire_complete, self.render_complete] {
            device.destroy_semaphore(semaphore, None);
        }
        device.destroy_fence(self.in_flight, None);
    }
}

/// Objects created so far, destroyed newest first if construction bails out
/// before [`CreatedSoFar::keep`].
struct CreatedSoFar<T, F: FnMut(T)> {
    objects: Vec<T>,
    destroy: F,
}

impl<T: Copy, F: FnMut(T)> CreatedSoFar<T, F> {
    fn new(destroy: F) -> Self {
        Self {
            objects: Vec::new(),
            destroy,
        }
    }

    fn push(&mut self, object: T) -> T {
        self.objects.push(object);
        object
    }

    fn keep(mut self) {
        self.objects.clear();
    }
}

impl<T, F: FnMut(T)> Drop for CreatedSoFar<T, F> {
    fn drop(&mut self) {
        while let Some(object) = self.objects.pop() {
            (self.destroy)(object);
        }
    }
}
