//! Command pools and queue submission.

use crate::error::Result;
use ash::vk;

/// A command pool bound to one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
}

impl CommandPool {
    /// # Safety
    /// `queue_family` must be a family the device was created with.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);
        Ok(Self {
            pool: device.create_command_pool(&info, None)?,
        })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// # Safety
    /// `device` must own the pool.
    pub unsafe fn allocate_primary(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let mut buffers = device.allocate_command_buffers(&info)?;
        Ok(buffers.remove(0))
    }

    /// Return every buffer allocated from the pool to the initial state.
    ///
    /// # Safety
    /// No command buffer from this pool may be pending execution.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        Ok(())
    }

    /// # Safety
    /// No command buffer from this pool may be pending execution.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
    }
}

/// # Safety
/// `cmd` must be in the initial state.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default().flags(flags))?;
    Ok(())
}

/// # Safety
/// `cmd` must be recording.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    device.end_command_buffer(cmd)?;
    Ok(())
}

/// Submit one frame's command buffer: wait on `wait` at `wait_stage`, then
/// signal `signal` and `fence` when it retires.
///
/// # Safety
/// `fence` must be unsignaled and `wait` must have a pending signal.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn submit_frame(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    wait: vk::Semaphore,
    wait_stage: vk::PipelineStageFlags,
    signal: vk::Semaphore,
    fence: vk::Fence,
) -> Result<()> {
    let cmds = [cmd];
    let waits = [wait];
    let stages = [wait_stage];
    let signals = [signal];

    let submit = vk::SubmitInfo::default()
        .wait_semaphores(&waits)
        .wait_dst_stage_mask(&stages)
        .command_buffers(&cmds)
        .signal_semaphores(&signals);
    device.queue_submit(queue, &[submit], fence)?;
    Ok(())
}

/// Record `f` into a throwaway command buffer, submit it and block until
/// `queue` drains. Whatever the commands read can be freed on return.
///
/// # Safety
/// `pool` must belong to `queue`'s family.
pub unsafe fn execute_single_time_commands<F, R>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<R>
where
    F: FnOnce(vk::CommandBuffer) -> R,
{
    let cmd = pool.allocate_primary(device)?;
    let result = submit_and_wait(device, queue, cmd, f);
    device.free_command_buffers(pool.handle(), &[cmd]);
    result
}

unsafe fn submit_and_wait<F, R>(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    f: F,
) -> Result<R>
where
    F: FnOnce(vk::CommandBuffer) -> R,
{
    begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
    let value = f(cmd);
    end_command_buffer(device, cmd)?;

    let cmds = [cmd];
    device.queue_submit(
        queue,
        &[vk::SubmitInfo::default().command_buffers(&cmds)],
        vk::Fence::null(),
    )?;
    device.queue_wait_idle(queue)?;
    Ok(value)
}
