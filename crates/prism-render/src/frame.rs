//! Frame synchronization: slot rotation, the per-frame sequence and chain
//! recreation.
//!
//! [`FrameScheduler`] owns the ordering rules and nothing else. Everything that
//! touches the GPU sits behind [`FrameBackend`], so the sequence (wait, release,
//! acquire, reset, record, update, submit, present, advance) and its recovery
//! paths can be driven by a recording mock in tests.
//!
//! Each slot moves through `Idle -> Acquiring -> Recording -> Submitted` and
//! back to `Idle` once its fence has been waited on. At most one submission per
//! slot is ever outstanding because the fence wait always precedes the reset.

use crate::camera::FrameUniforms;
use crate::draw::RenderObject;
use ash::vk;
use prism_gpu::surface::{wait_for_nonzero_extent, FramebufferSize};
use prism_gpu::swapchain::{AcquireOutcome, PresentOutcome};
use prism_gpu::{GpuError, Result};
use std::time::Duration;

#[cfg(test)]
mod tests;

/// GPU-side operations the frame sequence is made of.
///
/// Every method is called from the frame loop thread only.
pub trait FrameBackend {
    /// Number of frame slots the backend was built with.
    fn slot_count(&self) -> usize;

    /// Block until the slot's previous submission has retired.
    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> Result<()>;

    /// Release resources deferred on this slot. Called right after the wait.
    fn release_deferred(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next chain image, signaling the slot's acquire semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    /// Reset the slot's fence and command buffer.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Record the slot's command buffer for the acquired image.
    fn record(&mut self, slot: usize, image_index: u32, objects: &[RenderObject]) -> Result<()>;

    /// Write per-frame uniforms into the slot's buffer.
    fn update_uniforms(&mut self, slot: usize, uniforms: &FrameUniforms) -> Result<()>;

    /// Submit the slot's commands, fenced on the slot's fence.
    fn submit(&mut self, slot: usize) -> Result<()>;

    /// Present the image once the slot's render semaphore signals.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;

    /// Block until the device has no work in flight.
    fn wait_idle(&mut self) -> Result<()>;

    /// Tear down and rebuild the chain and everything sized to it.
    /// Only called with the device idle and a non-zero extent.
    fn recreate_chain(&mut self, extent: vk::Extent2D) -> Result<ChainRebuild>;
}

/// What [`FrameBackend::recreate_chain`] managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainRebuild {
    Rebuilt,
    /// The old chain is gone, but the surface reported a 0x0 extent (the
    /// window was minimized after its size was read), so none was built.
    SurfaceHidden,
}

/// Where a slot is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
}

/// Outcome of one call to [`FrameScheduler::draw_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and presented. `recreated` is set when the
    /// chain was rebuilt after presenting.
    Presented {
        slot: usize,
        image_index: u32,
        recreated: bool,
    },
    /// The chain was out of date; nothing was submitted and the chain has
    /// been rebuilt. The slot is reused for the next frame.
    Skipped,
}

/// Running counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_presented: u64,
    pub frames_skipped: u64,
    pub recreations: u64,
    pub coalesced_resizes: u64,
}

/// Drives frame slots round-robin through the per-frame sequence.
#[derive(Debug)]
pub struct FrameScheduler {
    slots: Vec<SlotState>,
    frame_counter: u64,
    current_slot: usize,
    last_submitted: Option<usize>,
    pending_resize: Option<vk::Extent2D>,
    fence_timeout_ns: u64,
    poll_interval: Duration,
    stats: FrameStats,
}

impl FrameScheduler {
    /// Create a scheduler for `slot_count` frames in flight.
    pub fn new(slot_count: usize, fence_timeout_ns: u64, poll_interval: Duration) -> Result<Self> {
        if slot_count == 0 {
            return Err(GpuError::InvalidState(
                "At least one frame slot is required".to_string(),
            ));
        }

        Ok(Self {
            slots: vec![SlotState::Idle; slot_count],
            frame_counter: 0,
            current_slot: 0,
            last_submitted: None,
            pending_resize: None,
            fence_timeout_ns,
            poll_interval,
            stats: FrameStats::default(),
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot the next frame will use.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).copied()
    }

    /// Frames presented so far; skipped frames do not count.
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Slot holding the most recent submission, if any.
    pub fn last_submitted_slot(&self) -> Option<usize> {
        self.last_submitted
    }

    /// Slot whose deletion queue should take a resource dropped now.
    ///
    /// That is the slot of the latest submission: it is the last of the
    /// earlier slots to be waited on again, so by its next release every
    /// submission that could reference the resource has retired. Before the
    /// first submission nothing is in flight and the next frame's slot is
    /// used.
    pub fn release_slot(&self) -> usize {
        self.last_submitted.unwrap_or(self.current_slot)
    }

    pub fn pending_resize(&self) -> Option<vk::Extent2D> {
        self.pending_resize
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Note a resize. Requests made before the next rebuild collapse into one.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        if self.pending_resize.is_some() {
            self.stats.coalesced_resizes += 1;
        }
        self.pending_resize = Some(vk::Extent2D { width, height });
        tracing::trace!("Resize requested: {width}x{height}");
    }

    fn advance(&mut self) {
        self.frame_counter += 1;
        self.current_slot = (self.frame_counter % self.slots.len() as u64) as usize;
    }

    fn transition(&mut self, slot: usize, from: SlotState, to: SlotState) -> Result<()> {
        let state = &mut self.slots[slot];
        if *state != from {
            return Err(GpuError::InvalidState(format!(
                "Frame slot {slot} is {state:?}, expected {from:?}"
            )));
        }
        *state = to;
        Ok(())
    }

    /// Run one frame.
    ///
    /// Out-of-date and suboptimal chains are handled here and never returned
    /// as errors; every error this returns is fatal.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn draw_frame<B, W>(
        &mut self,
        backend: &mut B,
        window: &W,
        objects: &[RenderObject],
        uniforms: &FrameUniforms,
    ) -> Result<FrameStatus>
    where
        B: FrameBackend + ?Sized,
        W: FramebufferSize + ?Sized,
    {
        let slot = self.current_slot;

        // 1. The slot's previous submission must have retired before any of
        // its resources are touched.
        backend.wait_for_slot(slot, self.fence_timeout_ns)?;
        if self.slots[slot] == SlotState::Submitted {
            self.slots[slot] = SlotState::Idle;
        }
        backend.release_deferred(slot)?;

        // 2. Acquire
        self.transition(slot, SlotState::Idle, SlotState::Acquiring)?;
        let (image_index, suboptimal) = match backend.acquire_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                // Nothing was submitted, so the fence stays signaled.
                self.transition(slot, SlotState::Acquiring, SlotState::Idle)?;
                self.stats.frames_skipped += 1;
                tracing::warn!("Presentation chain out of date on acquire, skipping frame");
                self.recreate(backend, window)?;
                return Ok(FrameStatus::Skipped);
            }
        };
        if suboptimal {
            tracing::debug!("Presentation chain suboptimal, rebuilding after present");
        }

        // 3. Reset, 4. record, 5. update uniforms
        backend.reset_slot(slot)?;
        self.transition(slot, SlotState::Acquiring, SlotState::Recording)?;
        backend.record(slot, image_index, objects)?;
        backend.update_uniforms(slot, uniforms)?;

        // 6. Submit
        backend.submit(slot)?;
        self.transition(slot, SlotState::Recording, SlotState::Submitted)?;
        self.last_submitted = Some(slot);

        // 7. Present, then rebuild if anything asked for it
        let presented = backend.present(slot, image_index)?;
        self.stats.frames_presented += 1;

        let recreated = suboptimal || presented.needs_rebuild() || self.pending_resize.is_some();
        if recreated {
            if presented == PresentOutcome::OutOfDate {
                tracing::warn!("Presentation chain out of date on present");
            }
            self.recreate(backend, window)?;
        }

        // 8. Advance
        self.advance();

        Ok(FrameStatus::Presented {
            slot,
            image_index,
            recreated,
        })
    }

    /// Rebuild the chain: wait for a visible window, wait for the device to
    /// go idle, then recreate against the latest framebuffer size.
    pub fn recreate<B, W>(&mut self, backend: &mut B, window: &W) -> Result<vk::Extent2D>
    where
        B: FrameBackend + ?Sized,
        W: FramebufferSize + ?Sized,
    {
        let extent = loop {
            let extent = wait_for_nonzero_extent(window, self.poll_interval);

            backend.wait_idle()?;
            // Every submission has retired.
            self.slots.fill(SlotState::Idle);

            match backend.recreate_chain(extent)? {
                ChainRebuild::Rebuilt => break extent,
                ChainRebuild::SurfaceHidden => {
                    tracing::debug!("Surface has no area, waiting before rebuilding");
                    std::thread::sleep(self.poll_interval);
                }
            }
        };

        self.pending_resize = None;
        self.stats.recreations += 1;
        tracing::debug!(
            "Presentation chain rebuilt at {}x{} (rebuild #{})",
            extent.width,
            extent.height,
            self.stats.recreations
        );

        Ok(extent)
    }

    /// Wait for all work to retire. Called before shutdown.
    pub fn wait_idle<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        backend.wait_idle()?;
        self.slots.fill(SlotState::Idle);
        Ok(())
    }
}
