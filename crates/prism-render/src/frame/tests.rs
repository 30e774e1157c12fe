use super::*;
use crate::draw::{MaterialId, MeshId};
use glam::Mat4;
use std::cell::Cell;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Wait(usize),
    Release(usize),
    Acquire(usize),
    Reset(usize),
    Record(usize, u32),
    Uniforms(usize),
    Submit(usize),
    Present(usize, u32),
    WaitIdle,
    Recreate(u32, u32),
    SurfaceHidden,
    /// A deferred resource was destroyed.
    Freed(u32),
}

/// A resource queued on a slot, with the submissions that were in flight
/// when it was dropped.
struct Deferred {
    resource: u32,
    referenced_by: Vec<u64>,
}

/// Backend that simulates fences and a chain, recording every call.
struct MockBackend {
    slots: usize,
    events: Vec<Event>,
    /// Submissions not yet observed retired through a fence wait or idle.
    in_flight: Vec<bool>,
    /// Fence state: signaled unless reset and not yet resubmitted+retired.
    fence_signaled: Vec<bool>,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    chain_generation: u32,
    chain_images: u32,
    next_image: u32,
    /// Generation of the chain each in-flight slot references.
    slot_generation: Vec<Option<u32>>,
    hang_on_wait: bool,
    /// Rebuilds that find the surface at 0x0 before one succeeds.
    hidden_rebuilds: u32,
    submissions: u64,
    /// Id of each slot's unretired submission.
    pending_submission: Vec<Option<u64>>,
    deferred: Vec<Vec<Deferred>>,
}

impl MockBackend {
    fn new(slots: usize) -> Self {
        Self {
            slots,
            events: Vec::new(),
            in_flight: vec![false; slots],
            fence_signaled: vec![true; slots],
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            chain_generation: 0,
            chain_images: 3,
            next_image: 0,
            slot_generation: vec![None; slots],
            hang_on_wait: false,
            hidden_rebuilds: 0,
            submissions: 0,
            pending_submission: vec![None; slots],
            deferred: (0..slots).map(|_| Vec::new()).collect(),
        }
    }

    /// Drop `resource` now, queuing it on `slot`.
    fn defer(&mut self, slot: usize, resource: u32) {
        let referenced_by = self.pending_submission.iter().flatten().copied().collect();
        self.deferred[slot].push(Deferred {
            resource,
            referenced_by,
        });
    }

    /// Slot whose release freed `resource`, and where it happened.
    fn freed_by(&self, resource: u32) -> Option<(usize, usize)> {
        let at = self.events.iter().position(|e| *e == Event::Freed(resource))?;
        let slot = self.events[..at].iter().rev().find_map(|e| match e {
            Event::Release(slot) => Some(*slot),
            _ => None,
        })?;
        Some((slot, at))
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl FrameBackend for MockBackend {
    fn slot_count(&self) -> usize {
        self.slots
    }

    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> Result<()> {
        self.events.push(Event::Wait(slot));
        if self.hang_on_wait && self.in_flight[slot] {
            return Err(GpuError::FenceTimeout { slot, timeout_ns });
        }
        // The GPU finishes whatever this slot submitted.
        assert!(
            self.fence_signaled[slot] || self.in_flight[slot],
            "waiting on a reset fence with nothing submitted would hang"
        );
        self.in_flight[slot] = false;
        self.fence_signaled[slot] = true;
        self.slot_generation[slot] = None;
        self.pending_submission[slot] = None;
        Ok(())
    }

    fn release_deferred(&mut self, slot: usize) -> Result<()> {
        assert!(!self.in_flight[slot], "released resources of an in-flight slot");
        self.events.push(Event::Release(slot));
        for deferred in std::mem::take(&mut self.deferred[slot]).into_iter().rev() {
            for id in &deferred.referenced_by {
                assert!(
                    !self.pending_submission.contains(&Some(*id)),
                    "resource {} freed while submission {id} may still use it",
                    deferred.resource
                );
            }
            self.events.push(Event::Freed(deferred.resource));
        }
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        self.events.push(Event::Acquire(slot));
        let outcome = self.acquire_script.pop_front().unwrap_or(AcquireOutcome::Acquired {
            image_index: self.next_image,
            suboptimal: false,
        });
        if let AcquireOutcome::Acquired { image_index, .. } = outcome {
            assert!(image_index < self.chain_images);
            self.next_image = (image_index + 1) % self.chain_images;
        }
        Ok(outcome)
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        assert!(!self.in_flight[slot], "reset a slot with a pending submission");
        self.events.push(Event::Reset(slot));
        self.fence_signaled[slot] = false;
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32, _objects: &[RenderObject]) -> Result<()> {
        self.events.push(Event::Record(slot, image_index));
        Ok(())
    }

    fn update_uniforms(&mut self, slot: usize, _uniforms: &FrameUniforms) -> Result<()> {
        assert!(!self.in_flight[slot], "uniforms written while the GPU may read them");
        self.events.push(Event::Uniforms(slot));
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        assert!(!self.in_flight[slot], "two submissions outstanding on slot {slot}");
        assert!(!self.fence_signaled[slot], "submitted with a signaled fence");
        self.events.push(Event::Submit(slot));
        self.in_flight[slot] = true;
        self.slot_generation[slot] = Some(self.chain_generation);
        self.pending_submission[slot] = Some(self.submissions);
        self.submissions += 1;
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        self.events.push(Event::Present(slot, image_index));
        Ok(self.present_script.pop_front().unwrap_or(PresentOutcome::Presented))
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.events.push(Event::WaitIdle);
        for slot in 0..self.slots {
            if self.in_flight[slot] {
                self.in_flight[slot] = false;
                self.fence_signaled[slot] = true;
            }
            self.slot_generation[slot] = None;
            self.pending_submission[slot] = None;
        }
        Ok(())
    }

    fn recreate_chain(&mut self, extent: vk::Extent2D) -> Result<ChainRebuild> {
        assert!(extent.width > 0 && extent.height > 0, "zero-sized chain");
        assert!(
            self.slot_generation.iter().all(Option::is_none),
            "chain rebuilt while a submission still references it"
        );
        if self.hidden_rebuilds > 0 {
            self.hidden_rebuilds -= 1;
            self.events.push(Event::SurfaceHidden);
            return Ok(ChainRebuild::SurfaceHidden);
        }
        self.events.push(Event::Recreate(extent.width, extent.height));
        self.chain_generation += 1;
        self.next_image = 0;
        Ok(ChainRebuild::Rebuilt)
    }
}

fn scheduler(slots: usize) -> FrameScheduler {
    FrameScheduler::new(slots, 1_000_000_000, Duration::ZERO).unwrap()
}

fn objects() -> Vec<RenderObject> {
    vec![RenderObject::new(MeshId(0), MaterialId(0), Mat4::IDENTITY, 36)]
}

fn window() -> impl Fn() -> (u32, u32) {
    || (800, 600)
}

#[test]
fn zero_slots_rejected() {
    assert!(FrameScheduler::new(0, 1, Duration::ZERO).is_err());
}

#[test]
fn frame_sequence_order() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);

    let status = frames
        .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
        .unwrap();

    assert_eq!(
        status,
        FrameStatus::Presented {
            slot: 0,
            image_index: 0,
            recreated: false
        }
    );
    assert_eq!(
        backend.events,
        vec![
            Event::Wait(0),
            Event::Release(0),
            Event::Acquire(0),
            Event::Reset(0),
            Event::Record(0, 0),
            Event::Uniforms(0),
            Event::Submit(0),
            Event::Present(0, 0),
        ]
    );
    assert_eq!(frames.current_slot(), 1);
    assert_eq!(frames.slot_state(0), Some(SlotState::Submitted));
    assert_eq!(frames.last_submitted_slot(), Some(0));
}

#[test]
fn slots_round_robin() {
    for slot_count in 1..=3 {
        let mut backend = MockBackend::new(slot_count);
        let mut frames = scheduler(slot_count);

        let mut used = Vec::new();
        for _ in 0..7 {
            if let FrameStatus::Presented { slot, .. } = frames
                .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
                .unwrap()
            {
                used.push(slot);
            }
        }

        let expected: Vec<usize> = (0..7).map(|i| i % slot_count).collect();
        assert_eq!(used, expected);
        assert_eq!(frames.frame_counter(), 7);
    }
}

#[test]
fn one_submission_per_slot() {
    // The mock asserts on a second outstanding submission; run long enough
    // for every slot to be reused several times.
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    for _ in 0..20 {
        frames
            .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
            .unwrap();
    }

    // Every submit on a slot is preceded by a wait on that slot since the
    // previous submit.
    for slot in 0..2 {
        let mut waited = true;
        for event in &backend.events {
            match event {
                Event::Wait(s) if *s == slot => waited = true,
                Event::Submit(s) if *s == slot => {
                    assert!(waited, "slot {slot} resubmitted without a fence wait");
                    waited = false;
                }
                _ => {}
            }
        }
    }
    assert_eq!(frames.stats().frames_presented, 20);
}

#[test]
fn out_of_date_acquire_skips_frame() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    backend.acquire_script.extend([
        AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false,
        },
        AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: false,
        },
        AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: false,
        },
        AcquireOutcome::Acquired {
            image_index: 0,
            suboptimal: false,
        },
        AcquireOutcome::OutOfDate,
    ]);

    let mut statuses = Vec::new();
    for _ in 0..8 {
        statuses.push(
            frames
                .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
                .unwrap(),
        );
    }

    // Iteration 5 is skipped without recording or submitting.
    assert_eq!(statuses[4], FrameStatus::Skipped);

    let fifth_acquire = backend
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Acquire(_)))
        .nth(4)
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(
        &backend.events[fifth_acquire..fifth_acquire + 3],
        &[Event::Acquire(0), Event::WaitIdle, Event::Recreate(800, 600)]
    );

    // Iteration 6 reuses slot 0 and draws into the new chain's first image.
    assert_eq!(
        statuses[5],
        FrameStatus::Presented {
            slot: 0,
            image_index: 0,
            recreated: false
        }
    );
    assert!(statuses[5..]
        .iter()
        .all(|s| matches!(s, FrameStatus::Presented { .. })));

    assert_eq!(frames.stats().frames_skipped, 1);
    assert_eq!(frames.stats().recreations, 1);
    assert_eq!(frames.stats().frames_presented, 7);
    assert_eq!(backend.count(|e| matches!(e, Event::Submit(_))), 7);
    assert_eq!(backend.chain_generation, 1);
}

#[test]
fn skipped_frame_keeps_fence_signaled() {
    let mut backend = MockBackend::new(1);
    let mut frames = scheduler(1);
    backend.acquire_script.push_back(AcquireOutcome::OutOfDate);

    let status = frames
        .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
        .unwrap();
    assert_eq!(status, FrameStatus::Skipped);
    assert_eq!(backend.count(|e| matches!(e, Event::Reset(_))), 0);
    assert!(backend.fence_signaled[0]);

    // The next wait would hang (and the mock assert) if the fence had been reset.
    frames
        .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
        .unwrap();
    assert_eq!(frames.frame_counter(), 1);
}

#[test]
fn suboptimal_rebuilds_after_present() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    backend.acquire_script.push_back(AcquireOutcome::Acquired {
        image_index: 1,
        suboptimal: true,
    });

    let status = frames
        .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
        .unwrap();

    assert_eq!(
        status,
        FrameStatus::Presented {
            slot: 0,
            image_index: 1,
            recreated: true
        }
    );
    let tail = &backend.events[backend.events.len() - 4..];
    assert_eq!(
        tail,
        &[
            Event::Submit(0),
            Event::Present(0, 1),
            Event::WaitIdle,
            Event::Recreate(800, 600)
        ]
    );
}

#[test]
fn present_results_trigger_rebuild() {
    for outcome in [PresentOutcome::Suboptimal, PresentOutcome::OutOfDate] {
        let mut backend = MockBackend::new(2);
        let mut frames = scheduler(2);
        backend.present_script.push_back(outcome);

        let status = frames
            .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
            .unwrap();

        assert!(matches!(status, FrameStatus::Presented { recreated: true, .. }));
        assert_eq!(frames.stats().recreations, 1);
        // The frame still advanced.
        assert_eq!(frames.current_slot(), 1);
    }
}

#[test]
fn rebuild_waits_for_idle_first() {
    let mut backend = MockBackend::new(3);
    let mut frames = scheduler(3);
    for i in 0..12 {
        if i % 4 == 3 {
            frames.request_resize(1024, 768);
        }
        frames
            .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
            .unwrap();
    }

    let recreations: Vec<usize> = backend
        .events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Recreate(..)))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(recreations.len(), 3);
    for i in recreations {
        assert_eq!(backend.events[i - 1], Event::WaitIdle);
    }
}

#[test]
fn resize_requests_coalesce() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    let size = Cell::new((640, 480));
    let window = || size.get();

    frames.request_resize(640, 480);
    frames.request_resize(800, 600);
    size.set((1280, 720));
    frames.request_resize(1280, 720);
    assert_eq!(frames.stats().coalesced_resizes, 2);

    frames
        .draw_frame(&mut backend, &window, &objects(), &FrameUniforms::default())
        .unwrap();

    assert_eq!(
        backend
            .events
            .iter()
            .filter(|e| matches!(e, Event::Recreate(..)))
            .collect::<Vec<_>>(),
        vec![&Event::Recreate(1280, 720)]
    );
    assert_eq!(frames.pending_resize(), None);

    // No further rebuild without a new request.
    frames
        .draw_frame(&mut backend, &window, &objects(), &FrameUniforms::default())
        .unwrap();
    assert_eq!(frames.stats().recreations, 1);
}

#[test]
fn minimized_window_blocks_rebuild() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    let polls = Cell::new(0);
    let window = || {
        polls.set(polls.get() + 1);
        if polls.get() <= 5 {
            (0, 0)
        } else {
            (1920, 1080)
        }
    };

    frames.request_resize(0, 0);
    frames
        .draw_frame(&mut backend, &window, &objects(), &FrameUniforms::default())
        .unwrap();

    assert_eq!(polls.get(), 6);
    assert!(backend.events.contains(&Event::Recreate(1920, 1080)));
    assert!(!backend
        .events
        .iter()
        .any(|e| matches!(e, Event::Recreate(0, _) | Event::Recreate(_, 0))));
}

#[test]
fn repeated_rebuild_is_stable() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);

    let first = frames.recreate(&mut backend, &window()).unwrap();
    let second = frames.recreate(&mut backend, &window()).unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.chain_generation, 2);
    assert_eq!(frames.stats().recreations, 2);
}

#[test]
fn fence_timeout_is_fatal() {
    let mut backend = MockBackend::new(1);
    let mut frames = scheduler(1);
    frames
        .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
        .unwrap();

    backend.hang_on_wait = true;
    let err = frames
        .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
        .unwrap_err();

    assert!(matches!(err, GpuError::FenceTimeout { slot: 0, .. }));
    // Nothing past the wait ran.
    assert_eq!(backend.events.last(), Some(&Event::Wait(0)));
}

#[test]
fn shutdown_idle_clears_slots() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    for _ in 0..2 {
        frames
            .draw_frame(&mut backend, &window(), &objects(), &FrameUniforms::default())
            .unwrap();
    }
    assert_eq!(frames.slot_state(1), Some(SlotState::Submitted));

    frames.wait_idle(&mut backend).unwrap();
    assert!((0..2).all(|s| frames.slot_state(s) == Some(SlotState::Idle)));
    assert!(backend.in_flight.iter().all(|f| !f));
}

fn draw(frames: &mut FrameScheduler, backend: &mut MockBackend) -> FrameStatus {
    frames
        .draw_frame(backend, &window(), &objects(), &FrameUniforms::default())
        .unwrap()
}

/// `resource` was freed by the release that directly follows a wait on `slot`.
fn assert_freed_after_wait(backend: &MockBackend, resource: u32, slot: usize) {
    let (released_by, at) = backend.freed_by(resource).unwrap();
    assert_eq!(released_by, slot);
    let wait = backend.events[..at]
        .iter()
        .rposition(|e| *e == Event::Release(slot))
        .unwrap();
    assert_eq!(backend.events[wait - 1], Event::Wait(slot));
}

#[test]
fn release_before_first_submit_goes_to_next_slot() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);

    assert_eq!(frames.release_slot(), 0);
    backend.defer(frames.release_slot(), 1);
    draw(&mut frames, &mut backend);

    assert_eq!(
        &backend.events[..3],
        &[Event::Wait(0), Event::Release(0), Event::Freed(1)]
    );
}

#[test]
fn release_waits_for_every_earlier_submission() {
    let mut backend = MockBackend::new(3);
    let mut frames = scheduler(3);
    for _ in 0..3 {
        draw(&mut frames, &mut backend);
    }

    // Frames on slots 0, 1 and 2 may all still reference the resource.
    let slot = frames.release_slot();
    assert_eq!(slot, 2);
    backend.defer(slot, 7);

    draw(&mut frames, &mut backend);
    draw(&mut frames, &mut backend);
    assert_eq!(backend.freed_by(7), None);

    draw(&mut frames, &mut backend);
    assert_freed_after_wait(&backend, 7, 2);
}

#[test]
fn release_after_skipped_frame() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    draw(&mut frames, &mut backend);

    backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
    assert_eq!(draw(&mut frames, &mut backend), FrameStatus::Skipped);

    // Skipping neither submits nor moves the release slot.
    assert_eq!(frames.release_slot(), 0);
    backend.defer(frames.release_slot(), 9);

    draw(&mut frames, &mut backend);
    assert_eq!(backend.freed_by(9), None);
    draw(&mut frames, &mut backend);
    assert_freed_after_wait(&backend, 9, 0);
}

#[test]
fn release_after_skipped_first_frame() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    backend.acquire_script.push_back(AcquireOutcome::OutOfDate);
    assert_eq!(draw(&mut frames, &mut backend), FrameStatus::Skipped);

    assert_eq!(frames.last_submitted_slot(), None);
    backend.defer(frames.release_slot(), 4);
    draw(&mut frames, &mut backend);

    assert_freed_after_wait(&backend, 4, 0);
}

#[test]
fn deferred_resources_free_in_reverse_order() {
    let mut backend = MockBackend::new(1);
    let mut frames = scheduler(1);
    draw(&mut frames, &mut backend);

    let slot = frames.release_slot();
    backend.defer(slot, 1);
    backend.defer(slot, 2);
    draw(&mut frames, &mut backend);

    let (_, first) = backend.freed_by(2).unwrap();
    let (_, second) = backend.freed_by(1).unwrap();
    assert!(first < second);
}

#[test]
fn rebuild_retries_while_surface_is_hidden() {
    let mut backend = MockBackend::new(2);
    let mut frames = scheduler(2);
    backend.hidden_rebuilds = 2;
    backend.acquire_script.push_back(AcquireOutcome::OutOfDate);

    assert_eq!(draw(&mut frames, &mut backend), FrameStatus::Skipped);
    assert_eq!(
        &backend.events[3..],
        &[
            Event::WaitIdle,
            Event::SurfaceHidden,
            Event::WaitIdle,
            Event::SurfaceHidden,
            Event::WaitIdle,
            Event::Recreate(800, 600),
        ]
    );
    assert_eq!(frames.stats().recreations, 1);
    assert_eq!(backend.chain_generation, 1);

    assert!(matches!(
        draw(&mut frames, &mut backend),
        FrameStatus::Presented { slot: 0, .. }
    ));
}
