//! Input as seen by a single frame.

use crate::button::ButtonPhase;
use crate::event::{InputEvent, InputQueue, MouseButton};
use glam::Vec2;
use hashbrown::HashMap;
use winit::keyboard::KeyCode;

/// Key and button phases plus motion accumulated since the previous frame.
#[derive(Debug, Default)]
pub struct InputState {
    keys: HashMap<KeyCode, ButtonPhase>,
    buttons: [ButtonPhase; MouseButton::COUNT],
    cursor: Vec2,
    motion: Vec2,
    scroll: Vec2,
}

impl InputState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a frame: age last frame's phases, clear per-frame deltas and
    /// apply every queued event.
    pub fn begin_frame(&mut self, queue: &InputQueue) {
        for phase in self.keys.values_mut() {
            phase.age();
        }
        for phase in &mut self.buttons {
            phase.age();
        }
        self.motion = Vec2::ZERO;
        self.scroll = Vec2::ZERO;

        for event in queue.drain() {
            self.apply(event);
        }
    }

    /// Apply a single event to the current frame.
    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::Key { code, pressed } => self.keys.entry(code).or_default().set(pressed),
            InputEvent::MouseButton { button, pressed } => self.buttons[button as usize].set(pressed),
            InputEvent::CursorMoved { x, y } => self.cursor = Vec2::new(x, y),
            InputEvent::MouseMotion { dx, dy } => self.motion += Vec2::new(dx, dy),
            InputEvent::Scroll { x, y } => self.scroll += Vec2::new(x, y),
            InputEvent::FocusLost => {
                for phase in self.keys.values_mut() {
                    phase.set(false);
                }
                for phase in &mut self.buttons {
                    phase.set(false);
                }
            }
        }
    }

    fn key(&self, key: KeyCode) -> ButtonPhase {
        self.keys.get(&key).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.key(key).is_pressed()
    }

    #[must_use]
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.key(key).went_down()
    }

    #[must_use]
    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.key(key).went_up()
    }

    #[must_use]
    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.buttons[button as usize].is_pressed()
    }

    #[must_use]
    pub fn is_button_just_pressed(&self, button: MouseButton) -> bool {
        self.buttons[button as usize].went_down()
    }

    /// Last cursor position in window pixels.
    #[must_use]
    pub const fn cursor(&self) -> Vec2 {
        self.cursor
    }

    /// Raw mouse motion summed over this frame.
    #[must_use]
    pub const fn motion(&self) -> Vec2 {
        self.motion
    }

    /// Scroll in lines summed over this frame.
    #[must_use]
    pub const fn scroll(&self) -> Vec2 {
        self.scroll
    }
}
