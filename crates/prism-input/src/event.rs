//! Typed input events and the channel carrying them from the event loop.
//!
//! The window thread owns an [`InputSender`] and forwards winit events through
//! it; the frame loop drains the matching [`InputQueue`] once per frame.

use crossbeam::channel::{self, Receiver, Sender};
use winit::event::{DeviceEvent, ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pixels per scroll line when a device reports pixel deltas.
const PIXELS_PER_LINE: f32 = 100.0;

/// Mouse buttons the engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub(crate) const COUNT: usize = 3;

    fn from_winit(button: winit::event::MouseButton) -> Option<Self> {
        match button {
            winit::event::MouseButton::Left => Some(Self::Left),
            winit::event::MouseButton::Right => Some(Self::Right),
            winit::event::MouseButton::Middle => Some(Self::Middle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Key { code: KeyCode, pressed: bool },
    MouseButton { button: MouseButton, pressed: bool },
    /// Cursor position in window pixels.
    CursorMoved { x: f32, y: f32 },
    /// Raw device motion, independent of the cursor.
    MouseMotion { dx: f32, dy: f32 },
    /// Scroll in lines.
    Scroll { x: f32, y: f32 },
    /// The window lost focus; every button counts as released.
    FocusLost,
}

impl InputEvent {
    /// Translate a window event, if it carries input.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => match event.physical_key {
                PhysicalKey::Code(code) => Some(Self::Key {
                    code,
                    pressed: event.state == ElementState::Pressed,
                }),
                PhysicalKey::Unidentified(_) => None,
            },
            WindowEvent::MouseInput { state, button, .. } => {
                MouseButton::from_winit(*button).map(|button| Self::MouseButton {
                    button,
                    pressed: *state == ElementState::Pressed,
                })
            }
            WindowEvent::CursorMoved { position, .. } => Some(Self::CursorMoved {
                x: position.x as f32,
                y: position.y as f32,
            }),
            WindowEvent::MouseWheel { delta, .. } => Some(match delta {
                MouseScrollDelta::LineDelta(x, y) => Self::Scroll { x: *x, y: *y },
                MouseScrollDelta::PixelDelta(pos) => Self::Scroll {
                    x: pos.x as f32 / PIXELS_PER_LINE,
                    y: pos.y as f32 / PIXELS_PER_LINE,
                },
            }),
            WindowEvent::Focused(false) => Some(Self::FocusLost),
            _ => None,
        }
    }

    /// Translate a device event, if it carries input.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn from_device_event(event: &DeviceEvent) -> Option<Self> {
        match event {
            DeviceEvent::MouseMotion { delta: (dx, dy) } => Some(Self::MouseMotion {
                dx: *dx as f32,
                dy: *dy as f32,
            }),
            _ => None,
        }
    }
}

/// Create a connected sender/queue pair.
#[must_use]
pub fn input_channel() -> (InputSender, InputQueue) {
    let (sender, receiver) = channel::unbounded();
    (InputSender { sender }, InputQueue { receiver })
}

/// Producer side, held by the event loop.
#[derive(Debug, Clone)]
pub struct InputSender {
    sender: Sender<InputEvent>,
}

impl InputSender {
    /// Queue an event. Returns `false` once the queue has been dropped.
    pub fn send(&self, event: InputEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Forward a window event; returns whether it was input.
    pub fn window_event(&self, event: &WindowEvent) -> bool {
        InputEvent::from_window_event(event).is_some_and(|e| self.forward(e))
    }

    /// Forward a device event; returns whether it was input.
    pub fn device_event(&self, event: &DeviceEvent) -> bool {
        InputEvent::from_device_event(event).is_some_and(|e| self.forward(e))
    }

    fn forward(&self, event: InputEvent) -> bool {
        if self.send(event) {
            true
        } else {
            tracing::trace!("Input queue closed, dropping {event:?}");
            false
        }
    }
}

/// Consumer side, drained by the frame loop.
#[derive(Debug)]
pub struct InputQueue {
    receiver: Receiver<InputEvent>,
}

impl InputQueue {
    /// Everything queued so far, oldest first. Never blocks.
    pub fn drain(&self) -> impl Iterator<Item = InputEvent> + '_ {
        self.receiver.try_iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;
    use winit::event::DeviceId;

    fn device() -> DeviceId {
        // SAFETY: only used to build synthetic events.
        unsafe { DeviceId::dummy() }
    }

    #[test]
    fn translates_mouse_events() {
        let press = WindowEvent::MouseInput {
            device_id: device(),
            state: ElementState::Pressed,
            button: winit::event::MouseButton::Right,
        };
        assert_eq!(
            InputEvent::from_window_event(&press),
            Some(InputEvent::MouseButton {
                button: MouseButton::Right,
                pressed: true
            })
        );

        let other = WindowEvent::MouseInput {
            device_id: device(),
            state: ElementState::Pressed,
            button: winit::event::MouseButton::Other(7),
        };
        assert_eq!(InputEvent::from_window_event(&other), None);

        let moved = WindowEvent::CursorMoved {
            device_id: device(),
            position: PhysicalPosition::new(10.0, 20.0),
        };
        assert_eq!(
            InputEvent::from_window_event(&moved),
            Some(InputEvent::CursorMoved { x: 10.0, y: 20.0 })
        );
    }

    #[test]
    fn pixel_scroll_converts_to_lines() {
        let wheel = WindowEvent::MouseWheel {
            device_id: device(),
            delta: MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 250.0)),
            phase: winit::event::TouchPhase::Moved,
        };
        assert_eq!(
            InputEvent::from_window_event(&wheel),
            Some(InputEvent::Scroll { x: 0.0, y: 2.5 })
        );
    }

    #[test]
    fn non_input_events_ignored() {
        let (sender, queue) = input_channel();
        assert!(!sender.window_event(&WindowEvent::RedrawRequested));
        assert!(!sender.device_event(&DeviceEvent::Added));
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_preserves_order() {
        let (sender, queue) = input_channel();
        sender.device_event(&DeviceEvent::MouseMotion { delta: (1.0, 2.0) });
        sender.window_event(&WindowEvent::Focused(false));
        sender.send(InputEvent::Scroll { x: 0.0, y: 1.0 });

        let events: Vec<_> = queue.drain().collect();
        assert_eq!(
            events,
            vec![
                InputEvent::MouseMotion { dx: 1.0, dy: 2.0 },
                InputEvent::FocusLost,
                InputEvent::Scroll { x: 0.0, y: 1.0 },
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn sender_works_across_threads() {
        let (sender, queue) = input_channel();
        let handle = std::thread::spawn(move || {
            for _ in 0..10 {
                sender.send(InputEvent::MouseMotion { dx: 1.0, dy: 0.0 });
            }
        });
        handle.join().unwrap();
        assert_eq!(queue.drain().count(), 10);
    }

    #[test]
    fn send_fails_after_queue_dropped() {
        let (sender, queue) = input_channel();
        drop(queue);
        assert!(!sender.send(InputEvent::FocusLost));
    }
}
