//! Input handling for the Prism engine.
//!
//! Window and device events travel from the event loop to the frame loop over
//! a channel ([`input_channel`]). Each frame drains the queue into an
//! [`InputState`], which answers "is this held" and "did this just happen"
//! queries, and a [`FlyCamera`] turns that state into a camera pose.

mod button;
mod event;
mod fly_camera;
mod state;

pub use button::ButtonPhase;
pub use event::{input_channel, InputEvent, InputQueue, InputSender, MouseButton};
pub use fly_camera::FlyCamera;
pub use state::InputState;

pub use winit::keyboard::KeyCode;
