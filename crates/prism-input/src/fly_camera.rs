//! Free-flying camera controller.

use crate::event::MouseButton;
use crate::state::InputState;
use glam::Vec3;
use winit::keyboard::KeyCode;

/// Pitch stays just short of straight up or down.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// WASD + QE movement, mouse look while the right button is held, scroll to
/// change speed. Shift moves faster.
#[derive(Debug, Clone)]
pub struct FlyCamera {
    pub position: Vec3,
    /// Radians around +Y, zero looking down -Z.
    pub yaw: f32,
    /// Radians, positive looking up.
    pub pitch: f32,
    /// Units per second.
    pub speed: f32,
    /// Radians per pixel of mouse motion.
    pub sensitivity: f32,
    pub boost: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            yaw: 0.0,
            pitch: 0.0,
            speed: 2.5,
            sensitivity: 0.003,
            boost: 4.0,
        }
    }
}

impl FlyCamera {
    /// Camera at `position` facing `target`.
    #[must_use]
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let mut camera = Self {
            position,
            ..Self::default()
        };
        let dir = (target - position).normalize_or(Vec3::NEG_Z);
        camera.yaw = (-dir.x).atan2(-dir.z);
        camera.pitch = dir.y.asin().clamp(-PITCH_LIMIT, PITCH_LIMIT);
        camera
    }

    /// Unit view direction.
    #[must_use]
    pub fn direction(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(-sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch)
    }

    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.direction().cross(Vec3::Y).normalize_or(Vec3::X)
    }

    /// Advance by `dt` seconds of input. Returns whether the pose changed.
    pub fn update(&mut self, input: &InputState, dt: f32) -> bool {
        let mut changed = false;

        if input.is_button_pressed(MouseButton::Right) {
            let motion = input.motion();
            if motion != glam::Vec2::ZERO {
                self.yaw -= motion.x * self.sensitivity;
                self.pitch = (self.pitch - motion.y * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
                changed = true;
            }
        }

        let scroll = input.scroll().y;
        if scroll != 0.0 {
            self.speed = (self.speed * 1.1_f32.powf(scroll)).clamp(0.05, 500.0);
        }

        let forward = self.direction();
        let right = self.right();
        let axes = [
            (KeyCode::KeyW, forward),
            (KeyCode::KeyS, -forward),
            (KeyCode::KeyD, right),
            (KeyCode::KeyA, -right),
            (KeyCode::KeyE, Vec3::Y),
            (KeyCode::KeyQ, Vec3::NEG_Y),
        ];
        let wish: Vec3 = axes
            .iter()
            .filter(|(key, _)| input.is_key_pressed(*key))
            .map(|(_, dir)| *dir)
            .sum();

        if wish != Vec3::ZERO {
            let boost = if input.is_key_pressed(KeyCode::ShiftLeft) {
                self.boost
            } else {
                1.0
            };
            self.position += wish.normalize_or_zero() * self.speed * boost * dt;
            changed = true;
        }

        changed
    }
}
