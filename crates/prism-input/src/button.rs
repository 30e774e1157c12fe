//! Per-frame phase of a key or mouse button.

/// Where a button is in its press/release cycle, as seen by one frame.
///
/// `Down` and `Up` last exactly one frame; [`ButtonPhase::age`] turns them into
/// `Held` and `Idle` at the start of the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonPhase {
    /// Went down this frame.
    Down,
    Held,
    /// Went up this frame.
    Up,
    #[default]
    Idle,
}

impl ButtonPhase {
    #[inline]
    #[must_use]
    pub const fn is_pressed(self) -> bool {
        matches!(self, Self::Down | Self::Held)
    }

    #[inline]
    #[must_use]
    pub const fn went_down(self) -> bool {
        matches!(self, Self::Down)
    }

    #[inline]
    #[must_use]
    pub const fn went_up(self) -> bool {
        matches!(self, Self::Up)
    }

    /// Apply a press or release. Repeats of the current state are ignored,
    /// so OS key repeat never produces a second `Down`.
    #[inline]
    pub fn set(&mut self, pressed: bool) {
        *self = match (pressed, self.is_pressed()) {
            (true, false) => Self::Down,
            (false, true) => Self::Up,
            _ => *self,
        };
    }

    /// Move one-frame phases into their steady state.
    #[inline]
    pub fn age(&mut self) {
        *self = match *self {
            Self::Down => Self::Held,
            Self::Up => Self::Idle,
            steady => steady,
        };
    }
}
