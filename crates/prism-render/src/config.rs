//! Renderer configuration.

use crate::error::{RenderError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Renderer settings fixed at construction.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Number of frame slots (frames in flight).
    pub frames_in_flight: usize,
    /// Prefer FIFO presentation over mailbox.
    pub vsync: bool,
    /// Multisample colour and depth attachments.
    pub msaa: bool,
    /// Upper bound on the MSAA sample count (1, 2, 4, 8, ...).
    pub max_msaa_samples: u32,
    /// Timeout for a frame slot's fence; exceeding it is a GPU hang.
    pub fence_timeout: Duration,
    /// How often to re-check the framebuffer size while minimized.
    pub resize_poll_interval: Duration,
    /// Directory with `mesh.vert.spv` and `mesh.frag.spv` to use instead of
    /// the built-in shaders.
    pub shader_dir: Option<PathBuf>,
    pub clear_color: [f32; 4],
    /// Maximum number of materials alive at once.
    pub max_materials: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            vsync: false,
            msaa: true,
            max_msaa_samples: 8,
            fence_timeout: Duration::from_secs(5),
            resize_poll_interval: Duration::from_millis(16),
            shader_dir: None,
            clear_color: [0.02, 0.02, 0.03, 1.0],
            max_materials: 256,
        }
    }
}

impl RendererConfig {
    /// Reject settings the frame loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.frames_in_flight == 0 {
            return Err(RenderError::InvalidConfig(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.fence_timeout.is_zero() || self.fence_timeout == Duration::MAX {
            return Err(RenderError::InvalidConfig(
                "fence_timeout must be finite and non-zero".to_string(),
            ));
        }
        if !self.max_msaa_samples.is_power_of_two() || self.max_msaa_samples > 64 {
            return Err(RenderError::InvalidConfig(format!(
                "max_msaa_samples {} is not a sample count",
                self.max_msaa_samples
            )));
        }
        if self.max_materials == 0 {
            return Err(RenderError::InvalidConfig(
                "max_materials must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Fence timeout in nanoseconds, saturating.
    pub fn fence_timeout_ns(&self) -> u64 {
        u64::try_from(self.fence_timeout.as_nanos()).unwrap_or(u64::MAX - 1)
    }

    /// Vertex and fragment module paths, when the built-in shaders are
    /// overridden.
    pub fn shader_override(&self) -> Option<(PathBuf, PathBuf)> {
        let dir = self.shader_dir.as_deref()?;
        Some((dir.join(VERTEX_SHADER_FILE), dir.join(FRAGMENT_SHADER_FILE)))
    }
}

const VERTEX_SHADER_FILE: &str = "mesh.vert.spv";
const FRAGMENT_SHADER_FILE: &str = "mesh.frag.spv";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.fence_timeout_ns(), 5_000_000_000);
    }

    #[test]
    fn rejects_zero_slots_and_unbounded_timeout() {
        let config = RendererConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RenderError::InvalidConfig(_))));

        let config = RendererConfig {
            fence_timeout: Duration::MAX,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RendererConfig {
            max_msaa_samples: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn built_in_shaders_unless_overridden() {
        assert!(RendererConfig::default().shader_override().is_none());

        let config = RendererConfig {
            shader_dir: Some(PathBuf::from("/opt/game/spirv")),
            ..Default::default()
        };
        let (vertex, fragment) = config.shader_override().unwrap();
        assert_eq!(vertex, PathBuf::from("/opt/game/spirv/mesh.vert.spv"));
        assert!(fragment.ends_with("spirv/mesh.frag.spv"));
    }
}
