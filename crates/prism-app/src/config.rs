//! Application configuration.

use prism_render::RendererConfig;
use std::path::PathBuf;

/// Window and renderer settings for [`run_app`](crate::run_app).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    pub renderer: RendererConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Prism".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            validation: cfg!(debug_assertions),
            renderer: RendererConfig::default(),
        }
    }
}

impl AppConfig {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.renderer.vsync = vsync;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.renderer.frames_in_flight = frames;
        self
    }

    #[must_use]
    pub fn with_msaa(mut self, msaa: bool) -> Self {
        self.renderer.msaa = msaa;
        self
    }

    /// Load SPIR-V from `dir` instead of the built-in mesh shaders.
    #[must_use]
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.renderer.shader_dir = Some(dir.into());
        self
    }

    /// Time budget per frame for the target rate, if any.
    #[must_use]
    pub fn target_frame_time(&self) -> Option<std::time::Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| std::time::Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}
