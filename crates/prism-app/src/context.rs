//! Application context.

use crate::config::AppConfig;
use anyhow::Context as _;
use prism_gpu::{vk, DeviceContextBuilder, FramebufferSize};
use prism_input::{InputQueue, InputState};
use prism_render::Renderer;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use std::time::Instant;
use winit::window::Window;

/// Reads the framebuffer size straight from the window.
#[derive(Clone, Copy)]
pub struct WindowFramebuffer<'a>(pub &'a Window);

impl FramebufferSize for WindowFramebuffer<'_> {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.0.inner_size();
        (size.width, size.height)
    }
}

/// State shared with every [`PrismApp`](crate::PrismApp) callback.
pub struct AppContext {
    pub window: Arc<Window>,
    pub renderer: Renderer,
    /// Input for the current frame.
    pub input: InputState,
    pub(crate) input_queue: InputQueue,
    /// Frames drawn so far.
    pub frame_count: u64,
    /// Seconds since the context was created.
    pub elapsed: f32,
    pub(crate) started: Instant,
    pub(crate) last_frame_time: Instant,
}

impl AppContext {
    pub(crate) fn new(window: Arc<Window>, config: &AppConfig, input_queue: InputQueue) -> anyhow::Result<Self> {
        let display = window.display_handle()?.as_raw();
        let handle = window.window_handle()?.as_raw();

        let device = DeviceContextBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .msaa(
                config.renderer.msaa,
                vk::SampleCountFlags::from_raw(config.renderer.max_msaa_samples),
            )
            .build(display, handle)
            .context("Failed to create device context")?;

        tracing::info!("GPU: {}", device.adapter().summary());

        let size = window.inner_size();
        let extent = vk::Extent2D {
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let renderer = Renderer::new(device, config.renderer.clone(), extent)
            .context("Failed to create renderer")?;

        let now = Instant::now();
        Ok(Self {
            window,
            renderer,
            input: InputState::new(),
            input_queue,
            frame_count: 0,
            elapsed: 0.0,
            started: now,
            last_frame_time: now,
        })
    }

    /// Window framebuffer size in pixels; zero while minimized.
    pub fn framebuffer_size(&self) -> (u32, u32) {
        WindowFramebuffer(&self.window).framebuffer_size()
    }

    /// Width over height of the current framebuffer, 1.0 while minimized.
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(&self) -> f32 {
        match self.framebuffer_size() {
            (w, h) if w > 0 && h > 0 => w as f32 / h as f32,
            _ => 1.0,
        }
    }

    /// Pull queued input into `self.input` for a new frame.
    pub(crate) fn begin_frame(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.elapsed = now.duration_since(self.started).as_secs_f32();

        self.input.begin_frame(&self.input_queue);
        dt
    }
}
