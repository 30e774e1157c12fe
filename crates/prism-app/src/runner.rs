//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use prism_input::{input_channel, InputSender};
use prism_render::FrameStatus;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::PrismApp;
use crate::config::AppConfig;
use crate::context::{AppContext, WindowFramebuffer};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter.
fn init_logging() {
    #[cfg(feature = "profiling-tracy")]
    {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,prism_app=trace,prism_render=trace,prism_gpu=trace,prism_viewer=trace")
        });

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .try_init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init();
    }
}

/// Run a [`PrismApp`] until its window closes.
///
/// Initializes logging, creates the window and renderer and drives the
/// frame loop. A fatal error is logged, everything is torn down with the
/// device idle, and the error is returned.
pub fn run_app<A: PrismApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    config.renderer.validate()?;

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        target_frame_time: config.target_frame_time(),
        config,
        state: None,
        fatal: None,
    };

    event_loop.run_app(&mut runner)?;

    // The loop can also end without a close request.
    if let Some(mut state) = runner.state.take() {
        state.shutdown();
    }

    match runner.fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

struct AppRunner<A: PrismApp> {
    config: AppConfig,
    target_frame_time: Option<Duration>,
    state: Option<AppState<A>>,
    fatal: Option<anyhow::Error>,
}

struct AppState<A: PrismApp> {
    ctx: AppContext,
    app: A,
    input: InputSender,
    skipped_frames: u64,
}

impl<A: PrismApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let (input, queue) = input_channel();
        let mut ctx = AppContext::new(window, &self.config, queue)?;
        let app = A::init(&mut ctx)?;

        Ok(AppState {
            ctx,
            app,
            input,
            skipped_frames: 0,
        })
    }

    /// Log a fatal error, tear down and stop the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        error!("Fatal error: {e:#}");
        if let Some(mut state) = self.state.take() {
            state.shutdown();
        }
        self.fatal = Some(e);
        event_loop.exit();
    }
}

impl<A: PrismApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || self.fatal.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => self.fail(event_loop, e.context("Failed to initialize application")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };
        if state.app.on_event(&event) {
            return;
        }
        state.input.window_event(&event);

        let result = match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(mut state) = self.state.take() {
                    state.shutdown();
                }
                event_loop.exit();
                return;
            }
            WindowEvent::Resized(size) => state.handle_resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let result = state.render_frame(self.target_frame_time);
                state.ctx.window.request_redraw();
                result
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            self.fail(event_loop, e);
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let Some(state) = &self.state {
            state.input.device_event(&event);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.ctx.window.request_redraw();
        }
    }
}

impl<A: PrismApp> AppState<A> {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn render_frame(&mut self, target_frame_time: Option<Duration>) -> anyhow::Result<()> {
        let frame_start = Instant::now();

        // Minimized: nothing to present into.
        let (width, height) = self.ctx.framebuffer_size();
        if width == 0 || height == 0 {
            return Ok(());
        }

        let dt = self.ctx.begin_frame();
        self.app.update(&mut self.ctx, dt);
        self.app.build_frame(&mut self.ctx)?;

        let window = Arc::clone(&self.ctx.window);
        match self.ctx.renderer.draw_frame(&WindowFramebuffer(&window))? {
            FrameStatus::Presented { .. } => self.ctx.frame_count += 1,
            FrameStatus::Skipped => self.skipped_frames += 1,
        }

        if let Some(target) = target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }

        Ok(())
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.ctx.renderer.notify_resized(width, height);
        self.app.on_resize(&mut self.ctx, width, height)?;

        tracing::debug!("Resized to {width}x{height}");
        Ok(())
    }

    fn shutdown(&mut self) {
        info!("Starting cleanup...");

        let stats = self.ctx.renderer.stats();
        info!(
            "Frames: {} presented, {} skipped, {} chain rebuilds, {} resizes coalesced",
            stats.frames_presented, stats.frames_skipped, stats.recreations, stats.coalesced_resizes
        );
        if self.ctx.elapsed > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            let avg_fps = self.ctx.frame_count as f32 / self.ctx.elapsed;
            info!("Average FPS: {avg_fps:.1}");
        }

        if let Err(e) = self.ctx.renderer.wait_idle() {
            error!("Failed to wait idle: {e}");
        }
        self.app.cleanup(&mut self.ctx);
        if let Err(e) = self.ctx.renderer.destroy() {
            error!("Renderer teardown failed: {e}");
        }

        info!("Cleanup complete");
    }
}
