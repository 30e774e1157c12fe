//! `PrismApp` trait definition.

use crate::context::AppContext;
use winit::event::WindowEvent;

/// Trait for Prism applications.
///
/// The framework owns the window, the renderer and the frame loop. Each frame
/// it drains input, calls [`update`](Self::update) then
/// [`build_frame`](Self::build_frame), and draws whatever render objects and
/// camera the app handed to the renderer.
pub trait PrismApp: Sized {
    /// Create the application once the window and renderer exist. Upload
    /// meshes and textures here.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Advance application state by `dt` seconds. Input for this frame is
    /// already in `ctx.input`.
    fn update(&mut self, ctx: &mut AppContext, dt: f32);

    /// Traverse the scene: submit this frame's render objects and camera to
    /// `ctx.renderer`.
    fn build_frame(&mut self, ctx: &mut AppContext) -> anyhow::Result<()>;

    /// The window was resized to a non-zero size. The renderer already knows.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Inspect a window event before the framework. Return `true` to
    /// consume it.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Called before shutdown with the device idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
