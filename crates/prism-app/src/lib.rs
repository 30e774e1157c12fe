//! Application framework for the Prism engine.
//!
//! This crate provides a trait-based application framework that handles:
//! - Logging setup
//! - Window, device and renderer creation
//! - Input forwarding from the event loop
//! - The frame loop, resizes and teardown
//!
//! # Example
//!
//! ```no_run
//! use prism_app::{run_app, AppConfig, AppContext, PrismApp};
//!
//! struct MyApp;
//!
//! impl PrismApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &mut AppContext, _dt: f32) {}
//!
//!     fn build_frame(&mut self, _ctx: &mut AppContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("My App"))
//! }
//! ```

mod app;
mod config;
mod context;
mod runner;

pub use app::PrismApp;
pub use config::AppConfig;
pub use context::{AppContext, WindowFramebuffer};
pub use runner::run_app;

pub use prism_render::{Camera, RenderObject, Renderer, RendererConfig};
pub use winit::event::WindowEvent;
