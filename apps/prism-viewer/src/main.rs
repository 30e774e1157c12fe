//! Prism Mesh Viewer
//!
//! Displays a textured mesh with a free-flying camera.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p prism-viewer -- [OPTIONS]
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # Spinning checkerboard cube
//! cargo run -p prism-viewer
//!
//! # A model with its texture, vsync on
//! cargo run -p prism-viewer -- --model viking_room.obj --texture viking_room.png --vsync
//!
//! # Stress the frame loop with many draws and three frames in flight
//! cargo run -p prism-viewer -- --grid 20 --frames-in-flight 3
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod args;
mod assets;

use prism_app::{run_app, AppConfig};

use crate::app::Viewer;
use crate::args::{print_help, ViewerArgs};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    let args = ViewerArgs::from_args();
    if args.help {
        print_help();
        return Ok(());
    }

    let mut config = AppConfig::new("Prism Viewer")
        .with_size(WIDTH, HEIGHT)
        .with_vsync(args.vsync)
        .with_msaa(args.msaa)
        .with_frames_in_flight(args.frames_in_flight);
    if let Some(dir) = args.shaders {
        config = config.with_shader_dir(dir);
    }

    run_app::<Viewer>(config)
}
