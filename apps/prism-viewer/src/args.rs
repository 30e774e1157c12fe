//! Command line options.

use std::path::PathBuf;

/// Viewer options parsed from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerArgs {
    pub model: Option<PathBuf>,
    pub texture: Option<PathBuf>,
    /// Directory with compiled `mesh.vert.spv`/`mesh.frag.spv`.
    pub shaders: Option<PathBuf>,
    pub vsync: bool,
    pub msaa: bool,
    pub frames_in_flight: usize,
    /// Copies per side of the instance grid.
    pub grid: u32,
    pub help: bool,
}

impl Default for ViewerArgs {
    fn default() -> Self {
        Self {
            model: None,
            texture: None,
            shaders: None,
            vsync: false,
            msaa: true,
            frames_in_flight: 2,
            grid: 1,
            help: false,
        }
    }
}

impl ViewerArgs {
    /// Parse `std::env::args`.
    pub fn from_args() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    /// Parse an argument list without the program name. Unknown flags and
    /// unparsable values are logged and ignored.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut params = Self::default();

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "-m" | "--model" => {
                    if let Some(v) = args.get(i + 1) {
                        params.model = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "-t" | "--texture" => {
                    if let Some(v) = args.get(i + 1) {
                        params.texture = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--shaders" => {
                    if let Some(v) = args.get(i + 1) {
                        params.shaders = Some(PathBuf::from(v));
                        i += 1;
                    }
                }
                "--frames-in-flight" => {
                    if let Some(v) = args.get(i + 1).and_then(|v| v.parse().ok()) {
                        params.frames_in_flight = v;
                        i += 1;
                    } else {
                        tracing::warn!("--frames-in-flight expects a number");
                    }
                }
                "--grid" => {
                    if let Some(v) = args.get(i + 1).and_then(|v| v.parse::<u32>().ok()) {
                        params.grid = v.max(1);
                        i += 1;
                    } else {
                        tracing::warn!("--grid expects a number");
                    }
                }
                "--vsync" => params.vsync = true,
                "--no-msaa" => params.msaa = false,
                "-h" | "--help" => params.help = true,
                other => tracing::warn!("Ignoring unknown argument {other}"),
            }
            i += 1;
        }

        params
    }
}

pub fn print_help() {
    eprintln!(
        "Prism Mesh Viewer

USAGE:
    cargo run -p prism-viewer -- [OPTIONS]

OPTIONS:
    -m, --model <PATH>        Wavefront OBJ file to display (default: cube)
    -t, --texture <PATH>      Texture image (default: checkerboard)
    --shaders <DIR>           Load mesh.vert.spv/mesh.frag.spv from DIR
    --vsync                   Prefer FIFO presentation
    --no-msaa                 Disable multisampling
    --frames-in-flight <N>    Frames the CPU may record ahead (default: 2)
    --grid <N>                Draw an NxN grid of copies (default: 1)
    -h, --help                Print this help message

CONTROLS:
    W/A/S/D, Q/E              Move
    Right mouse + drag        Look around
    Scroll                    Change speed
    Left Shift                Move faster

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log level (e.g., info, debug, trace)"
    );
}
