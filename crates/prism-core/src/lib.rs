//! Core data types for the Prism engine.
//!
//! This crate holds the plain data that crosses crate boundaries:
//! - Decoded mesh data (vertices and triangle indices)
//! - Decoded pixel buffers for textures
//! - The engine-wide error type

pub mod error;
pub mod mesh;
pub mod pixels;

pub use error::{Error, Result};
pub use mesh::{MeshData, Vertex};
pub use pixels::PixelBuffer;
