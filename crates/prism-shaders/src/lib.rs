//! Built-in mesh shaders.
//!
//! The GLSL in `shaders/` is compiled by the build script and embedded here,
//! so a renderer needs no files on disk to start.
//!
//! Interface shared by both stages:
//! - set 0, binding 0: frame uniforms (view, projection, view-projection,
//!   camera position)
//! - set 1, binding 0: material sampler
//! - push constant: 64-byte model matrix, vertex stage
//! - vertex locations 0/1/2: position, colour, texture coordinate

use std::sync::OnceLock;

static MESH_VERT_BYTES: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh.vert.spv"));
static MESH_FRAG_BYTES: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/mesh.frag.spv"));

static MESH_VERT: OnceLock<Vec<u32>> = OnceLock::new();
static MESH_FRAG: OnceLock<Vec<u32>> = OnceLock::new();

/// `include_bytes!` gives no alignment guarantee, so copy into words.
fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect()
}

pub fn mesh_vertex_shader() -> &'static [u32] {
    MESH_VERT.get_or_init(|| words(MESH_VERT_BYTES))
}

pub fn mesh_fragment_shader() -> &'static [u32] {
    MESH_FRAG.get_or_init(|| words(MESH_FRAG_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn embedded_modules_are_spirv() {
        for module in [mesh_vertex_shader(), mesh_fragment_shader()] {
            assert_eq!(module[0], SPIRV_MAGIC);
            assert!(module.len() > 5, "module has no body");
        }
    }

    #[test]
    fn embedded_bytes_are_whole_words() {
        assert_eq!(MESH_VERT_BYTES.len() % 4, 0);
        assert_eq!(MESH_FRAG_BYTES.len() % 4, 0);
        assert_eq!(mesh_vertex_shader().len() * 4, MESH_VERT_BYTES.len());
    }
}
