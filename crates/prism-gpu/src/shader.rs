//! SPIR-V loading and shader modules.

use crate::error::{GpuError, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode a SPIR-V binary into words.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() < 4 || bytes.len() % 4 != 0 {
        return Err(GpuError::ShaderCompilation(format!(
            "SPIR-V length {} is not a non-zero multiple of 4",
            bytes.len()
        )));
    }

    // read_spv also accepts byte-swapped modules
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| GpuError::ShaderCompilation(e.to_string()))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(GpuError::ShaderCompilation(format!(
            "Bad SPIR-V magic {other:#010x}"
        ))),
        None => Err(GpuError::ShaderCompilation("Empty SPIR-V module".to_string())),
    }
}

/// Read a compiled shader from disk.
pub fn load_spirv_file(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| GpuError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let words = spirv_from_bytes(&bytes)
        .map_err(|e| GpuError::ShaderCompilation(format!("{}: {e}", path.display())))?;
    tracing::debug!("Loaded shader {} ({} words)", path.display(), words.len());
    Ok(words)
}

/// Create a shader module.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&create_info, None)
        .map_err(|e| GpuError::ShaderCompilation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_spirv_header() {
        let bytes = module_bytes(&[SPIRV_MAGIC, 0x0001_0300, 0, 8, 0]);
        let words = spirv_from_bytes(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn rejects_wrong_magic() {
        let bytes = module_bytes(&[0xdead_beef, 0]);
        assert!(matches!(
            spirv_from_bytes(&bytes),
            Err(GpuError::ShaderCompilation(_))
        ));
    }

    #[test]
    fn rejects_truncated_binary() {
        assert!(spirv_from_bytes(&[0x03, 0x02, 0x23]).is_err());
        assert!(spirv_from_bytes(&[]).is_err());
    }

    #[test]
    fn missing_file_is_load_error() {
        let err = load_spirv_file(Path::new("does/not/exist.spv")).unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad { .. }));
    }
}
