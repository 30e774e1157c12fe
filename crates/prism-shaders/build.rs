//! Compiles the GLSL under `shaders/` to SPIR-V in `OUT_DIR`.

use shaderc::{CompileOptions, Compiler, EnvVersion, OptimizationLevel, ShaderKind, TargetEnv};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::{env, fs};

const SHADERS: &[(&str, ShaderKind)] = &[
    ("mesh.vert", ShaderKind::Vertex),
    ("mesh.frag", ShaderKind::Fragment),
];

fn main() -> Result<(), Box<dyn Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    println!("cargo:rerun-if-changed=shaders");

    let compiler = Compiler::new().ok_or("shaderc compiler unavailable")?;
    let mut options = CompileOptions::new().ok_or("shaderc options unavailable")?;
    options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_3 as u32);
    options.set_optimization_level(OptimizationLevel::Performance);

    for &(name, kind) in SHADERS {
        let input = Path::new("shaders").join(name);
        let output = out_dir.join(format!("{name}.spv"));
        compile(&compiler, &options, &input, &output, kind)?;
    }
    Ok(())
}

fn compile(
    compiler: &Compiler,
    options: &CompileOptions,
    input: &Path,
    output: &Path,
    kind: ShaderKind,
) -> Result<(), Box<dyn Error>> {
    let source = fs::read_to_string(input).map_err(|e| format!("{}: {e}", input.display()))?;
    let name = input.display().to_string();

    let artifact = compiler
        .compile_into_spirv(&source, kind, &name, "main", Some(options))
        .map_err(|e| format!("{name}: {e}"))?;
    if artifact.get_num_warnings() > 0 {
        println!("cargo:warning={name}: {}", artifact.get_warning_messages());
    }

    fs::write(output, bytemuck::cast_slice::<u32, u8>(artifact.as_binary()))
        .map_err(|e| format!("{}: {e}", output.display()))?;
    Ok(())
}
