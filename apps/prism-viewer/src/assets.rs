//! Model and texture loading.

use anyhow::{bail, Context};
use prism_core::{MeshData, PixelBuffer, Vertex};
use std::io::BufRead;
use std::path::Path;

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ignore_points: true,
        ignore_lines: true,
        ..Default::default()
    }
}

/// Load every model in an OBJ file into one mesh.
pub fn load_obj(path: &Path) -> anyhow::Result<MeshData> {
    let (models, _materials) = tobj::load_obj(path, &load_options())
        .with_context(|| format!("Failed to load {}", path.display()))?;
    mesh_from_models(&models)
}

/// Parse OBJ text from a reader. Material libraries are not resolved.
pub fn parse_obj(reader: &mut impl BufRead) -> anyhow::Result<MeshData> {
    let (models, _materials) =
        tobj::load_obj_buf(reader, &load_options(), |_| Ok(Default::default()))
            .context("Failed to parse OBJ")?;
    mesh_from_models(&models)
}

/// Flatten tobj models into a deduplicated mesh. Texture V is flipped to
/// Vulkan's top-left origin; missing colours default to white.
fn mesh_from_models(models: &[tobj::Model]) -> anyhow::Result<MeshData> {
    let mut soup = Vec::new();

    for model in models {
        let mesh = &model.mesh;
        let has_uv = !mesh.texcoords.is_empty();
        let has_color = !mesh.vertex_color.is_empty();

        for &index in &mesh.indices {
            let i = index as usize;
            let position = [
                mesh.positions[3 * i],
                mesh.positions[3 * i + 1],
                mesh.positions[3 * i + 2],
            ];
            let color = if has_color {
                [
                    mesh.vertex_color[3 * i],
                    mesh.vertex_color[3 * i + 1],
                    mesh.vertex_color[3 * i + 2],
                ]
            } else {
                [1.0, 1.0, 1.0]
            };
            let tex_coord = if has_uv {
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            } else {
                [0.0, 0.0]
            };
            soup.push(Vertex::new(position, color, tex_coord));
        }
    }

    if soup.is_empty() {
        bail!("model has no triangles");
    }

    let mesh = MeshData::deduplicated(soup);
    mesh.validate()?;
    tracing::debug!(
        "Loaded {} models: {} vertices, {} indices",
        models.len(),
        mesh.vertices.len(),
        mesh.indices.len()
    );
    Ok(mesh)
}

/// Decode an image file to RGBA8 pixels.
pub fn load_texture(path: &Path) -> anyhow::Result<PixelBuffer> {
    let image = image::open(path).with_context(|| format!("Failed to load {}", path.display()))?;
    pixels_from_image(image)
}

pub fn pixels_from_image(image: image::DynamicImage) -> anyhow::Result<PixelBuffer> {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(PixelBuffer::new(width, height, 4, rgba.into_raw())?)
}

/// Load the model at `path`, or the unit cube when none is given.
pub fn mesh_or_default(path: Option<&Path>) -> anyhow::Result<MeshData> {
    match path {
        Some(path) => load_obj(path),
        None => Ok(MeshData::cube()),
    }
}

/// Load the texture at `path`, or a checkerboard when none is given.
pub fn texture_or_default(path: Option<&Path>) -> anyhow::Result<PixelBuffer> {
    match path {
        Some(path) => load_texture(path),
        None => Ok(PixelBuffer::checkerboard(
            256,
            32,
            [230, 230, 230, 255],
            [40, 40, 48, 255],
        )?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    const QUAD: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn quad_is_triangulated_and_shared() {
        let mesh = parse_obj(&mut Cursor::new(QUAD)).unwrap();

        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn tex_coords_are_flipped() {
        let mesh = parse_obj(&mut Cursor::new(QUAD)).unwrap();
        let origin = mesh
            .vertices
            .iter()
            .find(|v| v.position == [0.0, 0.0, 0.0])
            .unwrap();

        assert_relative_eq!(origin.tex_coord[1], 1.0);
        assert_eq!(origin.color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn empty_obj_is_rejected() {
        assert!(parse_obj(&mut Cursor::new("# nothing here\n")).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_obj(Path::new("does/not/exist.obj")).unwrap_err();
        assert!(format!("{err:#}").contains("exist.obj"));
    }

    #[test]
    fn image_becomes_rgba8() {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            3,
            2,
            image::Rgb([10, 20, 30]),
        ));
        let pixels = pixels_from_image(image).unwrap();

        assert_eq!((pixels.width, pixels.height, pixels.channels), (3, 2, 4));
        assert_eq!(&pixels.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn defaults_without_paths() {
        assert_eq!(mesh_or_default(None).unwrap(), MeshData::cube());
        let texture = texture_or_default(None).unwrap();
        assert_eq!((texture.width, texture.height), (256, 256));
    }
}
