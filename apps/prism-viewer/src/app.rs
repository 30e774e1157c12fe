//! Viewer application.

use glam::{Mat4, Vec3};
use prism_app::{AppContext, Camera, PrismApp, RenderObject};
use prism_input::FlyCamera;
use prism_render::{MaterialId, MeshId};
use tracing::info;

use crate::args::ViewerArgs;
use crate::assets;

/// Radians per second.
const SPIN_SPEED: f32 = 0.6;
/// Distance between grid copies.
const GRID_SPACING: f32 = 2.5;

pub struct Viewer {
    camera: FlyCamera,
    mesh: MeshId,
    material: MaterialId,
    index_count: u32,
    grid: u32,
    spin: f32,
}

impl PrismApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let args = ViewerArgs::from_args();

        let mesh_data = assets::mesh_or_default(args.model.as_deref())?;
        let pixels = assets::texture_or_default(args.texture.as_deref())?;
        let index_count = mesh_data.index_count();

        let mesh = ctx.renderer.upload_mesh(&mesh_data, "model")?;
        let texture = ctx.renderer.upload_texture(&pixels, "model-texture")?;
        let material = ctx.renderer.create_material(texture)?;

        info!(
            "Model: {} vertices, {} indices, texture {}x{}",
            mesh_data.vertices.len(),
            index_count,
            pixels.width,
            pixels.height
        );

        let extent = grid_extent(args.grid);
        let camera = FlyCamera::looking_at(Vec3::new(0.0, extent * 0.5 + 1.0, extent + 3.0), Vec3::ZERO);

        Ok(Self {
            camera,
            mesh,
            material,
            index_count,
            grid: args.grid,
            spin: 0.0,
        })
    }

    fn update(&mut self, ctx: &mut AppContext, dt: f32) {
        self.camera.update(&ctx.input, dt);
        self.spin = (self.spin + SPIN_SPEED * dt) % std::f32::consts::TAU;
    }

    fn build_frame(&mut self, ctx: &mut AppContext) -> anyhow::Result<()> {
        let rotation = Mat4::from_rotation_y(self.spin);
        let objects = grid_offsets(self.grid).map(|offset| {
            RenderObject::new(
                self.mesh,
                self.material,
                Mat4::from_translation(offset) * rotation,
                self.index_count,
            )
        });
        ctx.renderer.submit_render_objects(objects);

        let mut camera = Camera::looking_at(
            self.camera.position,
            self.camera.position + self.camera.direction(),
        );
        camera.aspect = ctx.aspect_ratio();
        ctx.renderer.set_camera(&camera);

        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        info!("Viewer shutting down after {} frames", ctx.frame_count);
    }
}

/// Width of an `n` x `n` grid of copies.
#[allow(clippy::cast_precision_loss)]
fn grid_extent(n: u32) -> f32 {
    n.saturating_sub(1) as f32 * GRID_SPACING
}

/// Centres of an `n` x `n` grid on the XZ plane, centred on the origin.
#[allow(clippy::cast_precision_loss)]
fn grid_offsets(n: u32) -> impl Iterator<Item = Vec3> {
    let half = grid_extent(n) * 0.5;
    (0..n).flat_map(move |z| {
        (0..n).map(move |x| Vec3::new(x as f32 * GRID_SPACING - half, 0.0, z as f32 * GRID_SPACING - half))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn single_copy_sits_at_origin() {
        let offsets: Vec<_> = grid_offsets(1).collect();
        assert_eq!(offsets, vec![Vec3::ZERO]);
    }

    #[test]
    fn grid_is_centred() {
        let offsets: Vec<_> = grid_offsets(3).collect();
        assert_eq!(offsets.len(), 9);

        let centre = offsets.iter().copied().sum::<Vec3>() / offsets.len() as f32;
        assert_relative_eq!(centre.x, 0.0);
        assert_relative_eq!(centre.z, 0.0);
        assert_relative_eq!(offsets[0].x, -GRID_SPACING);
    }
}
