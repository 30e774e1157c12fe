//! The renderer facade applications drive.

use crate::backend::{FrameResources, VulkanBackend, MESH_PIPELINE};
use crate::camera::{Camera, FrameUniforms};
use crate::config::RendererConfig;
use crate::draw::{MaterialId, MeshId, RenderObject, TextureId};
use crate::error::{RenderError, Result};
use crate::frame::{FrameScheduler, FrameStats, FrameStatus};
use crate::mesh::upload_mesh_buffers;
use crate::resources::{Material, SceneResources};
use ash::vk;
use prism_core::{MeshData, PixelBuffer};
use prism_gpu::descriptors::{write_combined_image_sampler, DescriptorPool, DescriptorSetLayoutBuilder};
use prism_gpu::shader::load_spirv_file;
use prism_gpu::surface::FramebufferSize;
use prism_gpu::texture::upload_texture;
use prism_gpu::{DeviceContext, GpuError, ReleaseToken, VulkanTransfer};

/// Owns the device context and every resource created through it.
///
/// Resources are destroyed in reverse creation order by [`Renderer::destroy`],
/// which `Drop` calls if the application did not.
pub struct Renderer {
    frame: FrameResources,
    scene: SceneResources,
    scheduler: FrameScheduler,
    objects: Vec<RenderObject>,
    uniforms: FrameUniforms,
    config: RendererConfig,
    destroyed: bool,
    // Dropped last.
    context: DeviceContext,
}

impl Renderer {
    /// Build the frame loop on an existing device context.
    ///
    /// `extent` is the window's framebuffer size and must be non-zero.
    pub fn new(context: DeviceContext, config: RendererConfig, extent: vk::Extent2D) -> Result<Self> {
        config.validate()?;
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::InvalidConfig(
                "Initial framebuffer size must be non-zero".to_string(),
            ));
        }

        let (vertex_shader, fragment_shader) = match config.shader_override() {
            Some((vertex, fragment)) => {
                tracing::info!("Loading mesh shaders from {}", vertex.display());
                (load_spirv_file(&vertex)?, load_spirv_file(&fragment)?)
            }
            None => (
                prism_shaders::mesh_vertex_shader().to_vec(),
                prism_shaders::mesh_fragment_shader().to_vec(),
            ),
        };

        let scheduler = FrameScheduler::new(
            config.frames_in_flight,
            config.fence_timeout_ns(),
            config.resize_poll_interval,
        )?;

        let mut frame = FrameResources::new(&context, &config, extent, vertex_shader, fragment_shader)?;

        let material_sizes = DescriptorSetLayoutBuilder::new()
            .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .pool_sizes(config.max_materials);
        let material_pool =
            match unsafe { DescriptorPool::new(context.device(), config.max_materials, &material_sizes) } {
                Ok(pool) => pool,
                Err(e) => {
                    unsafe { frame.destroy(&context)? };
                    return Err(e.into());
                }
            };
        let scene = SceneResources::new(material_pool, config.max_materials);

        tracing::info!(
            "Renderer ready on {}: {} frames in flight, vsync {}",
            context.adapter().name,
            config.frames_in_flight,
            config.vsync
        );

        Ok(Self {
            frame,
            scene,
            scheduler,
            objects: Vec::new(),
            uniforms: FrameUniforms::default(),
            config,
            destroyed: false,
            context,
        })
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed {
            return Err(RenderError::Destroyed);
        }
        Ok(())
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneResources {
        &self.scene
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> FrameStats {
        self.scheduler.stats()
    }

    /// Current presentation chain extent.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.frame.extent()
    }

    /// Upload a mesh into device-local memory. Blocks until the copy is done.
    pub fn upload_mesh(&mut self, mesh: &MeshData, name: &str) -> Result<MeshId> {
        self.ensure_alive()?;
        mesh.validate()?;

        let mut transfer = VulkanTransfer::new(&self.context)?;
        let buffers = upload_mesh_buffers(&mut transfer, mesh, name)?;

        let id = MeshId(self.scene.next_id());
        tracing::debug!(
            "Uploaded mesh '{name}' as {id:?}: {} vertices, {} indices",
            buffers.vertex_count,
            buffers.index_count
        );
        self.scene.meshes.insert(id, buffers);
        Ok(id)
    }

    /// Upload pixels as a mipmapped texture. Blocks until the upload is done.
    pub fn upload_texture(&mut self, pixels: &PixelBuffer, name: &str) -> Result<TextureId> {
        self.ensure_alive()?;

        let mut transfer = VulkanTransfer::new(&self.context)?;
        let texture = upload_texture(&self.context, &mut transfer, pixels, name)?;

        let id = TextureId(self.scene.next_id());
        tracing::debug!(
            "Uploaded texture '{name}' as {id:?}: {}x{}, {} mip levels",
            pixels.width,
            pixels.height,
            texture.mip_levels()
        );
        self.scene.textures.insert(id, texture);
        Ok(id)
    }

    /// Bind a texture for sampling through the mesh pipeline.
    pub fn create_material(&mut self, texture: TextureId) -> Result<MaterialId> {
        self.ensure_alive()?;

        let (view, sampler) = self
            .scene
            .texture(texture)
            .map(|t| (t.view, t.sampler))
            .ok_or(RenderError::UnknownTexture(texture))?;

        if self.scene.material_count() >= self.scene.max_materials as usize {
            return Err(GpuError::AllocationFailed(format!(
                "Material pool exhausted ({} materials)",
                self.scene.max_materials
            ))
            .into());
        }

        let device = self.context.device();
        let set = unsafe {
            let sets = self
                .scene
                .material_pool
                .allocate(device, &[self.frame.material_layout])?;
            write_combined_image_sampler(device, sets[0], 0, view, sampler);
            sets[0]
        };

        let id = MaterialId(self.scene.next_id());
        self.scene.materials.insert(
            id,
            Material {
                pipeline: MESH_PIPELINE,
                texture,
                set,
            },
        );
        Ok(id)
    }

    /// Drop a mesh. Its buffers are released once the GPU is done with them.
    pub fn remove_mesh(&mut self, id: MeshId) -> Result<()> {
        self.ensure_alive()?;
        let mesh = self.scene.meshes.remove(&id).ok_or(RenderError::UnknownMesh(id))?;
        self.objects.retain(|object| object.mesh != id);
        for token in mesh.into_release_tokens() {
            self.defer_release(token);
        }
        Ok(())
    }

    /// Replace the list of objects drawn from the next frame on.
    ///
    /// Objects referring to meshes that do not exist are dropped.
    pub fn submit_render_objects(&mut self, objects: impl IntoIterator<Item = RenderObject>) {
        self.objects.clear();
        let mut dropped = 0;
        for object in objects {
            if self.scene.meshes.contains_key(&object.mesh) {
                self.objects.push(object);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!("Dropped {dropped} render objects with unknown meshes");
        }
    }

    pub fn render_objects(&self) -> &[RenderObject] {
        &self.objects
    }

    /// Camera used for the next frame's uniforms.
    pub fn set_camera(&mut self, camera: &Camera) {
        self.uniforms = camera.uniforms();
    }

    /// Tell the renderer the window changed size. The chain is rebuilt after
    /// the next present; repeated calls before then collapse into one rebuild.
    pub fn notify_resized(&mut self, width: u32, height: u32) {
        self.scheduler.request_resize(width, height);
    }

    /// Draw one frame with the current objects and camera.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn draw_frame<W: FramebufferSize + ?Sized>(&mut self, window: &W) -> Result<FrameStatus> {
        self.ensure_alive()?;

        let mut backend = VulkanBackend {
            context: &self.context,
            frame: &mut self.frame,
            scene: &self.scene,
        };
        Ok(self
            .scheduler
            .draw_frame(&mut backend, window, &self.objects, &self.uniforms)?)
    }

    /// Block until every submitted frame has retired.
    pub fn wait_idle(&mut self) -> Result<()> {
        self.ensure_alive()?;

        let mut backend = VulkanBackend {
            context: &self.context,
            frame: &mut self.frame,
            scene: &self.scene,
        };
        Ok(self.scheduler.wait_idle(&mut backend)?)
    }

    /// Release `token` once every submission made so far has retired.
    pub fn defer_release(&mut self, token: ReleaseToken) {
        let slot = self.scheduler.release_slot();
        match self.frame.slots.get_mut(slot) {
            Some(frame_slot) => frame_slot.deletion.push(token),
            None => tracing::error!("No frame slot {slot} to defer a {} release to", token.kind()),
        }
    }

    /// Tear everything down after waiting for the device to go idle.
    ///
    /// Later calls do nothing; every other method fails afterwards.
    pub fn destroy(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;

        self.context.wait_idle()?;
        unsafe {
            self.scene
                .destroy(self.context.device(), &mut self.context.allocator().lock())?;
            self.frame.destroy(&self.context)?;
        }

        let stats = self.scheduler.stats();
        tracing::info!(
            "Renderer destroyed after {} frames ({} skipped, {} chain rebuilds)",
            stats.frames_presented,
            stats.frames_skipped,
            stats.recreations
        );
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::error!("Renderer teardown failed: {e}");
        }
    }
}
