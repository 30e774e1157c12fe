//! Vulkan implementation of the frame sequence.
//!
//! [`FrameResources`] owns everything the frame loop touches: the frame slots,
//! the presentation chain, the render targets sized to it and the mesh
//! pipeline. [`VulkanBackend`] borrows it together with the device and the
//! scene for the duration of one frame and implements [`FrameBackend`].

use crate::camera::FrameUniforms;
use crate::config::RendererConfig;
use crate::draw::{
    plan_draws, record_draw_plan, DrawResources, MaterialId, MeshId, ObjectPushConstants,
    PipelineId, RenderObject,
};
use crate::frame::{ChainRebuild, FrameBackend};
use crate::mesh::{vertex_attributes, vertex_bindings};
use crate::resources::SceneResources;
use crate::targets::{
    chain_image_barrier, depth_target_barrier, msaa_color_barrier, present_barrier, RenderTargets,
};
use ash::vk;
use gpu_allocator::MemoryLocation;
use prism_gpu::command::{begin_command_buffer, end_command_buffer, submit_frame, CommandPool};
use prism_gpu::descriptors::{write_uniform_buffer, DescriptorPool, DescriptorSetLayoutBuilder};
use prism_gpu::swapchain::{AcquireOutcome, ChainSettings, PresentOutcome, PresentationChain};
use prism_gpu::sync::{reset_fence, wait_for_fence, SlotSync};
use prism_gpu::{
    DeletionQueue, DeviceContext, GpuBuffer, GpuError, GraphicsPipeline, GraphicsPipelineConfig,
    Result,
};

/// The only pipeline the renderer builds; every material uses it.
pub const MESH_PIPELINE: PipelineId = PipelineId(0);

/// Minimum fraction of samples shaded per fragment when multisampling.
const MIN_SAMPLE_SHADING: f32 = 0.2;

/// Resources owned by one frame slot.
pub struct FrameSlot {
    pub sync: SlotSync,
    pub pool: CommandPool,
    pub cmd: vk::CommandBuffer,
    pub uniforms: GpuBuffer,
    /// Set 0: the slot's uniform buffer.
    pub frame_set: vk::DescriptorSet,
    pub deletion: DeletionQueue,
}

impl FrameSlot {
    unsafe fn new(
        context: &DeviceContext,
        frame_pool: &DescriptorPool,
        frame_layout: vk::DescriptorSetLayout,
        index: usize,
    ) -> Result<Self> {
        let device = context.device();

        let sync = SlotSync::new(device)?;
        let pool = match CommandPool::new(
            device,
            context.queue_families().graphics,
            vk::CommandPoolCreateFlags::empty(),
        ) {
            Ok(pool) => pool,
            Err(e) => {
                sync.destroy(device);
                return Err(e);
            }
        };

        let uniforms = pool.allocate_primary(device).and_then(|cmd| {
            let uniforms = context.allocator().lock().create_buffer(
                std::mem::size_of::<FrameUniforms>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                &format!("frame {index} uniforms"),
            )?;
            Ok((cmd, uniforms))
        });
        let (cmd, mut uniforms) = match uniforms {
            Ok(parts) => parts,
            Err(e) => {
                pool.destroy(device);
                sync.destroy(device);
                return Err(e);
            }
        };

        let frame_set = match frame_pool.allocate(device, &[frame_layout]) {
            Ok(sets) => sets[0],
            Err(e) => {
                context.allocator().lock().free_buffer(&mut uniforms)?;
                pool.destroy(device);
                sync.destroy(device);
                return Err(e);
            }
        };
        write_uniform_buffer(device, frame_set, 0, uniforms.buffer, uniforms.size);

        Ok(Self {
            sync,
            pool,
            cmd,
            uniforms,
            frame_set,
            deletion: DeletionQueue::new(),
        })
    }

    /// # Safety
    /// The slot's submission must have retired.
    unsafe fn destroy(&mut self, context: &DeviceContext) -> Result<()> {
        let device = context.device();
        let mut allocator = context.allocator().lock();
        self.deletion.flush(device, &mut allocator)?;
        allocator.free_buffer(&mut self.uniforms)?;
        self.pool.destroy(device);
        self.sync.destroy(device);
        Ok(())
    }
}

/// Frame-loop state that lives as long as the renderer.
pub struct FrameResources {
    pub(crate) slots: Vec<FrameSlot>,
    pub(crate) chain: Option<PresentationChain>,
    pub(crate) targets: Option<RenderTargets>,
    pub(crate) frame_layout: vk::DescriptorSetLayout,
    pub(crate) material_layout: vk::DescriptorSetLayout,
    frame_pool: Option<DescriptorPool>,
    pub(crate) pipeline: GraphicsPipeline,
    pipeline_config: GraphicsPipelineConfig,
    depth_format: vk::Format,
    clear_color: [f32; 4],
    vsync: bool,
}

impl FrameResources {
    /// Create slots, chain, targets and the mesh pipeline.
    pub fn new(
        context: &DeviceContext,
        config: &RendererConfig,
        extent: vk::Extent2D,
        vertex_shader: Vec<u32>,
        fragment_shader: Vec<u32>,
    ) -> Result<Self> {
        let depth_format = context.find_depth_format()?;
        let samples = context.msaa_samples();

        let pipeline_config = GraphicsPipelineConfig {
            vertex_shader,
            fragment_shader,
            vertex_bindings: vertex_bindings().to_vec(),
            vertex_attributes: vertex_attributes().to_vec(),
            depth_format: Some(depth_format),
            samples,
            min_sample_shading: Some(MIN_SAMPLE_SHADING),
            ..Default::default()
        };

        // Every handle starts null so a failed init can be unwound by `destroy`.
        let mut resources = Self {
            slots: Vec::with_capacity(config.frames_in_flight),
            chain: None,
            targets: None,
            frame_layout: vk::DescriptorSetLayout::null(),
            material_layout: vk::DescriptorSetLayout::null(),
            frame_pool: None,
            pipeline: GraphicsPipeline {
                pipeline: vk::Pipeline::null(),
                layout: vk::PipelineLayout::null(),
            },
            pipeline_config,
            depth_format,
            clear_color: config.clear_color,
            vsync: config.vsync,
        };

        match resources.init(context, config.frames_in_flight, extent) {
            Ok(()) => Ok(resources),
            Err(e) => {
                unsafe { resources.destroy(context)? };
                Err(e)
            }
        }
    }

    fn init(&mut self, context: &DeviceContext, slot_count: usize, extent: vk::Extent2D) -> Result<()> {
        let device = context.device();

        let frame_layout = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
        self.frame_layout = unsafe { frame_layout.build(device)? };
        self.material_layout = unsafe {
            DescriptorSetLayoutBuilder::new()
                .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
                .build(device)?
        };

        let sets = slot_count as u32;
        let frame_pool = self.frame_pool.insert(unsafe {
            DescriptorPool::new(device, sets, &frame_layout.pool_sizes(sets))?
        });

        for index in 0..slot_count {
            let slot = unsafe { FrameSlot::new(context, frame_pool, self.frame_layout, index)? };
            self.slots.push(slot);
        }

        let format = self.create_chain(context, extent)?.ok_or_else(|| {
            GpuError::SwapchainCreation("Surface has no area at startup".to_string())
        })?;
        self.pipeline_config.color_format = format;
        self.pipeline = self.create_pipeline(device)?;

        tracing::info!(
            "Frame resources ready: {slot_count} slots, {:?} samples",
            self.pipeline_config.samples
        );
        Ok(())
    }

    fn create_pipeline(&self, device: &ash::Device) -> Result<GraphicsPipeline> {
        unsafe {
            GraphicsPipeline::new(
                device,
                &self.pipeline_config,
                &[self.frame_layout, self.material_layout],
                &[ObjectPushConstants::range()],
            )
        }
    }

    /// Build the chain and its targets; returns the chain's colour format, or
    /// `None` without building anything while the surface has no area.
    fn create_chain(&mut self, context: &DeviceContext, extent: vk::Extent2D) -> Result<Option<vk::Format>> {
        let support = context.surface_support()?;
        let settings = ChainSettings::choose(&support, extent, self.vsync)?;
        if !settings.has_area() {
            return Ok(None);
        }

        let chain = unsafe {
            PresentationChain::new(
                context.device(),
                context.swapchain_loader(),
                context.surface().handle,
                &settings,
                &context.queue_families(),
            )?
        };
        let format = chain.format;
        let chain_extent = chain.extent;

        tracing::info!(
            "Presentation chain created: {}x{}, {:?}, {:?}, {} images",
            chain.extent.width,
            chain.extent.height,
            chain.format,
            chain.present_mode,
            chain.image_count()
        );
        self.chain = Some(chain);

        self.targets = Some(RenderTargets::new(
            context,
            chain_extent,
            format,
            self.depth_format,
        )?);
        Ok(Some(format))
    }

    /// Chain and targets, torn down together.
    unsafe fn destroy_chain(&mut self, context: &DeviceContext) -> Result<()> {
        if let Some(mut targets) = self.targets.take() {
            targets.destroy(context.device(), &mut context.allocator().lock())?;
        }
        if let Some(mut chain) = self.chain.take() {
            chain.destroy(context.device(), context.swapchain_loader());
        }
        Ok(())
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Current chain extent, if a chain exists.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.chain.as_ref().map(|chain| chain.extent)
    }

    pub fn color_format(&self) -> vk::Format {
        self.pipeline_config.color_format
    }

    /// Destroy everything. Safe to call on partially built resources.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, context: &DeviceContext) -> Result<()> {
        let device = context.device();

        for mut slot in self.slots.drain(..) {
            slot.destroy(context)?;
        }
        self.destroy_chain(context)?;

        self.pipeline.destroy(device);
        self.pipeline.pipeline = vk::Pipeline::null();
        self.pipeline.layout = vk::PipelineLayout::null();

        if let Some(pool) = self.frame_pool.take() {
            device.destroy_descriptor_pool(pool.handle(), None);
        }
        device.destroy_descriptor_set_layout(self.material_layout, None);
        device.destroy_descriptor_set_layout(self.frame_layout, None);
        self.material_layout = vk::DescriptorSetLayout::null();
        self.frame_layout = vk::DescriptorSetLayout::null();
        Ok(())
    }
}

/// One frame's view of the device, the frame resources and the scene.
pub struct VulkanBackend<'a> {
    pub context: &'a DeviceContext,
    pub frame: &'a mut FrameResources,
    pub scene: &'a SceneResources,
}

impl VulkanBackend<'_> {
    fn slot(&self, slot: usize) -> Result<&FrameSlot> {
        self.frame
            .slots
            .get(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("No frame slot {slot}")))
    }

    fn chain(&self) -> Result<&PresentationChain> {
        self.frame
            .chain
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("No presentation chain".to_string()))
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    unsafe fn record_commands(
        &self,
        cmd: vk::CommandBuffer,
        frame_set: vk::DescriptorSet,
        image_index: u32,
        objects: &[RenderObject],
    ) -> Result<()> {
        let device = self.context.device();
        let chain = self.chain()?;
        let targets = self
            .frame
            .targets
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("No render targets".to_string()))?;
        let index = image_index as usize;
        let (Some(&chain_image), Some(&chain_view)) =
            (chain.images.get(index), chain.image_views.get(index))
        else {
            return Err(GpuError::InvalidState(format!(
                "Image index {image_index} outside a chain of {}",
                chain.image_count()
            )));
        };
        let extent = chain.extent;

        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        // Attachments are cleared every frame, so their previous contents
        // are discarded.
        let mut barriers = vec![
            chain_image_barrier(chain_image),
            depth_target_barrier(targets.depth.image.image, targets.depth_format),
        ];
        if let Some(color) = &targets.color {
            barriers.push(msaa_color_barrier(color.image.image));
        }
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        device.cmd_pipeline_barrier2(cmd, &dependency_info);

        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.frame.clear_color,
            },
        };
        let color_attachment = match &targets.color {
            // Render multisampled, resolve into the chain image.
            Some(color) => vk::RenderingAttachmentInfo::default()
                .image_view(color.view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(chain_view)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(clear),
            None => vk::RenderingAttachmentInfo::default()
                .image_view(chain_view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear),
        };
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(targets.depth.view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let color_attachments = [color_attachment];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        device.cmd_begin_rendering(cmd, &rendering_info);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[render_area]);

        let plan = plan_draws(objects, |material| {
            self.scene.material(material).map(|m| m.pipeline)
        });
        record_draw_plan(device, cmd, &plan, self, frame_set)?;

        device.cmd_end_rendering(cmd);

        let to_present = present_barrier(chain_image);
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(std::slice::from_ref(&to_present));
        device.cmd_pipeline_barrier2(cmd, &dependency_info);

        end_command_buffer(device, cmd)
    }
}

impl FrameBackend for VulkanBackend<'_> {
    fn slot_count(&self) -> usize {
        self.frame.slots.len()
    }

    fn wait_for_slot(&mut self, slot: usize, timeout_ns: u64) -> Result<()> {
        let fence = self.slot(slot)?.sync.in_flight;
        unsafe { wait_for_fence(self.context.device(), fence, slot, timeout_ns) }
    }

    fn release_deferred(&mut self, slot: usize) -> Result<()> {
        let device = self.context.device();
        let frame_slot = self
            .frame
            .slots
            .get_mut(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("No frame slot {slot}")))?;
        if frame_slot.deletion.is_empty() {
            return Ok(());
        }
        unsafe { frame_slot.deletion.flush(device, &mut self.context.allocator().lock()) }
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let semaphore = self.slot(slot)?.sync.acquire_complete;
        let chain = self.chain()?;
        unsafe { chain.acquire_next_image(self.context.swapchain_loader(), semaphore, u64::MAX) }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let device = self.context.device();
        let frame_slot = self.slot(slot)?;
        unsafe {
            reset_fence(device, frame_slot.sync.in_flight)?;
            frame_slot.pool.reset(device)
        }
    }

    fn record(&mut self, slot: usize, image_index: u32, objects: &[RenderObject]) -> Result<()> {
        let frame_slot = self.slot(slot)?;
        let (cmd, frame_set) = (frame_slot.cmd, frame_slot.frame_set);
        unsafe { self.record_commands(cmd, frame_set, image_index, objects) }
    }

    fn update_uniforms(&mut self, slot: usize, uniforms: &FrameUniforms) -> Result<()> {
        self.slot(slot)?.uniforms.write(std::slice::from_ref(uniforms))
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame_slot = self.slot(slot)?;
        unsafe {
            submit_frame(
                self.context.device(),
                self.context.graphics_queue(),
                frame_slot.cmd,
                frame_slot.sync.acquire_complete,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                frame_slot.sync.render_complete,
                frame_slot.sync.in_flight,
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let semaphore = self.slot(slot)?.sync.render_complete;
        let chain = self.chain()?;
        unsafe {
            chain.present(
                self.context.swapchain_loader(),
                self.context.present_queue(),
                image_index,
                semaphore,
            )
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.context.wait_idle()
    }

    fn recreate_chain(&mut self, extent: vk::Extent2D) -> Result<ChainRebuild> {
        let old_format = self.frame.pipeline_config.color_format;

        unsafe { self.frame.destroy_chain(self.context)? };
        let Some(format) = self.frame.create_chain(self.context, extent)? else {
            return Ok(ChainRebuild::SurfaceHidden);
        };

        if format != old_format {
            tracing::info!("Chain format changed from {old_format:?} to {format:?}, rebuilding pipeline");
            let device = self.context.device();
            self.frame.pipeline_config.color_format = format;
            let pipeline = self.frame.create_pipeline(device)?;
            let old = std::mem::replace(&mut self.frame.pipeline, pipeline);
            unsafe { old.destroy(device) };
        }
        Ok(ChainRebuild::Rebuilt)
    }
}

impl DrawResources for VulkanBackend<'_> {
    fn pipeline(&self, id: PipelineId) -> Option<(vk::Pipeline, vk::PipelineLayout)> {
        (id == MESH_PIPELINE).then_some((self.frame.pipeline.pipeline, self.frame.pipeline.layout))
    }

    fn material_set(&self, id: MaterialId) -> Option<vk::DescriptorSet> {
        self.scene.material(id).map(|material| material.set)
    }

    fn mesh_buffers(&self, id: MeshId) -> Option<(vk::Buffer, vk::Buffer)> {
        self.scene.mesh(id).map(|mesh| mesh.handles())
    }
}
