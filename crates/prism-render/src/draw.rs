//! Render objects, draw planning and command recording.
//!
//! The scene hands the renderer a fresh list of [`RenderObject`]s every frame.
//! [`plan_draws`] turns that list into a flat sequence of [`DrawCommand`]s,
//! dropping binds that would re-bind what is already bound, and
//! [`record_draw_plan`] emits the plan into a command buffer.

use ash::vk;
use glam::Mat4;
use prism_gpu::{GpuError, Result};

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

resource_id!(
    /// Handle to an uploaded mesh.
    MeshId
);
resource_id!(
    /// Handle to an uploaded texture.
    TextureId
);
resource_id!(
    /// Handle to a material (pipeline plus texture bindings).
    MaterialId
);
resource_id!(
    /// Handle to a graphics pipeline.
    PipelineId
);

/// One thing to draw this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    pub transform: Mat4,
    pub mesh: MeshId,
    pub material: MaterialId,
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
}

impl RenderObject {
    /// Draw the first `index_count` indices of `mesh`.
    pub fn new(mesh: MeshId, material: MaterialId, transform: Mat4, index_count: u32) -> Self {
        Self {
            transform,
            mesh,
            material,
            first_index: 0,
            index_count,
            vertex_offset: 0,
        }
    }
}

/// Push constant block for a draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectPushConstants {
    pub model: [[f32; 4]; 4],
}

impl ObjectPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Range covering the block, visible to the vertex stage.
    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(Self::SIZE)
    }
}

/// A single step of a recorded frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    BindPipeline(PipelineId),
    BindMaterial(MaterialId),
    BindMesh(MeshId),
    Draw {
        transform: Mat4,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    },
}

/// Draw commands for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawPlan {
    pub commands: Vec<DrawCommand>,
    pub draws: usize,
    pub skipped: usize,
}

impl DrawPlan {
    /// Number of bind commands (pipeline, material and mesh).
    pub fn bind_count(&self) -> usize {
        self.commands.len() - self.draws
    }
}

/// Plan a frame's draws in submission order.
///
/// `pipeline_for` maps a material to its pipeline; objects whose material is
/// unknown, or that draw no indices, are skipped.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub fn plan_draws<F>(objects: &[RenderObject], pipeline_for: F) -> DrawPlan
where
    F: Fn(MaterialId) -> Option<PipelineId>,
{
    let mut plan = DrawPlan::default();
    let mut pipeline = None;
    let mut material = None;
    let mut mesh = None;

    for object in objects {
        if object.index_count == 0 {
            plan.skipped += 1;
            continue;
        }
        let Some(object_pipeline) = pipeline_for(object.material) else {
            tracing::warn!("Skipping object with unknown material {:?}", object.material);
            plan.skipped += 1;
            continue;
        };

        if pipeline != Some(object_pipeline) {
            plan.commands.push(DrawCommand::BindPipeline(object_pipeline));
            pipeline = Some(object_pipeline);
            material = None;
        }
        if material != Some(object.material) {
            plan.commands.push(DrawCommand::BindMaterial(object.material));
            material = Some(object.material);
        }
        if mesh != Some(object.mesh) {
            plan.commands.push(DrawCommand::BindMesh(object.mesh));
            mesh = Some(object.mesh);
        }

        plan.commands.push(DrawCommand::Draw {
            transform: object.transform,
            index_count: object.index_count,
            first_index: object.first_index,
            vertex_offset: object.vertex_offset,
        });
        plan.draws += 1;
    }

    plan
}

/// Lookup of the GPU handles a plan refers to.
pub trait DrawResources {
    fn pipeline(&self, id: PipelineId) -> Option<(vk::Pipeline, vk::PipelineLayout)>;
    fn material_set(&self, id: MaterialId) -> Option<vk::DescriptorSet>;
    /// Vertex and index buffers.
    fn mesh_buffers(&self, id: MeshId) -> Option<(vk::Buffer, vk::Buffer)>;
}

/// Emit a plan into a command buffer inside an active rendering pass.
///
/// `frame_set` (per-frame uniforms) is bound at set 0 with every pipeline;
/// materials are bound at set 1.
///
/// # Safety
/// `cmd` must be recording inside a rendering pass compatible with the plan's
/// pipelines, and every handle `resources` returns must be valid.
pub unsafe fn record_draw_plan<R: DrawResources + ?Sized>(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    plan: &DrawPlan,
    resources: &R,
    frame_set: vk::DescriptorSet,
) -> Result<()> {
    let mut layout = vk::PipelineLayout::null();

    for command in &plan.commands {
        match *command {
            DrawCommand::BindPipeline(id) => {
                let (pipeline, pipeline_layout) = resources
                    .pipeline(id)
                    .ok_or_else(|| GpuError::InvalidState(format!("Unknown pipeline {id:?}")))?;
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline_layout,
                    0,
                    &[frame_set],
                    &[],
                );
                layout = pipeline_layout;
            }
            DrawCommand::BindMaterial(id) => {
                let set = resources
                    .material_set(id)
                    .ok_or_else(|| GpuError::InvalidState(format!("Unknown material {id:?}")))?;
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    1,
                    &[set],
                    &[],
                );
            }
            DrawCommand::BindMesh(id) => {
                let (vertex_buffer, index_buffer) = resources
                    .mesh_buffers(id)
                    .ok_or_else(|| GpuError::InvalidState(format!("Unknown mesh {id:?}")))?;
                device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
                device.cmd_bind_index_buffer(cmd, index_buffer, 0, vk::IndexType::UINT32);
            }
            DrawCommand::Draw {
                transform,
                index_count,
                first_index,
                vertex_offset,
            } => {
                let constants = ObjectPushConstants {
                    model: transform.to_cols_array_2d(),
                };
                device.cmd_push_constants(
                    cmd,
                    layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&constants),
                );
                device.cmd_draw_indexed(cmd, index_count, 1, first_index, vertex_offset, 0);
            }
        }
    }

    Ok(())
}
