//! Graphics pipelines for dynamic rendering.

use crate::deferred::ReleaseToken;
use crate::error::{GpuError, Result};
use crate::shader::create_shader_module;
use ash::vk;

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Everything needed to build a mesh-style graphics pipeline. Viewport and
/// scissor are always dynamic.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    /// `None` disables the depth test.
    pub depth_compare: Option<vk::CompareOp>,
    pub depth_write: bool,
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
    pub samples: vk::SampleCountFlags,
    /// Minimum fraction of samples shaded per fragment; `None` disables
    /// sample-rate shading.
    pub min_sample_shading: Option<f32>,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_compare: Some(vk::CompareOp::LESS),
            depth_write: true,
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: Some(vk::Format::D32_SFLOAT),
            samples: vk::SampleCountFlags::TYPE_1,
            min_sample_shading: None,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Sample shading only makes sense with more than one sample.
    pub fn sample_shading(&self) -> Option<f32> {
        self.min_sample_shading
            .filter(|_| self.samples != vk::SampleCountFlags::TYPE_1)
            .map(|min| min.clamp(0.0, 1.0))
    }

    fn rasterization(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(1.0)
    }

    fn multisample(&self) -> vk::PipelineMultisampleStateCreateInfo<'static> {
        let state = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(self.samples);
        match self.sample_shading() {
            Some(min) => state.sample_shading_enable(true).min_sample_shading(min),
            None => state,
        }
    }

    fn depth_stencil(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        let state = vk::PipelineDepthStencilStateCreateInfo::default();
        match (self.depth_format, self.depth_compare) {
            (Some(_), Some(op)) => state
                .depth_test_enable(true)
                .depth_write_enable(self.depth_write)
                .depth_compare_op(op),
            _ => state,
        }
    }
}

/// Vertex + fragment modules, only alive while a pipeline is being built.
struct StageModules {
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
}

impl StageModules {
    unsafe fn new(device: &ash::Device, config: &GraphicsPipelineConfig) -> Result<Self> {
        let vertex = create_shader_module(device, &config.vertex_shader)?;
        match create_shader_module(device, &config.fragment_shader) {
            Ok(fragment) => Ok(Self { vertex, fragment }),
            Err(e) => {
                device.destroy_shader_module(vertex, None);
                Err(e)
            }
        }
    }

    fn stages(&self) -> [vk::PipelineShaderStageCreateInfo<'static>; 2] {
        [
            (vk::ShaderStageFlags::VERTEX, self.vertex),
            (vk::ShaderStageFlags::FRAGMENT, self.fragment),
        ]
        .map(|(stage, module)| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(stage)
                .module(module)
                .name(ENTRY_POINT)
        })
    }

    unsafe fn destroy(self, device: &ash::Device) {
        device.destroy_shader_module(self.vertex, None);
        device.destroy_shader_module(self.fragment, None);
    }
}

/// A pipeline and the layout it was built against.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Build a pipeline that renders into `config.color_format` (plus depth,
    /// if set) with `vkCmdBeginRendering`.
    ///
    /// # Safety
    /// `device` must be valid and the shader words valid SPIR-V.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        set_layouts: &[vk::DescriptorSetLayout],
        push_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_ranges);
        let layout = device
            .create_pipeline_layout(&layout_info, None)
            .map_err(|e| GpuError::PipelineCreation(format!("layout: {e}")))?;

        let modules = match StageModules::new(device, config) {
            Ok(modules) => modules,
            Err(e) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(e);
            }
        };
        let pipeline = Self::create(device, config, &modules, layout);
        modules.destroy(device);

        match pipeline {
            Ok(pipeline) => Ok(Self { pipeline, layout }),
            Err(e) => {
                device.destroy_pipeline_layout(layout, None);
                Err(e)
            }
        }
    }

    unsafe fn create(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        modules: &StageModules,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline> {
        let stages = modules.stages();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = config.rasterization();
        let multisample = config.multisample();
        let depth_stencil = config.depth_stencil();

        let blend = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend);

        let dynamic = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic);

        let color_formats = [config.color_format];
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(config.depth_format.unwrap_or(vk::Format::UNDEFINED));

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut rendering)
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout);

        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::PipelineCreation("driver returned no pipeline".to_string()))
    }

    /// Release tokens in creation order, for a deletion queue.
    pub fn into_release_tokens(self) -> [ReleaseToken; 2] {
        [
            ReleaseToken::PipelineLayout(self.layout),
            ReleaseToken::Pipeline(self.pipeline),
        ]
    }

    /// # Safety
    /// No submitted command buffer may still reference the pipeline.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_shading_requires_multisampling() {
        let mut config = GraphicsPipelineConfig {
            min_sample_shading: Some(0.2),
            ..Default::default()
        };
        assert_eq!(config.sample_shading(), None);

        config.samples = vk::SampleCountFlags::TYPE_4;
        assert_eq!(config.sample_shading(), Some(0.2));

        config.min_sample_shading = Some(3.0);
        assert_eq!(config.sample_shading(), Some(1.0));

        config.min_sample_shading = None;
        assert_eq!(config.sample_shading(), None);
    }

    #[test]
    fn multisample_state_follows_config() {
        let config = GraphicsPipelineConfig {
            samples: vk::SampleCountFlags::TYPE_8,
            min_sample_shading: Some(0.25),
            ..Default::default()
        };
        let state = config.multisample();

        assert_eq!(state.rasterization_samples, vk::SampleCountFlags::TYPE_8);
        assert_eq!(state.sample_shading_enable, vk::TRUE);
        assert!((state.min_sample_shading - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn depth_test_needs_a_depth_format() {
        let with_depth = GraphicsPipelineConfig::default().depth_stencil();
        assert_eq!(with_depth.depth_test_enable, vk::TRUE);
        assert_eq!(with_depth.depth_compare_op, vk::CompareOp::LESS);

        let without = GraphicsPipelineConfig {
            depth_format: None,
            ..Default::default()
        }
        .depth_stencil();
        assert_eq!(without.depth_test_enable, vk::FALSE);
        assert_eq!(without.depth_write_enable, vk::FALSE);
    }
}
