use std::ffi::CStr;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::shader::ShaderModule;
use crate::renderer::resources::vertex::VertexInputDescription;

const ENTRY_POINT: &CStr = c"main";

pub struct PipelineLayout {
    pub layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl PipelineLayout {
    pub fn new(
        dev: &RenderDevice,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants: Option<vk::PushConstantRange>,
    ) -> Result<Self> {
        let ranges = push_constants.as_slice();
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(ranges);
        let layout = unsafe { dev.logical.create_pipeline_layout(&info, None)? };

        Ok(Self {
            layout,
            device: dev.logical.clone(),
        })
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Disabled,
    /// Render transparent objects after the opaque ones
    Alpha,
    Additive,
}

impl BlendMode {
    pub fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            Self::Disabled => state.blend_enable(false),
            Self::Alpha => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
            Self::Additive => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ONE)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// Subpasses with several color outputs need one blend state per output.
pub fn color_blend_states(
    color_attachment_count: u32,
    blend: BlendMode,
) -> Vec<vk::PipelineColorBlendAttachmentState> {
    vec![blend.attachment_state(); color_attachment_count as usize]
}

pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl GraphicsPipeline {
    pub fn bind(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    pub fn push_constants(
        &self,
        cmd: vk::CommandBuffer,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(cmd, self.layout, stages, 0, data);
        }
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// Builds a pipeline for one subpass of a render pass. Viewport and scissor are
/// always dynamic.
pub struct GraphicsPipelineBuilder<'a> {
    device: Arc<ash::Device>,
    render_pass: vk::RenderPass,
    subpass: u32,
    color_attachment_count: u32,
    vertex_input: VertexInputDescription,
    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth_compare: Option<vk::CompareOp>,
    depth_write: bool,
    depth_bias: Option<(f32, f32)>,
    blend: BlendMode,
    stages: Vec<&'a ShaderModule>,
    layout: Option<vk::PipelineLayout>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new(dev: &RenderDevice, render_pass: vk::RenderPass, subpass: u32) -> Self {
        Self {
            device: dev.logical.clone(),
            render_pass,
            subpass,
            color_attachment_count: 1,
            vertex_input: VertexInputDescription::default(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_compare: Some(vk::CompareOp::LESS_OR_EQUAL),
            depth_write: true,
            depth_bias: None,
            blend: BlendMode::Disabled,
            stages: Vec::new(),
            layout: None,
        }
    }

    pub fn with_shader(mut self, module: &'a ShaderModule) -> Self {
        self.stages.push(module);
        self
    }

    pub fn with_pipeline_layout(mut self, layout: &PipelineLayout) -> Self {
        self.layout = Some(layout.layout);
        self
    }

    /// Must match the subpass's color reference count
    pub fn with_color_attachment_count(mut self, count: u32) -> Self {
        self.color_attachment_count = count;
        self
    }

    pub fn with_vertex_input(mut self, description: VertexInputDescription) -> Self {
        self.vertex_input = description;
        self
    }

    pub fn with_input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags, front_face: vk::FrontFace) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    /// `None` disables both the test and writes
    pub fn with_depth_test(mut self, compare: Option<vk::CompareOp>, write: bool) -> Self {
        self.depth_compare = compare;
        self.depth_write = compare.is_some() && write;
        self
    }

    pub fn with_depth_bias(mut self, constant: f32, slope: f32) -> Self {
        self.depth_bias = Some((constant, slope));
        self
    }

    pub fn with_blending(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn build(self) -> Result<GraphicsPipeline> {
        if self.stages.is_empty() {
            return Err(eyre!("No shader provided for GraphicsPipelineBuilder"));
        }
        let layout = self
            .layout
            .ok_or_eyre("No pipeline layout provided for GraphicsPipelineBuilder")?;

        let stages = self
            .stages
            .iter()
            .map(|module| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(module.stage.vk_stage())
                    .module(module.module)
                    .name(ENTRY_POINT)
            })
            .collect::<Vec<_>>();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_input.bindings)
            .vertex_attribute_descriptions(&self.vertex_input.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let (bias_constant, bias_slope) = self.depth_bias.unwrap_or((0.0, 0.0));
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(self.depth_bias.is_some())
            .depth_bias_constant_factor(bias_constant)
            .depth_bias_slope_factor(bias_slope);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_compare.is_some())
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare.unwrap_or(vk::CompareOp::ALWAYS))
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let blend_states = color_blend_states(self.color_attachment_count, self.blend);
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_states);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_info)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| eyre!("Failed to create graphics pipeline: {}", err))?
        };
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_eyre("Driver returned no pipeline")?;

        Ok(GraphicsPipeline {
            pipeline,
            layout,
            device: self.device,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_blend_state_per_color_attachment() {
        let states = color_blend_states(4, BlendMode::Disabled);
        assert_eq!(states.len(), 4);
        assert!(states.iter().all(|s| s.blend_enable == vk::FALSE));
        assert!(states.iter().all(|s| s.color_write_mask == vk::ColorComponentFlags::RGBA));

        assert!(color_blend_states(0, BlendMode::Alpha).is_empty());
    }

    #[test]
    fn test_blend_mode_factors() {
        let alpha = BlendMode::Alpha.attachment_state();
        assert_eq!(alpha.blend_enable, vk::TRUE);
        assert_eq!(alpha.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(alpha.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);

        let additive = BlendMode::Additive.attachment_state();
        assert_eq!(additive.src_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(additive.dst_color_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(additive.color_blend_op, vk::BlendOp::ADD);
    }
}
