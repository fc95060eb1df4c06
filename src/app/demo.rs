use ash::vk;
use bytemuck::{Pod, Zeroable};
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use glam::{Mat4, Vec4};
use gpu_allocator::MemoryLocation;
use strata::renderer::resources::buffer::Buffer;
use strata::renderer::resources::descriptors::{BindingDesc, DescriptorSetLayout, DescriptorWriter};
use strata::renderer::resources::mesh::{GpuMesh, Mesh};
use strata::renderer::resources::pipeline::{GraphicsPipeline, GraphicsPipelineBuilder, PipelineLayout};
use strata::renderer::resources::shader::{GlslCompiler, ShaderModule, ShaderStage};
use strata::renderer::resources::vertex::Vertex;
use strata::renderer::scene::{push_constant_range, record_draws, MeshBuffers, Renderable};
use strata::{FrameContext, Renderer};

const VERTEX_SHADER: &str = r#"
#version 450

layout(set = 0, binding = 0) uniform Globals {
    mat4 projection;
    mat4 view;
    mat4 inverse_view;
    vec4 ambient_light;
} globals;

layout(push_constant) uniform Push {
    mat4 model;
    mat4 normal;
} push;

layout(location = 0) in vec3 in_position;
layout(location = 1) in vec3 in_color;
layout(location = 2) in vec3 in_normal;
layout(location = 3) in vec2 in_uv;

layout(location = 0) out vec3 out_color;
layout(location = 1) out vec3 out_normal;

void main() {
    gl_Position = globals.projection * globals.view * push.model * vec4(in_position, 1.0);
    out_color = in_color;
    out_normal = mat3(push.normal) * in_normal;
}
"#;

const FRAGMENT_SHADER: &str = r#"
#version 450

layout(set = 0, binding = 0) uniform Globals {
    mat4 projection;
    mat4 view;
    mat4 inverse_view;
    vec4 ambient_light;
} globals;

layout(set = 1, binding = 0) uniform Material {
    vec4 tint;
} material;

layout(location = 0) in vec3 in_color;
layout(location = 1) in vec3 in_normal;

layout(location = 0) out vec4 out_color;

void main() {
    vec3 light_dir = normalize(vec3(0.3, 1.0, 0.5));
    float diffuse = abs(dot(normalize(in_normal), light_dir));
    vec3 ambient = globals.ambient_light.rgb * globals.ambient_light.w;
    out_color = vec4(in_color * material.tint.rgb * (diffuse + ambient), material.tint.a);
}
"#;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct MaterialUniforms {
    tint: Vec4,
}

/// A spinning triangle drawn into the swapchain pass
pub struct DemoScene {
    // Field order is drop order
    pipeline: GraphicsPipeline,
    _pipeline_layout: PipelineLayout,
    _material_layout: DescriptorSetLayout,
    _material_buffer: Buffer,
    material_set: vk::DescriptorSet,
    mesh: GpuMesh,
    rotation: f32,
}

impl DemoScene {
    pub fn new(renderer: &mut Renderer) -> Result<Self> {
        let render_pass = renderer.swapchain_render_pass()?;
        let (dev, res) = renderer.device_and_resources();

        let compiler = GlslCompiler;
        let vertex_code = compiler.compile_source(VERTEX_SHADER, ShaderStage::Vertex)?;
        let fragment_code = compiler.compile_source(FRAGMENT_SHADER, ShaderStage::Fragment)?;
        let vertex_shader = ShaderModule::new(dev, &vertex_code, ShaderStage::Vertex)?;
        let fragment_shader = ShaderModule::new(dev, &fragment_code, ShaderStage::Fragment)?;

        let material_layout = DescriptorSetLayout::new(dev, &[BindingDesc::uniform_buffer(
            0,
            vk::ShaderStageFlags::FRAGMENT,
        )])?;
        let mut material_buffer = Buffer::new(
            size_of::<MaterialUniforms>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "Demo material",
            MemoryLocation::CpuToGpu,
            dev,
        )?;
        material_buffer.write(&[MaterialUniforms { tint: Vec4::ONE }], 0)?;
        let material_set = DescriptorWriter::new(&material_layout)
            .write_buffer(0, material_buffer.descriptor_info())
            .build(res.pool())?
            .ok_or_eyre("Descriptor pool too small for the demo material")?;

        let pipeline_layout = PipelineLayout::new(
            dev,
            &[res.global_layout().layout, material_layout.layout],
            Some(push_constant_range()),
        )?;
        let pipeline = GraphicsPipelineBuilder::new(dev, render_pass, 0)
            .with_shader(&vertex_shader)
            .with_shader(&fragment_shader)
            .with_pipeline_layout(&pipeline_layout)
            .with_vertex_input(Vertex::input_description())
            .build()?;

        let mesh = GpuMesh::upload(&Mesh::new_triangle(), "Demo triangle", dev)?;

        Ok(Self {
            pipeline,
            _pipeline_layout: pipeline_layout,
            _material_layout: material_layout,
            _material_buffer: material_buffer,
            material_set,
            mesh,
            rotation: 0.0,
        })
    }

    pub fn update(&mut self, delta_time_secs: f32) {
        self.rotation = (self.rotation + delta_time_secs) % std::f32::consts::TAU;
    }

    pub fn record(&self, renderer: &Renderer, frame: &FrameContext) {
        // Viewport and scissor were set when the swapchain pass began
        let device = &renderer.device().logical;
        let renderables: [&dyn Renderable; 1] = [self];
        record_draws(device, frame.command_buffer, &self.pipeline, frame.global_set, renderables);
    }
}

impl Renderable for DemoScene {
    fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_y(self.rotation)
    }

    fn material_set(&self) -> vk::DescriptorSet {
        self.material_set
    }

    fn mesh(&self) -> MeshBuffers {
        MeshBuffers::from(&self.mesh)
    }
}
