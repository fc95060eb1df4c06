use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::config::{RenderConfig, MAX_FRAMES_IN_FLIGHT};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::descriptors::{
    BindingDesc, DescriptorPool, DescriptorSetLayout, DescriptorWriter,
};
use crate::renderer::shader_data::GlobalUniforms;

/// Responsibilities:
/// - Own the shared descriptor pool every render system allocates from
/// - Own the global set layout and one global uniform buffer + set per frame slot
///
/// Built after the device and dropped before it.
pub struct RenderResourceContext {
    global_sets: Vec<vk::DescriptorSet>,
    global_buffers: Vec<Buffer>,
    global_layout: DescriptorSetLayout,
    pool: DescriptorPool,
}

impl RenderResourceContext {
    pub fn new(dev: &RenderDevice, config: &RenderConfig) -> Result<Self> {
        let mut pool = DescriptorPool::new(
            dev,
            config.descriptor_pool.max_sets,
            &config.descriptor_pool.pool_sizes,
        )?;
        let global_layout = DescriptorSetLayout::new(dev, &[BindingDesc::uniform_buffer(
            0,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        )])?;

        let global_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|i| {
                Buffer::new(
                    size_of::<GlobalUniforms>() as u64,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    &format!("Global uniforms {}", i),
                    MemoryLocation::CpuToGpu,
                    dev,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let global_sets = global_buffers
            .iter()
            .map(|buffer| {
                DescriptorWriter::new(&global_layout)
                    .write_buffer(0, buffer.descriptor_info())
                    .build(&mut pool)?
                    .ok_or_eyre("Descriptor pool too small for the global sets")
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Render context ready with {} global sets", global_sets.len());

        let mut ctx = Self {
            global_sets,
            global_buffers,
            global_layout,
            pool,
        };
        for frame_index in 0..MAX_FRAMES_IN_FLIGHT {
            ctx.update_globals(frame_index, &GlobalUniforms::default())?;
        }
        Ok(ctx)
    }

    pub fn global_layout(&self) -> &DescriptorSetLayout {
        &self.global_layout
    }

    pub fn global_set(&self, frame_index: usize) -> vk::DescriptorSet {
        self.global_sets[frame_index % MAX_FRAMES_IN_FLIGHT]
    }

    pub fn pool(&mut self) -> &mut DescriptorPool {
        &mut self.pool
    }

    /// Writes the uniforms of one frame slot. Only call for the slot whose fence
    /// has been waited on.
    pub fn update_globals(&mut self, frame_index: usize, globals: &GlobalUniforms) -> Result<()> {
        let buffer = self
            .global_buffers
            .get_mut(frame_index)
            .ok_or_else(|| eyre!("Frame index {} out of range", frame_index))?;
        buffer.write(std::slice::from_ref(globals), 0)?;
        Ok(())
    }
}
