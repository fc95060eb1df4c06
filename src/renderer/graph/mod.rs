pub mod compile;

use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::graph::compile::{
    compile_presentation, full_viewport, render_area, AttachmentSpec, CompiledRenderPass, SubpassSpec,
};
use crate::renderer::resources::attachment::FrameBufferAttachment;
use crate::renderer::resources::framebuffer::Framebuffer;

/// One attachment slot of a graph: the backing attachment plus how the pass
/// loads and stores it.
pub struct GraphAttachment<'a> {
    pub attachment: &'a FrameBufferAttachment,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}

impl<'a> GraphAttachment<'a> {
    pub fn new(
        attachment: &'a FrameBufferAttachment,
        load_op: vk::AttachmentLoadOp,
        store_op: vk::AttachmentStoreOp,
    ) -> Self {
        Self {
            attachment,
            load_op,
            store_op,
        }
    }

    /// Cleared on load, kept after the pass
    pub fn clear_store(attachment: &'a FrameBufferAttachment) -> Self {
        Self::new(attachment, vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
    }

    fn spec(&self) -> AttachmentSpec {
        AttachmentSpec {
            format: self.attachment.format(),
            role: self.attachment.role(),
            load_op: self.load_op,
            store_op: self.store_op,
        }
    }
}

/// A compiled render pass. Immutable after construction; it copies what it needs
/// from the attachments and keeps no reference to them, so the attachments can be
/// rebuilt (together with a new graph) on resize.
pub struct RenderPassGraph {
    render_pass: vk::RenderPass,
    compiled: CompiledRenderPass,
    device: Arc<ash::Device>,
}

impl RenderPassGraph {
    pub fn new(
        dev: &RenderDevice,
        attachments: &[GraphAttachment<'_>],
        subpasses: &[SubpassSpec],
    ) -> Result<Self> {
        let specs = attachments.iter().map(GraphAttachment::spec).collect::<Vec<_>>();
        let compiled = CompiledRenderPass::compile(&specs, subpasses)?;
        let render_pass = create_render_pass(&dev.logical, &compiled)?;

        Ok(Self {
            render_pass,
            compiled,
            device: dev.logical.clone(),
        })
    }

    /// The pass that draws into swapchain images
    pub fn presentation(
        dev: &RenderDevice,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let compiled = compile_presentation(color_format, depth_format)?;
        let render_pass = create_render_pass(&dev.logical, &compiled)?;

        Ok(Self {
            render_pass,
            compiled,
            device: dev.logical.clone(),
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn compiled(&self) -> &CompiledRenderPass {
        &self.compiled
    }

    pub fn subpass_count(&self) -> u32 {
        self.compiled.subpasses.len() as u32
    }

    /// Begins the pass over the whole framebuffer and sets viewport and scissor
    /// to the same extent.
    pub fn start(&self, framebuffer: &Framebuffer, cmd: vk::CommandBuffer) {
        let clear_values = self.compiled.clear_values();
        let extent = framebuffer.extent();
        let area = render_area(extent);

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer.framebuffer)
            .render_area(area)
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            self.device.cmd_set_viewport(cmd, 0, &[full_viewport(extent)]);
            self.device.cmd_set_scissor(cmd, 0, &[area]);
        }
    }

    pub fn next_subpass(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE);
        }
    }

    pub fn end(&self, cmd: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_end_render_pass(cmd);
        }
    }
}

impl Drop for RenderPassGraph {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

pub(crate) fn create_render_pass(
    device: &ash::Device,
    compiled: &CompiledRenderPass,
) -> Result<vk::RenderPass> {
    let subpasses = compiled.subpass_descriptions();
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&compiled.attachments)
        .subpasses(&subpasses)
        .dependencies(&compiled.dependencies);
    Ok(unsafe { device.create_render_pass(&info, None)? })
}
