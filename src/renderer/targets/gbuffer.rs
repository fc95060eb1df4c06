use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::graph::compile::SubpassSpec;
use crate::renderer::graph::{GraphAttachment, RenderPassGraph};
use crate::renderer::resources::attachment::FrameBufferAttachment;
use crate::renderer::resources::framebuffer::Framebuffer;
use crate::renderer::resources::sampler::{Sampler, SamplerDesc};
use crate::renderer::targets::{is_drawable, needs_resize, UiTexture};

pub const ALBEDO: u32 = 0;
pub const POSITION: u32 = 1;
pub const NORMAL: u32 = 2;
pub const MATERIAL: u32 = 3;
pub const DEPTH: u32 = 4;
pub const OUTPUT: u32 = 5;
pub const EMISSIVE: u32 = 6;

pub const GEOMETRY_SUBPASS: u32 = 0;
pub const LIGHTING_SUBPASS: u32 = 1;
pub const FORWARD_SUBPASS: u32 = 2;

/// Fill the G-buffer, compose lighting from it, then draw forward geometry
/// against the same depth.
pub fn gbuffer_subpasses() -> Vec<SubpassSpec> {
    vec![
        SubpassSpec::new(&[ALBEDO, POSITION, NORMAL, MATERIAL, DEPTH], &[]),
        SubpassSpec::new(&[OUTPUT], &[ALBEDO, POSITION, NORMAL, MATERIAL]),
        SubpassSpec::new(&[OUTPUT, EMISSIVE], &[DEPTH]),
    ]
}

/// Attachment formats in attachment-index order
pub fn gbuffer_formats(depth_format: vk::Format) -> [(&'static str, vk::Format); 7] {
    [
        ("G-buffer albedo", vk::Format::R8G8B8A8_UNORM),
        ("G-buffer position", vk::Format::R16G16B16A16_SFLOAT),
        ("G-buffer normal", vk::Format::R16G16B16A16_SFLOAT),
        ("G-buffer material", vk::Format::R8G8B8A8_UNORM),
        ("G-buffer depth", depth_format),
        ("G-buffer output", vk::Format::R16G16B16A16_SFLOAT),
        ("G-buffer emissive", vk::Format::R16G16B16A16_SFLOAT),
    ]
}

struct GBufferResources {
    framebuffer: Framebuffer,
    graph: RenderPassGraph,
    attachments: Vec<FrameBufferAttachment>,
}

impl GBufferResources {
    fn new(dev: &RenderDevice, depth_format: vk::Format, extent: vk::Extent2D) -> Result<Self> {
        let attachments = gbuffer_formats(depth_format)
            .iter()
            .map(|(name, format)| FrameBufferAttachment::new(name, *format, extent, dev))
            .collect::<Result<Vec<_>>>()?;

        let graph_attachments = attachments
            .iter()
            .map(GraphAttachment::clear_store)
            .collect::<Vec<_>>();
        let graph = RenderPassGraph::new(dev, &graph_attachments, &gbuffer_subpasses())?;

        let refs = attachments.iter().collect::<Vec<_>>();
        let framebuffer = Framebuffer::new(dev, graph.render_pass(), &refs)?;

        Ok(Self {
            framebuffer,
            graph,
            attachments,
        })
    }
}

/// The deferred target: geometry, lighting and forward subpasses in one pass.
pub struct GBufferTarget {
    // Empty only if a resize failed after the old set was released
    resources: Option<GBufferResources>,
    sampler: Sampler,
    depth_format: vk::Format,
    extent: vk::Extent2D,
}

impl GBufferTarget {
    pub fn new(dev: &RenderDevice, extent: vk::Extent2D) -> Result<Self> {
        if !is_drawable(extent) {
            return Err(eyre!("G-buffer created with empty extent"));
        }
        let depth_format = dev.find_depth_format()?;
        let resources = GBufferResources::new(dev, depth_format, extent)?;
        let sampler = Sampler::new(&SamplerDesc::default(), dev)?;

        Ok(Self {
            resources: Some(resources),
            sampler,
            depth_format,
            extent,
        })
    }

    /// Same contract as [`OffscreenTarget::resize`](super::offscreen::OffscreenTarget::resize),
    /// including releasing the old attachments first. Input-attachment descriptor
    /// sets point at the old views and must be rewritten afterwards.
    pub fn resize(&mut self, dev: &RenderDevice, extent: vk::Extent2D) -> Result<()> {
        if !needs_resize(self.extent, extent) {
            return Ok(());
        }
        dev.wait_idle()?;
        self.resources = None;
        self.resources = Some(GBufferResources::new(dev, self.depth_format, extent)?);
        self.extent = extent;
        log::debug!("Resized G-buffer to {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn resources(&self) -> Result<&GBufferResources> {
        self.resources
            .as_ref()
            .ok_or_else(|| eyre!("G-buffer lost its attachments in a failed resize"))
    }

    pub fn begin(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let resources = self.resources()?;
        resources.graph.start(&resources.framebuffer, cmd);
        Ok(())
    }

    pub fn next_subpass(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.resources()?.graph.next_subpass(cmd);
        Ok(())
    }

    pub fn end(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.resources()?.graph.end(cmd);
        Ok(())
    }

    pub fn render_pass(&self) -> Result<vk::RenderPass> {
        Ok(self.resources()?.graph.render_pass())
    }

    pub fn graph(&self) -> Result<&RenderPassGraph> {
        Ok(&self.resources()?.graph)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn attachment(&self, index: u32) -> Option<&FrameBufferAttachment> {
        self.resources.as_ref()?.attachments.get(index as usize)
    }

    /// Descriptor info for reading `index` as an input attachment in a later
    /// subpass. Depth is bound as the depth attachment instead, so it has none.
    pub fn input_info(&self, index: u32) -> Option<vk::DescriptorImageInfo> {
        let attachment = self.attachment(index)?;
        if attachment.role().is_depth_stencil() {
            return None;
        }
        Some(vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: attachment.view.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        })
    }

    /// The composed output
    pub fn ui_texture(&self) -> Result<UiTexture> {
        let output = self
            .attachment(OUTPUT)
            .ok_or_else(|| eyre!("G-buffer output attachment missing"))?;
        Ok(UiTexture::of(&self.sampler, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::graph::compile::{AttachmentSpec, CompiledRenderPass};

    fn compiled() -> CompiledRenderPass {
        let specs = gbuffer_formats(vk::Format::D32_SFLOAT)
            .iter()
            .map(|(_, format)| {
                AttachmentSpec::new(*format, vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::STORE)
            })
            .collect::<Vec<_>>();
        CompiledRenderPass::compile(&specs, &gbuffer_subpasses()).unwrap()
    }

    #[test]
    fn test_gbuffer_layout_compiles_to_three_subpasses() {
        let compiled = compiled();
        assert_eq!(compiled.subpasses.len(), 3);
        assert_eq!(compiled.dependencies.len(), 4);

        let geometry = &compiled.subpasses[GEOMETRY_SUBPASS as usize];
        assert_eq!(geometry.color.len(), 4);
        assert_eq!(geometry.depth.map(|d| d.attachment), Some(DEPTH));

        let lighting = &compiled.subpasses[LIGHTING_SUBPASS as usize];
        assert_eq!(lighting.input.len(), 4);
        assert_eq!(lighting.color.len(), 1);

        let forward = &compiled.subpasses[FORWARD_SUBPASS as usize];
        assert_eq!(forward.color.len(), 2);
        assert!(forward.input.is_empty());
        assert_eq!(
            forward.depth.map(|d| d.attachment),
            geometry.depth.map(|d| d.attachment),
        );
    }

    #[test]
    fn test_only_depth_is_depth_stencil() {
        let compiled = compiled();
        let depth_roles = compiled
            .roles
            .iter()
            .enumerate()
            .filter(|(_, role)| role.is_depth_stencil())
            .map(|(i, _)| i as u32)
            .collect::<Vec<_>>();
        assert_eq!(depth_roles, vec![DEPTH]);
    }
}
