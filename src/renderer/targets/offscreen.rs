use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::graph::compile::SubpassSpec;
use crate::renderer::graph::{GraphAttachment, RenderPassGraph};
use crate::renderer::resources::attachment::FrameBufferAttachment;
use crate::renderer::resources::framebuffer::Framebuffer;
use crate::renderer::resources::sampler::{Sampler, SamplerDesc};
use crate::renderer::targets::{is_drawable, needs_resize, UiTexture};

#[derive(Debug, Clone)]
pub struct OffscreenDesc {
    pub name: String,
    pub color_format: Option<vk::Format>,
    pub depth_format: Option<vk::Format>,
    pub sampler: SamplerDesc,
}

impl OffscreenDesc {
    /// Scene viewport shown in the editor
    pub fn viewport(color_format: vk::Format, depth_format: vk::Format) -> Self {
        Self {
            name: "Viewport".into(),
            color_format: Some(color_format),
            depth_format: Some(depth_format),
            sampler: SamplerDesc::default(),
        }
    }

    /// Full-screen pass output, no depth
    pub fn post_process(name: &str, color_format: vk::Format) -> Self {
        Self {
            name: name.into(),
            color_format: Some(color_format),
            depth_format: None,
            sampler: SamplerDesc::default(),
        }
    }

    /// Depth-only pass
    pub fn shadow_map(depth_format: vk::Format) -> Self {
        Self {
            name: "Shadow map".into(),
            color_format: None,
            depth_format: Some(depth_format),
            sampler: SamplerDesc::shadow_map(),
        }
    }

    /// Attachment count, also the list of render targets of the single subpass
    pub fn subpass(&self) -> Result<SubpassSpec> {
        let count = self.color_format.is_some() as u32 + self.depth_format.is_some() as u32;
        if count == 0 {
            return Err(eyre!("Offscreen target '{}' has no attachments", self.name));
        }
        let targets = (0..count).collect::<Vec<_>>();
        Ok(SubpassSpec::new(&targets, &[]))
    }
}

// Field order is drop order: framebuffer, then the pass, then the images it views
struct OffscreenResources {
    framebuffer: Framebuffer,
    graph: RenderPassGraph,
    color: Option<FrameBufferAttachment>,
    depth: Option<FrameBufferAttachment>,
}

impl OffscreenResources {
    fn new(dev: &RenderDevice, desc: &OffscreenDesc, extent: vk::Extent2D) -> Result<Self> {
        let subpass = desc.subpass()?;
        let color = desc
            .color_format
            .map(|format| {
                FrameBufferAttachment::with_usage(
                    &format!("{} color", desc.name),
                    format,
                    extent,
                    vk::ImageUsageFlags::TRANSFER_SRC,
                    dev,
                )
            })
            .transpose()?;
        let depth = desc
            .depth_format
            .map(|format| FrameBufferAttachment::new(&format!("{} depth", desc.name), format, extent, dev))
            .transpose()?;

        let attachments = color.iter().chain(depth.iter()).collect::<Vec<_>>();
        let graph_attachments = attachments
            .iter()
            .map(|a| GraphAttachment::clear_store(a))
            .collect::<Vec<_>>();
        let graph = RenderPassGraph::new(dev, &graph_attachments, &[subpass])?;
        let framebuffer = Framebuffer::new(dev, graph.render_pass(), &attachments)?;

        Ok(Self {
            framebuffer,
            graph,
            color,
            depth,
        })
    }
}

/// Single-subpass offscreen target with an optional color and an optional depth
/// attachment.
pub struct OffscreenTarget {
    // Empty only if a resize failed after the old set was released
    resources: Option<OffscreenResources>,
    sampler: Sampler,
    desc: OffscreenDesc,
    extent: vk::Extent2D,
}

impl OffscreenTarget {
    pub fn new(dev: &RenderDevice, desc: OffscreenDesc, extent: vk::Extent2D) -> Result<Self> {
        if !is_drawable(extent) {
            return Err(eyre!("Offscreen target '{}' created with empty extent", desc.name));
        }
        let resources = OffscreenResources::new(dev, &desc, extent)?;
        let sampler = Sampler::new(&desc.sampler, dev)?;

        Ok(Self {
            resources: Some(resources),
            sampler,
            desc,
            extent,
        })
    }

    /// Deletes and recreates every attachment, the framebuffer and the pass.
    /// The render pass handle changes, so pipelines and descriptor sets built
    /// against the old one must be rebuilt too. Empty or unchanged extents are
    /// ignored.
    ///
    /// The old set is released before the new one is allocated, so peak memory
    /// stays at one set. If recreation fails the target has no attachments until
    /// the next successful resize.
    pub fn resize(&mut self, dev: &RenderDevice, extent: vk::Extent2D) -> Result<()> {
        if !needs_resize(self.extent, extent) {
            return Ok(());
        }
        dev.wait_idle()?;
        self.resources = None;
        self.resources = Some(OffscreenResources::new(dev, &self.desc, extent)?);
        self.extent = extent;
        log::debug!("Resized '{}' to {}x{}", self.desc.name, extent.width, extent.height);
        Ok(())
    }

    fn resources(&self) -> Result<&OffscreenResources> {
        self.resources
            .as_ref()
            .ok_or_else(|| eyre!("Offscreen target '{}' lost its attachments in a failed resize", self.desc.name))
    }

    pub fn begin(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let resources = self.resources()?;
        resources.graph.start(&resources.framebuffer, cmd);
        Ok(())
    }

    pub fn end(&self, cmd: vk::CommandBuffer) -> Result<()> {
        self.resources()?.graph.end(cmd);
        Ok(())
    }

    pub fn render_pass(&self) -> Result<vk::RenderPass> {
        Ok(self.resources()?.graph.render_pass())
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn color_attachment(&self) -> Option<&FrameBufferAttachment> {
        self.resources.as_ref()?.color.as_ref()
    }

    pub fn depth_attachment(&self) -> Option<&FrameBufferAttachment> {
        self.resources.as_ref()?.depth.as_ref()
    }

    /// The color attachment if there is one, the depth attachment otherwise
    pub fn ui_texture(&self) -> Result<UiTexture> {
        let attachment = self
            .color_attachment()
            .or(self.depth_attachment())
            .ok_or_eyre("Offscreen target has no attachments")?;
        Ok(UiTexture::of(&self.sampler, attachment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_targets_both_attachments() {
        let desc = OffscreenDesc::viewport(vk::Format::R8G8B8A8_UNORM, vk::Format::D32_SFLOAT);
        assert_eq!(desc.subpass().unwrap().render_targets, vec![0, 1]);
    }

    #[test]
    fn test_single_attachment_targets() {
        let shadow = OffscreenDesc::shadow_map(vk::Format::D32_SFLOAT);
        assert_eq!(shadow.subpass().unwrap().render_targets, vec![0]);
        assert_eq!(shadow.sampler.address_mode, vk::SamplerAddressMode::CLAMP_TO_BORDER);

        let post = OffscreenDesc::post_process("Bloom", vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(post.subpass().unwrap().render_targets, vec![0]);
        assert!(post.depth_format.is_none());
    }

    #[test]
    fn test_target_without_attachments_is_rejected() {
        let desc = OffscreenDesc {
            name: "Empty".into(),
            color_format: None,
            depth_format: None,
            sampler: SamplerDesc::default(),
        };
        assert!(desc.subpass().is_err());
    }

    #[test]
    fn test_zero_extent_is_not_drawable() {
        assert!(!is_drawable(vk::Extent2D { width: 0, height: 600 }));
        assert!(!is_drawable(vk::Extent2D { width: 800, height: 0 }));
        assert!(is_drawable(vk::Extent2D { width: 800, height: 600 }));
    }
}
