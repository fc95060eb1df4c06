use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::attachment::FrameBufferAttachment;

/// Groups attachment views against one render pass. Owns none of the images;
/// whoever owns the attachments must keep them alive for as long as this exists.
pub struct Framebuffer {
    pub framebuffer: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    device: Arc<ash::Device>,
}

impl Framebuffer {
    /// Size is taken from the first attachment; all attachments must match it.
    pub fn new(
        dev: &RenderDevice,
        render_pass: vk::RenderPass,
        attachments: &[&FrameBufferAttachment],
    ) -> Result<Self> {
        let first = attachments
            .first()
            .ok_or_eyre("A framebuffer needs at least one attachment")?;
        let extent = first.extent();
        if let Some(mismatch) = attachments.iter().find(|a| a.extent() != extent) {
            return Err(eyre!(
                "Framebuffer attachment is {:?}, expected {:?}",
                mismatch.extent(),
                extent,
            ));
        }

        let views = attachments.iter().map(|a| a.view.view).collect::<Vec<_>>();
        Self::from_views(dev, render_pass, &views, extent)
    }

    /// For views not owned by a [`FrameBufferAttachment`], such as swapchain images.
    pub fn from_views(
        dev: &RenderDevice,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { dev.logical.create_framebuffer(&info, None)? };

        Ok(Self {
            framebuffer,
            render_pass,
            width: extent.width,
            height: extent.height,
            layers: 1,
            device: dev.logical.clone(),
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}
