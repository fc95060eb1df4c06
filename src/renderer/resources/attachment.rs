use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::image::{Image, ImageDesc, ImageView};

/// What an attachment is used for in a render pass, decided by its pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentRole {
    Color,
    DepthStencil { has_stencil: bool },
}

impl AttachmentRole {
    pub fn from_format(format: vk::Format) -> Self {
        match format {
            vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT => Self::DepthStencil { has_stencil: false },
            vk::Format::S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT => Self::DepthStencil { has_stencil: true },
            _ => Self::Color,
        }
    }

    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::DepthStencil { .. })
    }

    pub fn aspect(&self, format: vk::Format) -> vk::ImageAspectFlags {
        match (self, format) {
            (Self::Color, _) => vk::ImageAspectFlags::COLOR,
            (Self::DepthStencil { .. }, vk::Format::S8_UINT) => vk::ImageAspectFlags::STENCIL,
            (Self::DepthStencil { has_stencil: true }, _) => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            (Self::DepthStencil { has_stencil: false }, _) => vk::ImageAspectFlags::DEPTH,
        }
    }

    /// Layout the attachment is left in after its render pass; a later pass or the
    /// editor samples it from there.
    pub fn final_layout(&self) -> vk::ImageLayout {
        match self {
            Self::Color => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::DepthStencil { .. } => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        }
    }

    fn usage(&self) -> vk::ImageUsageFlags {
        let attachment = match self {
            Self::Color => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            Self::DepthStencil { .. } => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        };
        attachment | vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::INPUT_ATTACHMENT
    }
}

/// An image plus view used as a render-pass attachment. The role is fixed at
/// construction from the format.
pub struct FrameBufferAttachment {
    // Field order is drop order: the view goes before the image
    pub view: ImageView,
    pub image: Image,
    role: AttachmentRole,
}

impl FrameBufferAttachment {
    pub fn new(
        name: &str,
        format: vk::Format,
        extent: vk::Extent2D,
        dev: &RenderDevice,
    ) -> Result<Self> {
        Self::with_usage(name, format, extent, vk::ImageUsageFlags::empty(), dev)
    }

    /// Same as [`FrameBufferAttachment::new`] with extra usage bits, e.g.
    /// TRANSFER_SRC for attachments that get blitted.
    pub fn with_usage(
        name: &str,
        format: vk::Format,
        extent: vk::Extent2D,
        extra_usage: vk::ImageUsageFlags,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let role = AttachmentRole::from_format(format);
        let desc = ImageDesc::new_2d(name, format, extent, role.usage() | extra_usage);
        let image = Image::new(&desc, dev)?;
        let view = ImageView::new(&image, role.aspect(format))?;

        Ok(Self {
            view,
            image,
            role,
        })
    }

    pub fn role(&self) -> AttachmentRole {
        self.role
    }

    pub fn format(&self) -> vk::Format {
        self.image.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent_2d()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_depth_formats() {
        assert_eq!(
            AttachmentRole::from_format(vk::Format::D32_SFLOAT),
            AttachmentRole::DepthStencil { has_stencil: false },
        );
        assert_eq!(
            AttachmentRole::from_format(vk::Format::D24_UNORM_S8_UINT),
            AttachmentRole::DepthStencil { has_stencil: true },
        );
        assert!(AttachmentRole::from_format(vk::Format::D16_UNORM).is_depth_stencil());
    }

    #[test]
    fn test_role_from_color_formats() {
        for format in [
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::R32_SFLOAT,
        ] {
            assert_eq!(AttachmentRole::from_format(format), AttachmentRole::Color);
        }
    }

    #[test]
    fn test_aspect_and_final_layout() {
        let depth = AttachmentRole::from_format(vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(
            depth.aspect(vk::Format::D32_SFLOAT_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        );
        assert_eq!(depth.final_layout(), vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);

        let color = AttachmentRole::Color;
        assert_eq!(color.aspect(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(color.final_layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}
