use std::mem::ManuallyDrop;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::graph::RenderPassGraph;
use crate::renderer::internals::swapchain::{check_formats_unchanged, Swapchain};
use crate::renderer::resources::attachment::FrameBufferAttachment;
use crate::renderer::resources::framebuffer::Framebuffer;

/// Everything that is sized to the swapchain and rebuilt with it
struct PresentChain {
    framebuffers: Vec<Framebuffer>,
    depth_attachments: Vec<FrameBufferAttachment>,
    swapchain: Swapchain,
}

/// Presentation target of the renderer: the surface, its swapchain, one depth
/// attachment and framebuffer per swapchain image, and the render pass that draws
/// into them.
pub struct RenderTarget {
    chain: ManuallyDrop<PresentChain>,
    render_pass: RenderPassGraph,

    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub depth_format: vk::Format,
}

impl RenderTarget {
    pub fn new(
        ins: &RenderInstance,
        dev: &RenderDevice,
        surface: (vk::SurfaceKHR, ash::khr::surface::Instance),
        window_extent: vk::Extent2D,
        config: &RenderConfig,
    ) -> Result<Self> {
        let (surface, surface_loader) = surface;

        let surface_formats = unsafe {
            surface_loader.get_physical_device_surface_formats(dev.physical, surface)?
        };
        let surface_present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(dev.physical, surface)?
        };

        let surface_format = choose_surface_format(&surface_formats, config.preferred_surface_format)
            .ok_or_eyre("Surface reports no formats")?;
        let present_mode = choose_present_mode(&surface_present_modes, config.preferred_present_mode);
        let depth_format = dev.find_depth_format()?;

        let render_pass = RenderPassGraph::presentation(dev, surface_format.format, depth_format)?;
        let chain = Self::create_chain(
            ins,
            dev,
            surface,
            &surface_loader,
            surface_format,
            present_mode,
            depth_format,
            render_pass.render_pass(),
            window_extent,
            None,
        )?;

        Ok(Self {
            chain: ManuallyDrop::new(chain),
            render_pass,
            surface,
            surface_loader,
            surface_format,
            present_mode,
            depth_format,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn create_chain(
        ins: &RenderInstance,
        dev: &RenderDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        depth_format: vk::Format,
        render_pass: vk::RenderPass,
        window_extent: vk::Extent2D,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<PresentChain> {
        let swapchain = Swapchain::new(
            &ins.instance,
            dev,
            surface,
            surface_loader,
            surface_format,
            present_mode,
            window_extent,
            old_swapchain,
        )?;

        let depth_attachments = (0..swapchain.image_count())
            .map(|i| {
                FrameBufferAttachment::new(
                    &format!("Swapchain depth {}", i),
                    depth_format,
                    swapchain.extent,
                    dev,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let framebuffers = swapchain
            .image_views
            .iter()
            .zip(&depth_attachments)
            .map(|(color, depth)| {
                Framebuffer::from_views(dev, render_pass, &[*color, depth.view.view], swapchain.extent)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PresentChain {
            framebuffers,
            depth_attachments,
            swapchain,
        })
    }

    /// Recreates the swapchain and everything sized to it. The caller makes sure
    /// the extent is non-zero. Fails if the surface now wants different formats
    /// than the render pass was compiled for.
    pub fn rebuild(
        &mut self,
        ins: &RenderInstance,
        dev: &RenderDevice,
        window_extent: vk::Extent2D,
        config: &RenderConfig,
    ) -> Result<()> {
        dev.wait_idle()?;

        let surface_formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(dev.physical, self.surface)?
        };
        let surface_format = choose_surface_format(&surface_formats, config.preferred_surface_format)
            .ok_or_eyre("Surface reports no formats")?;
        let depth_format = dev.find_depth_format()?;
        check_formats_unchanged(
            self.surface_format.format,
            surface_format.format,
            self.depth_format,
            depth_format,
        )?;

        let chain = Self::create_chain(
            ins,
            dev,
            self.surface,
            &self.surface_loader,
            self.surface_format,
            self.present_mode,
            self.depth_format,
            self.render_pass.render_pass(),
            window_extent,
            Some(self.chain.swapchain.swapchain),
        )?;
        let old = std::mem::replace(&mut *self.chain, chain);
        drop(old);

        log::debug!(
            "Swapchain rebuilt at {}x{}",
            self.chain.swapchain.extent.width,
            self.chain.swapchain.extent.height,
        );
        Ok(())
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.chain.swapchain
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.chain.swapchain.extent
    }

    pub fn render_pass(&self) -> &RenderPassGraph {
        &self.render_pass
    }

    pub fn framebuffer(&self, image_index: u32) -> Option<&Framebuffer> {
        self.chain.framebuffers.get(image_index as usize)
    }

    pub fn image_count(&self) -> usize {
        self.chain.swapchain.image_count()
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            ManuallyDrop::drop(&mut self.chain);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// The preferred format if the surface offers it, otherwise whatever comes first.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    let exact = available.iter().find(|format| {
        format.format == preferred.format && format.color_space == preferred.color_space
    });
    match exact {
        Some(format) => Some(*format),
        None => {
            let fallback = available.first().copied();
            if let Some(format) = fallback {
                log::warn!(
                    "Preferred surface format {:?} unavailable, using {:?}",
                    preferred.format,
                    format.format,
                );
            }
            fallback
        }
    }
}

/// FIFO is the only mode every implementation must support.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn unorm() -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_preferred_surface_format_wins() {
        assert_eq!(choose_surface_format(&[unorm(), srgb()], srgb()), Some(srgb()));
    }

    #[test]
    fn test_surface_format_falls_back_to_first() {
        assert_eq!(choose_surface_format(&[unorm()], srgb()), Some(unorm()));
        assert_eq!(choose_surface_format(&[], srgb()), None);
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::IMMEDIATE,
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO,
        );
    }
}
