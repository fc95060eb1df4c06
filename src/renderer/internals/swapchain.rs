use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::{vk_error, RenderDevice};
use crate::renderer::contexts::device_ctx::queue::Queue;
use crate::renderer::window::choose_surface_extent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be rebuilt before
    /// anything is drawn.
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    device: Arc<ash::Device>,
}

impl Swapchain {
    /// Passing the previous swapchain lets the driver hand its resources over;
    /// the caller still destroys the old one afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &ash::Instance,
        dev: &RenderDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        surface_format: vk::SurfaceFormatKHR,
        present_mode: vk::PresentModeKHR,
        window_extent: vk::Extent2D,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(dev.physical, surface)?
        };

        let extent = choose_surface_extent(&capabilities, window_extent);
        let min_image_count = choose_image_count(&capabilities);
        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        let queue_family_indices = [
            dev.graphics_queue.family.index,
            dev.present_queue.family.index,
        ];
        let concurrent = queue_family_indices[0] != queue_family_indices[1];

        let mut swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(old_swapchain.unwrap_or_default());
        swapchain_info = if concurrent {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = ash::khr::swapchain::Device::new(instance, &dev.logical);
        let swapchain = unsafe { loader.create_swapchain(&swapchain_info, None)? };

        let images = unsafe { loader.get_swapchain_images(swapchain)? };
        let image_views = match Self::create_image_views(&images, surface_format.format, dev) {
            Ok(views) => views,
            Err(err) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(err);
            }
        };

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode,
        );

        Ok(Self {
            swapchain,
            loader,
            images,
            image_views,
            extent,
            surface_format,
            present_mode,
            device: dev.logical.clone(),
        })
    }

    fn create_image_views(
        images: &[vk::Image],
        format: vk::Format,
        dev: &RenderDevice,
    ) -> Result<Vec<vk::ImageView>> {
        let views = images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping::default())
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .level_count(1)
                            .layer_count(1),
                    )
                    .image(*image);
                unsafe { dev.logical.create_image_view(&view_info, None) }
            })
            .collect::<VkResult<Vec<_>>>()?;
        Ok(views)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Signals `semaphore` once the returned image can be rendered to.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    pub fn present(
        &self,
        queue: &Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let result = unsafe { self.loader.queue_present(queue.handle, &present_info) };
        classify_present(result)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// One more than the minimum so the driver never blocks acquisition, capped by the
/// maximum when the surface has one.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

pub fn classify_acquire(result: VkResult<(u32, bool)>) -> Result<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready { image_index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(err) => Err(vk_error(err, "Swapchain image acquisition")),
    }
}

pub fn classify_present(result: VkResult<bool>) -> Result<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(err) => Err(vk_error(err, "Presentation")),
    }
}

/// A rebuilt swapchain must keep the formats every render pass was compiled
/// against.
pub fn check_formats_unchanged(
    old_color: vk::Format,
    new_color: vk::Format,
    old_depth: vk::Format,
    new_depth: vk::Format,
) -> Result<()> {
    if old_color != new_color {
        return Err(eyre!(
            "Swapchain color format changed from {:?} to {:?}",
            old_color,
            new_color,
        ));
    }
    if old_depth != new_depth {
        return Err(eyre!(
            "Swapchain depth format changed from {:?} to {:?}",
            old_depth,
            new_depth,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_count_is_min_plus_one_within_max() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 8;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_acquire_classification() {
        assert_eq!(
            classify_acquire(Ok((1, false))).unwrap(),
            AcquireOutcome::Ready { image_index: 1, suboptimal: false },
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Ready { image_index: 0, suboptimal: true },
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate,
        );
        let lost = classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).unwrap_err();
        assert!(lost.to_string().contains("device lost"));
    }

    #[test]
    fn test_present_classification() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::Suboptimal);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::OutOfDate,
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_format_change_is_rejected() {
        let srgb = vk::Format::B8G8R8A8_SRGB;
        let d32 = vk::Format::D32_SFLOAT;
        assert!(check_formats_unchanged(srgb, srgb, d32, d32).is_ok());
        assert!(check_formats_unchanged(srgb, vk::Format::B8G8R8A8_UNORM, d32, d32).is_err());
        assert!(check_formats_unchanged(srgb, srgb, d32, vk::Format::D24_UNORM_S8_UINT).is_err());
    }
}
