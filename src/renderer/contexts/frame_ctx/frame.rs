use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;

/// Synchronization objects of one frame slot
pub struct FrameSync {
    // Signals when the swapchain image can be rendered to.
    pub image_available: vk::Semaphore,

    // Signals when rendering commands have finished and the image can be presented.
    pub render_finished: vk::Semaphore,

    // Signals when all commands submitted in this slot have finished execution.
    pub in_flight: vk::Fence,

    pub command_buffer: vk::CommandBuffer,

    device: Arc<ash::Device>,
}

impl FrameSync {
    pub fn new(dev: &RenderDevice, command_buffer: vk::CommandBuffer) -> Result<Self> {
        let image_available = unsafe {
            dev.logical.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        let render_finished = unsafe {
            dev.logical.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        // Created signaled so the first wait on a fresh slot returns immediately
        let in_flight = unsafe {
            dev.logical.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            command_buffer,
            device: dev.logical.clone(),
        })
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.image_available, None);
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_fence(self.in_flight, None);
        }
    }
}
