use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::Result;
use crate::renderer::contexts::device_ctx::device::vk_error;
use crate::renderer::contexts::device_ctx::queue::Queue;

/// Short-lived command recording for uploads and layout transitions that must
/// complete before the caller continues.
pub struct TransferContext {
    transfer_fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,

    queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(
        queue: Arc<Queue>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let transfer_fence_info = vk::FenceCreateInfo::default();
        let transfer_fence =
            unsafe { device.create_fence(&transfer_fence_info, None)? };

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family.index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool =
            unsafe { device.create_command_pool(&command_pool_info, None)? };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe {
            device.allocate_command_buffers(&command_buffer_info)?[0]
        };

        Ok(Self {
            transfer_fence,
            command_pool,
            command_buffer,
            queue,
            device,
        })
    }

    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let cmd = self.command_buffer;

        // This command buffer will be used exactly once before resetting
        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(cmd, &cmd_begin_info)?;
        }

        if let Err(err) = func(cmd, &self.device) {
            // Leave the buffer ready for the next submit
            unsafe {
                self.device.end_command_buffer(cmd)?;
                self.device.reset_command_pool(
                    self.command_pool,
                    vk::CommandPoolResetFlags::empty(),
                )?;
            }
            return Err(err);
        }

        unsafe {
            self.device.end_command_buffer(cmd)?;
        }

        let cmd = [cmd];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&cmd);
        unsafe {
            self.device
                .queue_submit(self.queue.handle, &[submit], self.transfer_fence)
                .map_err(|err| vk_error(err, "one-shot submit"))?;

            self.device
                .wait_for_fences(&[self.transfer_fence], true, u64::MAX)
                .map_err(|err| vk_error(err, "one-shot fence wait"))?;
            self.device.reset_fences(&[self.transfer_fence])?;
            self.device.reset_command_pool(
                self.command_pool,
                vk::CommandPoolResetFlags::empty(),
            )?;
        }

        Ok(())
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_fence(self.transfer_fence, None);
        }
    }
}
