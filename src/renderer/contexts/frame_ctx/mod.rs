pub mod frame;
pub mod pacer;

use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::config::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::device_ctx::device::{vk_error, RenderDevice};
use crate::renderer::contexts::frame_ctx::frame::FrameSync;
use crate::renderer::contexts::frame_ctx::pacer::{FramePacer, FrameState};
use crate::renderer::internals::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};

/// Responsibilities:
/// - Own the per-slot command buffers and synchronization objects
/// - Bound CPU/GPU overlap to `MAX_FRAMES_IN_FLIGHT` frames
/// - Drive acquire, submit and present against the swapchain
pub struct RenderFrameContext {
    frames: Vec<FrameSync>,
    pacer: FramePacer,
}

impl RenderFrameContext {
    pub fn new(dev: &RenderDevice, image_count: usize) -> Result<Self> {
        let command_buffers = dev
            .allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?
            .ok_or_eyre("Command pool exhausted while allocating frame command buffers")?;

        let frames = command_buffers
            .into_iter()
            .map(|cmd| FrameSync::new(dev, cmd))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            frames,
            pacer: FramePacer::new(image_count),
        })
    }

    pub fn frame_index(&self) -> usize {
        self.pacer.frame_index()
    }

    pub fn state(&self) -> FrameState {
        self.pacer.state()
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.frames[self.pacer.frame_index()].command_buffer
    }

    /// Waits for the current slot to retire, then acquires the next image. On
    /// success the slot's command buffer is reset and ready for recording.
    pub fn acquire(&mut self, dev: &RenderDevice, swapchain: &Swapchain) -> Result<AcquireOutcome> {
        let slot = self.pacer.begin_acquire();
        wait_for_fence(dev, self.frames[slot].in_flight)?;

        let outcome = swapchain.acquire_next_image(self.frames[slot].image_available)?;
        let AcquireOutcome::Ready { image_index, .. } = outcome else {
            self.pacer.needs_rebuild();
            return Ok(outcome);
        };

        if let Some(other) = self.pacer.acquired(image_index) {
            wait_for_fence(dev, self.frames[other].in_flight)?;
        }

        unsafe {
            dev.logical
                .reset_command_buffer(
                    self.frames[slot].command_buffer,
                    vk::CommandBufferResetFlags::empty(),
                )
                .map_err(|err| vk_error(err, "command buffer reset"))?;
            dev.logical
                .begin_command_buffer(
                    self.frames[slot].command_buffer,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .map_err(|err| vk_error(err, "command buffer begin"))?;
        }

        Ok(outcome)
    }

    /// Ends recording, submits the slot's command buffer and presents the acquired
    /// image. Advances to the next slot even when the swapchain reports it is stale.
    pub fn submit_and_present(
        &mut self,
        dev: &RenderDevice,
        swapchain: &Swapchain,
    ) -> Result<PresentOutcome> {
        let image_index = self
            .pacer
            .current_image()
            .ok_or_else(|| eyre!("No swapchain image acquired in state {:?}", self.pacer.state()))?;
        let frame = &self.frames[self.pacer.frame_index()];

        unsafe {
            dev.logical
                .end_command_buffer(frame.command_buffer)
                .map_err(|err| vk_error(err, "command buffer end"))?;
            dev.logical
                .reset_fences(&[frame.in_flight])
                .map_err(|err| vk_error(err, "fence reset"))?;
        }

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            dev.logical
                .queue_submit(dev.graphics_queue.handle, &[submit_info], frame.in_flight)
                .map_err(|err| vk_error(err, "queue submit"))?;
        }
        self.pacer.submitted();

        let outcome = swapchain.present(&dev.present_queue, image_index, frame.render_finished)?;
        self.pacer.presented();
        if outcome != PresentOutcome::Presented {
            self.pacer.needs_rebuild();
        }
        Ok(outcome)
    }

    /// Call after the swapchain was recreated and the device is idle
    pub fn swapchain_rebuilt(&mut self, image_count: usize) {
        self.pacer.rebuilt(image_count);
    }

    pub fn free(&mut self, dev: &RenderDevice) {
        let buffers = self.frames.iter().map(|f| f.command_buffer).collect::<Vec<_>>();
        dev.free_command_buffers(&buffers);
    }
}

fn wait_for_fence(dev: &RenderDevice, fence: vk::Fence) -> Result<()> {
    unsafe {
        dev.logical
            .wait_for_fences(&[fence], true, u64::MAX)
            .map_err(|err| vk_error(err, "frame fence wait"))
    }
}
