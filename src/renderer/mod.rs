pub mod config;
pub mod contexts;
pub mod graph;
pub mod internals;
pub mod resources;
pub mod scene;
pub mod shader_data;
pub mod targets;
pub mod window;

use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::target::RenderTarget;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::pacer::FrameState;
use crate::renderer::contexts::frame_ctx::RenderFrameContext;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::internals::swapchain::{AcquireOutcome, PresentOutcome};
use crate::renderer::targets::is_drawable;
use crate::renderer::window::RenderWindow;

/// One frame between [`Renderer::begin_frame`] and [`Renderer::end_frame`].
/// Record into `command_buffer`; it is already in the recording state.
pub struct FrameContext {
    pub frame_index: usize,
    pub image_index: u32,
    pub command_buffer: vk::CommandBuffer,
    pub global_set: vk::DescriptorSet,
    pub extent: vk::Extent2D,
}

/// What [`Renderer::begin_frame`] does before touching the swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// Nothing to draw into, keep any pending rebuild for later
    Skip,
    Rebuild,
    Acquire,
}

pub fn frame_action(extent: vk::Extent2D, rebuild_requested: bool, state: FrameState) -> FrameAction {
    if !is_drawable(extent) {
        FrameAction::Skip
    } else if rebuild_requested || state == FrameState::NeedsRebuild {
        FrameAction::Rebuild
    } else {
        FrameAction::Acquire
    }
}

/// Whether the swapchain has to be rebuilt before the next frame. A suboptimal
/// image is still drawn and presented; only the frame after it rebuilds.
pub fn rebuild_after_acquire(outcome: AcquireOutcome) -> bool {
    match outcome {
        AcquireOutcome::Ready { suboptimal, .. } => suboptimal,
        AcquireOutcome::OutOfDate => true,
    }
}

pub fn rebuild_after_present(outcome: PresentOutcome) -> bool {
    outcome != PresentOutcome::Presented
}

pub struct Renderer {
    // Field order is drop order
    frm: RenderFrameContext,
    res: RenderResourceContext,
    dev: RenderDeviceContext,

    window: Arc<dyn RenderWindow>,
    config: RenderConfig,
    rebuild_requested: bool,
}

impl Renderer {
    pub fn new(window: Arc<dyn RenderWindow>, config: RenderConfig) -> Result<Self> {
        let dev = RenderDeviceContext::new(Some(window.as_ref()), &config)?;
        let res = RenderResourceContext::new(&dev.device, &config)?;
        let image_count = dev
            .target
            .as_ref()
            .ok_or_eyre("Renderer needs a presentation target")?
            .image_count();
        let frm = RenderFrameContext::new(&dev.device, image_count)?;

        log::info!("Renderer initialized with {} swapchain images", image_count);

        Ok(Self {
            frm,
            res,
            dev,
            window,
            config,
            rebuild_requested: false,
        })
    }

    /// Waits for the current frame slot, acquires a swapchain image and starts
    /// recording. Returns `None` when no frame can be drawn right now: the
    /// swapchain was just rebuilt, or the window is minimized.
    pub fn begin_frame(&mut self) -> Result<Option<FrameContext>> {
        if self.window.take_resized() {
            self.rebuild_requested = true;
        }
        let action = frame_action(self.window.extent(), self.rebuild_requested, self.frm.state());
        match action {
            FrameAction::Skip => return Ok(None),
            FrameAction::Rebuild => {
                if !self.rebuild_swapchain()? {
                    return Ok(None);
                }
            }
            FrameAction::Acquire => {}
        }

        let target = self.dev.target.as_ref().ok_or_eyre("Presentation target missing")?;
        let outcome = self.frm.acquire(&self.dev.device, target.swapchain())?;
        if rebuild_after_acquire(outcome) {
            self.rebuild_requested = true;
        }
        let image_index = match outcome {
            AcquireOutcome::Ready { image_index, .. } => image_index,
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date on acquire");
                self.rebuild_swapchain()?;
                return Ok(None);
            }
        };

        let frame_index = self.frm.frame_index();
        Ok(Some(FrameContext {
            frame_index,
            image_index,
            command_buffer: self.frm.command_buffer(),
            global_set: self.res.global_set(frame_index),
            extent: target.extent(),
        }))
    }

    pub fn begin_swapchain_pass(&self, frame: &FrameContext) -> Result<()> {
        let target = self.target()?;
        let framebuffer = target
            .framebuffer(frame.image_index)
            .ok_or_else(|| eyre!("No framebuffer for swapchain image {}", frame.image_index))?;
        target.render_pass().start(framebuffer, frame.command_buffer);
        Ok(())
    }

    pub fn end_swapchain_pass(&self, frame: &FrameContext) -> Result<()> {
        self.target()?.render_pass().end(frame.command_buffer);
        Ok(())
    }

    /// Submits the frame's commands and presents its image
    pub fn end_frame(&mut self, frame: FrameContext) -> Result<()> {
        let target = self.dev.target.as_ref().ok_or_eyre("Presentation target missing")?;
        let outcome = self.frm.submit_and_present(&self.dev.device, target.swapchain())?;
        if rebuild_after_present(outcome) {
            log::debug!("Present reported {:?} for image {}", outcome, frame.image_index);
            self.rebuild_requested = true;
        }
        Ok(())
    }

    /// Returns false when the rebuild had to be deferred because the window has
    /// no drawable area.
    fn rebuild_swapchain(&mut self) -> Result<bool> {
        let extent = self.window.extent();
        if !is_drawable(extent) {
            log::trace!("Deferring swapchain rebuild for empty extent");
            return Ok(false);
        }

        let dev = &mut self.dev;
        let target = dev.target.as_mut().ok_or_eyre("Presentation target missing")?;
        target.rebuild(&dev.instance, &dev.device, extent, &self.config)?;
        self.frm.swapchain_rebuilt(target.image_count());
        self.rebuild_requested = false;
        Ok(true)
    }

    fn target(&self) -> Result<&RenderTarget> {
        self.dev.target.as_ref().ok_or_eyre("Presentation target missing")
    }

    pub fn device(&self) -> &RenderDevice {
        &self.dev.device
    }

    pub fn resources(&self) -> &RenderResourceContext {
        &self.res
    }

    pub fn resources_mut(&mut self) -> &mut RenderResourceContext {
        &mut self.res
    }

    /// Both halves at once, for building pipelines and descriptor sets
    pub fn device_and_resources(&mut self) -> (&RenderDevice, &mut RenderResourceContext) {
        (&self.dev.device, &mut self.res)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.dev
            .target
            .as_ref()
            .map_or(vk::Extent2D::default(), RenderTarget::extent)
    }

    pub fn swapchain_render_pass(&self) -> Result<vk::RenderPass> {
        Ok(self.target()?.render_pass().render_pass())
    }

    pub fn frame_index(&self) -> usize {
        self.frm.frame_index()
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.dev.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.dev.device.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {}", err);
        }
        self.frm.free(&self.dev.device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: vk::Extent2D = vk::Extent2D { width: 1280, height: 720 };
    const MINIMIZED: vk::Extent2D = vk::Extent2D { width: 0, height: 0 };

    #[test]
    fn test_steady_state_acquires() {
        for state in [FrameState::Idle, FrameState::Presented, FrameState::FrameInFlight] {
            assert_eq!(frame_action(WINDOW, false, state), FrameAction::Acquire);
        }
    }

    #[test]
    fn test_resize_or_stale_swapchain_rebuilds() {
        assert_eq!(frame_action(WINDOW, true, FrameState::Presented), FrameAction::Rebuild);
        assert_eq!(frame_action(WINDOW, false, FrameState::NeedsRebuild), FrameAction::Rebuild);
        assert_eq!(frame_action(WINDOW, true, FrameState::NeedsRebuild), FrameAction::Rebuild);
    }

    #[test]
    fn test_zero_extent_skips_even_with_pending_rebuild() {
        assert_eq!(frame_action(MINIMIZED, false, FrameState::Idle), FrameAction::Skip);
        assert_eq!(frame_action(MINIMIZED, true, FrameState::Presented), FrameAction::Skip);
        assert_eq!(
            frame_action(vk::Extent2D { width: 1280, height: 0 }, false, FrameState::NeedsRebuild),
            FrameAction::Skip,
        );
    }

    #[test]
    fn test_rebuild_is_not_repeated_once_done() {
        // Two resize events to the same extent collapse into one rebuild
        let mut rebuild_requested = true;
        let mut rebuilds = 0;
        for _ in 0..2 {
            if frame_action(WINDOW, rebuild_requested, FrameState::Presented) == FrameAction::Rebuild {
                rebuilds += 1;
                rebuild_requested = false;
            }
        }
        assert_eq!(rebuilds, 1);
    }

    #[test]
    fn test_suboptimal_acquire_draws_then_rebuilds() {
        let outcome = AcquireOutcome::Ready { image_index: 1, suboptimal: true };
        assert!(rebuild_after_acquire(outcome));
        assert!(matches!(outcome, AcquireOutcome::Ready { image_index: 1, .. }));
        assert_eq!(frame_action(WINDOW, true, FrameState::Presented), FrameAction::Rebuild);

        assert!(!rebuild_after_acquire(AcquireOutcome::Ready { image_index: 0, suboptimal: false }));
        assert!(rebuild_after_acquire(AcquireOutcome::OutOfDate));
    }

    #[test]
    fn test_present_outcomes() {
        assert!(!rebuild_after_present(PresentOutcome::Presented));
        assert!(rebuild_after_present(PresentOutcome::Suboptimal));
        assert!(rebuild_after_present(PresentOutcome::OutOfDate));
    }
}
