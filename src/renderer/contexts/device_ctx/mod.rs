pub mod device;
pub mod instance;
pub mod queue;
pub mod target;
pub mod transfer_ctx;

use color_eyre::Result;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::target::RenderTarget;
use crate::renderer::window::RenderWindow;

/// Responsibilities:
/// - Manage the Vulkan instance, device, and queues
/// - Own the presentation target when there is a window
///
/// Field order is drop order: the target goes before the device, the device
/// before the instance.
pub struct RenderDeviceContext {
    pub target: Option<RenderTarget>,
    pub device: RenderDevice,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    /// Without a window the context is headless and only renders offscreen.
    pub fn new(window: Option<&dyn RenderWindow>, config: &RenderConfig) -> Result<Self> {
        let instance = RenderInstance::new(window, config)?;
        let surface = match window {
            Some(window) => Some(instance.create_surface(window)?),
            None => None,
        };
        let device = instance.create_device(surface.as_ref())?;
        let target = match (window, surface) {
            (Some(window), Some(surface)) => Some(RenderTarget::new(
                &instance,
                &device,
                surface,
                window.extent(),
                config,
            )?),
            _ => None,
        };

        Ok(Self {
            target,
            device,
            instance,
        })
    }
}
