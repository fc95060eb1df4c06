use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use ash::vk;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use winit::window::Window;

/// What the renderer needs from the windowing layer
pub trait RenderWindow: HasDisplayHandle + HasWindowHandle {
    /// Current drawable size in pixels
    fn extent(&self) -> vk::Extent2D;

    /// Returns true once after each resize and clears the flag.
    fn take_resized(&self) -> bool;
}

/// `RenderWindow` over a winit window. The application forwards
/// `WindowEvent::Resized` to [`WinitWindow::notify_resized`].
pub struct WinitWindow {
    window: Arc<Window>,
    resized: AtomicBool,
}

impl WinitWindow {
    pub fn new(window: Arc<Window>) -> Self {
        Self {
            window,
            resized: AtomicBool::new(false),
        }
    }

    pub fn notify_resized(&self) {
        self.resized.store(true, Ordering::Release);
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }
}

impl HasDisplayHandle for WinitWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl HasWindowHandle for WinitWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl RenderWindow for WinitWindow {
    fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn take_resized(&self) -> bool {
        self.resized.swap(false, Ordering::AcqRel)
    }
}

/// Clamps the window size into the surface's allowed range, unless the surface
/// dictates its own extent.
pub fn choose_surface_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_extent_wins_when_defined() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 1024, height: 768 },
            ..Default::default()
        };
        let extent = choose_surface_extent(&caps, vk::Extent2D { width: 10, height: 10 });
        assert_eq!(extent, vk::Extent2D { width: 1024, height: 768 });
    }

    #[test]
    fn test_window_extent_is_clamped() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 2048 },
            ..Default::default()
        };
        let extent = choose_surface_extent(&caps, vk::Extent2D { width: 8000, height: 600 });
        assert_eq!(extent, vk::Extent2D { width: 4096, height: 600 });
    }
}
