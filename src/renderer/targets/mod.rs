//! Offscreen render targets. Each one owns its attachments, framebuffer and
//! render pass, and rebuilds all of them together when resized.

pub mod gbuffer;
pub mod offscreen;

use ash::vk;
use crate::renderer::resources::attachment::FrameBufferAttachment;
use crate::renderer::resources::sampler::Sampler;

/// What an immediate-mode UI needs to show a target as a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiTexture {
    pub sampler: vk::Sampler,
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
}

impl UiTexture {
    /// The layout is where the attachment's render pass leaves it.
    pub fn of(sampler: &Sampler, attachment: &FrameBufferAttachment) -> Self {
        Self {
            sampler: sampler.sampler,
            view: attachment.view.view,
            layout: attachment.role().final_layout(),
        }
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: self.layout,
        }
    }
}

/// A zero-sized extent (minimized window) cannot back a framebuffer.
pub fn is_drawable(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

/// Whether a target built at `current` has to be recreated for `requested`.
/// Empty extents are skipped, and asking for the current extent again is a no-op.
pub fn needs_resize(current: vk::Extent2D, requested: vk::Extent2D) -> bool {
    is_drawable(requested) && requested != current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_changed_extent_needs_resize() {
        assert!(needs_resize(extent(800, 600), extent(1024, 768)));
        assert!(needs_resize(extent(800, 600), extent(800, 601)));
    }

    #[test]
    fn test_zero_extent_never_resizes() {
        assert!(!needs_resize(extent(800, 600), extent(0, 0)));
        assert!(!needs_resize(extent(800, 600), extent(0, 768)));
        assert!(!needs_resize(extent(800, 600), extent(1024, 0)));
    }

    #[test]
    fn test_same_extent_twice_is_one_resize() {
        let mut current = extent(800, 600);
        let requested = extent(1280, 720);
        let mut resizes = 0;
        for _ in 0..2 {
            if needs_resize(current, requested) {
                current = requested;
                resizes += 1;
            }
        }
        assert_eq!(resizes, 1);
        assert_eq!(current, requested);
        assert!(!needs_resize(current, current));
    }
}
