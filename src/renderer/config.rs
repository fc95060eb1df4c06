use ash::vk;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Clear color used by every render pass for color attachments.
pub const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Clear value used by every render pass for depth/stencil attachments.
pub const CLEAR_DEPTH: f32 = 1.0;
pub const CLEAR_STENCIL: u32 = 0;

/// Renderer settings chosen once at startup
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub application_name: String,
    pub enable_validation: bool,
    pub preferred_present_mode: vk::PresentModeKHR,
    pub preferred_surface_format: vk::SurfaceFormatKHR,
    pub descriptor_pool: DescriptorPoolConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            application_name: "strata".into(),
            enable_validation: cfg!(debug_assertions),
            preferred_present_mode: vk::PresentModeKHR::MAILBOX,
            preferred_surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            descriptor_pool: DescriptorPoolConfig::default(),
        }
    }
}

/// Capacity of the shared descriptor pool owned by the render context
#[derive(Debug, Clone)]
pub struct DescriptorPoolConfig {
    pub max_sets: u32,
    pub pool_sizes: Vec<(vk::DescriptorType, u32)>,
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 1000,
            pool_sizes: vec![
                (vk::DescriptorType::UNIFORM_BUFFER, 1000),
                (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1000),
                (vk::DescriptorType::INPUT_ATTACHMENT, 100),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_prefers_mailbox_srgb() {
        let config = RenderConfig::default();
        assert_eq!(config.preferred_present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.preferred_surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.enable_validation, cfg!(debug_assertions));
    }

    #[test]
    fn test_default_pool_has_room_for_global_sets() {
        let config = DescriptorPoolConfig::default();
        assert!(config.max_sets as usize >= MAX_FRAMES_IN_FLIGHT);
        assert!(config
            .pool_sizes
            .iter()
            .any(|(ty, count)| *ty == vk::DescriptorType::UNIFORM_BUFFER && *count > 0));
    }
}
