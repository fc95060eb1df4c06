use std::hash::Hash;
use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family: QueueFamily,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
    supports_present: bool,
}

impl QueueFamily {
    pub fn new(
        index: u32,
        properties: vk::QueueFamilyProperties,
        supports_present: bool
    ) -> Self {
        Self {
            index,
            properties,
            supports_present,
        }
    }

    pub fn supports_present(&self) -> bool {
        self.supports_present
    }

    pub fn supports_graphics(&self) -> bool {
        self.properties.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    }
}

impl PartialEq for QueueFamily {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for QueueFamily {}

impl Hash for QueueFamily {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

/// Picks the graphics and present queue family indices from a device's family list.
///
/// A family that can do both is preferred so that swapchain images never change
/// queue ownership. `supports_present` is queried per family index.
pub fn select_queue_families(
    props: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<(u32, u32)> {
    let graphics = |q: &vk::QueueFamilyProperties| {
        q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    };

    if let Some(both) = props
        .iter()
        .enumerate()
        .position(|(i, q)| graphics(q) && supports_present(i as u32))
    {
        return Some((both as u32, both as u32));
    }

    let graphics_index = props.iter().position(graphics)?;
    let present_index = (0..props.len() as u32).find(|i| supports_present(*i))?;
    Some((graphics_index as u32, present_index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_family_with_graphics_and_present() {
        let props = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let selected = select_queue_families(&props, |i| i != 0);
        assert_eq!(selected, Some((2, 2)));
    }

    #[test]
    fn test_falls_back_to_separate_present_family() {
        let props = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let selected = select_queue_families(&props, |i| i == 1);
        assert_eq!(selected, Some((0, 1)));
    }

    #[test]
    fn test_no_graphics_family_is_rejected() {
        let props = [family(vk::QueueFlags::TRANSFER)];
        assert_eq!(select_queue_families(&props, |_| true), None);
    }
}
