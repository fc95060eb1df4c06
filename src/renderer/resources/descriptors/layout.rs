use std::collections::BTreeMap;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;

/// One binding slot of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingDesc {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    pub count: u32,
}

impl BindingDesc {
    pub fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            stages,
            count: 1,
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    pub fn uniform_buffer(binding: u32, stages: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::UNIFORM_BUFFER, stages)
    }

    pub fn combined_image_sampler(binding: u32, stages: vk::ShaderStageFlags) -> Self {
        Self::new(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stages)
    }

    pub fn input_attachment(binding: u32) -> Self {
        Self::new(binding, vk::DescriptorType::INPUT_ATTACHMENT, vk::ShaderStageFlags::FRAGMENT)
    }
}

/// The binding table of a layout, keyed by binding index
#[derive(Debug, Clone, Default)]
pub struct LayoutBindings {
    bindings: BTreeMap<u32, BindingDesc>,
}

impl LayoutBindings {
    /// Panics if two entries share a binding index.
    pub fn new(bindings: &[BindingDesc]) -> Self {
        let mut table = BTreeMap::new();
        for binding in bindings {
            let previous = table.insert(binding.binding, *binding);
            assert!(
                previous.is_none(),
                "Descriptor binding {} is declared more than once",
                binding.binding,
            );
        }
        Self { bindings: table }
    }

    pub fn get(&self, binding: u32) -> Option<&BindingDesc> {
        self.bindings.get(&binding)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BindingDesc> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Looks up the binding a single-descriptor write targets. Panics when the
    /// binding is absent or expects an array of descriptors.
    pub fn expect_single(&self, binding: u32) -> &BindingDesc {
        let desc = self
            .bindings
            .get(&binding)
            .unwrap_or_else(|| panic!("Layout does not contain binding {}", binding));
        assert_eq!(
            desc.count, 1,
            "Binding {} expects {} descriptors but a single one was written",
            binding, desc.count,
        );
        desc
    }

    fn vk_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings
            .values()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stages)
            })
            .collect()
    }
}

pub struct DescriptorSetLayout {
    pub layout: vk::DescriptorSetLayout,
    bindings: LayoutBindings,
    device: Arc<ash::Device>,
}

impl DescriptorSetLayout {
    pub fn new(dev: &RenderDevice, bindings: &[BindingDesc]) -> Result<Self> {
        let bindings = LayoutBindings::new(bindings);
        let vk_bindings = bindings.vk_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&vk_bindings);
        let layout = unsafe {
            dev.logical.create_descriptor_set_layout(&layout_info, None)?
        };

        Ok(Self {
            layout,
            bindings,
            device: dev.logical.clone(),
        })
    }

    pub fn bindings(&self) -> &LayoutBindings {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_are_recorded_by_index() {
        let bindings = LayoutBindings::new(&[
            BindingDesc::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
            BindingDesc::uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS),
        ]);
        assert_eq!(bindings.len(), 2);
        let ubo = bindings.get(0).unwrap();
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.stages, vk::ShaderStageFlags::ALL_GRAPHICS);
        assert_eq!(ubo.count, 1);

        let order = bindings.iter().map(|b| b.binding).collect::<Vec<_>>();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    #[should_panic(expected = "declared more than once")]
    fn test_duplicate_binding_panics() {
        LayoutBindings::new(&[
            BindingDesc::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
            BindingDesc::input_attachment(0),
        ]);
    }

    #[test]
    #[should_panic(expected = "does not contain binding 3")]
    fn test_write_to_missing_binding_panics() {
        let bindings = LayoutBindings::new(&[BindingDesc::input_attachment(0)]);
        bindings.expect_single(3);
    }

    #[test]
    #[should_panic(expected = "expects 4 descriptors")]
    fn test_single_write_to_array_binding_panics() {
        let bindings = LayoutBindings::new(&[
            BindingDesc::combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT).with_count(4),
        ]);
        bindings.expect_single(0);
    }
}
