use ash::vk;
use color_eyre::Result;
use crate::renderer::resources::descriptors::layout::{DescriptorSetLayout, LayoutBindings};
use crate::renderer::resources::descriptors::pool::DescriptorPool;

enum PendingInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

struct PendingWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    info: PendingInfo,
}

/// Collects writes against one layout and flushes them in a single update.
/// Every write is checked against the layout: the binding must exist, hold exactly
/// one descriptor, and be of a matching kind.
pub struct DescriptorWriter<'a> {
    bindings: &'a LayoutBindings,
    layout: &'a DescriptorSetLayout,
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self {
            bindings: layout.bindings(),
            layout,
            writes: Vec::new(),
        }
    }

    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        let descriptor_type = checked_type(self.bindings, binding, is_buffer_type, "buffer");
        self.writes.push(PendingWrite {
            binding,
            descriptor_type,
            info: PendingInfo::Buffer(info),
        });
        self
    }

    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        let descriptor_type = checked_type(self.bindings, binding, is_image_type, "image");
        self.writes.push(PendingWrite {
            binding,
            descriptor_type,
            info: PendingInfo::Image(info),
        });
        self
    }

    /// Allocates a set from `pool` and writes everything into it. `Ok(None)` when
    /// the pool has no room left.
    pub fn build(self, pool: &mut DescriptorPool) -> Result<Option<vk::DescriptorSet>> {
        let Some(set) = pool.allocate(self.layout)? else {
            return Ok(None);
        };
        self.overwrite(pool.device(), set);
        Ok(Some(set))
    }

    /// Rewrites an already allocated set
    pub fn overwrite(&self, device: &ash::Device, set: vk::DescriptorSet) {
        let writes = self
            .writes
            .iter()
            .map(|write| {
                let vk_write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(write.descriptor_type);
                match &write.info {
                    PendingInfo::Buffer(info) => vk_write.buffer_info(std::slice::from_ref(info)),
                    PendingInfo::Image(info) => vk_write.image_info(std::slice::from_ref(info)),
                }
            })
            .collect::<Vec<_>>();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

fn checked_type(
    bindings: &LayoutBindings,
    binding: u32,
    accepts: fn(vk::DescriptorType) -> bool,
    kind: &str,
) -> vk::DescriptorType {
    let desc = bindings.expect_single(binding);
    assert!(
        accepts(desc.descriptor_type),
        "Binding {} is {:?} and cannot take {} writes",
        binding,
        desc.descriptor_type,
        kind,
    );
    desc.descriptor_type
}

fn is_buffer_type(ty: vk::DescriptorType) -> bool {
    matches!(
        ty,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

fn is_image_type(ty: vk::DescriptorType) -> bool {
    matches!(
        ty,
        vk::DescriptorType::SAMPLER
            | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::INPUT_ATTACHMENT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::resources::descriptors::layout::BindingDesc;

    fn bindings() -> LayoutBindings {
        LayoutBindings::new(&[
            BindingDesc::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
            BindingDesc::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
            BindingDesc::input_attachment(2),
        ])
    }

    #[test]
    fn test_checked_type_takes_the_layout_type() {
        let bindings = bindings();
        assert_eq!(
            checked_type(&bindings, 0, is_buffer_type, "buffer"),
            vk::DescriptorType::UNIFORM_BUFFER,
        );
        assert_eq!(
            checked_type(&bindings, 2, is_image_type, "image"),
            vk::DescriptorType::INPUT_ATTACHMENT,
        );
    }

    #[test]
    #[should_panic(expected = "cannot take image writes")]
    fn test_image_write_to_buffer_binding_panics() {
        checked_type(&bindings(), 0, is_image_type, "image");
    }

    #[test]
    #[should_panic(expected = "cannot take buffer writes")]
    fn test_buffer_write_to_sampler_binding_panics() {
        checked_type(&bindings(), 1, is_buffer_type, "buffer");
    }

    #[test]
    #[should_panic(expected = "does not contain binding 7")]
    fn test_write_to_unknown_binding_panics() {
        checked_type(&bindings(), 7, is_buffer_type, "buffer");
    }
}
