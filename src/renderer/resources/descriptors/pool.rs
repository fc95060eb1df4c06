use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_descriptor::{
    CreatePoolError, DescriptorDevice, DescriptorPoolCreateFlags, DescriptorTotalCount,
    DeviceAllocationError,
};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::descriptors::layout::DescriptorSetLayout;

/// Fixed-capacity pool of descriptor sets
pub struct DescriptorPool {
    pub pool: vk::DescriptorPool,
    pub max_sets: u32,
    device: DescriptorAshDevice,
}

impl DescriptorPool {
    pub fn new(
        dev: &RenderDevice,
        max_sets: u32,
        pool_sizes: &[(vk::DescriptorType, u32)],
    ) -> Result<Self> {
        let device = DescriptorAshDevice::from(dev.logical.clone());
        let total = total_count(pool_sizes)?;
        let pool = unsafe {
            device.create_descriptor_pool(
                &total,
                max_sets,
                DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            )
        }
        .map_err(|err| eyre!("Failed to create descriptor pool: {:?}", err))?;

        Ok(Self {
            pool,
            max_sets,
            device,
        })
    }

    /// Allocates one set. `Ok(None)` means the pool is exhausted and the caller
    /// should fall back to a fresh or larger pool.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> Result<Option<vk::DescriptorSet>> {
        let mut sets: smallvec::SmallVec<[vk::DescriptorSet; 1]> = smallvec::SmallVec::new();
        let result = unsafe {
            self.device.alloc_descriptor_sets(
                &mut self.pool,
                std::iter::once(&layout.layout),
                &mut sets,
            )
        };
        match result {
            Ok(()) => Ok(sets.into_iter().next()),
            Err(DeviceAllocationError::OutOfPoolMemory)
            | Err(DeviceAllocationError::FragmentedPool) => {
                log::warn!("Descriptor pool exhausted ({} sets max)", self.max_sets);
                Ok(None)
            }
            Err(err) => Err(eyre!("Failed to allocate descriptor set: {:?}", err)),
        }
    }

    pub fn device(&self) -> &ash::Device {
        &self.device.0
    }

    pub fn free(&mut self, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.device
                .dealloc_descriptor_sets(&mut self.pool, sets.iter().copied());
        }
    }

    /// Returns every set allocated from this pool
    pub fn reset(&mut self) -> Result<()> {
        unsafe {
            self.device.0.reset_descriptor_pool(
                self.pool,
                vk::DescriptorPoolResetFlags::empty(),
            )?;
        }
        Ok(())
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool);
        }
    }
}

/// Folds `(type, count)` pairs into per-type totals. Repeated types add up.
pub fn total_count(pool_sizes: &[(vk::DescriptorType, u32)]) -> Result<DescriptorTotalCount> {
    let mut total = DescriptorTotalCount::default();
    for (ty, count) in pool_sizes {
        let slot = match *ty {
            vk::DescriptorType::SAMPLER => &mut total.sampler,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER => &mut total.combined_image_sampler,
            vk::DescriptorType::SAMPLED_IMAGE => &mut total.sampled_image,
            vk::DescriptorType::STORAGE_IMAGE => &mut total.storage_image,
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER => &mut total.uniform_texel_buffer,
            vk::DescriptorType::STORAGE_TEXEL_BUFFER => &mut total.storage_texel_buffer,
            vk::DescriptorType::UNIFORM_BUFFER => &mut total.uniform_buffer,
            vk::DescriptorType::STORAGE_BUFFER => &mut total.storage_buffer,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => &mut total.uniform_buffer_dynamic,
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => &mut total.storage_buffer_dynamic,
            vk::DescriptorType::INPUT_ATTACHMENT => &mut total.input_attachment,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => &mut total.acceleration_structure,
            other => return Err(eyre!("Unsupported descriptor pool type: {:?}", other)),
        };
        *slot += count;
    }
    Ok(total)
}

pub struct DescriptorAshDevice(pub Arc<ash::Device>);

impl From<Arc<ash::Device>> for DescriptorAshDevice {
    fn from(device: Arc<ash::Device>) -> Self {
        Self(device)
    }
}

impl DescriptorDevice<vk::DescriptorSetLayout, vk::DescriptorPool, vk::DescriptorSet>
for DescriptorAshDevice
{
    unsafe fn create_descriptor_pool(
        &self,
        descriptor_count: &DescriptorTotalCount,
        max_sets: u32,
        flags: DescriptorPoolCreateFlags,
    ) -> Result<vk::DescriptorPool, CreatePoolError> {
        let counts = [
            (vk::DescriptorType::SAMPLER, descriptor_count.sampler),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count.combined_image_sampler),
            (vk::DescriptorType::SAMPLED_IMAGE, descriptor_count.sampled_image),
            (vk::DescriptorType::STORAGE_IMAGE, descriptor_count.storage_image),
            (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, descriptor_count.uniform_texel_buffer),
            (vk::DescriptorType::STORAGE_TEXEL_BUFFER, descriptor_count.storage_texel_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER, descriptor_count.uniform_buffer),
            (vk::DescriptorType::STORAGE_BUFFER, descriptor_count.storage_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, descriptor_count.uniform_buffer_dynamic),
            (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, descriptor_count.storage_buffer_dynamic),
            (vk::DescriptorType::INPUT_ATTACHMENT, descriptor_count.input_attachment),
            (vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, descriptor_count.acceleration_structure),
        ];
        let pool_sizes: smallvec::SmallVec<[vk::DescriptorPoolSize; 12]> = counts
            .iter()
            .filter(|(_, count)| *count != 0)
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: *count,
            })
            .collect();

        let mut ash_flags = vk::DescriptorPoolCreateFlags::empty();

        if flags.contains(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            ash_flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        }

        if flags.contains(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND) {
            ash_flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }

        let result = unsafe {
            self.0.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .max_sets(max_sets)
                    .pool_sizes(&pool_sizes)
                    .flags(ash_flags),
                None,
            )
        };

        match result {
            Ok(pool) => Ok(pool),
            Err(vk::Result::ERROR_FRAGMENTATION) => Err(CreatePoolError::Fragmentation),
            Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => Err(CreatePoolError::OutOfHostMemory),
            Err(err) => {
                log::error!("Unexpected descriptor pool creation result '{}'", err);
                Err(CreatePoolError::OutOfDeviceMemory)
            }
        }
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe {
            self.0.destroy_descriptor_pool(pool, None)
        }
    }

    unsafe fn alloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        layouts: impl ExactSizeIterator<Item = &'a vk::DescriptorSetLayout>,
        sets: &mut impl Extend<vk::DescriptorSet>,
    ) -> Result<(), DeviceAllocationError> {
        let set_layouts: smallvec::SmallVec<[_; 16]> = layouts.copied().collect();

        unsafe {
            match self.0.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default()
                    .set_layouts(&set_layouts)
                    .descriptor_pool(*pool),
            ) {
                Ok(allocated) => {
                    sets.extend(allocated);
                    Ok(())
                }
                Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => {
                    Err(DeviceAllocationError::OutOfHostMemory)
                }
                Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => {
                    Err(DeviceAllocationError::OutOfDeviceMemory)
                }
                Err(vk::Result::ERROR_FRAGMENTED_POOL) => Err(DeviceAllocationError::FragmentedPool),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => Err(DeviceAllocationError::OutOfPoolMemory),
                Err(err) => {
                    log::error!("Unexpected descriptor set allocation result '{}'", err);
                    Err(DeviceAllocationError::OutOfDeviceMemory)
                }
            }
        }
    }

    unsafe fn dealloc_descriptor_sets(
        &self,
        pool: &mut vk::DescriptorPool,
        sets: impl Iterator<Item = vk::DescriptorSet>,
    ) {
        let sets: smallvec::SmallVec<[_; 16]> = sets.collect();
        unsafe {
            if let Err(err) = self.0.free_descriptor_sets(*pool, &sets) {
                log::error!("Failed to free descriptor sets: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_count_accumulates_per_type() {
        let total = total_count(&[
            (vk::DescriptorType::UNIFORM_BUFFER, 10),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4),
            (vk::DescriptorType::UNIFORM_BUFFER, 6),
            (vk::DescriptorType::INPUT_ATTACHMENT, 8),
        ])
        .unwrap();
        assert_eq!(total.uniform_buffer, 16);
        assert_eq!(total.combined_image_sampler, 4);
        assert_eq!(total.input_attachment, 8);
        assert_eq!(total.storage_buffer, 0);
    }

    #[test]
    fn test_inline_uniform_blocks_are_rejected() {
        let result = total_count(&[(vk::DescriptorType::INLINE_UNIFORM_BLOCK, 64)]);
        assert!(result.is_err());
    }
}
