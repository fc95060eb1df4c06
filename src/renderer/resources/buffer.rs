use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::{eyre, OptionExt};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::contexts::device_ctx::device::RenderDevice;

pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_loc: MemoryLocation,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let device = dev.logical.clone();
        let mem_allocator = dev.memory_allocator();

        let buffer = {
            let buffer_info = vk::BufferCreateInfo {
                size,
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                ..Default::default()
            };
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };
        let allocation = mem_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: mem_loc,
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer)
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(eyre!("No memory type for buffer '{}': {}", name, err));
            }
        };

        unsafe {
            device.bind_buffer_memory(
                buffer,
                allocation.memory(),
                allocation.offset(),
            )?;
        }

        Ok(Self {
            buffer,
            size,

            allocation: Some(allocation),
            memory_allocator: mem_allocator,
            device,
        })
    }

    /// Creates a GPU-only buffer and fills it through a staging buffer.
    pub fn new_device_local_with_data<T: Copy>(
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let size = std::mem::size_of_val(data) as u64;
        let mut staging = Self::new(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "Buffer staging buffer",
            MemoryLocation::CpuToGpu,
            dev,
        )?;
        staging.write(data, 0)?;

        let buffer = Self::new(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            name,
            MemoryLocation::GpuOnly,
            dev,
        )?;
        staging.copy_to(&buffer, size, dev)?;

        Ok(buffer)
    }

    /// Writes into host-visible memory. Fails for GPU-only buffers.
    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        let allocation = self
            .allocation
            .as_mut()
            .ok_or_eyre("Buffer memory already released")?;
        if allocation.mapped_ptr().is_none() {
            return Err(eyre!("Cannot write to buffer that is not host visible"));
        }
        Ok(presser::copy_from_slice_to_offset(
            data,
            allocation,
            start_offset,
        )?)
    }

    /// Copies `size` bytes into `dst` and waits for the copy to finish.
    pub fn copy_to(&self, dst: &Buffer, size: u64, dev: &RenderDevice) -> Result<()> {
        if size > self.size || size > dst.size {
            return Err(eyre!(
                "Copy of {} bytes exceeds buffer sizes ({} -> {})",
                size,
                self.size,
                dst.size,
            ));
        }
        dev.immediate_submit(|cmd, device| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe {
                device.cmd_copy_buffer(cmd, self.buffer, dst.buffer, &[region]);
            }
            Ok(())
        })
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: self.size,
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        log::error!("Failed to free buffer memory: {}", err);
                    }
                }
                Err(err) => log::error!("Memory allocator poisoned: {}", err),
            }
        }
    }
}
