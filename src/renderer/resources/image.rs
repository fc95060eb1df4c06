use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::internals::barrier;
use crate::renderer::resources::buffer::Buffer;

/// Everything needed to create an [`Image`]
#[derive(Debug, Clone)]
pub struct ImageDesc {
    pub name: String,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
}

impl ImageDesc {
    pub fn new_2d(
        name: impl Into<String>,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            name: name.into(),
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            usage,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }
}

/// Bytes per texel for the formats `Image::upload` accepts. Block-compressed and
/// depth formats return `None`.
pub fn texel_size(format: vk::Format) -> Option<u64> {
    let size = match format {
        vk::Format::R8_UNORM | vk::Format::R8_SRGB => 1,
        vk::Format::R8G8_UNORM | vk::Format::R8G8_SRGB => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::R32_SFLOAT => 4,
        vk::Format::R16G16B16A16_SFLOAT => 8,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        _ => return None,
    };
    Some(size)
}

/// Size in bytes of tightly packed texel data covering every layer of mip level 0
pub fn upload_size(format: vk::Format, extent: vk::Extent3D, array_layers: u32) -> Result<u64> {
    let texel = texel_size(format)
        .ok_or_else(|| eyre!("Uploads are not supported for format {:?}", format))?;
    Ok(extent.width as u64
        * extent.height as u64
        * extent.depth as u64
        * array_layers as u64
        * texel)
}

/// Fails unless `len` bytes are exactly mip level 0 of an image with a single mip level
pub fn check_upload(
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    len: usize,
) -> Result<()> {
    if mip_levels != 1 {
        return Err(eyre!(
            "Cannot upload into an image with {} mip levels, only level 0 would be written",
            mip_levels,
        ));
    }
    let expected = upload_size(format, extent, array_layers)?;
    if len as u64 != expected {
        return Err(eyre!(
            "Upload of {} bytes does not match {}x{} {:?} image ({} bytes expected)",
            len,
            extent.width,
            extent.height,
            format,
            expected,
        ));
    }
    Ok(())
}

/// A GPU image and the dedicated memory block backing it
pub struct Image {
    pub image: vk::Image,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,

    allocation: Option<Allocation>, // GPU-only memory block
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    // NOTE: the memory of the returned image is GPU-only and holds no data yet.
    // Attachments are written by render passes; sampled images need `upload()`.
    pub fn new(desc: &ImageDesc, dev: &RenderDevice) -> Result<Self> {
        let device = dev.logical.clone();
        let memory_allocator = dev.memory_allocator();

        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(desc.format)
                .usage(desc.usage)
                .extent(desc.extent)
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(desc.mip_levels)
                .array_layers(desc.array_layers)
                .samples(desc.samples)
                .tiling(desc.tiling)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { device.create_image(&info, None)? }
        };
        let reqs = unsafe { device.get_image_memory_requirements(image) };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: &desc.name,
                requirements: reqs,
                location: MemoryLocation::GpuOnly,
                linear: desc.tiling == vk::ImageTiling::LINEAR,
                allocation_scheme: AllocationScheme::DedicatedImage(image),
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(eyre!("No memory type for image '{}': {}", desc.name, err));
            }
        };
        unsafe {
            device.bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        log::debug!(
            "Created image '{}' {:?} {}x{}",
            desc.name,
            desc.format,
            desc.extent.width,
            desc.extent.height,
        );

        Ok(Self {
            image,
            format: desc.format,
            extent: desc.extent,
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,

            allocation: Some(allocation),
            memory_allocator,
            device,
        })
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    /// Records a layout transition into the caller's command buffer.
    pub fn transition_layout(
        &self,
        cmd: vk::CommandBuffer,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<()> {
        barrier::transition_image_layout(
            &self.device,
            cmd,
            self.image,
            aspect,
            self.mip_levels,
            self.array_layers,
            old_layout,
            new_layout,
        )
    }

    /// Transitions the image in a one-shot command buffer and waits for completion.
    pub fn transition_layout_immediate(
        &self,
        dev: &RenderDevice,
        aspect: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<()> {
        dev.immediate_submit(|cmd, _| {
            self.transition_layout(cmd, aspect, old_layout, new_layout)
        })
    }

    /// Copies tightly packed texel data from `buffer` into mip level 0.
    /// The image must be in TRANSFER_DST_OPTIMAL.
    pub fn copy_from_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: &Buffer,
        aspect: vk::ImageAspectFlags,
    ) {
        let copy_region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: self.array_layers,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: self.extent,
        };

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                cmd,
                buffer.buffer,
                self.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy_region],
            );
        }
    }

    /// Uploads color texel data through a staging buffer and leaves the image in
    /// SHADER_READ_ONLY_OPTIMAL. `data` must hold exactly mip level 0 of every layer;
    /// images with more than one mip level are rejected.
    pub fn upload(&mut self, data: &[u8], dev: &RenderDevice) -> Result<()> {
        check_upload(self.format, self.extent, self.mip_levels, self.array_layers, data.len())?;

        let mut staging_buffer = Buffer::new(
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "Image staging buffer",
            MemoryLocation::CpuToGpu,
            dev,
        )?;
        staging_buffer.write(data, 0)?;

        dev.immediate_submit(|cmd, _| {
            let aspect = vk::ImageAspectFlags::COLOR;
            self.transition_layout(
                cmd,
                aspect,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            self.copy_from_buffer(cmd, &staging_buffer, aspect);
            self.transition_layout(
                cmd,
                aspect,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        log::error!("Failed to free image memory: {}", err);
                    }
                }
                Err(err) => log::error!("Memory allocator poisoned: {}", err),
            }
        }
    }
}

/// A view over one [`Image`]. Holds only the raw image handle; the view must be
/// dropped before the image it was created from.
pub struct ImageView {
    pub view: vk::ImageView,
    pub aspect: vk::ImageAspectFlags,
    device: Arc<ash::Device>,
}

impl ImageView {
    pub fn new(image: &Image, aspect: vk::ImageAspectFlags) -> Result<Self> {
        let view_type = if image.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let info = vk::ImageViewCreateInfo::default()
            .view_type(view_type)
            .image(image.image)
            .format(image.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: image.mip_levels,
                base_array_layer: 0,
                layer_count: image.array_layers,
            });
        let view = unsafe { image.device.create_image_view(&info, None)? };

        Ok(Self {
            view,
            aspect,
            device: image.device.clone(),
        })
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent3D {
        vk::Extent3D { width, height, depth: 1 }
    }

    #[test]
    fn test_upload_size_rgba8() {
        let size = upload_size(vk::Format::R8G8B8A8_SRGB, extent(64, 64), 1).unwrap();
        assert_eq!(size, 64 * 64 * 4);
        assert_ne!(size, 16);
    }

    #[test]
    fn test_upload_size_counts_layers_and_texel_width() {
        let size = upload_size(vk::Format::R16G16B16A16_SFLOAT, extent(8, 4), 6).unwrap();
        assert_eq!(size, 8 * 4 * 6 * 8);
        let size = upload_size(vk::Format::R8_UNORM, extent(3, 5), 1).unwrap();
        assert_eq!(size, 15);
    }

    #[test]
    fn test_upload_size_rejects_unsupported_formats() {
        assert!(upload_size(vk::Format::D32_SFLOAT, extent(4, 4), 1).is_err());
        assert!(upload_size(vk::Format::BC7_SRGB_BLOCK, extent(4, 4), 1).is_err());
        assert_eq!(texel_size(vk::Format::UNDEFINED), None);
    }

    #[test]
    fn test_short_upload_is_rejected() {
        let format = vk::Format::R8G8B8A8_UNORM;
        assert!(check_upload(format, extent(64, 64), 1, 1, 16).is_err());
        assert!(check_upload(format, extent(64, 64), 1, 1, 16384 + 4).is_err());
        assert!(check_upload(format, extent(64, 64), 1, 1, 16384).is_ok());
    }

    #[test]
    fn test_mipmapped_upload_is_rejected() {
        let format = vk::Format::R8G8B8A8_UNORM;
        assert!(check_upload(format, extent(64, 64), 7, 1, 16384).is_err());
    }
}
