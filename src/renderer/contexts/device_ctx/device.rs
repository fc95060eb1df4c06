use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::str::Utf8Error;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt, Report};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::{self, Queue, QueueFamily};
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;

/// Owns the logical GPU context, the frame command pool and the memory allocator.
/// Created first and destroyed last; every other GPU object holds a clone of
/// `logical` and must be dropped before this.
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,

    pub graphics_queue: Arc<Queue>,
    pub present_queue: Arc<Queue>,

    instance: ash::Instance,
    command_pool: vk::CommandPool,
    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    transfer_context: ManuallyDrop<TransferContext>,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: Option<&(vk::SurfaceKHR, ash::khr::surface::Instance)>,
    ) -> Result<Self> {
        let (
            physical_device,
            graphics_queue_family,
            present_queue_family,
        ) = Self::select_physical_device(
            &instance.instance,
            surface,
        )?;

        let properties = unsafe {
            instance.instance.get_physical_device_properties(physical_device)
        };
        log::info!(
            "Selected GPU: {:?} ({:?})",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type,
        );

        let (
            logical_device,
            graphics_queue,
            present_queue,
        ) = Self::create_logical_device(
            &instance.instance,
            &physical_device,
            graphics_queue_family,
            present_queue_family,
            surface.is_some(),
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: true,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let logical_device = Arc::new(logical_device);
        let graphics_queue = Arc::new(graphics_queue);
        let present_queue = Arc::new(present_queue);

        let command_pool = {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_queue.family.index)
                // Frame command buffers are reset individually every frame
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            unsafe { logical_device.create_command_pool(&pool_info, None)? }
        };

        let transfer_context = TransferContext::new(
            graphics_queue.clone(),
            logical_device.clone(),
        )?;

        Ok(Self {
            logical: logical_device,
            physical: physical_device,
            properties,

            graphics_queue,
            present_queue,

            instance: instance.instance.clone(),
            command_pool,
            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            transfer_context: ManuallyDrop::new(transfer_context),
        })
    }

    pub fn memory_allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.memory_allocator)
    }

    /// Records commands into a one-shot command buffer, submits it and blocks until
    /// the GPU has executed it.
    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.transfer_context.immediate_submit(func)
    }

    /// Allocates primary command buffers from the device's command pool.
    /// Returns `Ok(None)` when the pool cannot satisfy the request.
    pub fn allocate_command_buffers(
        &self,
        count: u32,
    ) -> Result<Option<Vec<vk::CommandBuffer>>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        match unsafe { self.logical.allocate_command_buffers(&info) } {
            Ok(buffers) => Ok(Some(buffers)),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
            | Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => {
                log::warn!("Command pool exhausted while allocating {} buffers", count);
                Ok(None)
            }
            Err(err) => Err(vk_error(err, "command buffer allocation")),
        }
    }

    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        if command_buffers.is_empty() {
            return;
        }
        unsafe {
            self.logical.free_command_buffers(self.command_pool, command_buffers);
        }
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical
                .device_wait_idle()
                .map_err(|err| vk_error(err, "device wait idle"))
        }
    }

    /// Returns the first candidate whose tiling supports every requested feature.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Result<vk::Format> {
        pick_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical, format)
        })
        .ok_or_else(|| eyre!("No supported format among {:?} for {:?}", candidates, features))
    }

    pub fn find_depth_format(&self) -> Result<vk::Format> {
        self.find_supported_format(
            &[
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: Option<&(vk::SurfaceKHR, ash::khr::surface::Instance)>,
    ) -> Result<(vk::PhysicalDevice, QueueFamily, QueueFamily)> {
        let req_device_exts = Self::get_required_device_extensions(surface.is_some());
        let req_device_exts = req_device_exts
            .iter()
            .map(|ext| ext.to_str())
            .collect::<std::result::Result<Vec<&str>, Utf8Error>>()?;

        let physical_devices = unsafe { instance.enumerate_physical_devices()? };

        physical_devices
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|device| {
                let supported_extensions = unsafe {
                    instance.enumerate_device_extension_properties(*device)
                }.unwrap_or_default();

                req_device_exts.iter().all(|req_ext| {
                    let req_ext_supported = supported_extensions
                        .iter()
                        .filter_map(|sup_ext| sup_ext.extension_name_as_c_str().ok())
                        .any(|sup_ext| sup_ext.to_str() == Ok(*req_ext));
                    if !req_ext_supported {
                        log::error!("Device extension not supported: {}", req_ext);
                    }
                    req_ext_supported
                })
            })
            // Filter out devices that lack the required features
            .filter(|device| {
                let features = unsafe { instance.get_physical_device_features(*device) };
                let supported = RequiredDeviceFeatures::supported_by(&features);
                if !supported {
                    log::error!("Device is missing required features: {:?}", device);
                }
                supported
            })
            // Filter out devices that do not contain the required queues
            .filter_map(|device| {
                let props = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                let (graphics_index, present_index) = queue::select_queue_families(
                    &props,
                    |i| match surface {
                        Some((surface, surface_loader)) => unsafe {
                            surface_loader
                                .get_physical_device_surface_support(device, i, *surface)
                                .unwrap_or(false)
                        },
                        // Headless: presentation is never requested
                        None => true,
                    },
                )?;
                Some((
                    device,
                    QueueFamily::new(graphics_index, props[graphics_index as usize], graphics_index == present_index),
                    QueueFamily::new(present_index, props[present_index as usize], true),
                ))
            })
            .min_by_key(|(device, _, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                rank_device_type(props.device_type)
            })
            .ok_or_eyre("No suitable physical device found")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: &vk::PhysicalDevice,
        graphics_queue_family: QueueFamily,
        present_queue_family: QueueFamily,
        presenting: bool,
    ) -> Result<(ash::Device, Queue, Queue)> {
        let queue_priorities = [1.0];
        let mut queue_create_infos = vec![
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family.index)
                .queue_priorities(&queue_priorities),
        ];
        if present_queue_family != graphics_queue_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(present_queue_family.index)
                    .queue_priorities(&queue_priorities),
            );
        }

        // Create device
        let device = {
            let enabled_extension_names = Self::get_required_device_extensions(presenting)
                .iter()
                .map(|ext| ext.as_ptr())
                .collect::<Vec<*const c_char>>();
            let enabled_features = RequiredDeviceFeatures::features();

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&enabled_extension_names)
                .enabled_features(&enabled_features);

            unsafe {
                instance.create_device(*physical_device, &device_create_info, None)?
            }
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family.index, 0);
            Queue::new(graphics_queue_family, queue)
        };
        let present_queue = unsafe {
            let queue = device.get_device_queue(present_queue_family.index, 0);
            Queue::new(present_queue_family, queue)
        };

        Ok((device, graphics_queue, present_queue))
    }

    fn get_required_device_extensions(presenting: bool) -> Vec<&'static CStr> {
        let mut exts = Vec::new();
        if presenting {
            exts.push(ash::khr::swapchain::NAME);
        }

        #[cfg(target_os = "macos")]
        exts.push(ash::khr::portability_subset::NAME);

        exts
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.logical.device_wait_idle() {
                log::error!("Failed to idle device before teardown: {}", err);
            }

            ManuallyDrop::drop(&mut self.transfer_context);

            let outstanding = Arc::strong_count(&self.memory_allocator) - 1;
            if outstanding > 0 {
                log::error!(
                    "{} resources still hold the memory allocator at device teardown",
                    outstanding,
                );
            }
            ManuallyDrop::drop(&mut self.memory_allocator);

            self.logical.destroy_command_pool(self.command_pool, None);
            self.logical.destroy_device(None);
        }
    }
}

struct RequiredDeviceFeatures;

impl RequiredDeviceFeatures {
    fn features() -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
    }

    fn supported_by(supported: &vk::PhysicalDeviceFeatures) -> bool {
        supported.sampler_anisotropy == vk::TRUE
    }
}

/// Lower is better
pub fn rank_device_type(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        vk::PhysicalDeviceType::OTHER => 4,
        _ => 5,
    }
}

pub fn pick_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    format_properties: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|format| {
        let props = format_properties(*format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

/// Converts a Vulkan failure into a report, naming device loss explicitly since it
/// is never recoverable.
pub fn vk_error(err: vk::Result, operation: &str) -> Report {
    if err == vk::Result::ERROR_DEVICE_LOST {
        eyre!("GPU device lost during {}", operation)
    } else {
        eyre!("{} failed: {}", operation, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discrete_gpu_ranks_first() {
        let mut types = [
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
        ];
        types.sort_by_key(|t| rank_device_type(*t));
        assert_eq!(types[0], vk::PhysicalDeviceType::DISCRETE_GPU);
        assert_eq!(types[2], vk::PhysicalDeviceType::CPU);
    }

    #[test]
    fn test_pick_supported_format_respects_tiling() {
        let props = |format: vk::Format| {
            if format == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatProperties {
                    optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                }
            } else {
                vk::FormatProperties::default()
            }
        };
        let candidates = [vk::Format::D32_SFLOAT, vk::Format::D24_UNORM_S8_UINT];
        let features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        assert_eq!(
            pick_supported_format(&candidates, vk::ImageTiling::OPTIMAL, features, props),
            Some(vk::Format::D24_UNORM_S8_UINT),
        );
        assert_eq!(
            pick_supported_format(&candidates, vk::ImageTiling::LINEAR, features, props),
            None,
        );
    }

    #[test]
    fn test_device_lost_is_named() {
        let report = vk_error(vk::Result::ERROR_DEVICE_LOST, "queue submit");
        assert!(report.to_string().contains("device lost"));

        let report = vk_error(vk::Result::ERROR_OUT_OF_HOST_MEMORY, "queue submit");
        assert!(report.to_string().starts_with("queue submit failed"));
    }
}
