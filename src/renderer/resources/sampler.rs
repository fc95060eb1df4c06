use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;

#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    pub filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub border_color: vk::BorderColor,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub max_lod: f32,
    /// Clamped to the device limit; `None` disables anisotropic filtering
    pub max_anisotropy: Option<f32>,
    pub compare_op: Option<vk::CompareOp>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            max_lod: 1.0,
            max_anisotropy: None,
            compare_op: None,
        }
    }
}

impl SamplerDesc {
    /// Sampler for reading a shadow map outside its bounds as "fully lit"
    pub fn shadow_map() -> Self {
        Self {
            address_mode: vk::SamplerAddressMode::CLAMP_TO_BORDER,
            border_color: vk::BorderColor::FLOAT_OPAQUE_WHITE,
            ..Self::default()
        }
    }
}

pub struct Sampler {
    pub sampler: vk::Sampler,
    device: Arc<ash::Device>,
}

impl Sampler {
    pub fn new(desc: &SamplerDesc, dev: &RenderDevice) -> Result<Self> {
        let device_limit = dev.properties.limits.max_sampler_anisotropy;
        let anisotropy = desc.max_anisotropy.map(|a| a.min(device_limit));

        let info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .mip_lod_bias(0.0)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .compare_enable(desc.compare_op.is_some())
            .compare_op(desc.compare_op.unwrap_or(vk::CompareOp::NEVER))
            .min_lod(0.0)
            .max_lod(desc.max_lod)
            .border_color(desc.border_color);
        let sampler = unsafe { dev.logical.create_sampler(&info, None)? };

        Ok(Self {
            sampler,
            device: dev.logical.clone(),
        })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}
