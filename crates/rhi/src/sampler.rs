//! Texture sampler.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Maximum anisotropy requested when the device feature is enabled.
pub const MAX_ANISOTROPY: f32 = 4.0;

/// Linear, clamp-to-edge sampler.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates a linear sampler with clamped addressing.
    ///
    /// Anisotropic filtering is used when the device enabled it.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn linear_clamp(device: Arc<Device>) -> RhiResult<Self> {
        let anisotropy = device.anisotropy_enabled();
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { MAX_ANISOTROPY } else { 1.0 })
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!("Created linear sampler (anisotropy: {})", anisotropy);

        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}
