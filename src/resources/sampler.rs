use std::sync::Arc;

use ash::vk;

use crate::{
    context::Device,
    error::{BuilderError, DeviceError},
    EasyVkError,
};

///Fluent sampler setup. Mirrors [vk::SamplerCreateInfo] with defaults for linear
/// filtering and repeat addressing. The anisotropy and unnormalized-coordinate rules
/// are checked in [validate](SamplerBuilder::validate) before the device is touched.
#[derive(Clone, Debug)]
pub struct SamplerBuilder {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_op: Option<vk::CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: vk::BorderColor,
    pub unnormalized_coordinates: bool,
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        SamplerBuilder {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            mip_lod_bias: 0.0,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            compare_op: None,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            unnormalized_coordinates: false,
        }
    }
}

impl SamplerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    ///Allows changing `self` builder style.
    pub fn with(mut self, mut mapping: impl FnMut(&mut Self)) -> Self {
        mapping(&mut self);
        self
    }

    pub fn with_filters(mut self, mag: vk::Filter, min: vk::Filter) -> Self {
        self.mag_filter = mag;
        self.min_filter = min;
        self
    }

    pub fn with_address_modes(mut self, mode: vk::SamplerAddressMode) -> Self {
        self.address_mode_u = mode;
        self.address_mode_v = mode;
        self.address_mode_w = mode;
        self
    }

    pub fn with_anisotropy(mut self, max_anisotropy: f32) -> Self {
        self.anisotropy_enable = true;
        self.max_anisotropy = max_anisotropy;
        self
    }

    pub fn with_compare_op(mut self, op: vk::CompareOp) -> Self {
        self.compare_op = Some(op);
        self
    }

    pub fn with_lod(mut self, min_lod: f32, max_lod: f32) -> Self {
        self.min_lod = min_lod;
        self.max_lod = max_lod;
        self
    }

    pub fn unnormalized(mut self) -> Self {
        self.unnormalized_coordinates = true;
        self
    }

    ///Checks the collected state against the device's `max_sampler_anisotropy` limit
    /// and the combination rules for unnormalized coordinates.
    pub fn validate(&self, max_anisotropy_limit: f32) -> Result<(), BuilderError> {
        if self.anisotropy_enable {
            if self.max_anisotropy < 1.0 {
                return Err(BuilderError::InvalidAnisotropy);
            }
            if self.max_anisotropy > max_anisotropy_limit {
                return Err(BuilderError::AnisotropyExceedsLimit {
                    requested: self.max_anisotropy,
                    limit: max_anisotropy_limit,
                });
            }
        }

        if self.unnormalized_coordinates {
            if self.anisotropy_enable {
                return Err(BuilderError::UnnormalizedIncompatible("anisotropy"));
            }
            if self.compare_op.is_some() {
                return Err(BuilderError::UnnormalizedIncompatible("a compare op"));
            }
            if self.min_lod != 0.0 || self.max_lod != 0.0 {
                return Err(BuilderError::UnnormalizedIncompatible("a lod range"));
            }
            if self.mipmap_mode != vk::SamplerMipmapMode::NEAREST {
                return Err(BuilderError::UnnormalizedIncompatible(
                    "linear mipmap filtering",
                ));
            }
        }

        Ok(())
    }

    pub fn build(self, device: &Arc<Device>) -> Result<Sampler, EasyVkError> {
        let limit = device.properties().limits.max_sampler_anisotropy;
        self.validate(limit)?;

        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(self.mag_filter)
            .min_filter(self.min_filter)
            .mipmap_mode(self.mipmap_mode)
            .address_mode_u(self.address_mode_u)
            .address_mode_v(self.address_mode_v)
            .address_mode_w(self.address_mode_w)
            .mip_lod_bias(self.mip_lod_bias)
            .anisotropy_enable(self.anisotropy_enable)
            .max_anisotropy(self.max_anisotropy)
            .compare_enable(self.compare_op.is_some())
            .compare_op(self.compare_op.unwrap_or(vk::CompareOp::ALWAYS))
            .min_lod(self.min_lod)
            .max_lod(self.max_lod)
            .border_color(self.border_color)
            .unnormalized_coordinates(self.unnormalized_coordinates);

        let sampler = Sampler::new(device, &create_info)?;
        Ok(sampler)
    }
}

pub struct Sampler {
    pub inner: ash::vk::Sampler,
    pub device: Arc<Device>,
}

impl Sampler {
    pub fn new(
        device: &Arc<Device>,
        create_info: &vk::SamplerCreateInfoBuilder,
    ) -> Result<Self, DeviceError> {
        let sampler = unsafe { device.inner.create_sampler(create_info, None)? };

        Ok(Sampler {
            device: device.clone(),
            inner: sampler,
        })
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_sampler(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Sampler: Send, Sync);
    }

    #[test]
    fn rejects_anisotropy_below_one() {
        let builder = SamplerBuilder::new().with_anisotropy(0.5);
        assert!(matches!(
            builder.validate(16.0),
            Err(BuilderError::InvalidAnisotropy)
        ));
    }

    #[test]
    fn rejects_anisotropy_over_limit() {
        let builder = SamplerBuilder::new().with_anisotropy(32.0);
        assert!(matches!(
            builder.validate(16.0),
            Err(BuilderError::AnisotropyExceedsLimit { .. })
        ));
    }

    #[test]
    fn anisotropy_at_limit_is_ok() {
        let builder = SamplerBuilder::new().with_anisotropy(16.0);
        assert!(builder.validate(16.0).is_ok());
    }

    #[test]
    fn rejects_unnormalized_with_compare() {
        let builder = SamplerBuilder::new()
            .with_lod(0.0, 0.0)
            .with(|b| b.mipmap_mode = vk::SamplerMipmapMode::NEAREST)
            .with_compare_op(vk::CompareOp::LESS)
            .unnormalized();
        assert!(matches!(
            builder.validate(16.0),
            Err(BuilderError::UnnormalizedIncompatible(_))
        ));
    }

    #[test]
    fn rejects_unnormalized_with_lod_range() {
        let builder = SamplerBuilder::new()
            .with(|b| b.mipmap_mode = vk::SamplerMipmapMode::NEAREST)
            .unnormalized();
        //default max_lod is LOD_CLAMP_NONE which is non-zero
        assert!(matches!(
            builder.validate(16.0),
            Err(BuilderError::UnnormalizedIncompatible(_))
        ));
    }

    #[test]
    fn accepts_unnormalized_nearest() {
        let builder = SamplerBuilder::new()
            .with_lod(0.0, 0.0)
            .with(|b| b.mipmap_mode = vk::SamplerMipmapMode::NEAREST)
            .unnormalized();
        assert!(builder.validate(16.0).is_ok());
    }
}
