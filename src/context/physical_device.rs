use crate::error::DeviceError;

use super::{DeviceBuilder, QueueBuilder};
use std::ffi::CStr;
use std::sync::Arc;

///Compares a fixed-size, nul-padded name array as Vulkan returns it against `wanted`.
fn extension_name_matches(raw: &[std::os::raw::c_char], wanted: &CStr) -> bool {
    let bytes: &[u8] = bytemuck::cast_slice(raw);
    match CStr::from_bytes_until_nul(bytes) {
        Ok(name) => name == wanted,
        Err(_) => false,
    }
}

///Cached properties of one physical device, including all of its queue families.
/// Feed this into [into_device_builder](PhyDeviceProperties::into_device_builder) once a
/// device has been selected.
pub struct PhyDeviceProperties {
    pub phydev: ash::vk::PhysicalDevice,
    pub properties: ash::vk::PhysicalDeviceProperties,
    ///Queue family properties together with the family index they were reported under.
    pub queue_properties: Vec<(usize, ash::vk::QueueFamilyProperties)>,
}

impl PhyDeviceProperties {
    ///Queries `physical_device` for its properties and every queue family it exposes.
    pub fn new(instance: &ash::Instance, physical_device: ash::vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let queue_properties = unsafe {
            instance.get_physical_device_queue_family_properties(physical_device)
        }
        .into_iter()
        .enumerate()
        .collect();

        PhyDeviceProperties {
            phydev: physical_device,
            properties,
            queue_properties,
        }
    }

    ///Turns the cached properties into a [DeviceBuilder] that creates one queue per
    /// remaining family.
    pub fn into_device_builder(
        self,
        instance: Arc<crate::context::Instance>,
    ) -> Result<DeviceBuilder, DeviceError> {
        let queues = self
            .queue_properties
            .into_iter()
            .map(|(family_index, properties)| QueueBuilder {
                family_index: family_index as u32,
                properties,
                priorities: vec![1.0],
            })
            .collect();

        Ok(DeviceBuilder {
            instance,
            physical_device: self.phydev,
            queues,
            device_extensions: Vec::new(),
            features: ash::vk::PhysicalDeviceFeatures::default(),
        })
    }
}

///Narrows a set of physical devices down to the ones that fit the application.
/// Start from [ash::Instance::enumerate_physical_devices](ash::Instance::enumerate_physical_devices),
/// chain the `filter_*` calls, then take the survivors via [release](PhysicalDeviceFilter::release).
pub struct PhysicalDeviceFilter {
    ///The devices that passed every filter applied so far.
    pub pdevices: Vec<PhyDeviceProperties>,
}

impl PhysicalDeviceFilter {
    pub fn new(instance: &ash::Instance, phydevices: Vec<ash::vk::PhysicalDevice>) -> Self {
        PhysicalDeviceFilter {
            pdevices: phydevices
                .into_iter()
                .map(|phy| PhyDeviceProperties::new(instance, phy))
                .collect(),
        }
    }

    ///Keeps only devices of the given type, for instance DISCRETE_GPU.
    pub fn filter_type(self, dev_type: ash::vk::PhysicalDeviceType) -> Self {
        self.filter(|dev| dev.properties.device_type == dev_type)
    }

    ///Keeps only devices that expose at least one queue family containing `flags`.
    pub fn filter_queue_flags(self, flags: ash::vk::QueueFlags) -> Self {
        self.filter(|dev| {
            dev.queue_properties
                .iter()
                .any(|(_idx, family)| family.queue_flags.contains(flags))
        })
    }

    ///Keeps only devices for which `filter` returns true.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&PhyDeviceProperties) -> bool,
    {
        self.pdevices = self.pdevices.into_iter().filter(filter).collect();
        self
    }

    ///Keeps only devices that support every extension in `extensions`.
    pub fn filter_extensions(
        self,
        instance: &ash::Instance,
        extensions: &[&CStr],
    ) -> Self {
        self.filter(|dev| {
            let supported =
                unsafe { instance.enumerate_device_extension_properties(dev.phydev) }
                    .unwrap_or_default();

            extensions.iter().all(|needed| {
                supported
                    .iter()
                    .any(|ext| extension_name_matches(&ext.extension_name, needed))
            })
        })
    }

    ///Removes every queue family that cannot present to `surface`, and drops devices
    /// that have no presentable family left.
    pub fn filter_presentable(
        mut self,
        surface_loader: &ash::extensions::khr::Surface,
        surface: &ash::vk::SurfaceKHR,
    ) -> Self {
        self.pdevices = self
            .pdevices
            .into_iter()
            .filter_map(|mut pdev| {
                pdev.queue_properties.retain(|(family_index, _family)| {
                    match unsafe {
                        surface_loader.get_physical_device_surface_support(
                            pdev.phydev,
                            *family_index as u32,
                            *surface,
                        )
                    } {
                        Ok(presentable) => presentable,
                        Err(_e) => {
                            #[cfg(feature = "logging")]
                            log::warn!(
                                "Could not query present support on family {} of {:?}: {}",
                                family_index,
                                pdev.properties.device_name,
                                _e
                            );
                            false
                        }
                    }
                });

                if pdev.queue_properties.is_empty() {
                    None
                } else {
                    Some(pdev)
                }
            })
            .collect();
        self
    }

    ///Hands out the remaining devices. Use
    /// [into_device_builder](PhyDeviceProperties::into_device_builder) on one of them to
    /// continue with device creation.
    pub fn release(self) -> Vec<PhyDeviceProperties> {
        self.pdevices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn raw_name(name: &str) -> [std::os::raw::c_char; 256] {
        let mut raw = [0; 256];
        for (slot, byte) in raw.iter_mut().zip(name.as_bytes()) {
            *slot = *byte as std::os::raw::c_char;
        }
        raw
    }

    #[test]
    fn extension_name_comparison() {
        let swapchain = CString::new("VK_KHR_swapchain").unwrap();
        assert!(extension_name_matches(
            &raw_name("VK_KHR_swapchain"),
            &swapchain
        ));
        assert!(!extension_name_matches(
            &raw_name("VK_KHR_surface"),
            &swapchain
        ));
        //a name that fills the whole array carries no nul and must not match
        let filler = "a".repeat(256);
        assert!(!extension_name_matches(&raw_name(&filler), &swapchain));
    }
}
