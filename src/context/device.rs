use crate::error::DeviceError;

use super::{Queue, QueueBuilder};
use std::sync::Arc;

///Helper that lets you setup device properties and possibly needed extensions before creating the actual
/// device.
pub struct DeviceBuilder {
    ///Instance based on which the device is created
    pub instance: Arc<crate::context::Instance>,
    ///The physical device from which this will be an abstraction
    pub physical_device: ash::vk::PhysicalDevice,
    ///Queue family index, and properties of all queues that can be created.
    pub queues: Vec<QueueBuilder>,
    pub features: ash::vk::PhysicalDeviceFeatures,

    ///List of device extensions that are enabled. The pointer is usually obtained via `ash::extensions::khr::EXTENSION::name().as_ptr()`.
    pub device_extensions: Vec<*const i8>,
}

impl DeviceBuilder {
    ///Checks that all device extensions are supported.
    fn check_extensions(&mut self) -> Result<(), DeviceError> {
        let all_supported = unsafe {
            self.instance
                .inner
                .enumerate_device_extension_properties(self.physical_device)
        }
        .unwrap_or(Vec::new());

        let all_supported_names: Vec<String> = all_supported
            .iter()
            .map(|ext| {
                unsafe {
                    std::ffi::CStr::from_ptr(
                        ext.extension_name.as_ptr() as *const std::os::raw::c_char
                    )
                }
                .to_string_lossy()
                .as_ref()
                .to_owned()
            })
            .collect();

        #[cfg(feature = "logging")]
        {
            log::debug!("Supported extensions");
            for ext in all_supported_names.iter() {
                log::debug!("  {}", ext);
            }
        }

        for ext in self.device_extensions.iter() {
            let ext_as_str = unsafe { std::ffi::CStr::from_ptr(*ext) }
                .to_string_lossy()
                .as_ref()
                .to_owned();

            if !all_supported_names.contains(&ext_as_str) {
                return Err(DeviceError::UnsupportedExtension(ext_as_str));
            }
        }

        Ok(())
    }

    ///Allows changing `self` builder style
    pub fn with(mut self, mut mapping: impl FnMut(&mut DeviceBuilder)) -> Self {
        mapping(&mut self);
        self
    }

    ///Pushes the new extension. The name is usually obtained from the extensions definition like this:
    ///```ignore
    ///  builder.with_extensions(ash::extensions::khr::Swapchain::name());
    ///```
    pub fn with_extensions(mut self, ext_name: &'static std::ffi::CStr) -> Self {
        self.device_extensions.push(ext_name.as_ptr());
        self
    }

    pub fn build(mut self) -> Result<Arc<Device>, DeviceError> {
        //before starting anything, check that the extensions are supported
        self.check_extensions()?;

        let DeviceBuilder {
            instance,
            physical_device,
            queues,
            features,
            device_extensions,
        } = self;

        //now unwrap the queue infos into create infos
        let queue_create_infos = queues
            .iter()
            .map(|q| *q.as_create_info())
            .collect::<Vec<_>>();

        //NOTE: according to the vulkan doc device layers are deprecated, so nothing
        //related to that is exposed here.
        let device_creation_info = ash::vk::DeviceCreateInfo::builder()
            .enabled_extension_names(&device_extensions)
            .enabled_features(&features)
            .queue_create_infos(&queue_create_infos);

        unsafe { Device::new_from_info(instance, physical_device, &device_creation_info, &queues) }
    }
}

///Thin device abstraction that keeps the underlying instance (and therefore entrypoint) alive,
/// and takes care of device destruction once its dropped.
///
/// # Safety and self creation
/// Since the struct is completely public it is possible to create a device "on your own". In that case you'll have to make sure
/// that the instance is associated with the device and the queues actually exist.
pub struct Device {
    ///The raw ash device
    pub inner: ash::Device,
    pub instance: Arc<crate::context::Instance>,
    pub physical_device: ash::vk::PhysicalDevice,
    pub queues: Vec<Queue>,
}

impl Device {
    ///Mini helper function that creates the device from an already created instance and physical device, using
    /// the supplied device and creation infos.
    /// The function assumes that device and queues can be created from the device. No additional checking is done.
    ///
    /// # Safety
    /// The biggest concern when using this function should be that the queue_families of the `queue_builder` actually exist in that way,
    /// and that possibly enabled extensions in the `device_create_info` exist. Otherwise this either panics or fails, depending on the
    /// configured validation.
    pub unsafe fn new_from_info(
        instance: Arc<crate::context::Instance>,
        physical_device: ash::vk::PhysicalDevice,
        device_create_info: &ash::vk::DeviceCreateInfo,
        queue_builder: &[QueueBuilder],
    ) -> Result<Arc<Self>, DeviceError> {
        let device = instance
            .inner
            .create_device(physical_device, device_create_info, None)?;

        //now setup the queues for the infos we prepared before
        let queues = queue_builder
            .iter()
            .flat_map(|queue_family| {
                let device = &device;
                (0..queue_family.priorities.len()).map(move |queue_index| Queue {
                    family_index: queue_family.family_index,
                    properties: queue_family.properties,
                    inner: device.get_device_queue(queue_family.family_index, queue_index as u32),
                })
            })
            .collect();

        Ok(Arc::new(Device {
            inner: device,
            instance,
            physical_device,
            queues,
        }))
    }

    ///Returns the first queue for the given family, if there is any.
    pub fn get_first_queue_for_family(&self, family: u32) -> Option<&Queue> {
        self.queues.iter().find(|q| q.family_index == family)
    }

    ///Returns the first queue whose family covers `flags`. When no dedicated family
    /// matches, falls back to a graphics-capable queue.
    pub fn first_queue_for_flags(&self, flags: ash::vk::QueueFlags) -> Result<&Queue, DeviceError> {
        self.queues
            .iter()
            .find(|q| q.supports(flags))
            .or_else(|| {
                self.queues
                    .iter()
                    .find(|q| q.supports(ash::vk::QueueFlags::GRAPHICS))
            })
            .ok_or(DeviceError::NoSuchQueueFamily(flags))
    }

    pub fn graphics_queue(&self) -> Result<&Queue, DeviceError> {
        self.first_queue_for_flags(ash::vk::QueueFlags::GRAPHICS)
    }

    pub fn compute_queue(&self) -> Result<&Queue, DeviceError> {
        self.first_queue_for_flags(ash::vk::QueueFlags::COMPUTE)
    }

    pub fn transfer_queue(&self) -> Result<&Queue, DeviceError> {
        self.first_queue_for_flags(ash::vk::QueueFlags::TRANSFER)
    }

    ///Queries the physical-device properties, including the limits some builders
    /// validate against.
    pub fn properties(&self) -> ash::vk::PhysicalDeviceProperties {
        self.instance
            .get_physical_device_properties(&self.physical_device)
    }

    ///Blocks until the device is idle.
    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        unsafe { self.inner.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { self.inner.destroy_device(None) };
    }
}
