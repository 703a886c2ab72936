use std::{
    ffi::{CStr, CString},
    sync::Arc,
};

use ash::vk;
use raw_window_handle::HasRawDisplayHandle;

use crate::error::InstanceError;

use super::PhysicalDeviceFilter;

pub(crate) const VALIDATION_LAYER: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

///The external callback print function for debugging
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    #[allow(unused)] message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut core::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        #[cfg(feature = "logging")]
        log::error!("Debug messenger fired, but carried no data");
        return vk::FALSE;
    }

    let id = (*p_callback_data).message_id_number;
    let idname = if !(*p_callback_data).p_message_id_name.is_null() {
        std::ffi::CStr::from_ptr((*p_callback_data).p_message_id_name).to_string_lossy()
    } else {
        std::borrow::Cow::Borrowed("unknown id")
    };
    let msg = if !(*p_callback_data).p_message.is_null() {
        std::ffi::CStr::from_ptr((*p_callback_data).p_message).to_string_lossy()
    } else {
        std::borrow::Cow::Borrowed("no message")
    };

    //use log if the feature is enabled, otherwise use println
    #[cfg(feature = "logging")]
    {
        if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            log::error!("[{}: {}]: {}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            log::warn!("[{}: {}]: {}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            log::info!("[{}: {}]: {}", id, idname, msg);
        } else {
            log::trace!("[{}: {}]: {}", id, idname, msg);
        }
    }

    #[cfg(not(feature = "logging"))]
    println!("[{:?}][{}: {}]: {}", message_severity, id, idname, msg);

    vk::FALSE
}

///Instance configuration as well as the source entry point. Usually this struct is created via [Instance::load].
pub struct InstanceBuilder {
    pub entry: ash::Entry,
    ///When true, enables `VK_LAYER_KHRONOS_validation` and the debug-utils extension on `build()`.
    pub validation: bool,
    pub enabled_layers: Vec<CString>,
    pub enabled_extensions: Vec<CString>,
    available_layers: Vec<vk::LayerProperties>,
    available_extensions: Vec<vk::ExtensionProperties>,
}

impl InstanceBuilder {
    ///Builds the instance from the current information.
    pub fn build(mut self) -> Result<Arc<Instance>, InstanceError> {
        //check if validation is enabled, in that case push the validation layer and the
        //debug extension it reports through.
        let validation_enabled = self.validation;
        if validation_enabled {
            self = self.with_layer(VALIDATION_LAYER.to_owned())?;
            self = self.with_extension(ash::extensions::ext::DebugUtils::name().to_owned())?;
        }

        let InstanceBuilder {
            entry,
            validation: _,
            enabled_layers,
            enabled_extensions,
            available_layers: _,
            available_extensions: _,
        } = self;

        let app_desc = vk::ApplicationInfo::builder().api_version(vk::make_api_version(
            0,
            Instance::API_VERSION_MAJOR,
            Instance::API_VERSION_MINOR,
            Instance::API_VERSION_PATCH,
        ));

        #[cfg(feature = "logging")]
        {
            log::info!("Instance creation:");
            log::info!(
                "  Vulkan version: {}.{}.{}",
                Instance::API_VERSION_MAJOR,
                Instance::API_VERSION_MINOR,
                Instance::API_VERSION_PATCH,
            );
            log::info!("  Layers:");
            for l in &enabled_layers {
                log::info!("    {:?}", l);
            }
            log::info!("  Extensions:");
            for e in &enabled_extensions {
                log::info!("    {:?}", e);
            }
        }

        let enabled_extensions = enabled_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();

        let enabled_layers = enabled_layers
            .iter()
            .map(|layer| layer.as_ptr())
            .collect::<Vec<_>>();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_desc)
            .enabled_extension_names(&enabled_extensions)
            .enabled_layer_names(&enabled_layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        Ok(Arc::new(Instance {
            entry,
            inner: instance,
            validation_enabled,
        }))
    }

    pub fn is_layer_available(&self, name: &CStr) -> bool {
        self.available_layers.iter().any(|layer| {
            CStr::from_bytes_until_nul(bytemuck::cast_slice(layer.layer_name.as_slice()))
                .map(|layer_name| layer_name == name)
                .unwrap_or(false)
        })
    }

    ///Returns true if a instance-extension with the given name was found
    pub fn is_extension_available(&self, name: &CStr) -> bool {
        self.available_extensions.iter().any(|ext| {
            CStr::from_bytes_until_nul(bytemuck::cast_slice(ext.extension_name.as_slice()))
                .map(|ext_name| ext_name == name)
                .unwrap_or(false)
        })
    }

    ///adds an extension with the given name, if it was not added yet.
    pub fn with_extension(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_extension_available(name.as_c_str()) {
            return Err(InstanceError::MissingExtension(name));
        }

        if self.enabled_extensions.contains(&name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable extension twice: {:?}", name);
            return Ok(self);
        }

        #[cfg(feature = "logging")]
        log::info!("Enabling instance-extension: {:?}", name);
        self.enabled_extensions.push(name);

        Ok(self)
    }

    ///adds an layer with the given name to the list of layers
    pub fn with_layer(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_layer_available(name.as_c_str()) {
            return Err(InstanceError::MissingLayer(name));
        }

        if self.enabled_layers.contains(&name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable layer twice: {:?}", name);
            return Ok(self);
        }

        self.enabled_layers.push(name);

        Ok(self)
    }

    ///Enables all extensions that are needed for the surface behind `handle` to work.
    pub fn for_surface(
        mut self,
        handle: &dyn HasRawDisplayHandle,
    ) -> Result<Self, InstanceError> {
        let required_extensions =
            ash_window::enumerate_required_extensions(handle.raw_display_handle())?;
        for r in required_extensions {
            let st = unsafe { CStr::from_ptr(*r).to_owned() };
            self = self.with_extension(st)?;
        }

        Ok(self)
    }

    ///enables the validation layer plus a debug messenger that reports either via
    /// [println](println), or via the log crate if the `logging` feature is enabled.
    pub fn enable_validation(mut self) -> Self {
        self.validation = true;
        self
    }
}

///easyvk instance. Wraps the entry point as well as the created instance into one object.
///
/// # Safety
///
/// This struct is un-clonable for a reason. It implements [Drop] which takes care of destroying the vulkan instance.
pub struct Instance {
    pub entry: ash::Entry,
    pub inner: ash::Instance,
    pub validation_enabled: bool,
}

impl Instance {
    ///The major version of Vulkan loaded.
    pub const API_VERSION_MAJOR: u32 = 1;
    ///The minor version of Vulkan loaded.
    pub const API_VERSION_MINOR: u32 = 3;
    ///The patch version of Vulkan loaded.
    pub const API_VERSION_PATCH: u32 = 0;

    ///Creates an instance builder loaded by using [Entry::load](ash::Entry::load)
    pub fn load() -> Result<InstanceBuilder, InstanceError> {
        let entry = unsafe { ash::Entry::load()? };

        let available_layers = entry.enumerate_instance_layer_properties()?;
        let available_extensions = entry.enumerate_instance_extension_properties(None)?;

        Ok(InstanceBuilder {
            entry,
            enabled_extensions: Vec::new(),
            enabled_layers: Vec::new(),
            validation: false,
            available_layers,
            available_extensions,
        })
    }

    ///Returns the feature list of the given physical device
    pub fn get_physical_device_features(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        unsafe { self.inner.get_physical_device_features(*physical_device) }
    }

    ///Returns the properties (including limits) of the given physical device
    pub fn get_physical_device_properties(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        unsafe { self.inner.get_physical_device_properties(*physical_device) }
    }
}

pub trait GetDeviceFilter {
    fn create_physical_device_filter(&self) -> Result<PhysicalDeviceFilter, InstanceError>;
}

impl GetDeviceFilter for Arc<Instance> {
    fn create_physical_device_filter(&self) -> Result<PhysicalDeviceFilter, InstanceError> {
        let devices = unsafe { self.inner.enumerate_physical_devices()? };
        Ok(PhysicalDeviceFilter::new(&self.inner, devices))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            self.inner.destroy_instance(None);
        }
    }
}
