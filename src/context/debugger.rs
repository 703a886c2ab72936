use std::ffi::CStr;

use ash::vk::{self, Handle};

use crate::error::InstanceError;

use super::instance::{vulkan_debug_callback, Instance};

///Helper that gets usually initialised by activating validation layers.
/// Owns the debug messenger and allows naming objects through `VK_EXT_debug_utils`.
///
/// Creation fails when the extension was not enabled on the instance. Callers treat
/// that as "no debugger" and skip naming, the extension is optional.
pub struct Debugger {
    pub debug_utils: ash::extensions::ext::DebugUtils,
    pub messenger: vk::DebugUtilsMessengerEXT,
}

impl Debugger {
    pub fn new(instance: &Instance) -> Result<Self, InstanceError> {
        let debug_utils =
            ash::extensions::ext::DebugUtils::new(&instance.entry, &instance.inner);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let messenger =
            unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };

        Ok(Debugger {
            debug_utils,
            messenger,
        })
    }

    ///Attaches `name` to `handle` for validation/debugger output.
    pub fn name_object<H: Handle>(
        &self,
        device: &ash::Device,
        handle: H,
        name: &CStr,
    ) -> Result<(), vk::Result> {
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(handle.as_raw())
            .object_name(name);
        unsafe { self.debug_utils.set_debug_utils_object_name(device.handle(), &info) }
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        unsafe {
            self.debug_utils
                .destroy_debug_utils_messenger(self.messenger, None)
        };
    }
}
