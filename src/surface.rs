use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::error::InstanceError;

///A window surface created through [ash-window](https://crates.io/crates/ash-window).
/// Holds on to the instance so the surface can always be destroyed before it.
pub struct Surface {
    pub instance: Arc<crate::context::Instance>,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::extensions::khr::Surface,
}

impl Surface {
    pub fn new<T>(
        instance: &Arc<crate::context::Instance>,
        window_handle: &T,
    ) -> Result<Self, InstanceError>
    where
        T: HasRawWindowHandle + HasRawDisplayHandle,
    {
        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.inner,
                window_handle.raw_display_handle(),
                window_handle.raw_window_handle(),
                None,
            )?
        };

        Ok(Surface {
            instance: instance.clone(),
            surface,
            surface_loader: ash::extensions::khr::Surface::new(&instance.entry, &instance.inner),
        })
    }

    pub fn get_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, InstanceError> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?
        };
        Ok(capabilities)
    }

    pub fn get_formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, InstanceError> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)?
        };
        Ok(formats)
    }

    pub fn get_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, InstanceError> {
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?
        };
        Ok(modes)
    }

    ///The surface's current extent, if the platform reports one. Returns None where
    /// the size is left to the swapchain (Wayland reports the 0xFFFFFFFF marker there)
    /// or the surface has no area yet.
    pub fn get_current_extent(&self, physical_device: vk::PhysicalDevice) -> Option<vk::Extent2D> {
        let extent = self.get_capabilities(physical_device).ok()?.current_extent;

        let undefined = extent.width == u32::MAX && extent.height == u32::MAX;
        let empty = extent.width == 0 && extent.height == 0;
        if undefined || empty {
            None
        } else {
            Some(extent)
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}
