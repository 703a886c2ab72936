//! ## Context
//!
//! When working with Vulkan the [Device](ash::Device) is the entry point for most operations.
//! It therefore is needed in most structures and function calls that somehow transform state related to Vulkan.
//! The device is created from an [Instance](ash::Instance) which represents a runtime instance of Vulkan.
//!
//! Additionally to the device one or multiple [queues](ash::vk::Queue) might be created. They can be understood as
//! a kind of "thread". Basically they are used for scheduling work on the GPU.
//!
//! When working with buffers (and images) another structure, the allocator, is relevant.
//! It takes care of tracking where and which memory is in-use on the GPU.
//!
//! Since those structures closely work together we define an abstraction called [Ctx](Ctx), or "Context".
//!
//! The `Instance` and `Device` are always created by ash, the allocator however can be defined by the
//! application. Have a look at the [allocator](crate::allocator) module for its definition and default implementation.

use std::{
    cmp::Ordering,
    sync::{Arc, Mutex},
};

mod instance;
use ash::vk;
pub use instance::{GetDeviceFilter, Instance, InstanceBuilder};

mod device;
pub use device::{Device, DeviceBuilder};

mod queue;
pub use queue::{Queue, QueueBuilder};

mod physical_device;
pub use physical_device::{PhyDeviceProperties, PhysicalDeviceFilter};

mod debugger;
pub use debugger::Debugger;

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::{allocator::Allocator, error::DeviceError, surface::Surface, EasyVkError};

///easyvk's Vulkan context. Can either be constructed by hand, or via the helper functions.
#[derive(Clone)]
pub struct Ctx<A: Allocator + Send> {
    ///Allocator instance used for all buffer and image allocation in this context.
    pub allocator: Arc<Mutex<A>>,
    ///Vulkan device including associated queues.
    pub device: Arc<Device>,
    ///Debug-utils messenger and object-naming helper. Present when the extension
    /// could be loaded, usually because validation is enabled.
    pub debugger: Option<Arc<Debugger>>,
    ///The initial vulkan instance used for the context.
    pub instance: Arc<Instance>,
}

impl<A: Allocator + Send> Ctx<A> {
    ///Creates the context from its elements.
    ///
    /// Assumes that the allocator was created for the device, which is in turn created for the instance.
    pub fn new(allocator: A, device: Arc<Device>, instance: Arc<Instance>) -> Self {
        let debugger = if instance.validation_enabled {
            Debugger::new(&instance).ok().map(Arc::new)
        } else {
            None
        };
        Ctx {
            allocator: Arc::new(Mutex::new(allocator)),
            device,
            debugger,
            instance,
        }
    }
}

#[cfg(feature = "default_allocator")]
impl Ctx<gpu_allocator::vulkan::Allocator> {
    ///Creates a new context that does not check for any surface availability.
    pub fn new_default_headless(use_validation: bool) -> Result<Self, EasyVkError> {
        let mut instance_builder = Instance::load()?;
        if use_validation {
            instance_builder = instance_builder.enable_validation();
        }
        let instance = instance_builder.build()?;
        Self::new_default_from_instance(instance, None)
    }

    ///Creates a simple context with a graphics queue. Creates the instance in a way that
    ///a surface for the provided window handle can be created.
    pub fn default_with_surface<T>(
        window_handle: &T,
        use_validation: bool,
    ) -> Result<(Self, Arc<Surface>), EasyVkError>
    where
        T: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let mut instance_builder = Instance::load()?;
        instance_builder = instance_builder.for_surface(window_handle)?;

        if use_validation {
            instance_builder = instance_builder.enable_validation();
        }
        let instance = instance_builder.build()?;

        //create the surface, so we can check for compatible devices in the filter.
        let surface = Arc::new(Surface::new(&instance, window_handle)?);

        let ctx = Self::new_default_from_instance(instance, Some(&surface))?;

        Ok((ctx, surface))
    }

    ///Creates a default context from a given instance. This is also the base creation code for
    /// [Self::default_with_surface] and [Self::new_default_headless].
    pub fn new_default_from_instance(
        instance: Arc<Instance>,
        surface: Option<&Surface>,
    ) -> Result<Self, EasyVkError> {
        let mut device_candidates = instance
            .create_physical_device_filter()?
            .filter_queue_flags(vk::QueueFlags::GRAPHICS);
        //If we have a surface, filter for that
        if let Some(surface) = surface {
            device_candidates = device_candidates
                .filter_extensions(
                    &instance.inner,
                    &[ash::extensions::khr::Swapchain::name()],
                )
                .filter_presentable(&surface.surface_loader, &surface.surface);
        }

        let mut device_candidates = device_candidates.release();

        if device_candidates.is_empty() {
            return Err(DeviceError::NoPhysicalDevice)?;
        }

        //Prefer a discrete GPU when there is one.
        device_candidates.sort_by(compare_device_type);

        let mut device_builder = device_candidates
            .remove(0)
            .into_device_builder(instance.clone())?;

        // only add the swapchain extension if we got a surface
        if surface.is_some() {
            device_builder =
                device_builder.with_extensions(ash::extensions::khr::Swapchain::name());
        }
        let device = device_builder.build()?;

        let allocator = default_allocator(&instance, &device)?;

        let debugger = if instance.validation_enabled {
            Debugger::new(&instance).ok().map(Arc::new)
        } else {
            None
        };

        Ok(Ctx {
            allocator: Arc::new(Mutex::new(allocator)),
            device,
            debugger,
            instance,
        })
    }

    ///Creates a custom context. To control the device creation process, use the
    /// `on_device_builder` closure, useful especially to register extensions or features.
    pub fn custom_context<T>(
        window_handle: Option<&T>,
        use_validation: bool,
        on_device_builder: impl FnOnce(DeviceBuilder) -> DeviceBuilder,
    ) -> Result<(Self, Option<Surface>), EasyVkError>
    where
        T: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let mut instance_builder = Instance::load()?;
        if let Some(window_handle) = window_handle {
            instance_builder = instance_builder.for_surface(window_handle)?;
        }

        if use_validation {
            instance_builder = instance_builder.enable_validation();
        }
        let instance = instance_builder.build()?;

        //create the surface, so we can check for compatible devices in the filter.
        let surface = if let Some(handle) = window_handle {
            Some(Surface::new(&instance, handle)?)
        } else {
            None
        };

        let mut physical_device_filter = instance.create_physical_device_filter()?;

        //If creating for a surface we need a queue that can do graphics work and present.
        if let Some(surface) = &surface {
            physical_device_filter = physical_device_filter
                .filter_queue_flags(vk::QueueFlags::GRAPHICS)
                .filter_presentable(&surface.surface_loader, &surface.surface)
        }

        let mut device_candidates = physical_device_filter.release();

        if device_candidates.is_empty() {
            return Err(DeviceError::NoPhysicalDevice)?;
        }

        device_candidates.sort_by(compare_device_type);

        #[cfg(feature = "logging")]
        {
            log::info!("Device candidates (in order):");
            for dev in device_candidates.iter() {
                log::info!("    Device: {:#?}", dev.properties.device_name);
            }
        }

        let mut device_builder = device_candidates
            .remove(0)
            .into_device_builder(instance.clone())?;

        device_builder = on_device_builder(device_builder);

        let device = device_builder.build()?;

        let allocator = default_allocator(&instance, &device)?;

        let debugger = if instance.validation_enabled {
            Debugger::new(&instance).ok().map(Arc::new)
        } else {
            None
        };

        Ok((
            Ctx {
                allocator: Arc::new(Mutex::new(allocator)),
                device,
                debugger,
                instance,
            },
            surface,
        ))
    }
}

///Orders discrete GPUs before everything else.
fn compare_device_type(a: &PhyDeviceProperties, b: &PhyDeviceProperties) -> Ordering {
    match (a.properties.device_type, b.properties.device_type) {
        (vk::PhysicalDeviceType::DISCRETE_GPU, vk::PhysicalDeviceType::DISCRETE_GPU) => {
            Ordering::Equal
        }
        (vk::PhysicalDeviceType::DISCRETE_GPU, _) => Ordering::Less,
        (_, vk::PhysicalDeviceType::DISCRETE_GPU) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[cfg(feature = "default_allocator")]
fn default_allocator(
    instance: &Arc<Instance>,
    device: &Arc<Device>,
) -> Result<gpu_allocator::vulkan::Allocator, DeviceError> {
    gpu_allocator::vulkan::Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
        buffer_device_address: false,
        debug_settings: gpu_allocator::AllocatorDebugSettings {
            log_leaks_on_shutdown: true,
            ..Default::default()
        },
        device: device.inner.clone(),
        instance: instance.inner.clone(),
        physical_device: device.physical_device,
        allocation_sizes: Default::default(),
    })
    .map_err(|e| DeviceError::GpuAllocatorError(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        #[cfg(feature = "default_allocator")]
        assert_impl_all!(Ctx<gpu_allocator::vulkan::Allocator>: Send, Sync);
        assert_impl_all!(Device: Send, Sync);
    }
}
