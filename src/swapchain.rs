use std::sync::Arc;

use crate::{
    allocator::{MemoryUsage, UnmanagedAllocation},
    context::Device,
    error::DeviceError,
    resources::{Image, ImageType, ImgDesc, SharingMode},
    surface::Surface,
    sync::Semaphore,
    EasyVkError,
};

///Wraps one raw swapchain image handle. The memory belongs to the swapchain, so the
/// wrapper carries the no-op allocation and never destroys the handle itself.
fn wrap_swapchain_image(
    device: &Arc<Device>,
    image: ash::vk::Image,
    extent: ash::vk::Extent2D,
    format: ash::vk::Format,
    usage: ash::vk::ImageUsageFlags,
    sharing_mode: &SharingMode,
) -> Arc<Image> {
    Arc::new(Image {
        inner: image,
        allocation: Box::new(UnmanagedAllocation::new()),
        desc: ImgDesc {
            img_type: ImageType::Tex2d,
            format,
            extent: ash::vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            samples: ash::vk::SampleCountFlags::TYPE_1,
            tiling: ash::vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: sharing_mode.clone(),
        },
        usage: MemoryUsage::Unknown,
        device: device.clone(),
        do_not_destroy: true,
    })
}

///Collects swapchain parameters before creation. Format and present mode are
/// preference lists: the first supported entry wins, with a guaranteed fallback
/// (whatever the surface reports first, and FIFO respectively).
pub struct SwapchainBuilder {
    pub surface: Arc<Surface>,
    pub device: Arc<Device>,

    ///Formats in preference order. When none is supported the surface's first
    /// reported format is used.
    pub format_preference: Vec<ash::vk::SurfaceFormatKHR>,
    ///Present modes in preference order. When none is supported FIFO is used, which
    /// the specification guarantees to be available.
    pub present_mode_preference: Vec<ash::vk::PresentModeKHR>,

    pub image_count: u32,

    pub extent: ash::vk::Extent2D,
    pub array_layers: u32,
    pub usage: ash::vk::ImageUsageFlags,
    pub sharing_mode: SharingMode,
    pub transform: ash::vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: ash::vk::CompositeAlphaFlagsKHR,
    pub is_clipped: bool,
}

impl SwapchainBuilder {
    pub fn build(self) -> Result<Swapchain, EasyVkError> {
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(DeviceError::InvalidSwapchainSize(self.extent).into());
        }

        let sharing_mode = self.sharing_mode.clone();

        let create_info = self.as_swapchain_create_info()?;
        let loader =
            ash::extensions::khr::Swapchain::new(&self.device.instance.inner, &self.device.inner);
        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(DeviceError::VkError)?
        };

        let raw_images = unsafe {
            loader
                .get_swapchain_images(swapchain)
                .map_err(DeviceError::VkError)?
        };
        let images = raw_images
            .into_iter()
            .map(|image| {
                wrap_swapchain_image(
                    &self.device,
                    image,
                    create_info.image_extent,
                    create_info.image_format,
                    self.usage,
                    &sharing_mode,
                )
            })
            .collect::<Vec<_>>();

        //one semaphore pair per image, handed out round robin on acquire
        let acquire_semaphores = (0..images.len())
            .map(|_| Semaphore::new(&self.device))
            .collect::<Result<Vec<_>, _>>()?;
        let render_finished_semaphores = (0..images.len())
            .map(|_| Semaphore::new(&self.device))
            .collect::<Result<Vec<_>, _>>()?;

        //NOTE: see safety concern below.
        let recreate_info = create_info.build();

        Ok(Swapchain {
            loader,
            swapchain,
            surface: self.surface,
            images,
            acquire_semaphores,
            render_finished_semaphores,
            next_semaphore: 0,
            //FIXME: This is potentially unsafe if the p_next chain had lifetime requirements.
            //       Otherwise only the surface is referenced, but the reference is kept alive since we
            //       "Own" a ref until we are dropped.
            recreate_info,
            sharing_mode,
            usage: self.usage,
        })
    }

    ///The first entry of the format preferences the surface supports, or the
    /// surface's first reported format when no preference matches.
    pub fn get_first_supported_format(&self) -> Result<ash::vk::SurfaceFormatKHR, EasyVkError> {
        let mut supported = self.surface.get_formats(self.device.physical_device)?;
        for preferred in self.format_preference.iter() {
            if supported.contains(preferred) {
                return Ok(*preferred);
            }
        }

        if supported.is_empty() {
            return Err(DeviceError::NoSurfaceFormat.into());
        }
        Ok(supported.remove(0))
    }

    ///The first entry of the present mode preferences the surface supports, falling
    /// back to FIFO.
    pub fn get_first_supported_present_mode(&self) -> Result<ash::vk::PresentModeKHR, EasyVkError> {
        let supported = self.surface.get_present_modes(self.device.physical_device)?;
        for preferred in self.present_mode_preference.iter() {
            if supported.contains(preferred) {
                return Ok(*preferred);
            }
        }

        Ok(ash::vk::PresentModeKHR::FIFO)
    }

    ///Clamps the requested extent to the surface's supported range.
    pub fn get_supported_image_extent(&self) -> Result<ash::vk::Extent2D, EasyVkError> {
        let capabilities = self.surface.get_capabilities(self.device.physical_device)?;
        let clamp = |min: u32, wanted: u32, max: u32| wanted.clamp(min.min(max), max);

        let extent = ash::vk::Extent2D {
            width: clamp(
                capabilities.min_image_extent.width,
                self.extent.width,
                capabilities.max_image_extent.width,
            ),
            height: clamp(
                capabilities.min_image_extent.height,
                self.extent.height,
                capabilities.max_image_extent.height,
            ),
        };

        if extent.width == u32::MAX || extent.height == u32::MAX {
            #[cfg(feature = "logging")]
            log::warn!(
                "Swapchain extent is u32::MAX on one axis, set the window's size explicitly. Extent: {:?}",
                extent
            );
        }

        Ok(extent)
    }

    ///Assembles the create info, resolving format, present mode and extent against
    /// the surface's capabilities.
    pub fn as_swapchain_create_info(
        &self,
    ) -> Result<ash::vk::SwapchainCreateInfoKHRBuilder<'_>, EasyVkError> {
        let format = self.get_first_supported_format()?;

        let builder = ash::vk::SwapchainCreateInfoKHR::builder()
            .surface(self.surface.surface)
            .min_image_count(self.image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(self.get_supported_image_extent()?)
            .image_array_layers(self.array_layers)
            .image_usage(self.usage)
            .pre_transform(self.transform)
            .composite_alpha(self.composite_alpha)
            .present_mode(self.get_first_supported_present_mode()?)
            .clipped(self.is_clipped);

        let builder = match &self.sharing_mode {
            SharingMode::Exclusive => builder.image_sharing_mode(ash::vk::SharingMode::EXCLUSIVE),
            SharingMode::Concurrent {
                queue_family_indices,
            } => builder
                .image_sharing_mode(ash::vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices),
        };

        Ok(builder)
    }

    ///Moves `mode` to the front of the present mode preferences, appending it if it
    /// was not listed before.
    fn prefer_present_mode(&mut self, mode: ash::vk::PresentModeKHR) {
        if let Some(at) = self.present_mode_preference.iter().position(|m| *m == mode) {
            self.present_mode_preference.remove(at);
        }
        self.present_mode_preference.insert(0, mode);
    }

    ///Reorders the present mode preferences to prefer FIFO_RELAXED, then FIFO.
    pub fn with_vsync(mut self) -> Self {
        self.prefer_present_mode(ash::vk::PresentModeKHR::FIFO);
        self.prefer_present_mode(ash::vk::PresentModeKHR::FIFO_RELAXED);
        self
    }

    ///Reorders the present mode preferences to prefer immediate presentation.
    pub fn with_immediate_present(mut self) -> Self {
        self.prefer_present_mode(ash::vk::PresentModeKHR::IMMEDIATE);
        self
    }

    ///enables you to chain multiple assignments to a constructed builder. For instance
    ///
    ///```ignore
    /// builder.with(|b| b.usage = ash::vk::ImageUsageFlags::COLOR_ATTACHMENT)
    ///    .with(|b| b.is_clipped = true)
    ///    .build()
    ///```
    pub fn with(mut self, mut mapping: impl FnMut(&mut Self)) -> Self {
        mapping(&mut self);
        self
    }
}

///One acquired swapchain image together with the semaphores that guard its use.
pub struct SwapchainImage {
    ///The image, owned by the swapchain.
    pub image: Arc<Image>,
    ///Index to hand back on present.
    pub index: u32,
    ///Signaled when the image is actually available. Work writing to the image must
    /// wait on this.
    pub sem_acquire: Arc<Semaphore>,
    ///Presenting waits on this. Signal it from the submission that finishes rendering
    /// to the image.
    pub sem_present: Arc<Semaphore>,
}

pub struct Swapchain {
    pub loader: ash::extensions::khr::Swapchain,
    pub swapchain: ash::vk::SwapchainKHR,
    ///Kept alive for as long as the swapchain exists.
    pub surface: Arc<Surface>,

    pub images: Vec<Arc<Image>>,
    //the semaphore rotation is managed entirely by acquire_next_image
    acquire_semaphores: Vec<Arc<Semaphore>>,
    render_finished_semaphores: Vec<Arc<Semaphore>>,
    next_semaphore: usize,

    ///The create info recreation starts from. Adjust it before calling
    /// [recreate](Swapchain::recreate) to change parameters for the next swapchain.
    pub recreate_info: ash::vk::SwapchainCreateInfoKHR,
    sharing_mode: SharingMode,
    usage: ash::vk::ImageUsageFlags,
}

impl Swapchain {
    ///Creates a new swapchain builder with common defaults: B8G8R8A8_SRGB if supported,
    /// MAILBOX before FIFO presentation, one image more than the minimum (clamped to the
    /// supported maximum) and color attachment usage.
    ///
    /// # Note on Wayland
    /// It can happen that the surface's "supported" extent is `u32::MAX` on all axis. In that case you'll
    /// have to manually set the correct extent.
    pub fn builder(
        device: &Arc<Device>,
        surface: &Arc<Surface>,
    ) -> Result<SwapchainBuilder, EasyVkError> {
        let capabilities = surface.get_capabilities(device.physical_device)?;

        let mut image_count = capabilities.min_image_count + 1;
        //max_image_count == 0 means "no limit"
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let transform = if capabilities
            .supported_transforms
            .contains(ash::vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            ash::vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        Ok(SwapchainBuilder {
            surface: surface.clone(),
            device: device.clone(),
            format_preference: vec![ash::vk::SurfaceFormatKHR {
                format: ash::vk::Format::B8G8R8A8_SRGB,
                color_space: ash::vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_mode_preference: vec![
                ash::vk::PresentModeKHR::MAILBOX,
                ash::vk::PresentModeKHR::FIFO,
            ],
            image_count,
            extent: capabilities.current_extent,
            array_layers: 1,
            usage: ash::vk::ImageUsageFlags::COLOR_ATTACHMENT,
            sharing_mode: SharingMode::Exclusive,
            transform,
            composite_alpha: ash::vk::CompositeAlphaFlagsKHR::OPAQUE,
            is_clipped: true,
        })
    }

    ///Acquires the next image to render to, with its acquire and present semaphores
    /// already attached.
    ///
    /// Errors are returned raw, so callers can match on
    /// [ERROR_OUT_OF_DATE_KHR](ash::vk::Result::ERROR_OUT_OF_DATE_KHR) and recreate.
    pub fn acquire_next_image(&mut self) -> Result<SwapchainImage, ash::vk::Result> {
        let sem_acquire = self.acquire_semaphores[self.next_semaphore].clone();
        let sem_present = self.render_finished_semaphores[self.next_semaphore].clone();
        self.next_semaphore = (self.next_semaphore + 1) % self.acquire_semaphores.len();

        let (index, is_suboptimal) = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sem_acquire.inner,
                ash::vk::Fence::null(),
            )?
        };

        if is_suboptimal {
            #[cfg(feature = "logging")]
            log::warn!("Acquired image is suboptimal!");
        }

        Ok(SwapchainImage {
            image: self.images[index as usize].clone(),
            index,
            sem_acquire,
            sem_present,
        })
    }

    ///Recreates the swapchain for `extent`, reusing the cached create info. Old image
    /// wrappers go down once the last reference to them is dropped.
    pub fn recreate(&mut self, extent: ash::vk::Extent2D) -> Result<(), EasyVkError> {
        if extent.width == 0 || extent.height == 0 {
            return Err(DeviceError::InvalidSwapchainSize(extent).into());
        }

        let device = self.images[0].device.clone();

        let mut recreate_info = self.recreate_info;
        recreate_info.old_swapchain = self.swapchain;
        recreate_info.image_extent = extent;

        //only touch self once the new swapchain exists
        let new_swapchain = unsafe {
            self.loader
                .create_swapchain(&recreate_info, None)
                .map_err(DeviceError::VkError)?
        };
        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        self.swapchain = new_swapchain;
        self.recreate_info = recreate_info;

        let raw_images = unsafe {
            self.loader
                .get_swapchain_images(self.swapchain)
                .map_err(DeviceError::VkError)?
        };
        self.images = raw_images
            .into_iter()
            .map(|image| {
                wrap_swapchain_image(
                    &device,
                    image,
                    self.recreate_info.image_extent,
                    self.recreate_info.image_format,
                    self.usage,
                    &self.sharing_mode,
                )
            })
            .collect();

        #[cfg(feature = "logging")]
        log::info!("Recreating swapchain for {:?}", extent);

        Ok(())
    }

    ///Queues a present of `image`, waiting on `image.sem_present`. A suboptimal
    /// present is reported as [SUBOPTIMAL_KHR](ash::vk::Result::SUBOPTIMAL_KHR) so
    /// callers can decide to recreate.
    pub fn present_image(
        &self,
        image: SwapchainImage,
        queue: &ash::vk::Queue,
    ) -> ash::prelude::VkResult<()> {
        let present_info = ash::vk::PresentInfoKHR::builder()
            .swapchains(core::slice::from_ref(&self.swapchain))
            .image_indices(core::slice::from_ref(&image.index))
            .wait_semaphores(core::slice::from_ref(&image.sem_present.inner));

        let is_suboptimal = unsafe {
            self.loader.queue_present(*queue, &present_info).map_err(|e| {
                #[cfg(feature = "logging")]
                log::error!("Error while presenting image: {}", e);
                e
            })?
        };

        if is_suboptimal {
            #[cfg(feature = "logging")]
            log::warn!("Suboptimal image on present. returning error");
            return Err(ash::vk::Result::SUBOPTIMAL_KHR);
        }

        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
