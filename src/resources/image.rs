use ash::vk;

use crate::{
    allocator::{Allocation, Allocator, AnonymAllocation, ManagedAllocation, MemoryUsage},
    context::{Device, Queue},
    error::{BuilderError, DeviceError},
    resources::SharingMode,
    EasyVkError,
};
use std::{
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use super::Buffer;

///Dimensionality of an image, including the array and cube variants. Carries the
/// layer count where one applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    Tex1d,
    Tex1dArray(u32),
    Tex2d,
    Tex2dArray(u32),
    Tex3d,
    Tex3dArray(u32),
    Cube,
    CubeArray(u32),
}

impl ImageType {
    ///Clamps the unused axes of `extent` to 1, so a 1d image cannot end up with a
    /// zero height for instance.
    pub fn valid_extent(&self, extent: vk::Extent3D) -> vk::Extent3D {
        match self {
            ImageType::Tex1d | ImageType::Tex1dArray(_) => vk::Extent3D {
                width: extent.width,
                height: 1,
                depth: 1,
            },
            ImageType::Tex2d
            | ImageType::Tex2dArray(_)
            | ImageType::Cube
            | ImageType::CubeArray(_) => vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            ImageType::Tex3d | ImageType::Tex3dArray(_) => extent,
        }
    }

    ///The number of array layers this type occupies. Cubes take six layers per face
    /// set.
    pub fn layer_count(&self) -> u32 {
        match self {
            ImageType::Tex1d | ImageType::Tex2d | ImageType::Tex3d => 1,
            ImageType::Tex1dArray(layers)
            | ImageType::Tex2dArray(layers)
            | ImageType::Tex3dArray(layers) => *layers,
            ImageType::Cube => 6,
            ImageType::CubeArray(cubes) => 6 * cubes,
        }
    }

    ///The view type a view over the full image uses.
    pub fn view_type(&self) -> vk::ImageViewType {
        match self {
            ImageType::Tex1d => vk::ImageViewType::TYPE_1D,
            ImageType::Tex1dArray(_) => vk::ImageViewType::TYPE_1D_ARRAY,
            ImageType::Tex2d => vk::ImageViewType::TYPE_2D,
            ImageType::Tex2dArray(_) => vk::ImageViewType::TYPE_2D_ARRAY,
            ImageType::Tex3d | ImageType::Tex3dArray(_) => vk::ImageViewType::TYPE_3D,
            ImageType::Cube => vk::ImageViewType::CUBE,
            ImageType::CubeArray(_) => vk::ImageViewType::CUBE_ARRAY,
        }
    }
}

impl From<ImageType> for vk::ImageType {
    fn from(ty: ImageType) -> vk::ImageType {
        match ty {
            ImageType::Tex1d | ImageType::Tex1dArray(_) => vk::ImageType::TYPE_1D,
            ImageType::Tex2d
            | ImageType::Tex2dArray(_)
            | ImageType::Cube
            | ImageType::CubeArray(_) => vk::ImageType::TYPE_2D,
            ImageType::Tex3d | ImageType::Tex3dArray(_) => vk::ImageType::TYPE_3D,
        }
    }
}

///Static description of an image view. [Image::view_all] produces one covering the
/// whole image; adjust the subresource range for partial views.
pub struct ImgViewDesc {
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub component_mapping: vk::ComponentMapping,
    pub range: vk::ImageSubresourceRange,
}

impl ImgViewDesc {
    ///Writes every field of `self` onto `builder`.
    pub fn set_on_builder<'a>(
        &'a self,
        builder: vk::ImageViewCreateInfoBuilder<'a>,
    ) -> vk::ImageViewCreateInfoBuilder<'a> {
        builder
            .view_type(self.view_type)
            .format(self.format)
            .components(self.component_mapping)
            .subresource_range(self.range)
    }

    pub fn with_aspect(mut self, aspect_flag: vk::ImageAspectFlags) -> Self {
        self.range.aspect_mask |= aspect_flag;
        self
    }
}

///Image view that holds its source image and destroys the view handle on drop.
pub struct ImageView {
    pub desc: ImgViewDesc,
    pub device: Arc<crate::context::Device>,
    pub view: vk::ImageView,
    pub src_img: Arc<Image>,
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_image_view(self.view, None) };
    }
}

///All static parameters of an image, the creation-only parts of a
/// [vk::ImageCreateInfo] (flags, p_next) excluded. The `*_2d` constructors cover the
/// common attachment, storage and texture setups.
#[derive(Clone, Debug)]
pub struct ImgDesc {
    pub img_type: ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub sharing_mode: SharingMode,
}

impl Default for ImgDesc {
    ///A plain 512x512 2d image: one mip, one sample, optimal tiling, color attachment
    /// usage.
    fn default() -> Self {
        ImgDesc {
            img_type: ImageType::Tex2d,
            format: vk::Format::R8G8B8A8_UINT,
            extent: vk::Extent3D {
                width: 512,
                height: 512,
                depth: 1,
            },
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            sharing_mode: SharingMode::Exclusive,
        }
    }
}

impl ImgDesc {
    ///Writes everything `self` describes onto `builder`. Extent and layer count are
    /// derived through the image type so they are always consistent.
    pub fn set_on_builder<'a>(
        &'a self,
        builder: vk::ImageCreateInfoBuilder<'a>,
    ) -> vk::ImageCreateInfoBuilder<'a> {
        let builder = builder
            .image_type(self.img_type.into())
            .format(self.format)
            .extent(self.img_type.valid_extent(self.extent))
            .mip_levels(self.mip_levels)
            .array_layers(self.img_type.layer_count())
            .samples(self.samples)
            .tiling(self.tiling)
            .usage(self.usage);

        match &self.sharing_mode {
            SharingMode::Exclusive => builder.sharing_mode(vk::SharingMode::EXCLUSIVE),
            SharingMode::Concurrent {
                queue_family_indices,
            } => builder
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices),
        }
    }

    pub fn add_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    fn simple_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            format,
            ..Default::default()
        }
    }

    ///A 2d color attachment. Add further usages via [add_usage](ImgDesc::add_usage)
    /// if the attachment is also sampled or copied.
    pub fn color_attachment_2d(width: u32, height: u32, format: vk::Format) -> Self {
        Self::simple_2d(width, height, format)
    }

    ///A 2d depth/stencil attachment.
    pub fn depth_attachment_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Self::simple_2d(width, height, format)
        }
    }

    ///A 2d storage image with both transfer directions enabled.
    pub fn storage_image_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            usage: vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            ..Self::simple_2d(width, height, format)
        }
    }

    ///A 2d sampled texture that can be uploaded to.
    pub fn texture_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ..Self::simple_2d(width, height, format)
        }
    }
}

///Fluent image setup around an [ImgDesc]. Checks the description in
/// [validate](ImageBuilder::validate) before any device call.
#[derive(Clone, Debug)]
pub struct ImageBuilder {
    pub desc: ImgDesc,
    pub memory_usage: MemoryUsage,
    pub create_flags: vk::ImageCreateFlags,
    ///Debug name forwarded to the allocator.
    pub name: Option<String>,
}

impl ImageBuilder {
    pub fn new(desc: ImgDesc) -> Self {
        ImageBuilder {
            desc,
            memory_usage: MemoryUsage::GpuOnly,
            create_flags: vk::ImageCreateFlags::empty(),
            name: None,
        }
    }

    ///Allows changing `self` builder style.
    pub fn with(mut self, mut mapping: impl FnMut(&mut Self)) -> Self {
        mapping(&mut self);
        self
    }

    pub fn with_memory_usage(mut self, usage: MemoryUsage) -> Self {
        self.memory_usage = usage;
        self
    }

    pub fn with_create_flags(mut self, flags: vk::ImageCreateFlags) -> Self {
        self.create_flags = flags;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    ///Checks the collected description without touching a device.
    pub fn validate(&self) -> Result<(), BuilderError> {
        let extent = self.desc.img_type.valid_extent(self.desc.extent);
        if extent.width == 0 || extent.height == 0 || extent.depth == 0 {
            return Err(BuilderError::ZeroExtent);
        }
        if self.desc.usage.is_empty() {
            return Err(BuilderError::EmptyUsage);
        }
        if self.desc.mip_levels == 0 || self.desc.img_type.layer_count() == 0 {
            return Err(BuilderError::ZeroMipOrLayer);
        }
        if let SharingMode::Concurrent {
            queue_family_indices,
        } = &self.desc.sharing_mode
        {
            if queue_family_indices.len() < 2 {
                return Err(BuilderError::ConcurrentWithoutQueues);
            }
        }
        Ok(())
    }

    pub fn build<A: Allocator + Send + Sync + 'static>(
        self,
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
    ) -> Result<Image, EasyVkError> {
        self.validate()?;
        let image = Image::new(
            device,
            allocator,
            self.desc,
            self.memory_usage,
            self.name.as_deref(),
            self.create_flags,
        )?;
        Ok(image)
    }

    ///Builds the image and fills its first mip level with `data` through a staging buffer.
    /// The copy and the layout transitions (UNDEFINED → TRANSFER_DST_OPTIMAL → `target_layout`)
    /// are submitted on `upload_queue` and awaited before returning. The returned image is
    /// in `target_layout`.
    pub fn build_and_upload<A: Allocator + Send + Sync + 'static, T: bytemuck::Pod>(
        mut self,
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        upload_queue: &Queue,
        data: &[T],
        target_layout: vk::ImageLayout,
    ) -> Result<Image, EasyVkError> {
        //the copy target flag must be present for the staging copy
        self.desc.usage |= vk::ImageUsageFlags::TRANSFER_DST;
        let image = self.build(device, allocator)?;

        let staging =
            Buffer::new_staging_for_data(device, allocator, Some("staging buffer"), data)?;

        //resolve the barrier masks up front so recording itself cannot fail
        let to_transfer = crate::commands::transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        let to_target = if target_layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
            Some(crate::commands::transition_masks(
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                target_layout,
            )?)
        } else {
            None
        };

        let copy_region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(image.subresource_layers_all())
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(image.extent_3d());

        crate::commands::execute_oneshot(device, upload_queue, |dev, cmd| {
            crate::commands::record_image_barrier(
                dev,
                cmd,
                &image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &to_transfer,
            );

            unsafe {
                dev.cmd_copy_buffer_to_image(
                    cmd,
                    staging.inner,
                    image.inner,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[*copy_region],
                );
            }

            if let Some(masks) = &to_target {
                crate::commands::record_image_barrier(
                    dev,
                    cmd,
                    &image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    target_layout,
                    masks,
                );
            }
        })?;

        Ok(image)
    }
}

///Image with its allocation. Dropping the image destroys the handle (unless the
/// memory is owned elsewhere, see `do_not_destroy`) and the allocation frees itself.
pub struct Image {
    pub inner: vk::Image,
    ///Freed when the image is dropped.
    pub allocation: Box<dyn AnonymAllocation + Send + Sync + 'static>,
    pub desc: ImgDesc,
    pub usage: MemoryUsage,
    pub device: Arc<Device>,
    ///Set for images whose handle belongs to someone else, like the swapchain.
    pub do_not_destroy: bool,
}

///Hashes the raw image handle.
impl Hash for Image {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if !self.do_not_destroy {
            unsafe { self.device.inner.destroy_image(self.inner, None) }
        }
    }
}

impl Image {
    ///Creates the image and binds freshly allocated memory to it. The image starts in
    /// the UNDEFINED layout.
    pub fn new<A: Allocator + Send + Sync + 'static>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        description: ImgDesc,
        memory_usage: MemoryUsage,
        name: Option<&str>,
        create_flags: vk::ImageCreateFlags,
    ) -> Result<Self, DeviceError> {
        let builder = vk::ImageCreateInfo::builder()
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .flags(create_flags);
        let builder = description.set_on_builder(builder);

        let image = unsafe { device.inner.create_image(&builder, None)? };

        let allocation = allocator
            .lock()
            .unwrap()
            .allocate_image(
                &device.inner,
                name,
                &image,
                memory_usage,
                description.tiling == vk::ImageTiling::LINEAR,
            )
            .map_err(|e| DeviceError::GpuAllocatorError(Box::new(e)))?;

        unsafe {
            device
                .inner
                .bind_image_memory(image, allocation.memory(), allocation.offset())?
        };

        Ok(Image {
            inner: image,
            allocation: Box::new(ManagedAllocation {
                allocator: allocator.clone(),
                allocation: Some(allocation),
            }),
            desc: description,
            usage: memory_usage,
            device: device.clone(),
            do_not_destroy: false,
        })
    }

    pub fn extent_3d(&self) -> vk::Extent3D {
        self.desc.img_type.valid_extent(self.desc.extent)
    }

    ///The extent without the depth axis.
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.desc.extent.width,
            height: self.desc.extent.height,
        }
    }

    ///A subresource range spanning every mip level and layer. The aspect is derived
    /// from the usage: depth(/stencil) for depth attachments, color otherwise.
    pub fn subresource_all(&self) -> vk::ImageSubresourceRange {
        let aspect_mask = if self
            .desc
            .usage
            .contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            match self.desc.format {
                //depth-only formats must not carry the stencil aspect
                vk::Format::D16_UNORM | vk::Format::D32_SFLOAT => vk::ImageAspectFlags::DEPTH,
                _ => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            }
        } else {
            vk::ImageAspectFlags::COLOR
        };

        vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: self.desc.mip_levels,
            base_array_layer: 0,
            layer_count: self.desc.img_type.layer_count(),
        }
    }

    ///Subresource layers for the first mip level, across every layer.
    pub fn subresource_layers_all(&self) -> vk::ImageSubresourceLayers {
        let range = self.subresource_all();
        vk::ImageSubresourceLayers {
            aspect_mask: range.aspect_mask,
            mip_level: range.base_mip_level,
            base_array_layer: range.base_array_layer,
            layer_count: range.layer_count,
        }
    }

    ///An [ImgViewDesc] covering the whole image with identity swizzling.
    pub fn view_all(&self) -> ImgViewDesc {
        ImgViewDesc {
            view_type: self.desc.img_type.view_type(),
            format: self.desc.format,
            component_mapping: vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            },
            range: self.subresource_all(),
        }
    }
}

///Creates views whose lifetime is safe: the view holds the image, the image holds
/// the device.
pub trait SafeImageView {
    fn view(&self, device: &Arc<Device>, desc: ImgViewDesc) -> Result<ImageView, DeviceError>;
}

impl SafeImageView for Arc<Image> {
    fn view(&self, device: &Arc<Device>, desc: ImgViewDesc) -> Result<ImageView, DeviceError> {
        let builder = vk::ImageViewCreateInfo::builder().image(self.inner);
        let builder = desc.set_on_builder(builder);

        let view = unsafe { device.inner.create_image_view(&builder, None)? };

        Ok(ImageView {
            desc,
            device: device.clone(),
            view,
            src_img: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Image: Send, Sync);
        assert_impl_all!(ImageView: Send, Sync);
    }

    #[test]
    fn rejects_zero_extent() {
        let builder = ImageBuilder::new(ImgDesc::texture_2d(0, 128, vk::Format::R8G8B8A8_UNORM));
        assert!(matches!(builder.validate(), Err(BuilderError::ZeroExtent)));
    }

    #[test]
    fn rejects_empty_usage() {
        let mut desc = ImgDesc::texture_2d(128, 128, vk::Format::R8G8B8A8_UNORM);
        desc.usage = vk::ImageUsageFlags::empty();
        let builder = ImageBuilder::new(desc);
        assert!(matches!(builder.validate(), Err(BuilderError::EmptyUsage)));
    }

    #[test]
    fn rejects_zero_mips() {
        let mut desc = ImgDesc::texture_2d(128, 128, vk::Format::R8G8B8A8_UNORM);
        desc.mip_levels = 0;
        let builder = ImageBuilder::new(desc);
        assert!(matches!(
            builder.validate(),
            Err(BuilderError::ZeroMipOrLayer)
        ));
    }

    #[test]
    fn one_d_extent_is_sanitized() {
        let mut desc = ImgDesc::texture_2d(128, 0, vk::Format::R8G8B8A8_UNORM);
        desc.img_type = ImageType::Tex1d;
        let builder = ImageBuilder::new(desc);
        //height is forced to 1 for 1d images, so this is valid
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn cube_layer_count() {
        assert_eq!(ImageType::Cube.layer_count(), 6);
        assert_eq!(ImageType::CubeArray(2).layer_count(), 12);
    }

    #[test]
    fn array_types_view_as_arrays() {
        assert_eq!(
            ImageType::Tex2dArray(4).view_type(),
            vk::ImageViewType::TYPE_2D_ARRAY
        );
        assert_eq!(ImageType::Cube.view_type(), vk::ImageViewType::CUBE);
    }
}
