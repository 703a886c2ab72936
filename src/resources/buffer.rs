use std::{
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use crate::{
    allocator::{Allocation, Allocator, AnonymAllocation, ManagedAllocation, MemoryUsage},
    context::{Device, Queue},
    error::{BufferMapError, BuilderError, DeviceError},
    EasyVkError,
};
use ash::vk::{self, DeviceSize};

use super::SharingMode;

///Rounds `value` down to the next multiple of `alignment`. `alignment` must be a power of two,
/// which holds for `nonCoherentAtomSize`.
fn align_down(value: DeviceSize, alignment: DeviceSize) -> DeviceSize {
    value & !(alignment - 1)
}

fn align_up(value: DeviceSize, alignment: DeviceSize) -> DeviceSize {
    align_down(value + alignment - 1, alignment)
}

///Creation-time description of a buffer. Carries everything needed to build the
/// `vk::BufferCreateInfo`, and stays attached to the created [Buffer] for later inspection.
#[derive(Clone, Debug)]
pub struct BufDesc {
    pub size: ash::vk::DeviceSize,
    pub usage: ash::vk::BufferUsageFlags,
    pub sharing: super::SharingMode,
}

impl BufDesc {
    pub fn set_on_builder<'a>(
        &'a self,
        mut builder: ash::vk::BufferCreateInfoBuilder<'a>,
    ) -> ash::vk::BufferCreateInfoBuilder<'a> {
        builder = builder.size(self.size).usage(self.usage);

        match &self.sharing {
            super::SharingMode::Exclusive => {
                builder = builder.sharing_mode(ash::vk::SharingMode::EXCLUSIVE)
            }
            super::SharingMode::Concurrent {
                queue_family_indices,
            } => {
                builder = builder
                    .sharing_mode(ash::vk::SharingMode::CONCURRENT)
                    .queue_family_indices(queue_family_indices)
            }
        }

        builder
    }
}

///Fluent buffer setup. Collects the description, the memory location and optional
/// creation flags, checks the combination in [validate](BufferBuilder::validate) and only
/// then touches the device.
#[derive(Clone, Debug)]
pub struct BufferBuilder {
    pub desc: BufDesc,
    pub memory_usage: MemoryUsage,
    pub create_flags: vk::BufferCreateFlags,
    ///Debug name forwarded to the allocator.
    pub name: Option<String>,
}

impl BufferBuilder {
    pub fn new(size: DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        BufferBuilder {
            desc: BufDesc {
                size,
                usage,
                sharing: SharingMode::Exclusive,
            },
            memory_usage: MemoryUsage::GpuOnly,
            create_flags: vk::BufferCreateFlags::empty(),
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

    pub fn with_sharing(mut self, sharing: SharingMode) -> Self {
        self.desc.sharing = sharing;
        self
    }

    pub fn with_create_flags(mut self, flags: vk::BufferCreateFlags) -> Self {
        self.create_flags = flags;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    ///Checks the collected description without touching a device.
    pub fn validate(&self) -> Result<(), BuilderError> {
        if self.desc.size == 0 {
            return Err(BuilderError::ZeroSize);
        }
        if self.desc.usage.is_empty() {
            return Err(BuilderError::EmptyUsage);
        }
        if let SharingMode::Concurrent {
            queue_family_indices,
        } = &self.desc.sharing
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
    ) -> Result<Buffer, EasyVkError> {
        self.validate()?;
        let buffer = Buffer::new(
            device,
            allocator,
            self.desc,
            self.memory_usage,
            self.name.as_deref(),
            self.create_flags,
        )?;
        Ok(buffer)
    }

    ///Builds the buffer and fills it with `data`. Host-visible buffers are written through
    /// their mapping; device-local buffers go through a temporary staging buffer and a
    /// blocking copy submitted on `upload_queue`.
    pub fn build_and_upload<A: Allocator + Send + Sync + 'static, T: bytemuck::Pod>(
        mut self,
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        upload_queue: &Queue,
        data: &[T],
    ) -> Result<Buffer, EasyVkError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if self.desc.size < bytes.len() as DeviceSize {
            #[cfg(feature = "logging")]
            log::warn!(
                "Buffer size {} too small for upload of {} bytes, growing",
                self.desc.size,
                bytes.len()
            );
            self.desc.size = bytes.len() as DeviceSize;
        }

        match self.memory_usage {
            MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => {
                let mut buffer = self.build(device, allocator)?;
                buffer.write(0, bytes)?;
                buffer.flush_range();
                Ok(buffer)
            }
            MemoryUsage::GpuOnly | MemoryUsage::Unknown => {
                //the copy target flag must be present for the staging copy
                self.desc.usage |= vk::BufferUsageFlags::TRANSFER_DST;
                let copy_size = bytes.len() as DeviceSize;
                let buffer = self.build(device, allocator)?;

                let staging =
                    Buffer::new_staging_for_data(device, allocator, Some("staging buffer"), data)?;

                crate::commands::execute_oneshot(device, upload_queue, |dev, cmd| unsafe {
                    dev.cmd_copy_buffer(
                        cmd,
                        staging.inner,
                        buffer.inner,
                        &[*vk::BufferCopy::builder()
                            .src_offset(0)
                            .dst_offset(0)
                            .size(copy_size)],
                    );
                })?;

                Ok(buffer)
            }
        }
    }
}

///Self managing buffer. Destroys the handle on drop; the backing memory is freed
/// by the allocation's own Drop.
pub struct Buffer {
    pub desc: BufDesc,
    pub inner: ash::vk::Buffer,
    pub usage: MemoryUsage,
    pub device: Arc<Device>,
    //Type-erased so buffers from different allocators can live in one collection.
    //The allocation is only touched again on drop.
    pub allocation: Box<dyn AnonymAllocation + Send + Sync + 'static>,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_buffer(self.inner, None) }
    }
}

///The hash implementation is based on [Buffer](ash::vk::Buffer)'s hash.
impl Hash for Buffer {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl Buffer {
    ///Creates a buffer for `description` and the supplied creation-time information. Note that the actual resulting
    ///allocation can be bigger than specified.
    pub fn new<A: Allocator + Send + Sync + 'static>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        description: BufDesc,
        usage: MemoryUsage,
        name: Option<&str>,
        create_flags: ash::vk::BufferCreateFlags,
    ) -> Result<Self, DeviceError> {
        let mut builder = ash::vk::BufferCreateInfo::builder().flags(create_flags);
        builder = description.set_on_builder(builder);

        //create buffer handle
        let buffer = unsafe { device.inner.create_buffer(&builder, None)? };
        let allocation = allocator
            .lock()
            .unwrap()
            .allocate_buffer(&device.inner, name, &buffer, usage)
            .map_err(|e| DeviceError::GpuAllocatorError(Box::new(e)))?;

        //if allocation did no fail, bind memory to buffer and return.
        unsafe {
            device
                .inner
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?
        };

        Ok(Buffer {
            device: device.clone(),
            allocation: Box::new(ManagedAllocation {
                allocator: allocator.clone(),
                allocation: Some(allocation),
            }),
            usage,
            desc: description,
            inner: buffer,
        })
    }

    ///A staging buffer is a host visible, mapable buffer. Those are usually used to either copy data (from them) to the GPU, or from the GPU back to
    /// the staging buffer to read the data.
    ///
    /// Buffers created by this function are initalized to `data` and can be used as transfer source and destination.
    pub fn new_staging_for_data<A: Allocator + Send + Sync + 'static, T: bytemuck::Pod>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        name: Option<&str>,
        data: &[T],
    ) -> Result<Self, EasyVkError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        //pad to the coherent atom so the final flush covers the whole write
        let atom = device.properties().limits.non_coherent_atom_size;
        let buffer_size = align_up(bytes.len() as DeviceSize, atom);

        let desc = BufDesc {
            sharing: SharingMode::Exclusive,
            size: buffer_size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST, //make sure copy works
        };

        let mut buffer = Buffer::new(
            device,
            allocator,
            desc,
            MemoryUsage::CpuToGpu,
            name,
            vk::BufferCreateFlags::empty(),
        )?;
        buffer.write(0, bytes)?;
        //Make sure the data is written
        buffer.flush_range();

        Ok(buffer)
    }

    ///Writes `data` to the buffer, starting at `offset` bytes into it.
    ///If `offset + data.len()` exceeds the buffer size only the part up to the buffer's
    /// end is written and an error is returned.
    ///
    ///If the buffer is not mapable by the host (usually if the buffer was created with
    /// MemoryUsage::GpuOnly) nothing is written and an error is returned.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BufferMapError> {
        //Check that we have a chance for mapping
        match &self.usage {
            MemoryUsage::GpuOnly | MemoryUsage::Unknown => {
                #[cfg(feature = "logging")]
                log::error!("Tried to map buffer that has usage: {:?}", self.usage);
                return Err(BufferMapError::NotMappable);
            }
            _ => {}
        }

        //Test region of write and shrink if necessary
        let write_size = if (offset + data.len()) > (self.desc.size as usize) {
            //edge case where the offset is too big, in that case the subtraction below would underflow
            if offset > (self.desc.size as usize) {
                return Err(BufferMapError::OffsetTooLarge {
                    offset,
                    size: self.desc.size as usize,
                });
            }

            (self.desc.size as usize) - offset
        } else {
            data.len()
        };

        //since we sanitized the write, try to map the pointer and write the actual slice
        if let Some(ptr) = self.allocation.as_slice_mut() {
            ptr[offset..(offset + write_size)].copy_from_slice(&data[0..write_size]);
        } else {
            return Err(BufferMapError::NotMappable);
        }

        if write_size < data.len() {
            Err(BufferMapError::PartiallyWritten {
                written: write_size,
                size: data.len(),
            })
        } else {
            Ok(())
        }
    }

    ///Tries to flush the mapped memory range. Does nothing if the memory is not host mappable.
    pub fn flush_range(&self) {
        match &self.usage {
            MemoryUsage::GpuOnly | MemoryUsage::Unknown => {
                #[cfg(feature = "logging")]
                log::error!("Tried to flush buffer that has usage: {:?}", self.usage);
                return;
            }
            _ => {}
        }

        //The flushed range must be aligned to the coherent atom size, so widen the
        // allocation's range accordingly.
        let atom = self.device.properties().limits.non_coherent_atom_size;
        let start = align_down(self.allocation.offset(), atom);
        let end = align_up(self.allocation.offset() + self.allocation.size(), atom);
        let range = vk::MappedMemoryRange::builder()
            .memory(self.allocation.memory())
            .offset(start)
            .size(end - start);

        unsafe {
            if let Err(e) = self.device.inner.flush_mapped_memory_ranges(&[*range]) {
                #[cfg(feature = "logging")]
                log::error!("Failed to flush memory range of mapped buffer: {}", e);
                #[cfg(not(feature = "logging"))]
                let _ = e;
            }
        }
    }

    ///Returns (if possible) a reference to the buffers data. Note that the data might be aligned, or not even be of one type. Turning this data into actual types should probably be implemented
    /// by whoever knows the actual data layout.
    pub fn read(&self) -> Result<&[u8], BufferMapError> {
        match &self.usage {
            MemoryUsage::GpuOnly | MemoryUsage::Unknown => {
                return Err(BufferMapError::NotMappable);
            }
            _ => {}
        }

        if let Some(slice) = self.allocation.as_slice_ref() {
            Ok(slice)
        } else {
            Err(BufferMapError::NotMappable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Buffer: Send, Sync);
    }

    #[test]
    fn rejects_zero_size() {
        let builder = BufferBuilder::new(0, vk::BufferUsageFlags::VERTEX_BUFFER);
        assert!(matches!(builder.validate(), Err(BuilderError::ZeroSize)));
    }

    #[test]
    fn rejects_empty_usage() {
        let builder = BufferBuilder::new(1024, vk::BufferUsageFlags::empty());
        assert!(matches!(builder.validate(), Err(BuilderError::EmptyUsage)));
    }

    #[test]
    fn rejects_concurrent_with_single_queue() {
        let builder = BufferBuilder::new(1024, vk::BufferUsageFlags::STORAGE_BUFFER)
            .with_sharing(SharingMode::Concurrent {
                queue_family_indices: smallvec![0],
            });
        assert!(matches!(
            builder.validate(),
            Err(BuilderError::ConcurrentWithoutQueues)
        ));
    }

    #[test]
    fn accepts_valid_description() {
        let builder = BufferBuilder::new(256, vk::BufferUsageFlags::UNIFORM_BUFFER)
            .with_memory_usage(MemoryUsage::CpuToGpu)
            .with_sharing(SharingMode::Concurrent {
                queue_family_indices: smallvec![0, 1],
            });
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_down(129, 64), 128);
        assert_eq!(align_up(129, 64), 192);
        assert_eq!(align_up(128, 64), 128);
        assert_eq!(align_down(0, 64), 0);
    }
}
