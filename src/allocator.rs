//! ## Allocator
//!
//! Device memory management is left to the application in Vulkan, and in practice
//! handled by a dedicated allocator library. The [Allocator] trait is the seam where
//! such a library plugs in; resources only ever see a type-erased
//! [AnonymAllocation], so their structs stay free of the allocator type.
//!
//! With the `default_allocator` feature (on by default) the trait is implemented for
//! [gpu-allocator](https://github.com/Traverse-Research/gpu-allocator).

#[cfg(feature = "default_allocator")]
mod gpu_allocator;

mod unallocated;
pub use unallocated::{UnmanagedAllocation, UnmanagedAllocationError, UnmanagedAllocator};

///Intended access pattern of an allocation. GpuOnly memory is fastest for the device
/// but cannot be mapped; the CpuToGpu/GpuToCpu variants request host-visible memory.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryUsage {
    Unknown,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

///One allocation of a concrete [Allocator]: the backing memory handle, the range on
/// it, and a host mapping when the memory is mappable.
pub trait Allocation {
    fn memory(&self) -> ash::vk::DeviceMemory;
    fn offset(&self) -> u64;
    fn size(&self) -> u64;
    fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>>;
    fn as_slice_ref(&self) -> Option<&[u8]>;
    fn as_slice_mut(&mut self) -> Option<&mut [u8]>;
}

///The [Allocation] interface with the allocator type erased. [Image](crate::resources::Image)
/// and [Buffer](crate::resources::Buffer) store a `Box<dyn AnonymAllocation>` so the
/// allocator does not leak into their types.
pub trait AnonymAllocation: Send + Sync {
    fn memory(&self) -> ash::vk::DeviceMemory;
    fn offset(&self) -> u64;
    fn size(&self) -> u64;
    fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>>;
    fn as_slice_ref(&self) -> Option<&[u8]>;
    fn as_slice_mut(&mut self) -> Option<&mut [u8]>;
}

///An allocation paired with its allocator. Hands the allocation back when dropped,
/// which is what gives buffers and images their free-on-drop behavior.
pub struct ManagedAllocation<A: Allocator + Send + Sync + 'static> {
    pub allocator: std::sync::Arc<std::sync::Mutex<A>>,
    ///None once the allocation was taken out, for instance on drop.
    pub allocation: Option<<A as Allocator>::Allocation>,
}

impl<A: Allocator + Send + Sync + 'static> ManagedAllocation<A> {
    ///False if the allocation was already handed back and must not be used.
    pub fn is_valid(&self) -> bool {
        self.allocation.is_some()
    }
}

impl<A: Allocator + Send + Sync + 'static> Drop for ManagedAllocation<A> {
    fn drop(&mut self) {
        let Some(allocation) = self.allocation.take() else {
            return;
        };
        match self.allocator.lock() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    //a failed free is not recoverable here, the allocator keeps
                    //the bookkeeping either way
                    #[cfg(feature = "logging")]
                    log::error!("Freeing allocation failed with: {}", e);
                    #[cfg(not(feature = "logging"))]
                    let _ = e;
                }
            }
            Err(_poisoned) => {
                #[cfg(feature = "logging")]
                log::warn!("Allocator mutex poisoned, leaking allocation");
            }
        }
    }
}

impl<A: Allocator + Send + Sync + 'static> AnonymAllocation for ManagedAllocation<A> {
    fn memory(&self) -> ash::vk::DeviceMemory {
        self.allocation
            .as_ref()
            .map(|a| a.memory())
            .unwrap_or(ash::vk::DeviceMemory::null())
    }
    fn offset(&self) -> u64 {
        self.allocation.as_ref().map(|a| a.offset()).unwrap_or(0)
    }
    fn size(&self) -> u64 {
        self.allocation.as_ref().map(|a| a.size()).unwrap_or(0)
    }
    fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        self.allocation.as_ref().and_then(|a| a.mapped_ptr())
    }
    fn as_slice_ref(&self) -> Option<&[u8]> {
        self.allocation.as_ref().and_then(|a| a.as_slice_ref())
    }
    fn as_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.allocation.as_mut().and_then(|a| a.as_slice_mut())
    }
}

///A device memory allocator. The buffer/image helpers read the resource's memory
/// requirements and forward to [allocate](Allocator::allocate).
pub trait Allocator {
    type Allocation: Allocation + Send + Sync + 'static;
    type AllocationError: std::error::Error + Send + Sync + 'static;

    ///Allocates memory matching `requirements`, with `name` as an optional debug tag.
    /// `is_linear` distinguishes linearly tiled resources (buffers, linear images)
    /// from optimally tiled images.
    fn allocate(
        &mut self,
        name: Option<&str>,
        requirements: ash::vk::MemoryRequirements,
        usage: MemoryUsage,
        is_linear: bool,
    ) -> Result<Self::Allocation, Self::AllocationError>;

    fn free(&mut self, allocation: Self::Allocation) -> Result<(), Self::AllocationError>;

    ///Allocates memory fitting `buffer`. Buffers are always linear.
    fn allocate_buffer(
        &mut self,
        device: &ash::Device,
        name: Option<&str>,
        buffer: &ash::vk::Buffer,
        usage: MemoryUsage,
    ) -> Result<Self::Allocation, Self::AllocationError> {
        let requirements = unsafe { device.get_buffer_memory_requirements(*buffer) };
        self.allocate(name, requirements, usage, true)
    }

    ///Allocates memory fitting `image`.
    fn allocate_image(
        &mut self,
        device: &ash::Device,
        name: Option<&str>,
        image: &ash::vk::Image,
        usage: MemoryUsage,
        is_linear: bool,
    ) -> Result<Self::Allocation, Self::AllocationError> {
        let requirements = unsafe { device.get_image_memory_requirements(*image) };
        self.allocate(name, requirements, usage, is_linear)
    }
}
