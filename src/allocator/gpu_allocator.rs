use gpu_allocator::{
    vulkan::{AllocationCreateDesc, AllocationScheme},
    MemoryLocation,
};

use super::{Allocation, MemoryUsage};

impl From<MemoryUsage> for MemoryLocation {
    fn from(usage: MemoryUsage) -> MemoryLocation {
        match usage {
            MemoryUsage::Unknown => MemoryLocation::Unknown,
            MemoryUsage::GpuOnly => MemoryLocation::GpuOnly,
            MemoryUsage::CpuToGpu => MemoryLocation::CpuToGpu,
            MemoryUsage::GpuToCpu => MemoryLocation::GpuToCpu,
        }
    }
}

impl Allocation for gpu_allocator::vulkan::Allocation {
    fn memory(&self) -> ash::vk::DeviceMemory {
        unsafe { self.memory() }
    }

    fn offset(&self) -> u64 {
        self.offset()
    }

    fn size(&self) -> u64 {
        self.size()
    }

    fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        self.mapped_ptr()
    }

    fn as_slice_ref(&self) -> Option<&[u8]> {
        self.mapped_slice()
    }

    fn as_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.mapped_slice_mut()
    }
}

impl super::Allocator for gpu_allocator::vulkan::Allocator {
    type Allocation = gpu_allocator::vulkan::Allocation;
    type AllocationError = gpu_allocator::AllocationError;

    fn allocate(
        &mut self,
        name: Option<&str>,
        requirements: ash::vk::MemoryRequirements,
        usage: MemoryUsage,
        is_linear: bool,
    ) -> Result<Self::Allocation, Self::AllocationError> {
        self.allocate(&AllocationCreateDesc {
            name: name.unwrap_or("easyvk allocation"),
            requirements,
            location: usage.into(),
            linear: is_linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
    }

    fn free(&mut self, allocation: Self::Allocation) -> Result<(), Self::AllocationError> {
        self.free(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_maps_to_matching_location() {
        assert_eq!(
            MemoryLocation::from(MemoryUsage::GpuOnly),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            MemoryLocation::from(MemoryUsage::CpuToGpu),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            MemoryLocation::from(MemoryUsage::GpuToCpu),
            MemoryLocation::GpuToCpu
        );
        assert_eq!(
            MemoryLocation::from(MemoryUsage::Unknown),
            MemoryLocation::Unknown
        );
    }
}
