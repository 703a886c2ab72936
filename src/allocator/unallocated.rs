use std::{fmt::Display, marker::PhantomData};

use super::{Allocation, AnonymAllocation};

///Placeholder allocator for resources whose memory is owned elsewhere, like swapchain
/// images. `allocate` always fails, `free` is a no-op.
pub struct UnmanagedAllocator;

///The no-op allocation handed to externally owned resources. Reports a null memory
/// handle, zero size and no mapping.
pub struct UnmanagedAllocation {
    //keeps construction inside the crate
    pub(crate) hidden: PhantomData<()>,
}

impl UnmanagedAllocation {
    pub(crate) fn new() -> Self {
        UnmanagedAllocation {
            hidden: PhantomData,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct UnmanagedAllocationError;
impl Display for UnmanagedAllocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unmanaged memory cannot be allocated")
    }
}
impl std::error::Error for UnmanagedAllocationError {}

impl Allocation for UnmanagedAllocation {
    fn memory(&self) -> ash::vk::DeviceMemory {
        ash::vk::DeviceMemory::null()
    }
    fn offset(&self) -> u64 {
        0
    }
    fn size(&self) -> u64 {
        0
    }
    fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        None
    }
    fn as_slice_ref(&self) -> Option<&[u8]> {
        None
    }
    fn as_slice_mut(&mut self) -> Option<&mut [u8]> {
        None
    }
}

impl AnonymAllocation for UnmanagedAllocation {
    fn memory(&self) -> ash::vk::DeviceMemory {
        ash::vk::DeviceMemory::null()
    }
    fn offset(&self) -> u64 {
        0
    }
    fn size(&self) -> u64 {
        0
    }
    fn mapped_ptr(&self) -> Option<std::ptr::NonNull<std::ffi::c_void>> {
        None
    }
    fn as_slice_ref(&self) -> Option<&[u8]> {
        None
    }
    fn as_slice_mut(&mut self) -> Option<&mut [u8]> {
        None
    }
}

impl super::Allocator for UnmanagedAllocator {
    type Allocation = UnmanagedAllocation;
    type AllocationError = UnmanagedAllocationError;

    fn allocate(
        &mut self,
        _name: Option<&str>,
        _requirements: ash::vk::MemoryRequirements,
        _usage: super::MemoryUsage,
        _is_linear: bool,
    ) -> Result<Self::Allocation, Self::AllocationError> {
        Err(UnmanagedAllocationError)
    }

    fn free(&mut self, _allocation: Self::Allocation) -> Result<(), Self::AllocationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::Allocator;
    use super::*;

    #[test]
    fn never_allocates() {
        let mut allocator = UnmanagedAllocator;
        let result = allocator.allocate(
            None,
            ash::vk::MemoryRequirements::default(),
            crate::allocator::MemoryUsage::GpuOnly,
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn allocation_reports_nothing() {
        let allocation = UnmanagedAllocation::new();
        assert_eq!(Allocation::memory(&allocation), ash::vk::DeviceMemory::null());
        assert_eq!(Allocation::size(&allocation), 0);
        assert!(Allocation::mapped_ptr(&allocation).is_none());
    }
}
