use std::sync::Arc;

use ahash::AHashMap;

use crate::{context::Device, error::DescriptorError};

///Sums the requested pool sizes per descriptor type, merging duplicate entries.
fn sum_pool_sizes(
    sizes: &[ash::vk::DescriptorPoolSize],
) -> AHashMap<ash::vk::DescriptorType, u32> {
    let mut summed = AHashMap::default();
    for size in sizes {
        *summed.entry(size.ty).or_insert(0) += size.descriptor_count;
    }
    summed
}

///Descriptor set layout that destroys its handle when dropped.
pub struct DescriptorSetLayout {
    pub device: Arc<Device>,
    pub inner: ash::vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(
        device: &Arc<Device>,
        bindings: &[ash::vk::DescriptorSetLayoutBinding],
    ) -> Result<Self, DescriptorError> {
        let info = ash::vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);

        let layout = unsafe { device.inner.create_descriptor_set_layout(&info, None)? };

        Ok(DescriptorSetLayout {
            device: device.clone(),
            inner: layout,
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .inner
                .destroy_descriptor_set_layout(self.inner, None)
        }
    }
}

///Fixed-size descriptor pool. The per-type capacities it was created with stay
/// available in `sizes` for bookkeeping.
pub struct DescriptorPool {
    pub device: Arc<Device>,
    pub inner: ash::vk::DescriptorPool,
    ///Capacity per descriptor type, duplicate entries from creation summed up.
    pub sizes: AHashMap<ash::vk::DescriptorType, u32>,
    ///Whether individual sets can be freed back into this pool. Derived from the
    /// FREE_DESCRIPTOR_SET creation flag.
    pub can_free: bool,
}

impl DescriptorPool {
    pub fn new(
        device: &Arc<Device>,
        flags: ash::vk::DescriptorPoolCreateFlags,
        sizes: &[ash::vk::DescriptorPoolSize],
        set_count: u32,
    ) -> Result<Self, DescriptorError> {
        let create_info = ash::vk::DescriptorPoolCreateInfo::builder()
            .flags(flags)
            .max_sets(set_count)
            .pool_sizes(sizes);

        let pool = unsafe { device.inner.create_descriptor_pool(&create_info, None)? };

        Ok(DescriptorPool {
            can_free: flags.contains(ash::vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET),
            device: device.clone(),
            inner: pool,
            sizes: sum_pool_sizes(sizes),
        })
    }

    fn allocate_raw(
        &self,
        layout: &ash::vk::DescriptorSetLayout,
    ) -> Result<ash::vk::DescriptorSet, DescriptorError> {
        let create_info = ash::vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.inner)
            .set_layouts(core::slice::from_ref(layout));

        let mut sets = unsafe { self.device.inner.allocate_descriptor_sets(&create_info)? };

        if sets.is_empty() {
            return Err(DescriptorError::Allocation {
                requested: 1,
                count: 0,
            });
        }

        Ok(sets.remove(0))
    }

    fn free_raw(&self, set: &ash::vk::DescriptorSet) -> Result<(), DescriptorError> {
        if !self.can_free {
            return Err(DescriptorError::UnFreeable);
        }
        unsafe {
            self.device
                .inner
                .free_descriptor_sets(self.inner, core::slice::from_ref(set))?
        };
        Ok(())
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_descriptor_pool(self.inner, None) }
    }
}

///Anything descriptor sets can be allocated from. [DescriptorPool] is the plain
/// implementation; growing pool schemes can implement this as well. The `Arc`
/// implementation is what long-lived sets use so the pool cannot go down before them.
pub trait DescriptorAllocator {
    ///Allocates one set of `layout`. Fails when the pool runs out of sets or of
    /// descriptors of a needed type.
    fn allocate(
        self,
        layout: &ash::vk::DescriptorSetLayout,
    ) -> Result<DescriptorSet<Self>, DescriptorError>
    where
        Self: Sized;
    ///Returns `set` to the pool. `set` must not be used afterwards.
    fn free(&self, set: &ash::vk::DescriptorSet) -> Result<(), DescriptorError>;
    ///The device the pool lives on.
    fn device(&self) -> &ash::Device;
}

impl DescriptorAllocator for DescriptorPool {
    fn allocate(
        self,
        layout: &ash::vk::DescriptorSetLayout,
    ) -> Result<DescriptorSet<Self>, DescriptorError> {
        let inner = self.allocate_raw(layout)?;
        Ok(DescriptorSet {
            inner,
            is_freed: false,
            parent_pool: self,
        })
    }

    fn free(&self, set: &ash::vk::DescriptorSet) -> Result<(), DescriptorError> {
        self.free_raw(set)
    }

    fn device(&self) -> &ash::Device {
        &self.device.inner
    }
}

impl DescriptorAllocator for Arc<DescriptorPool> {
    fn allocate(
        self,
        layout: &ash::vk::DescriptorSetLayout,
    ) -> Result<DescriptorSet<Self>, DescriptorError> {
        let inner = self.allocate_raw(layout)?;
        Ok(DescriptorSet {
            inner,
            is_freed: false,
            parent_pool: self,
        })
    }

    fn free(&self, set: &ash::vk::DescriptorSet) -> Result<(), DescriptorError> {
        self.free_raw(set)
    }

    fn device(&self) -> &ash::Device {
        &self.device.inner
    }
}

///A descriptor set tied to the pool it came from. Dropping the set hands it back to
/// the pool when the pool supports freeing; otherwise the set is released together
/// with the pool.
pub struct DescriptorSet<P>
where
    P: DescriptorAllocator,
{
    ///Kept so the pool outlives the set.
    pub parent_pool: P,
    pub is_freed: bool,
    pub inner: ash::vk::DescriptorSet,
}

impl<P> DescriptorSet<P>
where
    P: DescriptorAllocator,
{
    ///Applies `write` to this set. The write's `dst_set` is filled in here, everything
    /// else is taken as supplied; with validation layers active a write that does not
    /// match the set's layout will be reported.
    ///
    /// Updating several bindings at once is possible through
    /// `update_descriptor_sets` on the raw device using `self.inner` directly.
    pub fn write<'a>(&'a mut self, write: ash::vk::WriteDescriptorSetBuilder<'a>) {
        let write = write.dst_set(self.inner);

        unsafe {
            self.parent_pool
                .device()
                .update_descriptor_sets(core::slice::from_ref(&write), &[])
        }
    }
}

impl<P> Drop for DescriptorSet<P>
where
    P: DescriptorAllocator,
{
    fn drop(&mut self) {
        self.is_freed = true;
        if let Err(e) = self.parent_pool.free(&self.inner) {
            match e {
                //pools without the free flag release their sets when the pool goes down
                DescriptorError::UnFreeable => {}
                _ => {
                    #[cfg(feature = "logging")]
                    log::error!("Failed to free descriptor set: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(DescriptorSetLayout: Send, Sync);
        assert_impl_all!(DescriptorPool: Send, Sync);
        assert_impl_all!(DescriptorSet<Arc<DescriptorPool>>: Send, Sync);
    }

    #[test]
    fn duplicate_pool_sizes_are_summed() {
        let sizes = [
            ash::vk::DescriptorPoolSize {
                ty: ash::vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 4,
            },
            ash::vk::DescriptorPoolSize {
                ty: ash::vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2,
            },
            ash::vk::DescriptorPoolSize {
                ty: ash::vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 3,
            },
        ];
        let summed = sum_pool_sizes(&sizes);
        assert_eq!(
            summed.get(&ash::vk::DescriptorType::UNIFORM_BUFFER),
            Some(&7)
        );
        assert_eq!(
            summed.get(&ash::vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            Some(&2)
        );
    }
}
