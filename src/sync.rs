//! # Synchronisation
//!
//! Thin wrappers around the binary synchronisation primitives a frame loop needs:
//! semaphores for GPU-GPU ordering, fences for host-device ordering, and
//! [FrameSync] which bundles one set of each per frame in flight.

use crate::context::Device;
use crate::error::SyncError;
use std::fmt::Debug;
use std::sync::Arc;

///Single binary semaphore.
pub struct Semaphore {
    pub inner: ash::vk::Semaphore,
    pub device: Arc<Device>,
}

impl Semaphore {
    pub fn new(device: &Arc<Device>) -> Result<Arc<Self>, SyncError> {
        let ci = ash::vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.inner.create_semaphore(&ci, None)? };

        Ok(Arc::new(Semaphore {
            inner: semaphore,
            device: device.clone(),
        }))
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_semaphore(self.inner, None) }
    }
}

impl Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

///Fence for host-device synchronisation.
pub struct Fence {
    pub inner: ash::vk::Fence,
    pub device: Arc<Device>,
}

impl Fence {
    ///Creates the fence. A `signaled` fence does not block the first wait, which is the
    /// usual setup for per-frame fences.
    pub fn new(device: &Arc<Device>, signaled: bool) -> Result<Arc<Self>, SyncError> {
        let flags = if signaled {
            ash::vk::FenceCreateFlags::SIGNALED
        } else {
            ash::vk::FenceCreateFlags::empty()
        };
        let ci = ash::vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.inner.create_fence(&ci, None)? };

        Ok(Arc::new(Fence {
            inner: fence,
            device: device.clone(),
        }))
    }

    ///Blocks until the fence is signaled, or `timeout` nanoseconds passed.
    pub fn wait(&self, timeout: u64) -> Result<(), SyncError> {
        unsafe {
            self.device
                .inner
                .wait_for_fences(&[self.inner], true, timeout)?
        };
        Ok(())
    }

    pub fn reset(&self) -> Result<(), SyncError> {
        unsafe { self.device.inner.reset_fences(&[self.inner])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_fence(self.inner, None) }
    }
}

impl Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

///Per-frame synchronisation objects for a frames-in-flight render loop: one
/// image-available semaphore, one render-finished semaphore and one (signaled)
/// in-flight fence per frame. Accessors check the frame index so an out-of-range
/// frame yields an error instead of a panic deep in a frame loop.
pub struct FrameSync {
    pub device: Arc<Device>,
    image_available: Vec<Arc<Semaphore>>,
    render_finished: Vec<Arc<Semaphore>>,
    in_flight: Vec<Arc<Fence>>,
}

impl FrameSync {
    pub fn new(device: &Arc<Device>, frames_in_flight: usize) -> Result<Self, SyncError> {
        let image_available = (0..frames_in_flight)
            .map(|_| Semaphore::new(device))
            .collect::<Result<Vec<_>, _>>()?;
        let render_finished = (0..frames_in_flight)
            .map(|_| Semaphore::new(device))
            .collect::<Result<Vec<_>, _>>()?;
        let in_flight = (0..frames_in_flight)
            .map(|_| Fence::new(device, true))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FrameSync {
            device: device.clone(),
            image_available,
            render_finished,
            in_flight,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn check_frame(&self, frame: usize) -> Result<(), SyncError> {
        if frame >= self.in_flight.len() {
            return Err(SyncError::FrameOutOfRange {
                frame,
                frames: self.in_flight.len(),
            });
        }
        Ok(())
    }

    pub fn image_available(&self, frame: usize) -> Result<&Arc<Semaphore>, SyncError> {
        self.check_frame(frame)?;
        Ok(&self.image_available[frame])
    }

    pub fn render_finished(&self, frame: usize) -> Result<&Arc<Semaphore>, SyncError> {
        self.check_frame(frame)?;
        Ok(&self.render_finished[frame])
    }

    pub fn in_flight(&self, frame: usize) -> Result<&Arc<Fence>, SyncError> {
        self.check_frame(frame)?;
        Ok(&self.in_flight[frame])
    }

    ///Waits for frame `frame`'s fence and resets it, the usual start of a frame.
    pub fn wait_and_reset(&self, frame: usize) -> Result<(), SyncError> {
        let fence = self.in_flight(frame)?;
        fence.wait(u64::MAX)?;
        fence.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Semaphore: Send, Sync);
        assert_impl_all!(Fence: Send, Sync);
        assert_impl_all!(FrameSync: Send, Sync);
    }
}
