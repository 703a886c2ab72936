use std::error::Error;

use ash::{vk, LoadingError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Extension {0} is not supported by device")]
    UnsupportedExtension(String),
    #[error("Feature {0} not supported")]
    UnsupportedFeature(String),
    #[error("No physical device found. Is a Vulkan capable GPU and driver installed?")]
    NoPhysicalDevice,
    #[error("No queue family matching {0:?} found on device")]
    NoSuchQueueFamily(vk::QueueFlags),
    #[error("Swapchain can't have a extent of 0 on either axis, was: {0:#?}")]
    InvalidSwapchainSize(vk::Extent2D),
    #[error("Surface reports no supported formats")]
    NoSurfaceFormat,
    #[error("GpuAllocator error: {0}")]
    GpuAllocatorError(#[from] Box<dyn Error + Send + Sync + 'static>),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to load Vulkan entry point: {0}")]
    EntryLoading(#[from] LoadingError),
    #[error("Instance layer {0:?} requested, but not available")]
    MissingLayer(std::ffi::CString),
    #[error("Instance extension {0:?} requested, but not available")]
    MissingExtension(std::ffi::CString),
}

///Builder precondition violations. Every variant names the offending field
/// or combination so the message alone identifies the fix.
#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("Buffer size must be greater than zero")]
    ZeroSize,
    #[error("Usage flags must not be empty")]
    EmptyUsage,
    #[error("Concurrent sharing mode needs at least two queue family indices")]
    ConcurrentWithoutQueues,
    #[error("Image extent must be non-zero on every axis")]
    ZeroExtent,
    #[error("Image needs at least one mip level and one array layer")]
    ZeroMipOrLayer,
    #[error("Sampler max_anisotropy {requested} exceeds the device limit {limit}")]
    AnisotropyExceedsLimit { requested: f32, limit: f32 },
    #[error("Sampler anisotropy enabled but max_anisotropy is below 1.0")]
    InvalidAnisotropy,
    #[error("Unnormalized coordinates are incompatible with {0}")]
    UnnormalizedIncompatible(&'static str),
    #[error("end_subpass() called without a matching begin_subpass()")]
    NoOpenSubpass,
    #[error("begin_subpass() called while a subpass is still open")]
    SubpassAlreadyOpen,
    #[error("Attachment reference {index} is out of range, {count} attachments declared")]
    AttachmentOutOfRange { index: u32, count: usize },
    #[error("Render pass needs at least one subpass")]
    NoSubpass,
    #[error("build() called while a subpass is still open")]
    UnclosedSubpass,
    #[error("Graphics pipeline needs at least one shader stage")]
    NoShaderStage,
    #[error("Graphics pipeline needs a render pass")]
    NoRenderPass,
    #[error("Framebuffer needs at least one attachment")]
    NoAttachments,
}

///Errors when reading or writing host-mapped buffer memory.
#[derive(Error, Debug)]
pub enum BufferMapError {
    #[error("Supplied offset {offset} is beyond the buffer size {size}")]
    OffsetTooLarge { offset: usize, size: usize },
    #[error("Mapped buffer was only partially written, {written} of {size} bytes")]
    PartiallyWritten { written: usize, size: usize },
    #[error("Buffer memory is not host mappable")]
    NotMappable,
}

///Errors of the name-keyed resource registry and the command helpers
/// operating on tracked records.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("No {kind:?} registered under name \"{name}\"")]
    NotFound {
        kind: crate::registry::ResourceKind,
        name: String,
    },
    #[error("Unsupported image layout transition from {from:?} to {to:?}")]
    UnsupportedTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Filesystem error: {0}")]
    FileError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CommandBufferError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Command pool is not resettable")]
    PoolNotResetable,
    #[error("Submitting to queue failed with {0}")]
    SubmitFailed(vk::Result),
    #[error("Failed to allocate command buffer. Requested {count}, got {allocated}")]
    FailedToAllocate { allocated: usize, count: usize },
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate Descriptors from pool. Requested {requested} got {count}")]
    Allocation { requested: usize, count: usize },
    #[error("Descriptorset can't be freed")]
    UnFreeable,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate pipeline")]
    Allocation,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Frame index {frame} out of range, {frames} frames in flight")]
    FrameOutOfRange { frame: usize, frames: usize },
}

#[derive(Error, Debug)]
pub enum EasyVkError {
    #[error("Buffer map error: {0}")]
    BufferMapError(#[from] BufferMapError),
    #[error("Builder error: {0}")]
    BuilderError(#[from] BuilderError),
    #[error("CommandBuffer error: {0}")]
    CommandBufferError(#[from] CommandBufferError),
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Descriptor error: {0}")]
    DescriptorError(#[from] DescriptorError),
    #[error("Instance error: {0}")]
    InstanceError(#[from] InstanceError),
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
    #[error("Resource error: {0}")]
    ResourceError(#[from] ResourceError),
    #[error("Shader/ShaderModule error: {0}")]
    ShaderError(#[from] ShaderError),
    #[error("Sync error: {0}")]
    SyncError(#[from] SyncError),
    #[error("Other error: {0}")]
    Other(String),
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use crate::{
        error::{
            BufferMapError, BuilderError, CommandBufferError, DescriptorError, DeviceError,
            InstanceError, PipelineError, ResourceError, ShaderError, SyncError,
        },
        EasyVkError,
    };

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(DeviceError: Send, Sync);
        assert_impl_all!(BufferMapError: Send, Sync);
        assert_impl_all!(BuilderError: Send, Sync);
        assert_impl_all!(ResourceError: Send, Sync);
        assert_impl_all!(ShaderError: Send, Sync);
        assert_impl_all!(CommandBufferError: Send, Sync);
        assert_impl_all!(InstanceError: Send, Sync);
        assert_impl_all!(DescriptorError: Send, Sync);
        assert_impl_all!(PipelineError: Send, Sync);
        assert_impl_all!(SyncError: Send, Sync);
        assert_impl_all!(EasyVkError: Send, Sync);
    }
}
