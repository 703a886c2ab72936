//! # EasyVulkan
//!
//! Convenience layer over [ash](https://crates.io/crates/ash) that keeps the explicit
//! Vulkan API reachable while taking over the repetitive parts: fluent builders for the
//! common resource types, lifetime tracking through [Arc](std::sync::Arc)-based wrappers
//! and a name-keyed [registry](registry::ResourceRegistry) that tears resources down in
//! dependency order.
//!
//! # Usage
//!
//! In general EasyVulkan provides you with transparent wrappers around the main Vulkan
//! objects. This includes the [Instance](context::Instance), [Device](context::Device)
//! and other lifetime sensitive structures. Those wrappers, if used, keep track of
//! lifetimes and destruction of those objects when not needed anymore. Usually there are
//! builders to simplify the creation of those. They can however also be created by hand.
//!
//! Structures that are not sensitive to lifetime requirements (like create info) are not wrapped.
#![deny(warnings)]

pub use ash;
pub use bytemuck;
#[cfg(feature = "default_allocator")]
pub use gpu_allocator;

///Allocator related details. Custom allocators can be plugged in through the `A`
/// parameter on the [Context](context::Ctx).
pub mod allocator;

///Blocking one-shot command execution and image layout transition helpers.
pub mod commands;

///Structures you need to get starting. Basically [Instance](context::Instance) and [Device](context::Device) creation.
/// Also includes the [Ctx](context::Ctx) struct, which also keeps track of a memory allocator.
pub mod context;

///Name-keyed resource registry with ordered bulk teardown.
pub mod registry;

///Allocatable and buildable resources. Mostly [Image](resources::Image), [Buffer](resources::Buffer)
/// and the pipeline related objects.
pub mod resources;

///Window surface related structures. Includes a self managed [Surface](surface::Surface) type.
pub mod surface;

/// [Swapchain](swapchain::Swapchain) type that can be created from a [Surface](surface::Surface). Includes some helper functions
///to search for suitable formats, handle recreation etc.
pub mod swapchain;

///Vulkan synchronisation primitives
pub mod sync;

mod error;
pub use error::{
    BufferMapError, BuilderError, CommandBufferError, DescriptorError, DeviceError, EasyVkError,
    InstanceError, PipelineError, ResourceError, ShaderError, SyncError,
};
