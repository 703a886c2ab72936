mod image;
pub use image::{
    Image, ImageBuilder, ImageType, ImageView, ImgDesc, ImgViewDesc, SafeImageView,
};

mod buffer;
pub use buffer::{BufDesc, Buffer, BufferBuilder};

mod sampler;
pub use sampler::{Sampler, SamplerBuilder};

mod descriptor;
pub use descriptor::{DescriptorAllocator, DescriptorPool, DescriptorSet, DescriptorSetLayout};

pub mod pipeline;
pub use pipeline::{
    compute::{ComputePipeline, ComputePipelineBuilder},
    graphics::{GraphicsPipeline, GraphicsPipelineBuilder, StageDesc},
    AnyPipeline, PipelineLayout,
};

mod render_pass;
pub use render_pass::{RenderPass, RenderPassBuilder};

mod framebuffer;
pub use framebuffer::{Framebuffer, FramebufferBuilder};

mod command_buffer;
pub use command_buffer::{CommandBuffer, CommandBufferAllocator, CommandPool};

mod shader_module;
pub use shader_module::{ShaderModule, DEFAULT_ENTRY};

use smallvec::SmallVec;

///Queue family sharing of a resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SharingMode {
    Exclusive,
    Concurrent {
        ///The queue family indices of families that can access the resource concurrently.
        queue_family_indices: SmallVec<[u32; 4]>,
    },
}
