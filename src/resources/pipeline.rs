use crate::{context::Device, error::PipelineError};
use std::sync::Arc;

pub mod compute;
pub mod graphics;

use compute::ComputePipeline;
use graphics::GraphicsPipeline;

///Pipeline layout that destroys its handle when dropped. Pipelines hold their layout
/// in an [Arc], so the layout can be shared between compatible pipelines.
pub struct PipelineLayout {
    pub device: Arc<Device>,
    pub layout: ash::vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: &Arc<Device>,
        descriptor_set_layouts: &[ash::vk::DescriptorSetLayout],
        push_constant_ranges: &[ash::vk::PushConstantRange],
    ) -> Result<Self, PipelineError> {
        let create_info = ash::vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.inner.create_pipeline_layout(&create_info, None)? };

        Ok(PipelineLayout {
            device: device.clone(),
            layout,
        })
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline_layout(self.layout, None) }
    }
}

///Either kind of pipeline, for code that stores pipelines without caring about the
/// bind point, like the registry.
pub enum AnyPipeline {
    Graphics(GraphicsPipeline),
    Compute(ComputePipeline),
}

impl AnyPipeline {
    pub fn raw(&self) -> ash::vk::Pipeline {
        match self {
            AnyPipeline::Graphics(pipeline) => pipeline.pipeline,
            AnyPipeline::Compute(pipeline) => pipeline.pipeline,
        }
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        match self {
            AnyPipeline::Graphics(pipeline) => &pipeline.layout,
            AnyPipeline::Compute(pipeline) => &pipeline.layout,
        }
    }

    ///The bind point to use with `cmd_bind_pipeline`.
    pub fn bind_point(&self) -> ash::vk::PipelineBindPoint {
        match self {
            AnyPipeline::Graphics(_) => ash::vk::PipelineBindPoint::GRAPHICS,
            AnyPipeline::Compute(_) => ash::vk::PipelineBindPoint::COMPUTE,
        }
    }
}

impl From<GraphicsPipeline> for AnyPipeline {
    fn from(pipeline: GraphicsPipeline) -> Self {
        AnyPipeline::Graphics(pipeline)
    }
}

impl From<ComputePipeline> for AnyPipeline {
    fn from(pipeline: ComputePipeline) -> Self {
        AnyPipeline::Compute(pipeline)
    }
}
