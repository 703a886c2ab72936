use std::{ffi::CString, sync::Arc};

use super::{graphics::StageDesc, PipelineLayout};
use crate::context::Device;
use crate::error::{BuilderError, PipelineError};
use crate::resources::ShaderModule;
use ash::vk;

///Fluent compute pipeline setup. Needs exactly one compute stage; as with the
/// graphics builder, a pipeline layout is created from the collected descriptor set
/// layouts and push constant ranges when none is supplied.
pub struct ComputePipelineBuilder {
    pub stage: Option<StageDesc>,
    pub layout: Option<Arc<PipelineLayout>>,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl Default for ComputePipelineBuilder {
    fn default() -> Self {
        ComputePipelineBuilder {
            stage: None,
            layout: None,
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
        }
    }
}

impl ComputePipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    ///Allows changing `self` builder style.
    pub fn with(mut self, mut mapping: impl FnMut(&mut Self)) -> Self {
        mapping(&mut self);
        self
    }

    pub fn with_stage(mut self, module: &Arc<ShaderModule>, entry: CString) -> Self {
        self.stage = Some(StageDesc {
            stage: vk::ShaderStageFlags::COMPUTE,
            module: module.clone(),
            entry,
        });
        self
    }

    ///Sets the stage with the common `main` entry point.
    pub fn with_main_stage(self, module: &Arc<ShaderModule>) -> Self {
        //"main" contains no interior nul
        let entry = CString::new("main").unwrap_or_default();
        self.with_stage(module, entry)
    }

    pub fn with_layout(mut self, layout: &Arc<PipelineLayout>) -> Self {
        self.layout = Some(layout.clone());
        self
    }

    ///Collects a descriptor set layout for the auto-created pipeline layout.
    /// Ignored when an explicit layout is set.
    pub fn with_set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    pub fn with_push_constant_range(mut self, range: vk::PushConstantRange) -> Self {
        self.push_constant_ranges.push(range);
        self
    }

    ///Checks the collected state without touching a device.
    pub fn validate(&self) -> Result<(), BuilderError> {
        if self.stage.is_none() {
            return Err(BuilderError::NoShaderStage);
        }
        Ok(())
    }

    pub fn build(self, device: &Arc<Device>) -> Result<ComputePipeline, crate::EasyVkError> {
        self.validate()?;

        //`validate` checked for the stage
        let stage = match &self.stage {
            Some(stage) => stage,
            None => return Err(BuilderError::NoShaderStage.into()),
        };

        let layout = match &self.layout {
            Some(layout) => layout.clone(),
            None => Arc::new(PipelineLayout::new(
                device,
                &self.set_layouts,
                &self.push_constant_ranges,
            )?),
        };

        let stage_info = vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage.stage)
            .module(stage.module.module)
            .name(&stage.entry);

        let create_info = vk::ComputePipelineCreateInfo::builder()
            .stage(*stage_info)
            .layout(layout.layout);

        ComputePipeline::new(device, &create_info, layout).map_err(Into::into)
    }
}

///Compute pipeline that keeps its layout alive and destroys its handle when dropped.
pub struct ComputePipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
}

impl ComputePipeline {
    ///Creates the pipeline from a finished create info. `create_info`'s `layout` field
    /// must refer to the supplied wrapper.
    pub fn new(
        device: &Arc<Device>,
        create_info: &vk::ComputePipelineCreateInfoBuilder,
        layout: Arc<PipelineLayout>,
    ) -> Result<Self, PipelineError> {
        let mut pipelines = unsafe {
            match device.inner.create_compute_pipelines(
                vk::PipelineCache::null(),
                core::slice::from_ref(&**create_info),
                None,
            ) {
                Ok(p) => p,
                Err((_plines, err)) => {
                    return Err(err.into());
                }
            }
        };

        if pipelines.len() != 1 {
            return Err(PipelineError::Allocation);
        }

        let pipeline = pipelines.remove(0);

        Ok(ComputePipeline {
            device: device.clone(),
            pipeline,
            layout,
        })
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ComputePipeline: Send, Sync);
    }

    #[test]
    fn rejects_missing_stage() {
        let builder = ComputePipelineBuilder::new();
        assert!(matches!(
            builder.validate(),
            Err(BuilderError::NoShaderStage)
        ));
    }
}
