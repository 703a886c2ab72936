use std::{ffi::CString, sync::Arc};

use super::PipelineLayout;
use crate::context::Device;
use crate::error::{BuilderError, PipelineError};
use crate::resources::{RenderPass, ShaderModule};
use ash::vk;

///One shader stage of a graphics pipeline. Keeps the module alive and owns the
/// entry point name so the create info can be assembled at build time.
pub struct StageDesc {
    pub stage: vk::ShaderStageFlags,
    pub module: Arc<ShaderModule>,
    pub entry: CString,
}

///Fluent graphics pipeline setup. All fixed-function state carries defaults
/// (triangle list, fill mode, back-face culling, depth test+write with LESS,
/// blending off) so a minimal pipeline only needs shader stages and a render pass.
///
/// When no pipeline layout is supplied, one is created from the collected
/// descriptor set layouts and push constant ranges.
pub struct GraphicsPipelineBuilder {
    pub stages: Vec<StageDesc>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub samples: vk::SampleCountFlags,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    pub blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub extent: vk::Extent2D,
    pub layout: Option<Arc<PipelineLayout>>,
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    pub render_pass: Option<Arc<RenderPass>>,
    pub subpass: u32,
}

///Blend state for one color attachment with blending disabled and all channels written.
fn default_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    *vk::PipelineColorBlendAttachmentState::builder()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        GraphicsPipelineBuilder {
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            blend_attachments: vec![default_blend_attachment()],
            dynamic_states: Vec::new(),
            extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            layout: None,
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            render_pass: None,
            subpass: 0,
        }
    }
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    ///Allows changing `self` builder style.
    pub fn with(mut self, mut mapping: impl FnMut(&mut Self)) -> Self {
        mapping(&mut self);
        self
    }

    pub fn with_stage(
        mut self,
        module: &Arc<ShaderModule>,
        stage: vk::ShaderStageFlags,
        entry: CString,
    ) -> Self {
        self.stages.push(StageDesc {
            stage,
            module: module.clone(),
            entry,
        });
        self
    }

    ///Adds a stage with the common `main` entry point.
    pub fn with_main_stage(self, module: &Arc<ShaderModule>, stage: vk::ShaderStageFlags) -> Self {
        //"main" contains no interior nul
        let entry = CString::new("main").unwrap_or_default();
        self.with_stage(module, stage, entry)
    }

    pub fn with_vertex_input(
        mut self,
        bindings: &[vk::VertexInputBindingDescription],
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings.extend_from_slice(bindings);
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn with_extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent = extent;
        self
    }

    pub fn with_render_pass(mut self, render_pass: &Arc<RenderPass>, subpass: u32) -> Self {
        self.render_pass = Some(render_pass.clone());
        self.subpass = subpass;
        self
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

    pub fn with_dynamic_states(mut self, states: &[vk::DynamicState]) -> Self {
        self.dynamic_states.extend_from_slice(states);
        self
    }

    pub fn with_depth(mut self, test: bool, write: bool, compare: vk::CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare = compare;
        self
    }

    ///Checks the collected state without touching a device.
    pub fn validate(&self) -> Result<(), BuilderError> {
        Self::check(self.stages.len(), self.render_pass.is_some())
    }

    ///The validation rules on the raw parts, so they stay checkable without live
    /// shader modules and render passes.
    fn check(stage_count: usize, has_render_pass: bool) -> Result<(), BuilderError> {
        if stage_count == 0 {
            return Err(BuilderError::NoShaderStage);
        }
        if !has_render_pass {
            return Err(BuilderError::NoRenderPass);
        }
        Ok(())
    }

    pub fn build(self, device: &Arc<Device>) -> Result<GraphicsPipeline, crate::EasyVkError> {
        self.validate()?;

        //`validate` checked for the render pass
        let render_pass = match &self.render_pass {
            Some(rp) => rp.clone(),
            None => return Err(BuilderError::NoRenderPass.into()),
        };

        let layout = match &self.layout {
            Some(layout) => layout.clone(),
            None => Arc::new(PipelineLayout::new(
                device,
                &self.set_layouts,
                &self.push_constant_ranges,
            )?),
        };

        let stages = self
            .stages
            .iter()
            .map(|desc| {
                *vk::PipelineShaderStageCreateInfo::builder()
                    .stage(desc.stage)
                    .module(desc.module.module)
                    .name(&desc.entry)
            })
            .collect::<Vec<_>>();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(core::slice::from_ref(&viewport))
            .scissors(core::slice::from_ref(&scissor));

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false)
            .line_width(self.line_width);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(self.samples)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&self.blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&self.dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.layout)
            .render_pass(render_pass.inner)
            .subpass(self.subpass);

        let pipeline = GraphicsPipeline::new(device, &create_info, layout, render_pass)?;
        Ok(pipeline)
    }
}

///Pipeline that manages its own lifetime and keeps the layout and render pass alive
/// for its correct execution.
pub struct GraphicsPipeline {
    pub device: Arc<Device>,
    pub pipeline: ash::vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
    pub render_pass: Arc<RenderPass>,
}

impl GraphicsPipeline {
    ///Creates the pipeline from a finished create info. `create_info`'s `layout` and
    /// `render_pass` fields must refer to the supplied wrappers.
    pub fn new(
        device: &Arc<Device>,
        create_info: &ash::vk::GraphicsPipelineCreateInfoBuilder,
        layout: Arc<PipelineLayout>,
        render_pass: Arc<RenderPass>,
    ) -> Result<Self, PipelineError> {
        let mut pipelines = unsafe {
            match device.inner.create_graphics_pipelines(
                ash::vk::PipelineCache::null(),
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

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline,
            layout,
            render_pass,
        })
    }
}

impl Drop for GraphicsPipeline {
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
        assert_impl_all!(GraphicsPipeline: Send, Sync);
    }

    #[test]
    fn rejects_missing_stages() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(matches!(
            builder.validate(),
            Err(BuilderError::NoShaderStage)
        ));
    }

    #[test]
    fn rejects_missing_render_pass() {
        assert!(matches!(
            GraphicsPipelineBuilder::check(1, false),
            Err(BuilderError::NoRenderPass)
        ));
        assert!(GraphicsPipelineBuilder::check(1, true).is_ok());
    }

    #[test]
    fn defaults_are_conservative() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(builder.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(builder.depth_compare, vk::CompareOp::LESS);
        assert!(builder.depth_test);
        assert!(builder.depth_write);
        assert_eq!(builder.line_width, 1.0);
    }
}
