use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::BuilderError, EasyVkError};

///Render pass wrapper that destroys itself when dropped.
pub struct RenderPass {
    pub device: Arc<Device>,
    pub inner: vk::RenderPass,
}

impl RenderPass {
    pub fn new(
        device: &Arc<Device>,
        create_info: &vk::RenderPassCreateInfo,
    ) -> Result<Self, vk::Result> {
        let renderpass = unsafe { device.inner.create_render_pass(create_info, None)? };
        Ok(RenderPass {
            device: device.clone(),
            inner: renderpass,
        })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_render_pass(self.inner, None) }
    }
}

///Attachment references collected for one subpass.
#[derive(Clone, Debug, Default)]
struct SubpassRecord {
    color: Vec<vk::AttachmentReference>,
    input: Vec<vk::AttachmentReference>,
    depth: Option<vk::AttachmentReference>,
}

///Fluent render pass setup. Attachments are declared up front, subpasses are built
/// between `begin_subpass()` and `end_subpass()` and reference attachments by the index
/// they were added at. Unbalanced begin/end calls and out-of-range references error
/// immediately instead of producing an invalid create info.
#[derive(Clone, Debug, Default)]
pub struct RenderPassBuilder {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub dependencies: Vec<vk::SubpassDependency>,
    subpasses: Vec<SubpassRecord>,
    current: Option<SubpassRecord>,
}

impl RenderPassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    ///Declares an attachment and returns the builder. The attachment's index is the
    /// number of attachments added before it.
    pub fn add_attachment(mut self, desc: vk::AttachmentDescription) -> Self {
        self.attachments.push(desc);
        self
    }

    ///Declares a standard cleared color attachment that ends up in `final_layout`.
    pub fn add_color_attachment(self, format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        self.add_attachment(
            *vk::AttachmentDescription::builder()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(final_layout),
        )
    }

    ///Declares a standard cleared depth attachment whose contents are not stored.
    pub fn add_depth_attachment(self, format: vk::Format) -> Self {
        self.add_attachment(
            *vk::AttachmentDescription::builder()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        )
    }

    pub fn add_dependency(mut self, dependency: vk::SubpassDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn begin_subpass(mut self) -> Result<Self, BuilderError> {
        if self.current.is_some() {
            return Err(BuilderError::SubpassAlreadyOpen);
        }
        self.current = Some(SubpassRecord::default());
        Ok(self)
    }

    fn check_index(&self, index: u32) -> Result<(), BuilderError> {
        if index as usize >= self.attachments.len() {
            return Err(BuilderError::AttachmentOutOfRange {
                index,
                count: self.attachments.len(),
            });
        }
        Ok(())
    }

    ///References attachment `index` as color target of the open subpass.
    pub fn color_attachment(mut self, index: u32) -> Result<Self, BuilderError> {
        self.check_index(index)?;
        let subpass = self.current.as_mut().ok_or(BuilderError::NoOpenSubpass)?;
        subpass.color.push(vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        });
        Ok(self)
    }

    ///References attachment `index` as depth/stencil target of the open subpass.
    pub fn depth_attachment(mut self, index: u32) -> Result<Self, BuilderError> {
        self.check_index(index)?;
        let subpass = self.current.as_mut().ok_or(BuilderError::NoOpenSubpass)?;
        subpass.depth = Some(vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });
        Ok(self)
    }

    ///References attachment `index` as input attachment of the open subpass.
    pub fn input_attachment(mut self, index: u32, layout: vk::ImageLayout) -> Result<Self, BuilderError> {
        self.check_index(index)?;
        let subpass = self.current.as_mut().ok_or(BuilderError::NoOpenSubpass)?;
        subpass.input.push(vk::AttachmentReference {
            attachment: index,
            layout,
        });
        Ok(self)
    }

    pub fn end_subpass(mut self) -> Result<Self, BuilderError> {
        let subpass = self.current.take().ok_or(BuilderError::NoOpenSubpass)?;
        self.subpasses.push(subpass);
        Ok(self)
    }

    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    ///Checks the collected state without touching a device.
    pub fn validate(&self) -> Result<(), BuilderError> {
        if self.current.is_some() {
            return Err(BuilderError::UnclosedSubpass);
        }
        if self.subpasses.is_empty() {
            return Err(BuilderError::NoSubpass);
        }
        Ok(())
    }

    pub fn build(self, device: &Arc<Device>) -> Result<RenderPass, EasyVkError> {
        self.validate()?;

        let subpass_descriptions = self
            .subpasses
            .iter()
            .map(|record| {
                let mut desc = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&record.color)
                    .input_attachments(&record.input);
                if let Some(depth) = &record.depth {
                    desc = desc.depth_stencil_attachment(depth);
                }
                *desc
            })
            .collect::<Vec<_>>();

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&self.attachments)
            .subpasses(&subpass_descriptions)
            .dependencies(&self.dependencies);

        let pass = RenderPass::new(device, &create_info)
            .map_err(crate::error::ResourceError::VkError)?;
        Ok(pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(RenderPass: Send, Sync);
    }

    #[test]
    fn end_without_begin_errors() {
        let builder = RenderPassBuilder::new();
        assert!(matches!(
            builder.end_subpass(),
            Err(BuilderError::NoOpenSubpass)
        ));
    }

    #[test]
    fn double_begin_errors() {
        let builder = RenderPassBuilder::new().begin_subpass().unwrap();
        assert!(matches!(
            builder.begin_subpass(),
            Err(BuilderError::SubpassAlreadyOpen)
        ));
    }

    #[test]
    fn out_of_range_reference_errors() {
        let builder = RenderPassBuilder::new()
            .add_color_attachment(
                vk::Format::B8G8R8A8_SRGB,
                vk::ImageLayout::PRESENT_SRC_KHR,
            )
            .begin_subpass()
            .unwrap();
        assert!(matches!(
            builder.color_attachment(1),
            Err(BuilderError::AttachmentOutOfRange { index: 1, count: 1 })
        ));
    }

    #[test]
    fn reference_outside_subpass_errors() {
        let builder = RenderPassBuilder::new().add_color_attachment(
            vk::Format::B8G8R8A8_SRGB,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        assert!(matches!(
            builder.color_attachment(0),
            Err(BuilderError::NoOpenSubpass)
        ));
    }

    #[test]
    fn no_subpass_fails_validation() {
        let builder = RenderPassBuilder::new().add_color_attachment(
            vk::Format::B8G8R8A8_SRGB,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        assert!(matches!(builder.validate(), Err(BuilderError::NoSubpass)));
    }

    #[test]
    fn unclosed_subpass_fails_validation() {
        let builder = RenderPassBuilder::new()
            .add_color_attachment(
                vk::Format::B8G8R8A8_SRGB,
                vk::ImageLayout::PRESENT_SRC_KHR,
            )
            .begin_subpass()
            .unwrap()
            .color_attachment(0)
            .unwrap();
        assert!(matches!(
            builder.validate(),
            Err(BuilderError::UnclosedSubpass)
        ));
    }

    #[test]
    fn balanced_usage_validates() {
        let builder = RenderPassBuilder::new()
            .add_color_attachment(
                vk::Format::B8G8R8A8_SRGB,
                vk::ImageLayout::PRESENT_SRC_KHR,
            )
            .add_depth_attachment(vk::Format::D32_SFLOAT)
            .begin_subpass()
            .unwrap()
            .color_attachment(0)
            .unwrap()
            .depth_attachment(1)
            .unwrap()
            .end_subpass()
            .unwrap();
        assert!(builder.validate().is_ok());
        assert_eq!(builder.subpass_count(), 1);
    }
}
