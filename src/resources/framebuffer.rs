use std::sync::Arc;

use ash::vk;

use crate::{
    context::Device,
    error::{BuilderError, ResourceError},
    resources::{ImageView, RenderPass},
    EasyVkError,
};

///Fluent framebuffer setup. Keeps the referenced image views and render pass alive
/// through the created [Framebuffer].
#[derive(Default)]
pub struct FramebufferBuilder {
    pub render_pass: Option<Arc<RenderPass>>,
    pub attachments: Vec<Arc<ImageView>>,
    pub extent: vk::Extent2D,
    pub layers: u32,
}

impl FramebufferBuilder {
    pub fn new(render_pass: &Arc<RenderPass>, extent: vk::Extent2D) -> Self {
        FramebufferBuilder {
            render_pass: Some(render_pass.clone()),
            attachments: Vec::new(),
            extent,
            layers: 1,
        }
    }

    pub fn add_attachment(mut self, view: &Arc<ImageView>) -> Self {
        self.attachments.push(view.clone());
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    ///Checks the collected state without touching a device.
    pub fn validate(&self) -> Result<(), BuilderError> {
        Self::check(
            self.render_pass.is_some(),
            self.extent,
            self.attachments.len(),
        )
    }

    ///The validation rules on the raw parts, so they stay checkable without live
    /// render pass and view handles.
    fn check(
        has_render_pass: bool,
        extent: vk::Extent2D,
        attachment_count: usize,
    ) -> Result<(), BuilderError> {
        if !has_render_pass {
            return Err(BuilderError::NoRenderPass);
        }
        if extent.width == 0 || extent.height == 0 {
            return Err(BuilderError::ZeroExtent);
        }
        if attachment_count == 0 {
            return Err(BuilderError::NoAttachments);
        }
        Ok(())
    }

    pub fn build(self, device: &Arc<Device>) -> Result<Framebuffer, EasyVkError> {
        self.validate()?;
        //`validate` checked for the render pass
        let render_pass = match self.render_pass {
            Some(rp) => rp,
            None => return Err(BuilderError::NoRenderPass.into()),
        };

        let raw_attachments = self
            .attachments
            .iter()
            .map(|view| view.view)
            .collect::<Vec<_>>();

        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.inner)
            .attachments(&raw_attachments)
            .width(self.extent.width)
            .height(self.extent.height)
            .layers(self.layers);

        let framebuffer = unsafe {
            device
                .inner
                .create_framebuffer(&create_info, None)
                .map_err(ResourceError::VkError)?
        };

        Ok(Framebuffer {
            device: device.clone(),
            inner: framebuffer,
            render_pass,
            attachments: self.attachments,
            extent: self.extent,
        })
    }
}

///Framebuffer wrapper that destroys itself when dropped, and keeps its render pass
/// and image views alive until then.
pub struct Framebuffer {
    pub device: Arc<Device>,
    pub inner: vk::Framebuffer,
    pub render_pass: Arc<RenderPass>,
    pub attachments: Vec<Arc<ImageView>>,
    pub extent: vk::Extent2D,
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_framebuffer(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Framebuffer: Send, Sync);
    }

    #[test]
    fn rejects_missing_render_pass() {
        let builder = FramebufferBuilder {
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            layers: 1,
            ..Default::default()
        };
        assert!(matches!(
            builder.validate(),
            Err(BuilderError::NoRenderPass)
        ));
    }

    #[test]
    fn rejects_zero_extent() {
        let zero = vk::Extent2D {
            width: 0,
            height: 600,
        };
        assert!(matches!(
            FramebufferBuilder::check(true, zero, 1),
            Err(BuilderError::ZeroExtent)
        ));
    }

    #[test]
    fn rejects_missing_attachments() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert!(matches!(
            FramebufferBuilder::check(true, extent, 0),
            Err(BuilderError::NoAttachments)
        ));
        assert!(FramebufferBuilder::check(true, extent, 1).is_ok());
    }
}
