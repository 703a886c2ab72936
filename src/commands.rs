//! ## Commands
//!
//! One-shot command execution and image layout transitions. Both are blocking
//! helpers meant for setup work like resource uploads, not for per-frame
//! recording.

use std::sync::Arc;

use ash::vk;

use crate::{
    context::{Device, Queue},
    error::{CommandBufferError, ResourceError},
    resources::{CommandBufferAllocator, CommandPool, Image},
    EasyVkError,
};

///Access masks and pipeline stages for one image layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

///Resolves the barrier masks for a `from` → `to` layout transition. Only the
/// transitions a convenience layer commonly needs are covered; any other pair
/// returns [ResourceError::UnsupportedTransition] so callers can fall back to a
/// hand-written barrier.
pub fn transition_masks(
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<TransitionMasks, ResourceError> {
    use vk::AccessFlags as Access;
    use vk::ImageLayout as Layout;
    use vk::PipelineStageFlags as Stage;

    let masks = match (from, to) {
        (Layout::UNDEFINED, Layout::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: Access::empty(),
            dst_access: Access::TRANSFER_WRITE,
            src_stage: Stage::TOP_OF_PIPE,
            dst_stage: Stage::TRANSFER,
        },
        (Layout::TRANSFER_DST_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: Access::TRANSFER_WRITE,
            dst_access: Access::SHADER_READ,
            src_stage: Stage::TRANSFER,
            dst_stage: Stage::FRAGMENT_SHADER,
        },
        (Layout::UNDEFINED, Layout::COLOR_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_access: Access::empty(),
            dst_access: Access::COLOR_ATTACHMENT_READ | Access::COLOR_ATTACHMENT_WRITE,
            src_stage: Stage::TOP_OF_PIPE,
            dst_stage: Stage::COLOR_ATTACHMENT_OUTPUT,
        },
        (Layout::UNDEFINED, Layout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_access: Access::empty(),
            dst_access: Access::DEPTH_STENCIL_ATTACHMENT_READ
                | Access::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: Stage::TOP_OF_PIPE,
            dst_stage: Stage::EARLY_FRAGMENT_TESTS,
        },
        (Layout::COLOR_ATTACHMENT_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: Access::COLOR_ATTACHMENT_WRITE,
            dst_access: Access::SHADER_READ,
            src_stage: Stage::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: Stage::FRAGMENT_SHADER,
        },
        (Layout::SHADER_READ_ONLY_OPTIMAL, Layout::COLOR_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_access: Access::SHADER_READ,
            dst_access: Access::COLOR_ATTACHMENT_WRITE,
            src_stage: Stage::FRAGMENT_SHADER,
            dst_stage: Stage::COLOR_ATTACHMENT_OUTPUT,
        },
        (Layout::UNDEFINED, Layout::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: Access::empty(),
            dst_access: Access::SHADER_READ,
            src_stage: Stage::TOP_OF_PIPE,
            dst_stage: Stage::FRAGMENT_SHADER,
        },
        (Layout::UNDEFINED, Layout::GENERAL) => TransitionMasks {
            src_access: Access::empty(),
            dst_access: Access::SHADER_READ | Access::SHADER_WRITE,
            src_stage: Stage::TOP_OF_PIPE,
            dst_stage: Stage::COMPUTE_SHADER,
        },
        (Layout::GENERAL, Layout::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: Access::SHADER_WRITE,
            dst_access: Access::SHADER_READ,
            src_stage: Stage::COMPUTE_SHADER,
            dst_stage: Stage::FRAGMENT_SHADER,
        },
        (Layout::SHADER_READ_ONLY_OPTIMAL, Layout::GENERAL) => TransitionMasks {
            src_access: Access::SHADER_READ,
            dst_access: Access::SHADER_READ | Access::SHADER_WRITE,
            src_stage: Stage::FRAGMENT_SHADER,
            dst_stage: Stage::COMPUTE_SHADER,
        },
        (Layout::TRANSFER_SRC_OPTIMAL, Layout::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: Access::TRANSFER_READ,
            dst_access: Access::SHADER_READ,
            src_stage: Stage::TRANSFER,
            dst_stage: Stage::FRAGMENT_SHADER,
        },
        (Layout::SHADER_READ_ONLY_OPTIMAL, Layout::TRANSFER_SRC_OPTIMAL) => TransitionMasks {
            src_access: Access::SHADER_READ,
            dst_access: Access::TRANSFER_READ,
            src_stage: Stage::FRAGMENT_SHADER,
            dst_stage: Stage::TRANSFER,
        },
        //readback/screenshot path between presentable images and transfer sources
        (Layout::PRESENT_SRC_KHR, Layout::TRANSFER_SRC_OPTIMAL) => TransitionMasks {
            src_access: Access::COLOR_ATTACHMENT_WRITE,
            dst_access: Access::TRANSFER_READ,
            src_stage: Stage::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: Stage::TRANSFER,
        },
        (Layout::TRANSFER_SRC_OPTIMAL, Layout::PRESENT_SRC_KHR) => TransitionMasks {
            src_access: Access::TRANSFER_READ,
            dst_access: Access::COLOR_ATTACHMENT_WRITE,
            src_stage: Stage::TRANSFER,
            dst_stage: Stage::COLOR_ATTACHMENT_OUTPUT,
        },
        (Layout::TRANSFER_DST_OPTIMAL, Layout::TRANSFER_SRC_OPTIMAL) => TransitionMasks {
            src_access: Access::TRANSFER_WRITE,
            dst_access: Access::TRANSFER_READ,
            src_stage: Stage::TRANSFER,
            dst_stage: Stage::TRANSFER,
        },
        (Layout::UNDEFINED, Layout::PRESENT_SRC_KHR) => TransitionMasks {
            src_access: Access::empty(),
            dst_access: Access::empty(),
            src_stage: Stage::TOP_OF_PIPE,
            dst_stage: Stage::BOTTOM_OF_PIPE,
        },
        (Layout::COLOR_ATTACHMENT_OPTIMAL, Layout::PRESENT_SRC_KHR) => TransitionMasks {
            src_access: Access::COLOR_ATTACHMENT_WRITE,
            dst_access: Access::empty(),
            src_stage: Stage::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: Stage::BOTTOM_OF_PIPE,
        },
        (from, to) => return Err(ResourceError::UnsupportedTransition { from, to }),
    };

    Ok(masks)
}

///Records `record` into a freshly allocated one-time-submit command buffer, submits it
/// on `queue` and blocks until the submission finished. Pool, buffer and fence are
/// cleaned up before returning.
pub fn execute_oneshot(
    device: &Arc<Device>,
    queue: &Queue,
    record: impl FnOnce(&ash::Device, vk::CommandBuffer),
) -> Result<(), CommandBufferError> {
    let pool = CommandPool::new(
        device,
        queue.family_index,
        vk::CommandPoolCreateFlags::TRANSIENT,
    )?;
    let command_buffer = pool.allocate_buffer(vk::CommandBufferLevel::PRIMARY)?;

    unsafe {
        device.inner.begin_command_buffer(
            command_buffer.inner,
            &vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
        )?;
    }

    record(&device.inner, command_buffer.inner);

    unsafe {
        device.inner.end_command_buffer(command_buffer.inner)?;
    }

    let fence = unsafe {
        device
            .inner
            .create_fence(&vk::FenceCreateInfo::builder(), None)?
    };

    let submit_result = unsafe {
        device
            .inner
            .queue_submit(
                queue.inner,
                &[*vk::SubmitInfo::builder()
                    .command_buffers(core::slice::from_ref(&command_buffer.inner))],
                fence,
            )
            .map_err(CommandBufferError::SubmitFailed)
            .and_then(|_| {
                device
                    .inner
                    .wait_for_fences(&[fence], true, u64::MAX)
                    .map_err(CommandBufferError::VkError)
            })
    };

    unsafe { device.inner.destroy_fence(fence, None) };

    submit_result
}

///Records a whole-image pipeline barrier for the `from` → `to` transition with
/// pre-resolved `masks` into `cmd`. Infallible so it can run inside oneshot closures.
pub fn record_image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: &Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
    masks: &TransitionMasks,
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .image(image.inner)
        .old_layout(from)
        .new_layout(to)
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .subresource_range(image.subresource_all());
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[*barrier],
        );
    }
}

///Resolves the barrier masks for `from` → `to` and records the transition into an
/// already recording command buffer `cmd`. No submission happens here.
pub fn record_layout_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: &Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<(), ResourceError> {
    let masks = transition_masks(from, to)?;
    record_image_barrier(device, cmd, image, from, to, &masks);
    Ok(())
}

///Transitions the whole of `image` from `*current_layout` to `target_layout` with a
/// blocking one-shot submission on `queue`. The tracked layout is updated in place
/// once the submission finished, so bookkeeping cannot drift from the actual state.
pub fn transition_image_layout(
    device: &Arc<Device>,
    queue: &Queue,
    image: &Image,
    current_layout: &mut vk::ImageLayout,
    target_layout: vk::ImageLayout,
) -> Result<(), EasyVkError> {
    if *current_layout == target_layout {
        return Ok(());
    }

    let masks = transition_masks(*current_layout, target_layout)?;
    let old_layout = *current_layout;

    execute_oneshot(device, queue, |dev, cmd| {
        record_image_barrier(dev, cmd, image, old_layout, target_layout, &masks);
    })?;

    *current_layout = target_layout;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transition_masks() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn texture_sampling_masks() {
        let masks = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn present_transition_has_no_dst_access() {
        let masks = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
        .unwrap();
        assert_eq!(masks.dst_access, vk::AccessFlags::empty());
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn storage_image_transition() {
        let masks =
            transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL).unwrap();
        assert_eq!(
            masks.dst_access,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        );
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
    }

    #[test]
    fn unlisted_pair_errors() {
        let result = transition_masks(
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        assert!(matches!(
            result,
            Err(ResourceError::UnsupportedTransition { .. })
        ));
    }

    #[test]
    fn screenshot_path_round_trip() {
        let to_readback = transition_masks(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_readback.dst_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(to_readback.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let back = transition_masks(
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
        .unwrap();
        assert_eq!(
            back.dst_stage,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
    }

    #[test]
    fn compute_write_to_sampled_round_trip() {
        let to_sampled = transition_masks(
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_sampled.src_access, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(to_sampled.src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);

        let back = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::GENERAL,
        )
        .unwrap();
        assert_eq!(
            back.dst_access,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        );
    }

    #[test]
    fn blit_chain_transfer_dst_to_src() {
        let masks = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn round_trip_between_shader_read_and_transfer_src() {
        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .is_ok());
        assert!(transition_masks(
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .is_ok());
    }
}
