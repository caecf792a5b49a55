//! Layout transition sequences recorded around the draw.
//!
//! The capture tail orders color attachment output, transfer and host read
//! explicitly. A wrong stage or access mask here does not fail validation on
//! most drivers; it shows up as torn or stale frames in the capture.

use streak_rhi::vk;

use crate::gpu::{CaptureTarget, CommandRecorder, ImageBarrier, RenderAttachments};

/// Moves the color and depth attachments out of `UNDEFINED` before
/// rendering. Previous contents are discarded.
pub fn record_pre_render<R: CommandRecorder>(recorder: &mut R, attachments: &RenderAttachments) {
    recorder.pipeline_barrier(
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        &[
            ImageBarrier::color(
                attachments.color_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            ImageBarrier {
                image: attachments.depth_image,
                aspect: vk::ImageAspectFlags::DEPTH,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                src_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            },
        ],
    );
}

/// Tail without capture: the rendered image goes straight to presentable.
pub fn record_present_tail<R: CommandRecorder>(recorder: &mut R, color_image: vk::Image) {
    recorder.pipeline_barrier(
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        &[ImageBarrier::color(
            color_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::AccessFlags::empty(),
        )],
    );
}

/// Tail with capture.
///
/// 1. rendered image to transfer source, blit target to transfer dest
/// 2. scaled blit into the fixed-size blit target
/// 3. blit target to transfer source, staging image to transfer dest
/// 4. copy into the host-readable staging image
/// 5. staging image to `GENERAL`, made visible to host reads
/// 6. rendered image to presentable, only after the copy-out
pub fn record_capture_tail<R: CommandRecorder, C: CaptureTarget + ?Sized>(
    recorder: &mut R,
    color_image: vk::Image,
    color_extent: vk::Extent2D,
    capture: &C,
) {
    let blit_image = capture.blit_image();
    let staging_image = capture.staging_image();
    let capture_extent = capture.extent();

    recorder.pipeline_barrier(
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::TRANSFER,
        &[
            ImageBarrier::color(
                color_image,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            ),
            ImageBarrier::color(
                blit_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
            ),
        ],
    );

    recorder.blit_image(color_image, color_extent, blit_image, capture_extent);

    recorder.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::TRANSFER,
        &[
            ImageBarrier::color(
                blit_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::TRANSFER_READ,
            ),
            ImageBarrier::color(
                staging_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
            ),
        ],
    );

    recorder.copy_image(blit_image, staging_image, capture_extent);

    recorder.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::HOST,
        &[ImageBarrier::color(
            staging_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::GENERAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::HOST_READ,
        )],
    );

    recorder.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        &[ImageBarrier::color(
            color_image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::empty(),
        )],
    );
}
