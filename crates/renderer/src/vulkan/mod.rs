//! Vulkan implementation of the [`Gpu`] seam on top of `streak_rhi`.
//!
//! [`VulkanGpu`] owns the instance, surface and device plus everything that
//! does not depend on the surface: the command pool, the particle shaders
//! and the particle resources. Surface-dependent resources are created
//! through the trait and owned by the frame pipeline.
//!
//! # Resource Destruction Order
//!
//! 1. Wait for the device to go idle
//! 2. Particle resources, shaders, command pool
//! 3. Device
//! 4. Surface
//! 5. Instance
//!
//! The frame pipeline owning this backend releases its slots and surface
//! resources before the backend is dropped.

mod particles;

use std::mem::ManuallyDrop;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use streak_platform::Surface;
use streak_rhi::command::{CommandBuffer, CommandPool};
use streak_rhi::device::Device;
use streak_rhi::image::{HostImage, Image, ImageDesc, color_subresource_layers, subresource_range};
use streak_rhi::instance::Instance;
use streak_rhi::physical_device::select_physical_device;
use streak_rhi::pipeline::{
    CompareOp, GraphicsPipelineBuilder, Pipeline, PipelineLayout, PrimitiveTopology,
};
use streak_rhi::shader::{Shader, ShaderStage};
use streak_rhi::swapchain::{Swapchain, current_surface_extent};
use streak_rhi::sync::{Fence, Semaphore};
use streak_rhi::vk;

pub use particles::{PARTICLE_FORMAT, ParticleDesc};

use crate::error::{RenderError, RenderResult};
use crate::gpu::{
    AcquireStatus, CaptureTarget, CommandRecorder, CompletionSignal, DepthTarget, Gpu,
    ImageBarrier, PresentStatus, PresentationRing, RawHandle, RenderAttachments, RenderTarget,
};
use crate::push_constants::PushConstants;
use particles::ParticleResources;

/// Longest a frame fence may take before the device is considered lost.
pub const FENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Format of the capture blit target and staging image.
pub const CAPTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Everything [`VulkanGpu::new`] needs besides the instance and surface.
#[derive(Clone, Debug)]
pub struct VulkanGpuDesc<'a> {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub particles: ParticleDesc<'a>,
}

/// Vulkan backend.
pub struct VulkanGpu {
    particles: ManuallyDrop<ParticleResources>,
    vertex_shader: ManuallyDrop<Shader>,
    fragment_shader: ManuallyDrop<Shader>,
    command_pool: ManuallyDrop<CommandPool>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
}

impl VulkanGpu {
    /// Picks a device able to present to `surface` and creates the
    /// surface-independent resources.
    ///
    /// # Errors
    ///
    /// Returns an error if no suitable device exists, a shader cannot be
    /// loaded, or any resource creation fails.
    pub fn new(instance: Instance, surface: Surface, desc: &VulkanGpuDesc<'_>) -> RenderResult<Self> {
        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &desc.vertex_shader,
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &desc.fragment_shader,
            ShaderStage::Fragment,
            "main",
        )?;
        let particles = ParticleResources::new(&device, &desc.particles)?;

        info!(
            "Vulkan backend ready on {} ({} particles)",
            physical_device_info.device_name(),
            particles.particle_count()
        );

        Ok(Self {
            particles: ManuallyDrop::new(particles),
            vertex_shader: ManuallyDrop::new(vertex_shader),
            fragment_shader: ManuallyDrop::new(fragment_shader),
            command_pool: ManuallyDrop::new(command_pool),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Vertices to draw per frame, one per particle.
    pub fn particle_count(&self) -> u32 {
        self.particles.particle_count()
    }
}

impl Drop for VulkanGpu {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during backend drop: {}", e);
        }

        // Safety: each field is dropped exactly once, here, and never used
        // again.
        unsafe {
            ManuallyDrop::drop(&mut self.particles);
            ManuallyDrop::drop(&mut self.fragment_shader);
            ManuallyDrop::drop(&mut self.vertex_shader);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Vulkan backend destroyed");
    }
}

// =============================================================================
// Resource types
// =============================================================================

/// Frame fence with a bounded wait.
pub struct VulkanFence(Fence);

impl CompletionSignal for VulkanFence {
    fn wait(&self) -> RenderResult<()> {
        self.0.wait(Some(FENCE_TIMEOUT)).map_err(|e| match RenderError::from(e) {
            RenderError::DeviceLost(reason) => RenderError::DeviceLost(format!(
                "frame fence not signaled within {:?}: {}",
                FENCE_TIMEOUT, reason
            )),
            other => other,
        })
    }

    fn reset(&self) -> RenderResult<()> {
        Ok(self.0.reset()?)
    }
}

impl PresentationRing for Swapchain {
    fn image_count(&self) -> usize {
        Swapchain::image_count(self)
    }

    fn extent(&self) -> vk::Extent2D {
        Swapchain::extent(self)
    }

    fn format(&self) -> vk::Format {
        Swapchain::format(self)
    }

    fn image(&self, index: usize) -> vk::Image {
        Swapchain::image(self, index)
    }
}

impl DepthTarget for Image {
    fn format(&self) -> vk::Format {
        Image::format(self)
    }
}

/// Attachments of one presentation image.
pub struct VulkanRenderTarget(RenderAttachments);

impl RenderTarget for VulkanRenderTarget {
    fn attachments(&self) -> RenderAttachments {
        self.0
    }
}

impl RawHandle<vk::PipelineLayout> for PipelineLayout {
    fn raw(&self) -> vk::PipelineLayout {
        self.handle()
    }
}

impl RawHandle<vk::Pipeline> for Pipeline {
    fn raw(&self) -> vk::Pipeline {
        self.handle()
    }
}

/// Per-slot capture images: an optimal-tiling blit target and a linear,
/// host-readable staging copy.
pub struct VulkanCaptureTarget {
    blit: Image,
    staging: HostImage,
}

impl CaptureTarget for VulkanCaptureTarget {
    fn blit_image(&self) -> vk::Image {
        self.blit.handle()
    }

    fn staging_image(&self) -> vk::Image {
        self.staging.handle()
    }

    fn extent(&self) -> vk::Extent2D {
        self.staging.extent()
    }

    fn read_rgba(&self, out: &mut Vec<u8>) -> RenderResult<()> {
        Ok(self.staging.read_rgba(out)?)
    }
}

// =============================================================================
// Command recording
// =============================================================================

/// Records one frame into a primary command buffer.
pub struct VulkanRecorder {
    cmd: CommandBuffer,
}

impl CommandRecorder for VulkanRecorder {
    fn begin(&mut self) -> RenderResult<()> {
        Ok(self.cmd.begin()?)
    }

    fn end(&mut self) -> RenderResult<()> {
        Ok(self.cmd.end()?)
    }

    fn begin_rendering(&mut self, attachments: &RenderAttachments, clear_color: [f32; 4]) {
        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(attachments.color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            });

        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(attachments.depth_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let color_attachments = [color_attachment];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: attachments.extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        self.cmd.begin_rendering(&rendering_info);
    }

    fn end_rendering(&mut self) {
        self.cmd.end_rendering();
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.cmd
            .bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline);
    }

    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.cmd
            .bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, layout, 0, &[set]);
    }

    fn push_constants(&mut self, layout: vk::PipelineLayout, bytes: &[u8]) {
        self.cmd
            .push_constants(layout, vk::ShaderStageFlags::VERTEX, 0, bytes);
    }

    fn set_viewport_scissor(&mut self, extent: vk::Extent2D) {
        self.cmd.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        self.cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
    }

    fn draw(&mut self, vertex_count: u32) {
        self.cmd.draw(vertex_count);
    }

    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[ImageBarrier],
    ) {
        let barriers: Vec<_> = barriers
            .iter()
            .map(|b| {
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(b.src_access)
                    .dst_access_mask(b.dst_access)
                    .old_layout(b.old_layout)
                    .new_layout(b.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(b.image)
                    .subresource_range(subresource_range(b.aspect))
            })
            .collect();

        self.cmd.pipeline_barrier(src_stage, dst_stage, &barriers);
    }

    fn blit_image(
        &mut self,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
    ) {
        let region = vk::ImageBlit::default()
            .src_subresource(color_subresource_layers())
            .src_offsets([vk::Offset3D::default(), far_corner(src_extent)])
            .dst_subresource(color_subresource_layers())
            .dst_offsets([vk::Offset3D::default(), far_corner(dst_extent)]);

        self.cmd.blit_image(
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
            vk::Filter::NEAREST,
        );
    }

    fn copy_image(&mut self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::ImageCopy::default()
            .src_subresource(color_subresource_layers())
            .dst_subresource(color_subresource_layers())
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        self.cmd.copy_image(
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

// =============================================================================
// Gpu
// =============================================================================

impl Gpu for VulkanGpu {
    type Fence = VulkanFence;
    type Semaphore = Semaphore;
    type Recorder = VulkanRecorder;
    type Ring = Swapchain;
    type Depth = Image;
    type Target = VulkanRenderTarget;
    type Layout = PipelineLayout;
    type Pipeline = Pipeline;
    type Capture = VulkanCaptureTarget;

    fn create_fence(&self, signaled: bool) -> RenderResult<VulkanFence> {
        Ok(VulkanFence(Fence::new(Arc::clone(&self.device), signaled)?))
    }

    fn create_semaphore(&self) -> RenderResult<Semaphore> {
        Ok(Semaphore::new(Arc::clone(&self.device))?)
    }

    fn create_recorder(&self) -> RenderResult<VulkanRecorder> {
        Ok(VulkanRecorder {
            cmd: CommandBuffer::new(Arc::clone(&self.device), &self.command_pool)?,
        })
    }

    fn create_ring(&self, extent: vk::Extent2D) -> RenderResult<Swapchain> {
        Ok(Swapchain::new(
            &self.instance,
            Arc::clone(&self.device),
            self.surface.handle(),
            extent.width,
            extent.height,
        )?)
    }

    fn create_depth(&self, extent: vk::Extent2D) -> RenderResult<Image> {
        Ok(Image::new(
            Arc::clone(&self.device),
            ImageDesc {
                name: "depth",
                extent,
                format: crate::surface_resources::DEPTH_FORMAT,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                view_aspect: Some(vk::ImageAspectFlags::DEPTH),
            },
        )?)
    }

    fn create_render_target(
        &self,
        ring: &Swapchain,
        index: usize,
        depth: &Image,
    ) -> RenderResult<VulkanRenderTarget> {
        Ok(VulkanRenderTarget(RenderAttachments {
            color_image: ring.image(index),
            color_view: ring.image_view(index),
            depth_image: depth.handle(),
            depth_view: depth.view(),
            extent: ring.extent(),
        }))
    }

    fn create_pipeline_layout(&self) -> RenderResult<PipelineLayout> {
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(PushConstants::SIZE as u32);

        Ok(PipelineLayout::new(
            Arc::clone(&self.device),
            &[self.particles.set_layout()],
            &[push_range],
        )?)
    }

    fn create_pipeline(
        &self,
        layout: &PipelineLayout,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RenderResult<Pipeline> {
        Ok(GraphicsPipelineBuilder::new()
            .vertex_shader(&self.vertex_shader)
            .fragment_shader(&self.fragment_shader)
            .topology(PrimitiveTopology::PointList)
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(CompareOp::LessOrEqual)
            .color_attachment_format(color_format)
            .depth_attachment_format(depth_format)
            .build(Arc::clone(&self.device), layout)?)
    }

    fn create_capture_target(&self, extent: vk::Extent2D) -> RenderResult<VulkanCaptureTarget> {
        let blit = Image::new(
            Arc::clone(&self.device),
            ImageDesc {
                name: "capture blit",
                extent,
                format: CAPTURE_FORMAT,
                usage: vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST,
                view_aspect: None,
            },
        )?;
        let staging = HostImage::new(Arc::clone(&self.device), extent, CAPTURE_FORMAT)?;
        Ok(VulkanCaptureTarget { blit, staging })
    }

    fn descriptor_set(&self) -> vk::DescriptorSet {
        self.particles.descriptor_set()
    }

    fn acquire_next_image(
        &self,
        ring: &Swapchain,
        signal: &Semaphore,
    ) -> RenderResult<AcquireStatus> {
        match ring.acquire_next_image(signal.handle()) {
            Ok((index, suboptimal)) => Ok(AcquireStatus::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn submit(
        &self,
        recorder: &VulkanRecorder,
        wait: &Semaphore,
        signal: &Semaphore,
        fence: &VulkanFence,
    ) -> RenderResult<()> {
        let wait_semaphores = [wait.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [signal.handle()];
        let command_buffers = [recorder.cmd.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // Safety: the recorder finished recording and the fence was reset by
        // the caller right before this submission.
        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit_info), fence.0.handle())?;
        }
        Ok(())
    }

    fn present(
        &self,
        ring: &Swapchain,
        index: u32,
        wait: &Semaphore,
    ) -> RenderResult<PresentStatus> {
        match ring.present(self.device.present_queue(), index, wait.handle()) {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn wait_idle(&self) -> RenderResult<()> {
        debug!("Waiting for device idle");
        Ok(self.device.wait_idle()?)
    }

    fn surface_extent(&self) -> RenderResult<Option<vk::Extent2D>> {
        Ok(current_surface_extent(
            self.device.physical_device(),
            self.surface.handle(),
            self.surface.loader(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_capture_target_is_send_sync() {
        assert_send_sync::<VulkanCaptureTarget>();
        assert_send_sync::<VulkanFence>();
    }

    #[test]
    fn test_far_corner() {
        let corner = far_corner(vk::Extent2D {
            width: 1920,
            height: 1080,
        });
        assert_eq!((corner.x, corner.y, corner.z), (1920, 1080, 1));
    }

    #[test]
    fn test_fence_timeout_is_bounded() {
        assert!(FENCE_TIMEOUT >= Duration::from_secs(1));
    }
}
