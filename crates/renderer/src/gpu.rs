//! Backend seam for the frame pipeline.
//!
//! [`FramePipeline`](crate::FramePipeline), the surface resource set and the
//! capture path only talk to the device through [`Gpu`]. The Vulkan backend
//! lives in [`crate::vulkan`]; tests drive the same code with a recording
//! fake.
//!
//! Handles crossing the seam are raw `vk` handles so recorded commands stay
//! inspectable without a device.

use streak_rhi::vk;

use crate::error::RenderResult;

/// Host-waitable completion flag (a fence).
///
/// Shared with encode workers, hence `Send + Sync`.
pub trait CompletionSignal: Send + Sync {
    /// Blocks until the signal fires.
    ///
    /// Implementations report a timeout as
    /// [`RenderError::DeviceLost`](crate::RenderError::DeviceLost).
    fn wait(&self) -> RenderResult<()>;

    /// Returns the signal to the pending state.
    fn reset(&self) -> RenderResult<()>;
}

/// Access to the raw handle behind a backend object.
pub trait RawHandle<H> {
    fn raw(&self) -> H;
}

/// One image layout transition inside a pipeline barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

impl ImageBarrier {
    /// Color transition on `image`.
    pub fn color(
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
    ) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            old_layout,
            new_layout,
            src_access,
            dst_access,
        }
    }
}

/// Images and views a frame renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderAttachments {
    pub color_image: vk::Image,
    pub color_view: vk::ImageView,
    pub depth_image: vk::Image,
    pub depth_view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// Records one frame's command list.
///
/// Recording happens on the render thread only.
pub trait CommandRecorder {
    /// Resets the list and starts recording.
    fn begin(&mut self) -> RenderResult<()>;

    fn end(&mut self) -> RenderResult<()>;

    /// Starts dynamic rendering, clearing color to `clear_color` and depth
    /// to 1.0.
    fn begin_rendering(&mut self, attachments: &RenderAttachments, clear_color: [f32; 4]);

    fn end_rendering(&mut self);

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);

    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet);

    /// Pushes vertex-stage constants at offset 0.
    fn push_constants(&mut self, layout: vk::PipelineLayout, bytes: &[u8]);

    /// Sets viewport and scissor to cover `extent`.
    fn set_viewport_scissor(&mut self, extent: vk::Extent2D);

    fn draw(&mut self, vertex_count: u32);

    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[ImageBarrier],
    );

    /// Scaled copy from `src` in `TRANSFER_SRC_OPTIMAL` to `dst` in
    /// `TRANSFER_DST_OPTIMAL`.
    fn blit_image(
        &mut self,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
    );

    /// Unscaled copy between same-format images in transfer layouts.
    fn copy_image(&mut self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D);
}

/// The presentable images of the current surface.
pub trait PresentationRing {
    fn image_count(&self) -> usize;

    fn extent(&self) -> vk::Extent2D;

    fn format(&self) -> vk::Format;

    fn image(&self, index: usize) -> vk::Image;
}

/// Per-slot depth buffer.
pub trait DepthTarget {
    fn format(&self) -> vk::Format;
}

/// Binding of one presentation image and one depth buffer as render
/// targets.
pub trait RenderTarget {
    fn attachments(&self) -> RenderAttachments;
}

/// Fixed-size images a frame is copied into for capture.
///
/// The blit target is device-local; the staging image is host-readable and
/// read back from encode workers.
pub trait CaptureTarget: Send + Sync + 'static {
    fn blit_image(&self) -> vk::Image;

    fn staging_image(&self) -> vk::Image;

    fn extent(&self) -> vk::Extent2D;

    /// Copies the staging image into `out` as tightly packed RGBA rows.
    ///
    /// Only valid once the frame that wrote the image has completed.
    fn read_rgba(&self, out: &mut Vec<u8>) -> RenderResult<()>;
}

/// Result of asking the presentation ring for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    /// An image index is available. `suboptimal` asks for a recreate after
    /// this frame.
    Ready { index: u32, suboptimal: bool },
    /// The ring no longer matches the surface; nothing was acquired.
    OutOfDate,
}

/// Result of queuing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// True when the surface-dependent resources should be rebuilt.
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentStatus::Presented)
    }
}

/// Device operations the frame pipeline needs.
pub trait Gpu {
    /// Completion Signal (fence).
    type Fence: CompletionSignal + 'static;
    /// Ordering Signal (semaphore).
    type Semaphore;
    type Recorder: CommandRecorder;
    type Ring: PresentationRing;
    type Depth: DepthTarget;
    type Target: RenderTarget;
    type Layout: RawHandle<vk::PipelineLayout>;
    type Pipeline: RawHandle<vk::Pipeline>;
    type Capture: CaptureTarget;

    fn create_fence(&self, signaled: bool) -> RenderResult<Self::Fence>;

    fn create_semaphore(&self) -> RenderResult<Self::Semaphore>;

    fn create_recorder(&self) -> RenderResult<Self::Recorder>;

    /// Creates the presentation ring. `extent` is used only when the surface
    /// leaves the size to the application.
    fn create_ring(&self, extent: vk::Extent2D) -> RenderResult<Self::Ring>;

    fn create_depth(&self, extent: vk::Extent2D) -> RenderResult<Self::Depth>;

    fn create_render_target(
        &self,
        ring: &Self::Ring,
        index: usize,
        depth: &Self::Depth,
    ) -> RenderResult<Self::Target>;

    fn create_pipeline_layout(&self) -> RenderResult<Self::Layout>;

    fn create_pipeline(
        &self,
        layout: &Self::Layout,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RenderResult<Self::Pipeline>;

    fn create_capture_target(&self, extent: vk::Extent2D) -> RenderResult<Self::Capture>;

    /// Descriptor set holding the scene-static resources.
    fn descriptor_set(&self) -> vk::DescriptorSet;

    /// Requests the next image without blocking the host; `image_acquired`
    /// is signaled when the image is ready.
    fn acquire_next_image(
        &self,
        ring: &Self::Ring,
        image_acquired: &Self::Semaphore,
    ) -> RenderResult<AcquireStatus>;

    /// Submits `recorder`, waiting on `wait` at color attachment output and
    /// signaling `signal` and `fence` on completion.
    fn submit(
        &self,
        recorder: &Self::Recorder,
        wait: &Self::Semaphore,
        signal: &Self::Semaphore,
        fence: &Self::Fence,
    ) -> RenderResult<()>;

    fn present(
        &self,
        ring: &Self::Ring,
        index: u32,
        wait: &Self::Semaphore,
    ) -> RenderResult<PresentStatus>;

    fn wait_idle(&self) -> RenderResult<()>;

    /// The extent the surface dictates, or `None` if the application
    /// chooses.
    fn surface_extent(&self) -> RenderResult<Option<vk::Extent2D>>;
}
