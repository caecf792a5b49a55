//! Frame pipeline and capture for streak.
//!
//! This crate drives rendering to a window surface:
//! - [`FramePipeline`]: acquire, wait for reuse, record, submit, present,
//!   with at most one frame in flight per presentation image
//! - [`SurfaceResourceSet`]: everything rebuilt when the surface changes
//! - [`capture`]: optional per-frame readback encoded on a worker pool
//!
//! The pipeline is generic over the [`Gpu`] seam; [`vulkan::VulkanGpu`] is
//! the production backend.

mod barriers;
pub mod capture;
mod error;
mod frame;
mod frame_pipeline;
pub mod gpu;
mod push_constants;
mod surface_resources;
pub mod vulkan;

pub use capture::{CaptureSettings, EncodeError, FfmpegEncoder, FrameEncoder, RawVideoEncoder};
pub use error::{RenderError, RenderResult};
pub use frame_pipeline::{FrameOutcome, FramePipeline, FramePipelineConfig};
pub use gpu::Gpu;
pub use push_constants::PushConstants;
pub use surface_resources::{DEPTH_FORMAT, SurfaceResourceSet, SurfaceResources};
