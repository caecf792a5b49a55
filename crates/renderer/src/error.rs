//! Renderer error taxonomy.

use thiserror::Error;

use streak_resources::ResourceError;
use streak_rhi::{RhiError, vk};

use crate::capture::EncodeError;

/// Errors raised while driving frames.
///
/// Only [`RenderError::SurfaceInvalid`] and [`RenderError::CaptureSink`] are
/// recoverable; see [`RenderError::is_fatal`].
#[derive(Error, Debug)]
pub enum RenderError {
    /// The surface was lost or went out of date; recovered by recreating the
    /// surface-dependent resources.
    #[error("Surface invalid: {0}")]
    SurfaceInvalid(String),

    /// Device or host memory allocation failed.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A wait was issued on a signal that was never submitted.
    #[error("Synchronization misuse: {0}")]
    SynchronizationMisuse(String),

    /// The device stopped responding, including fence wait timeouts.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// The capture sink failed; capture is forced off and rendering goes on.
    #[error("Capture sink error: {0}")]
    CaptureSink(#[from] EncodeError),

    #[error(transparent)]
    Rhi(RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl RenderError {
    /// True for errors the render loop cannot continue after.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RenderError::SurfaceInvalid(_) | RenderError::CaptureSink(_)
        )
    }
}

impl From<RhiError> for RenderError {
    fn from(e: RhiError) -> Self {
        match e {
            RhiError::VulkanError(
                vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR,
            ) => RenderError::SurfaceInvalid(e.to_string()),
            e if e.is_device_lost() => RenderError::DeviceLost(e.to_string()),
            e if e.is_out_of_memory() => RenderError::ResourceExhausted(e.to_string()),
            e => RenderError::Rhi(e),
        }
    }
}

impl From<vk::Result> for RenderError {
    fn from(result: vk::Result) -> Self {
        RhiError::VulkanError(result).into()
    }
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_errors_are_transient() {
        let err: RenderError = vk::Result::ERROR_OUT_OF_DATE_KHR.into();
        assert!(matches!(err, RenderError::SurfaceInvalid(_)));
        assert!(!err.is_fatal());

        let err: RenderError = vk::Result::ERROR_SURFACE_LOST_KHR.into();
        assert!(matches!(err, RenderError::SurfaceInvalid(_)));
    }

    #[test]
    fn test_timeouts_are_device_lost() {
        let err: RenderError = vk::Result::TIMEOUT.into();
        assert!(matches!(err, RenderError::DeviceLost(_)));
        assert!(err.is_fatal());

        let err: RenderError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(err, RenderError::DeviceLost(_)));
    }

    #[test]
    fn test_allocation_failures_are_exhaustion() {
        let err: RenderError = vk::Result::ERROR_OUT_OF_DEVICE_MEMORY.into();
        assert!(matches!(err, RenderError::ResourceExhausted(_)));
        assert!(err.is_fatal());

        let err: RenderError = RhiError::NoSuitableMemoryType {
            type_bits: 0,
            required: vk::MemoryPropertyFlags::HOST_VISIBLE,
        }
        .into();
        assert!(matches!(err, RenderError::ResourceExhausted(_)));
    }

    #[test]
    fn test_capture_sink_is_not_fatal() {
        let err = RenderError::CaptureSink(EncodeError::Closed);
        assert!(!err.is_fatal());
        assert!(RenderError::SynchronizationMisuse("x".into()).is_fatal());
    }
}
