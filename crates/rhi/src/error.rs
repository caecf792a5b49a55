//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type satisfies the required property flags
    #[error("No memory type matches bits {type_bits:#x} with {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: ash::vk::MemoryPropertyFlags,
    },

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// Returns true for errors that mean the device can no longer be used.
    pub fn is_device_lost(&self) -> bool {
        matches!(
            self,
            RhiError::VulkanError(ash::vk::Result::ERROR_DEVICE_LOST | ash::vk::Result::TIMEOUT)
        )
    }

    /// Returns true for out-of-memory errors from the driver or the allocator.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(
            self,
            RhiError::VulkanError(
                ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY
                    | ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            ) | RhiError::AllocatorError(gpu_allocator::AllocationError::OutOfMemory)
                | RhiError::NoSuitableMemoryType { .. }
        )
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_device_lost_classification() {
        assert!(RhiError::from(vk::Result::ERROR_DEVICE_LOST).is_device_lost());
        assert!(RhiError::from(vk::Result::TIMEOUT).is_device_lost());
        assert!(!RhiError::from(vk::Result::ERROR_OUT_OF_DATE_KHR).is_device_lost());
    }

    #[test]
    fn test_out_of_memory_classification() {
        assert!(RhiError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).is_out_of_memory());
        assert!(
            RhiError::NoSuitableMemoryType {
                type_bits: 0,
                required: vk::MemoryPropertyFlags::HOST_VISIBLE,
            }
            .is_out_of_memory()
        );
        assert!(!RhiError::NoSuitableGpu.is_out_of_memory());
    }
}
