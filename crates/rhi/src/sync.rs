//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] - device-side ordering between queue operations
//!   (image acquired, rendering finished)
//! - [`Fence`] - device-to-host completion, waited on before a frame slot
//!   is reused and by capture workers before reading back pixels

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan semaphore wrapper.
///
/// Created unsignaled. Only ever consumed by queue submission and present.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
///
/// Waiting is allowed from several threads at once. Resetting is not: the
/// caller must guarantee no other thread is waiting on or submitting with the
/// fence while [`Fence::reset`] runs.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence, optionally already signaled so the first wait
    /// before any submission returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled.
    ///
    /// `None` waits forever.
    ///
    /// # Errors
    ///
    /// Returns `vk::Result::TIMEOUT` if the timeout elapses, or the driver
    /// error (typically `ERROR_DEVICE_LOST`).
    pub fn wait(&self, timeout: Option<Duration>) -> RhiResult<()> {
        let timeout_ns = timeout
            .map(|t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(u64::MAX);

        // wait_for_fences maps VK_TIMEOUT to Err
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_ns)?;
        }
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().reset_fences(&[self.fence])?;
        }
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_semaphore_is_send_sync() {
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        // Capture workers hold fences on their own threads
        assert_send_sync::<Fence>();
    }
}
