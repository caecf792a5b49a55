//! Logical device management.
//!
//! This module handles VkDevice creation, queue retrieval, and memory allocator
//! initialization.
//!
//! # Example
//!
//! ```no_run
//! use streak_rhi::device::Device;
//! use streak_rhi::instance::Instance;
//! use streak_rhi::physical_device::select_physical_device;
//! use streak_rhi::vk;
//!
//! # fn example(surface: vk::SurfaceKHR) -> Result<(), streak_rhi::RhiError> {
//! let instance = Instance::new(false, &[])?;
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(&instance, &info)?;
//! let graphics_queue = device.graphics_queue();
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{self, PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] =
    &[ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

/// Vulkan logical device wrapper.
///
/// Shared across threads through `Arc`; every RAII wrapper in this crate
/// keeps a clone so the device outlives the handles created from it.
/// The allocator sits behind a mutex because capture workers free
/// host-readable images from their own threads.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    anisotropy_enabled: bool,
    // Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// Enables the swapchain extension, Vulkan 1.3 dynamic rendering, vertex
    /// stage storage access for the particle texel buffer and, when the GPU
    /// offers it, sampler anisotropy. Also initializes gpu-allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let anisotropy_enabled = info.supports_anisotropy();
        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(anisotropy_enabled)
            .vertex_pipeline_stores_and_atomics(true)
            .large_points(info.features.large_points == vk::TRUE);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s), anisotropy {}",
            DEVICE_EXTENSIONS.len(),
            if anisotropy_enabled { "on" } else { "off" }
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved (graphics family {}, present family {})",
            graphics_family, present_family
        );

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: info.device,
            properties: info.properties,
            memory_properties: info.memory_properties,
            anisotropy_enabled,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Whether samplers may request anisotropic filtering.
    #[inline]
    pub fn anisotropy_enabled(&self) -> bool {
        self.anisotropy_enabled
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Graphics queue family index. Always present on a created device.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.queue_families.graphics_family.unwrap_or_default()
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Resolves a memory type index, see [`physical_device::find_memory_type`].
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoSuitableMemoryType`] if no type has the required flags.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
        preferred: vk::MemoryPropertyFlags,
    ) -> RhiResult<u32> {
        physical_device::find_memory_type(&self.memory_properties, type_bits, required, preferred)
            .ok_or(RhiError::NoSuitableMemoryType {
                type_bits,
                required,
            })
    }

    /// Blocks until all queues are idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails (typically device loss).
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and recorded
    /// - Referenced semaphores are in a state legal for the submission
    /// - The fence (if not null) is unsignaled and not in use
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator releases its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, the remaining fields are plain handles or
// property structs, and the allocator is behind a mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::dynamic_rendering::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
