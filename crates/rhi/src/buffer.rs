//! GPU buffer management.
//!
//! - [`BufferUsage`] selects Vulkan usage flags and the memory location
//! - [`Buffer`] wraps VkBuffer with gpu-allocator managed memory
//! - [`BufferView`] exposes a buffer to shaders as a formatted texel buffer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use streak_rhi::device::Device;
//! use streak_rhi::buffer::{Buffer, BufferUsage, BufferView};
//! use streak_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), streak_rhi::RhiError> {
//! let positions: Vec<[f32; 4]> = vec![[0.0; 4]; 1024];
//! let buffer = Buffer::new_with_data(
//!     device.clone(),
//!     BufferUsage::StorageTexel,
//!     bytemuck::cast_slice(&positions),
//! )?;
//! let view = BufferView::new(device, &buffer, vk::Format::R32G32B32A32_SFLOAT)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Formatted read/write data for shaders, seeded from the host
    StorageTexel,
    /// Host-written source for transfers into images
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::StorageTexel => {
                vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the memory location for this buffer type.
    ///
    /// Both kinds are written by the host once, so both live in mapped memory.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::StorageTexel | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::StorageTexel => "storage texel",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer wrapper with managed memory.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a new buffer with the specified size.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero or buffer/memory allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        // From here on Drop cleans up
        let this = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        };

        if let Some(allocation) = &this.allocation {
            unsafe {
                this.device.handle().bind_buffer_memory(
                    buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(this)
    }

    /// Creates a buffer sized for `data` and uploads it.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or the upload fails.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is not mapped or the write would
    /// exceed the buffer size.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().lock().free(allocation)
        {
            error!("Failed to free buffer allocation: {:?}", e);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

/// Typed view over a whole buffer, bound as a texel buffer descriptor.
pub struct BufferView {
    device: Arc<Device>,
    view: vk::BufferView,
}

impl BufferView {
    /// Creates a view covering all of `buffer`, interpreting it as `format`.
    ///
    /// # Errors
    ///
    /// Returns an error if view creation fails.
    pub fn new(device: Arc<Device>, buffer: &Buffer, format: vk::Format) -> RhiResult<Self> {
        let create_info = vk::BufferViewCreateInfo::default()
            .buffer(buffer.handle())
            .format(format)
            .offset(0)
            .range(vk::WHOLE_SIZE);

        let view = unsafe { device.handle().create_buffer_view(&create_info, None)? };
        debug!("Created buffer view ({:?})", format);

        Ok(Self { device, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::BufferView {
        self.view
    }
}

impl Drop for BufferView {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer_view(self.view, None);
        }
        debug!("Destroyed buffer view");
    }
}
