//! Image management.
//!
//! - [`Image`] - device-local optimal-tiling image with gpu-allocator memory
//!   and an optional view (textures, depth buffers, capture blit targets)
//! - [`HostImage`] - linear-tiling image in host-visible memory that the host
//!   reads back after a transfer (capture staging)
//!
//! Host images bypass gpu-allocator: the memory type is picked explicitly with
//! [`Device::find_memory_type`] so that host-cached memory can be preferred
//! for readback.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Full single-mip, single-layer color subresource.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    subresource_range(vk::ImageAspectFlags::COLOR)
}

/// Full single-mip, single-layer subresource for `aspect`.
pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Color subresource layers for copies and blits.
pub fn color_subresource_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

/// Creation parameters for an [`Image`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// Aspect for the view; `None` skips view creation
    pub view_aspect: Option<vk::ImageAspectFlags>,
}

/// Device-local 2D image.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    /// Creates the image, binds device-local memory and creates the view.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is zero, or image, memory or view
    /// creation fails. Nothing is leaked on failure.
    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{} image has zero extent",
                desc.name
            )));
        }

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&create_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device.allocator().lock().allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            desc,
        };

        if let Some(allocation) = &this.allocation {
            unsafe {
                this.device.handle().bind_image_memory(
                    image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        if let Some(aspect) = desc.view_aspect {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(desc.format)
                .subresource_range(subresource_range(aspect));
            this.view = unsafe { this.device.handle().create_image_view(&view_info, None)? };
        }

        debug!(
            "Created {} image: {}x{} {:?}",
            desc.name, desc.extent.width, desc.extent.height, desc.format
        );

        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the view, or a null handle if none was requested.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().lock().free(allocation)
        {
            error!("Failed to free {} image allocation: {:?}", self.desc.name, e);
        }

        debug!("Destroyed {} image", self.desc.name);
    }
}

/// Linear-tiling RGBA8 image the host reads back.
///
/// The device copies into it in `TRANSFER_DST_OPTIMAL` and transitions it to
/// `GENERAL` with a host-read barrier before the host calls
/// [`HostImage::read_rgba`].
pub struct HostImage {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    extent: vk::Extent2D,
    coherent: bool,
    // Serializes map/unmap on the dedicated allocation
    map_lock: Mutex<()>,
}

impl HostImage {
    /// Bytes per pixel of the readback format.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Creates a host-visible linear image of `extent`, preferring
    /// host-cached memory.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation fails or no host-visible memory
    /// type accepts the image.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&create_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let memory_type = device.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_CACHED,
        );
        let memory = memory_type.and_then(|memory_type| {
            let alloc_info = vk::MemoryAllocateInfo::default()
                .allocation_size(requirements.size)
                .memory_type_index(memory_type);
            let memory = unsafe { device.handle().allocate_memory(&alloc_info, None)? };
            Ok((memory_type, memory))
        });
        let (memory_type, memory) = match memory {
            Ok(pair) => pair,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let coherent = device.memory_properties().memory_types[memory_type as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT);

        let this = Self {
            device,
            image,
            memory,
            extent,
            coherent,
            map_lock: Mutex::new(()),
        };

        unsafe {
            this.device.handle().bind_image_memory(image, memory, 0)?;
        }

        debug!(
            "Created host image {}x{} (memory type {}, coherent {})",
            extent.width, extent.height, memory_type, coherent
        );

        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Size of a tightly packed frame in bytes.
    #[inline]
    pub fn packed_len(&self) -> usize {
        self.extent.width as usize * self.extent.height as usize * Self::BYTES_PER_PIXEL
    }

    /// Copies the image contents into `out` as tightly packed rows.
    ///
    /// The transfer that wrote the image must have completed (its fence
    /// waited) before calling this.
    ///
    /// # Errors
    ///
    /// Returns an error if mapping or invalidation fails.
    pub fn read_rgba(&self, out: &mut Vec<u8>) -> RhiResult<()> {
        let subresource = vk::ImageSubresource::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .array_layer(0);
        let layout = unsafe {
            self.device
                .handle()
                .get_image_subresource_layout(self.image, subresource)
        };

        let _guard = self.map_lock.lock();
        let ptr = unsafe {
            self.device.handle().map_memory(
                self.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )?
        };

        let result = (|| {
            if !self.coherent {
                let range = vk::MappedMemoryRange::default()
                    .memory(self.memory)
                    .offset(0)
                    .size(vk::WHOLE_SIZE);
                unsafe {
                    self.device
                        .handle()
                        .invalidate_mapped_memory_ranges(std::slice::from_ref(&range))?;
                }
            }

            let row_len = self.extent.width as usize * Self::BYTES_PER_PIXEL;
            out.clear();
            out.reserve(self.packed_len());
            for row in 0..self.extent.height as usize {
                let offset = layout.offset as usize + row * layout.row_pitch as usize;
                let src = unsafe {
                    std::slice::from_raw_parts(ptr.cast::<u8>().add(offset), row_len)
                };
                out.extend_from_slice(src);
            }
            Ok(())
        })();

        unsafe { self.device.handle().unmap_memory(self.memory) };
        result
    }
}

impl Drop for HostImage {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image(self.image, None);
            self.device.handle().free_memory(self.memory, None);
        }
        debug!("Destroyed host image");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_host_image_is_send_sync() {
        // Read back on encode worker threads
        assert_send_sync::<HostImage>();
        assert_send_sync::<Image>();
    }

    #[test]
    fn test_color_subresource_range_covers_one_level() {
        let range = color_subresource_range();
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
    }

    #[test]
    fn test_depth_subresource_range() {
        let range = subresource_range(vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.base_mip_level, 0);
    }
}
