//! Physical device (GPU) selection and memory-type queries.
//!
//! The selection process:
//! 1. Enumerate all available GPUs
//! 2. Reject GPUs without graphics + present queue families or Vulkan 1.3
//! 3. Score the rest, preferring discrete GPUs with more device-local memory
//!
//! [`find_memory_type`] resolves the memory type index for allocations that
//! bypass gpu-allocator (host-readable capture images need explicit
//! property control).

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue family indices for the queues the renderer uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if both graphics and present queue families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the unique queue family indices.
    ///
    /// Used when creating the logical device so a family is requested once.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        for family in [self.graphics_family, self.present_family]
            .into_iter()
            .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Whether anisotropic filtering may be enabled on samplers.
    #[inline]
    pub fn supports_anisotropy(&self) -> bool {
        self.features.sampler_anisotropy == vk::TRUE
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    let Some((selected, score)) = selected else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let queue_families = find_queue_families(instance, device, surface, surface_loader);

    let info = PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    };

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            info.device_name(),
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    // Dynamic rendering is core in 1.3
    let (major, minor, _) = info.api_version();
    if (major, minor) < (1, 3) {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            info.device_name(),
            major,
            minor
        );
        return None;
    }

    // Particles are fetched from a texel buffer in the vertex stage
    if features.vertex_pipeline_stores_and_atomics == vk::FALSE {
        debug!(
            "GPU '{}' skipped: vertex stage storage access not supported",
            info.device_name()
        );
        return None;
    }

    Some(info)
}

fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_present = unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        };

        // A family doing both avoids concurrent sharing on swapchain images
        if has_graphics && has_present {
            return QueueFamilyIndices {
                graphics_family: Some(i),
                present_family: Some(i),
            };
        }
        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }
        if has_present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    if info.supports_anisotropy() {
        score += 100;
    }

    score
}

/// Finds a memory type index for an allocation.
///
/// Only types allowed by `type_bits` that carry every `required` flag are
/// considered. Among those:
/// - with no `preferred` flags, the first candidate is returned
/// - a candidate carrying every `preferred` flag is returned immediately
/// - otherwise the first candidate sharing any `preferred` flag is used,
///   falling back to the first candidate
///
/// Returns `None` when no memory type carries the required flags.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    preferred: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = memory_properties.memory_type_count as usize;
    let mut candidates = memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .filter(|(i, ty)| type_bits & (1 << i) != 0 && ty.property_flags.contains(required))
        .map(|(i, ty)| (i as u32, ty.property_flags));

    let (first, first_flags) = candidates.next()?;
    if preferred.is_empty() || first_flags.contains(preferred) {
        return Some(first);
    }

    let mut partial = first_flags.intersects(preferred).then_some(first);
    for (index, flags) in candidates {
        if flags.contains(preferred) {
            return Some(index);
        }
        if partial.is_none() && flags.intersects(preferred) {
            partial = Some(index);
        }
    }

    Some(partial.unwrap_or(first))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    const DEVICE_LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST_VISIBLE: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;
    const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_COHERENT;
    const HOST_CACHED: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_CACHED;

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn test_unique_families_shared_family() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_unique_families_split_families() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![0, 2]);
    }

    #[test]
    fn test_find_memory_type_without_preference_takes_first_match() {
        let props = memory_properties(&[DEVICE_LOCAL, HOST_VISIBLE | HOST_COHERENT]);
        assert_eq!(
            find_memory_type(&props, 0b11, HOST_VISIBLE, vk::MemoryPropertyFlags::empty()),
            Some(1)
        );
        assert_eq!(
            find_memory_type(&props, 0b11, DEVICE_LOCAL, vk::MemoryPropertyFlags::empty()),
            Some(0)
        );
    }

    #[test]
    fn test_find_memory_type_prefers_exact_match() {
        let props = memory_properties(&[
            HOST_VISIBLE | HOST_COHERENT,
            HOST_VISIBLE | HOST_COHERENT | HOST_CACHED,
        ]);
        assert_eq!(
            find_memory_type(&props, 0b11, HOST_VISIBLE, HOST_CACHED),
            Some(1)
        );
    }

    #[test]
    fn test_find_memory_type_falls_back_to_partial_match() {
        let props = memory_properties(&[
            HOST_VISIBLE,
            HOST_VISIBLE | HOST_COHERENT,
            DEVICE_LOCAL,
        ]);
        // Nothing is both coherent and cached; coherent-only is a partial hit
        assert_eq!(
            find_memory_type(&props, 0b111, HOST_VISIBLE, HOST_COHERENT | HOST_CACHED),
            Some(1)
        );
    }

    #[test]
    fn test_find_memory_type_falls_back_to_required_only() {
        let props = memory_properties(&[HOST_VISIBLE, HOST_VISIBLE]);
        assert_eq!(
            find_memory_type(&props, 0b10, HOST_VISIBLE, HOST_CACHED),
            Some(1)
        );
    }

    #[test]
    fn test_find_memory_type_respects_type_bits() {
        let props = memory_properties(&[HOST_VISIBLE | HOST_CACHED, HOST_VISIBLE]);
        assert_eq!(
            find_memory_type(&props, 0b10, HOST_VISIBLE, HOST_CACHED),
            Some(1)
        );
    }

    #[test]
    fn test_find_memory_type_none_when_required_missing() {
        let props = memory_properties(&[DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type(&props, 0b1, HOST_VISIBLE, vk::MemoryPropertyFlags::empty()),
            None
        );
    }
}
