//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a thin, RAII-owning layer over Vulkan using `ash`.
//! Every wrapper holds an `Arc<Device>` and destroys its handle on drop.
//! It handles:
//! - Instance, physical device and logical device creation
//! - Swapchain management
//! - Command pools and command buffer recording
//! - Buffers, images, samplers and descriptors
//! - Pipeline creation
//! - Synchronization primitives

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
