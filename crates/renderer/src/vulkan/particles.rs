//! Scene-static particle resources.
//!
//! These live for the whole run, independent of the surface:
//! - a storage texel buffer with one `vec4` position per particle, seeded
//!   uniformly inside the bounds
//! - the background texture, one texel per particle
//! - a linear clamp sampler
//! - one descriptor set binding the two (binding 0 and 1)

use std::sync::Arc;

use rand::Rng;
use tracing::info;

use streak_resources::Background;
use streak_rhi::buffer::{Buffer, BufferUsage, BufferView};
use streak_rhi::command::{CommandBuffer, CommandPool};
use streak_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, layout_binding, write_combined_image_sampler,
    write_texel_buffer,
};
use streak_rhi::device::Device;
use streak_rhi::image::{Image, ImageDesc, color_subresource_layers, color_subresource_range};
use streak_rhi::sampler::Sampler;
use streak_rhi::{RhiError, vk};

use crate::error::{RenderError, RenderResult};

/// Format of both the position buffer and the background texture.
pub const PARTICLE_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

/// Binding of the position texel buffer.
pub const POSITIONS_BINDING: u32 = 0;
/// Binding of the background combined image sampler.
pub const BACKGROUND_BINDING: u32 = 1;

/// Particle grid parameters.
#[derive(Clone, Copy, Debug)]
pub struct ParticleDesc<'a> {
    pub grid_x: u32,
    pub grid_y: u32,
    /// Half extent of the cube the particles start in.
    pub bounds: f32,
    /// Must be `grid_x` x `grid_y`.
    pub background: &'a Background,
}

impl ParticleDesc<'_> {
    pub fn particle_count(&self) -> u32 {
        self.grid_x * self.grid_y
    }
}

/// Owns the particle data and its descriptor set.
///
/// Fields drop in declaration order: the pool frees the set before the
/// resources it references go away.
pub(crate) struct ParticleResources {
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    set_layout: DescriptorSetLayout,
    _sampler: Sampler,
    _background: Image,
    _positions_view: BufferView,
    _positions: Buffer,
    particle_count: u32,
}

impl ParticleResources {
    pub fn new(device: &Arc<Device>, desc: &ParticleDesc<'_>) -> RenderResult<Self> {
        let background = desc.background;
        if background.width() != desc.grid_x || background.height() != desc.grid_y {
            return Err(RhiError::InvalidHandle(format!(
                "background is {}x{}, particle grid is {}x{}",
                background.width(),
                background.height(),
                desc.grid_x,
                desc.grid_y
            ))
            .into());
        }

        let particle_count = desc.particle_count();
        let seeds = seed_positions(particle_count as usize, desc.bounds, &mut rand::rng());
        let positions = Buffer::new_with_data(
            device.clone(),
            BufferUsage::StorageTexel,
            bytemuck::cast_slice(&seeds),
        )?;
        let positions_view = BufferView::new(device.clone(), &positions, PARTICLE_FORMAT)?;

        let background_image = upload_background(device, background)?;
        let sampler = Sampler::linear_clamp(device.clone())?;

        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            &[
                layout_binding(
                    POSITIONS_BINDING,
                    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
                    vk::ShaderStageFlags::VERTEX,
                ),
                layout_binding(
                    BACKGROUND_BINDING,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT,
                ),
            ],
        )?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_TEXEL_BUFFER)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1),
        ];
        let descriptor_pool = DescriptorPool::new(device.clone(), 1, &pool_sizes)?;
        let descriptor_set = descriptor_pool
            .allocate(&[set_layout.handle()])?
            .into_iter()
            .next()
            .ok_or_else(|| RenderError::ResourceExhausted("descriptor pool is empty".into()))?;

        write_texel_buffer(
            device,
            descriptor_set,
            POSITIONS_BINDING,
            vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            positions_view.handle(),
        );
        write_combined_image_sampler(
            device,
            descriptor_set,
            BACKGROUND_BINDING,
            background_image.view(),
            sampler.handle(),
        );

        info!(
            "Particle resources ready: {}x{} = {} particles",
            desc.grid_x, desc.grid_y, particle_count
        );

        Ok(Self {
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            set_layout,
            _sampler: sampler,
            _background: background_image,
            _positions_view: positions_view,
            _positions: positions,
            particle_count,
        })
    }

    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.handle()
    }

    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }
}

/// Uniform random positions in `[-bounds, bounds]^3`, `w = 1`.
fn seed_positions<R: Rng>(count: usize, bounds: f32, rng: &mut R) -> Vec<[f32; 4]> {
    (0..count)
        .map(|_| {
            [
                rng.random_range(-bounds..=bounds),
                rng.random_range(-bounds..=bounds),
                rng.random_range(-bounds..=bounds),
                1.0,
            ]
        })
        .collect()
}

/// Copies the background into a sampled device-local image and leaves it in
/// `SHADER_READ_ONLY_OPTIMAL`. Blocks until the copy is done.
fn upload_background(device: &Arc<Device>, background: &Background) -> RenderResult<Image> {
    let extent = vk::Extent2D {
        width: background.width(),
        height: background.height(),
    };
    let image = Image::new(
        device.clone(),
        ImageDesc {
            name: "background",
            extent,
            format: PARTICLE_FORMAT,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            view_aspect: Some(vk::ImageAspectFlags::COLOR),
        },
    )?;

    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, background.as_bytes())?;
    let pool = CommandPool::new_transient(device.clone(), device.graphics_family())?;
    let cmd = CommandBuffer::new(device.clone(), &pool)?;

    cmd.begin()?;
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
        &[vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.handle())
            .subresource_range(color_subresource_range())],
    );
    cmd.copy_buffer_to_image(
        staging.handle(),
        image.handle(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[vk::BufferImageCopy::default()
            .buffer_offset(0)
            .image_subresource(color_subresource_layers())
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })],
    );
    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &[vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image.handle())
            .subresource_range(color_subresource_range())],
    );
    cmd.submit_and_wait()?;

    info!(
        "Uploaded {}x{} background texture",
        extent.width, extent.height
    );
    Ok(image)
}
