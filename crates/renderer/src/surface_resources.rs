//! Resources sized or formatted against the current surface.
//!
//! The set is either [`SurfaceResourceSet::Absent`] or fully
//! [`SurfaceResourceSet::Live`]. Acquisition builds every member before
//! publishing any of them; a failure part way drops what was built in
//! reverse order and leaves the set absent.

use tracing::{debug, info};

use streak_rhi::vk;

use crate::error::RenderResult;
use crate::gpu::{Gpu, PresentationRing};

/// Depth format of the per-slot depth buffers.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Live surface-dependent resources.
///
/// Field order is drop order: pipeline, layout, render targets, depth
/// buffers, then the presentation ring.
pub struct SurfaceResources<G: Gpu> {
    pipeline: G::Pipeline,
    layout: G::Layout,
    render_targets: Vec<G::Target>,
    depth_buffers: Vec<G::Depth>,
    ring: G::Ring,
}

impl<G: Gpu> SurfaceResources<G> {
    /// Creates the ring, then one depth buffer and render target per ring
    /// image, then the pipeline layout and pipeline.
    pub fn acquire(gpu: &G, extent: vk::Extent2D) -> RenderResult<Self> {
        let ring = gpu.create_ring(extent)?;
        let ring_extent = ring.extent();

        let depth_buffers = (0..ring.image_count())
            .map(|_| gpu.create_depth(ring_extent))
            .collect::<RenderResult<Vec<_>>>()?;

        let render_targets = depth_buffers
            .iter()
            .enumerate()
            .map(|(index, depth)| gpu.create_render_target(&ring, index, depth))
            .collect::<RenderResult<Vec<_>>>()?;

        let layout = gpu.create_pipeline_layout()?;
        let pipeline = gpu.create_pipeline(&layout, ring.format(), DEPTH_FORMAT)?;

        info!(
            "Surface resources acquired: {}x{}, {} images",
            ring_extent.width,
            ring_extent.height,
            ring.image_count()
        );

        Ok(Self {
            pipeline,
            layout,
            render_targets,
            depth_buffers,
            ring,
        })
    }

    pub fn ring(&self) -> &G::Ring {
        &self.ring
    }

    pub fn pipeline(&self) -> &G::Pipeline {
        &self.pipeline
    }

    pub fn layout(&self) -> &G::Layout {
        &self.layout
    }

    pub fn render_target(&self, index: usize) -> &G::Target {
        &self.render_targets[index]
    }

    pub fn image_count(&self) -> usize {
        self.ring.image_count()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.ring.extent()
    }
}

/// Lifecycle wrapper: `Absent -> Live -> Absent`.
pub enum SurfaceResourceSet<G: Gpu> {
    Absent,
    Live(SurfaceResources<G>),
}

impl<G: Gpu> SurfaceResourceSet<G> {
    /// Builds the live set against `extent`.
    ///
    /// Must only run once no frame references the previous set. On error the
    /// set stays absent.
    pub fn acquire(&mut self, gpu: &G, extent: vk::Extent2D) -> RenderResult<()> {
        self.release();
        *self = SurfaceResourceSet::Live(SurfaceResources::acquire(gpu, extent)?);
        Ok(())
    }

    /// Destroys every member in dependency order.
    pub fn release(&mut self) {
        if let SurfaceResourceSet::Live(resources) =
            std::mem::replace(self, SurfaceResourceSet::Absent)
        {
            drop(resources);
            debug!("Surface resources released");
        }
    }

    pub fn live(&self) -> Option<&SurfaceResources<G>> {
        match self {
            SurfaceResourceSet::Live(resources) => Some(resources),
            SurfaceResourceSet::Absent => None,
        }
    }
}
