//! The frame pipeline: acquire, wait for reuse, record, submit, present.
//!
//! One [`FramePipeline::render_one_frame`] call drives one frame on the
//! calling thread and returns. The host blocks only when a slot's previous
//! frame (or its encode job) has not finished; acquire and present are
//! handshakes ordered on the device by semaphores.
//!
//! Slots are keyed by presentation image index, so at most `N` frames are
//! between recording and their fence firing, `N` being the ring size.
//! Ordering semaphores form a separate ring of `N` pairs indexed by frame
//! number; before a pair is reused the slot that last consumed it is waited
//! on.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use streak_rhi::vk;

use crate::barriers::{record_capture_tail, record_pre_render, record_present_tail};
use crate::capture::{
    ActiveCapture, CaptureSettings, EncodeError, EncodePool, ErrorSlot, FrameEncoder,
    SharedEncoder, encode_job,
};
use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameSlot, OrderingPair};
use crate::gpu::{
    AcquireStatus, CaptureTarget, CommandRecorder, Gpu, RawHandle, RenderAttachments,
    RenderTarget,
};
use crate::push_constants::PushConstants;
use crate::surface_resources::SurfaceResourceSet;

/// Fixed per-pipeline drawing parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FramePipelineConfig {
    /// Vertices drawn per frame (one per particle).
    pub vertex_count: u32,
    pub clear_color: [f32; 4],
}

impl Default for FramePipelineConfig {
    fn default() -> Self {
        Self {
            vertex_count: 0,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// What one [`FramePipeline::render_one_frame`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and queued for presentation.
    Presented,
    /// The surface changed; resources were rebuilt. A frame may or may not
    /// have been presented first.
    SurfaceRecreated,
    /// The surface has no area (e.g. minimized); nothing was rendered.
    Skipped,
    /// [`FramePipeline::stop`] was called.
    Stopped,
}

/// Drives frames for one surface.
pub struct FramePipeline<G: Gpu> {
    slots: Vec<FrameSlot<G>>,
    pairs: Vec<OrderingPair<G>>,
    surface: SurfaceResourceSet<G>,
    capture: Option<ActiveCapture>,
    capture_errors: ErrorSlot,
    last_capture_error: Option<EncodeError>,
    encoder: SharedEncoder,
    requested_extent: vk::Extent2D,
    frame_counter: u64,
    config: FramePipelineConfig,
    stopped: bool,
    gpu: G,
}

impl<G: Gpu> FramePipeline<G> {
    /// Acquires the surface resources for `extent` and creates one frame
    /// slot per presentation image.
    ///
    /// A zero extent is accepted; resources are acquired on the first frame
    /// the surface has an area.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource cannot be created. Nothing is left
    /// live in that case.
    pub fn new(
        gpu: G,
        encoder: Box<dyn FrameEncoder>,
        config: FramePipelineConfig,
        extent: vk::Extent2D,
    ) -> RenderResult<Self> {
        let mut pipeline = Self {
            slots: Vec::new(),
            pairs: Vec::new(),
            surface: SurfaceResourceSet::Absent,
            capture: None,
            capture_errors: ErrorSlot::default(),
            last_capture_error: None,
            encoder: Arc::new(Mutex::new(encoder)),
            requested_extent: extent,
            frame_counter: 0,
            config,
            stopped: false,
            gpu,
        };

        pipeline.recreate_surface()?;
        info!(
            "Frame pipeline ready: {} slots, {} vertices",
            pipeline.slots.len(),
            config.vertex_count
        );
        Ok(pipeline)
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Drives one frame.
    ///
    /// Surface loss or staleness reported by acquire or present rebuilds the
    /// surface resources instead of retrying. Capture sink failures reported
    /// by encode workers turn capture off before recording; see
    /// [`FramePipeline::take_capture_error`].
    ///
    /// # Errors
    ///
    /// Every returned error is fatal except
    /// [`RenderError::CaptureSink`](crate::RenderError::CaptureSink).
    pub fn render_one_frame(&mut self, constants: &PushConstants) -> RenderResult<FrameOutcome> {
        if self.stopped {
            return Ok(FrameOutcome::Stopped);
        }

        self.poll_capture_errors();

        let Some(resources) = self.surface.live() else {
            return self.restore_surface();
        };

        let pair_index = (self.frame_counter % self.pairs.len() as u64) as usize;
        if let Some(owner) = self.pairs[pair_index].last_slot {
            self.slots[owner].wait_for_reuse()?;
        }

        let acquired = self
            .gpu
            .acquire_next_image(resources.ring(), &self.pairs[pair_index].image_acquired);
        let (image_index, suboptimal) = match acquired {
            Ok(AcquireStatus::Ready { index, suboptimal }) => (index, suboptimal),
            Ok(AcquireStatus::OutOfDate) => {
                debug!("Presentation ring out of date at acquire");
                return self.rebuild_surface();
            }
            Err(RenderError::SurfaceInvalid(reason)) => {
                warn!("Surface invalid at acquire: {}", reason);
                return self.rebuild_surface();
            }
            Err(e) => return Err(e),
        };

        let slot_index = image_index as usize;
        let Some(slot) = self.slots.get_mut(slot_index) else {
            warn!(
                "Acquired image {} but only {} slots exist",
                image_index,
                self.slots.len()
            );
            // The acquire signal has no submit to consume it
            let outcome = self.rebuild_surface()?;
            if let Some(pair) = self.pairs.get_mut(pair_index) {
                *pair = OrderingPair::new(&self.gpu)?;
            }
            return Ok(outcome);
        };

        slot.wait_for_reuse()?;

        let attachments = resources.render_target(slot_index).attachments();
        let capture_target = match self.capture {
            Some(_) => slot.capture.clone(),
            None => None,
        };

        record_frame(
            &mut slot.recorder,
            &FrameCommands {
                pipeline: resources.pipeline().raw(),
                layout: resources.layout().raw(),
                descriptor_set: self.gpu.descriptor_set(),
                push_constants: constants.as_bytes(),
                attachments,
                clear_color: self.config.clear_color,
                vertex_count: self.config.vertex_count,
            },
            capture_target.as_deref(),
        )?;

        slot.arm()?;
        let pair = &self.pairs[pair_index];
        self.gpu.submit(
            &slot.recorder,
            &pair.image_acquired,
            &pair.render_finished,
            slot.fence(),
        )?;
        slot.mark_submitted();

        let presented = self
            .gpu
            .present(resources.ring(), image_index, &pair.render_finished);
        self.pairs[pair_index].last_slot = Some(slot_index);

        if let (Some(active), Some(target)) = (self.capture.as_mut(), capture_target) {
            let job = encode_job(
                active.next_frame,
                Arc::clone(slot.fence()),
                target,
                Arc::clone(&self.encoder),
                self.capture_errors.clone(),
            );
            match active.pool.dispatch(job) {
                Ok(ticket) => slot.attach_ticket(ticket),
                Err(e) => self.capture_errors.report(e),
            }
            active.next_frame += 1;
        }

        self.frame_counter += 1;

        let needs_recreate = match presented {
            Ok(status) => suboptimal || status.needs_recreate(),
            Err(RenderError::SurfaceInvalid(reason)) => {
                warn!("Surface invalid at present: {}", reason);
                true
            }
            Err(e) => return Err(e),
        };

        if needs_recreate {
            debug!("Presentation ring suboptimal or out of date, recreating");
            self.rebuild_surface()
        } else {
            Ok(FrameOutcome::Presented)
        }
    }

    // =========================================================================
    // Surface
    // =========================================================================

    /// Rebuilds the surface resources for `extent` after a window resize.
    ///
    /// In-flight frames and encode jobs are waited out first. A zero extent
    /// releases the resources until the surface has an area again.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting or resource creation fails.
    pub fn on_resize(&mut self, extent: vk::Extent2D) -> RenderResult<()> {
        debug!("Resize to {}x{}", extent.width, extent.height);
        self.requested_extent = extent;
        self.recreate_surface()?;
        Ok(())
    }

    fn rebuild_surface(&mut self) -> RenderResult<FrameOutcome> {
        if self.recreate_surface()? {
            Ok(FrameOutcome::SurfaceRecreated)
        } else {
            Ok(FrameOutcome::Skipped)
        }
    }

    /// Called while the set is absent; re-acquires once the surface has an
    /// area again.
    fn restore_surface(&mut self) -> RenderResult<FrameOutcome> {
        if is_empty(self.target_extent()?) {
            return Ok(FrameOutcome::Skipped);
        }
        self.rebuild_surface()
    }

    fn target_extent(&self) -> RenderResult<vk::Extent2D> {
        Ok(self.gpu.surface_extent()?.unwrap_or(self.requested_extent))
    }

    /// Release then acquire. Returns false if the surface has no area and
    /// the set was left absent.
    fn recreate_surface(&mut self) -> RenderResult<bool> {
        self.drain()?;
        self.surface.release();

        let extent = self.target_extent()?;
        if is_empty(extent) {
            debug!("Surface has zero extent, resources stay released");
            return Ok(false);
        }

        self.surface.acquire(&self.gpu, extent)?;
        let image_count = self.surface.live().map_or(0, |r| r.image_count());
        self.ensure_slots(image_count)?;
        Ok(true)
    }

    /// Rebuilds slots and ordering pairs when the ring size changed.
    fn ensure_slots(&mut self, count: usize) -> RenderResult<()> {
        if self.slots.len() == count {
            return Ok(());
        }

        info!("Frame slots: {} -> {}", self.slots.len(), count);

        let slots = (0..count)
            .map(|_| FrameSlot::new(&self.gpu))
            .collect::<RenderResult<Vec<_>>>()?;
        let pairs = (0..count)
            .map(|_| OrderingPair::new(&self.gpu))
            .collect::<RenderResult<Vec<_>>>()?;
        self.slots = slots;
        self.pairs = pairs;
        self.frame_counter = 0;

        if self.capture.is_some()
            && let Err(e) = self.resize_capture(count)
        {
            self.force_capture_off(Some(e));
        }
        Ok(())
    }

    /// Waits for the device and every slot, including encode jobs.
    fn drain(&mut self) -> RenderResult<()> {
        self.gpu.wait_idle()?;
        self.drain_slots()
    }

    fn drain_slots(&mut self) -> RenderResult<()> {
        for slot in &mut self.slots {
            slot.drain()?;
        }
        Ok(())
    }

    // =========================================================================
    // Capture
    // =========================================================================

    /// Flips capture on or off. Returns the new state.
    ///
    /// # Errors
    ///
    /// Sink failures are returned as
    /// [`RenderError::CaptureSink`](crate::RenderError::CaptureSink) with
    /// capture left off.
    pub fn toggle_capture(&mut self, settings: &CaptureSettings) -> RenderResult<bool> {
        let enable = self.capture.is_none();
        self.set_capture_enabled(enable, settings)?;
        Ok(enable)
    }

    /// Turns capture on or off; a no-op if already in that state.
    ///
    /// Turning off lets outstanding encode jobs finish, then closes the sink.
    pub fn set_capture_enabled(
        &mut self,
        enabled: bool,
        settings: &CaptureSettings,
    ) -> RenderResult<()> {
        match (enabled, self.capture.is_some()) {
            (true, false) => self.start_capture(settings),
            (false, true) => self.stop_capture(),
            _ => {
                debug!("Capture already {}", if enabled { "on" } else { "off" });
                Ok(())
            }
        }
    }

    fn start_capture(&mut self, settings: &CaptureSettings) -> RenderResult<()> {
        settings.validate()?;

        let targets = self
            .slots
            .iter()
            .map(|_| {
                self.gpu
                    .create_capture_target(settings.extent())
                    .map(Arc::new)
            })
            .collect::<RenderResult<Vec<_>>>()?;
        let pool = EncodePool::new(self.slots.len())?;

        self.encoder.lock().open(settings)?;

        // A stale error from the previous capture must not stop this one
        self.capture_errors.take();
        for (slot, target) in self.slots.iter_mut().zip(targets) {
            slot.capture = Some(target);
        }
        self.capture = Some(ActiveCapture {
            settings: settings.clone(),
            pool,
            next_frame: 0,
        });

        info!(
            "Capture on: {:?} {}x{} @ {} fps",
            settings.path, settings.width, settings.height, settings.fps
        );
        Ok(())
    }

    fn stop_capture(&mut self) -> RenderResult<()> {
        let Some(active) = self.capture.take() else {
            return Ok(());
        };

        let drained = self.drain_slots();
        active.pool.shutdown();
        for slot in &mut self.slots {
            slot.capture = None;
        }

        // Jobs that finished during the drain may have failed
        if let Some(err) = self.capture_errors.take() {
            warn!("Capture sink failed while stopping: {}", err);
            self.last_capture_error = Some(err);
        }

        let closed = self.encoder.lock().close();
        info!("Capture off after {} frames", active.next_frame);

        drained?;
        closed.map_err(RenderError::from)
    }

    /// Replaces capture targets and the pool after the slot count changed.
    fn resize_capture(&mut self, count: usize) -> RenderResult<()> {
        let Some(active) = self.capture.as_mut() else {
            return Ok(());
        };

        let extent = active.settings.extent();
        for slot in &mut self.slots {
            slot.capture = Some(Arc::new(self.gpu.create_capture_target(extent)?));
        }
        if active.pool.size() != count {
            let pool = std::mem::replace(&mut active.pool, EncodePool::new(count)?);
            pool.shutdown();
        }
        Ok(())
    }

    fn poll_capture_errors(&mut self) {
        if self.capture.is_some() && self.capture_errors.is_set() {
            self.force_capture_off(None);
        }
    }

    /// Turns capture off after a failure and keeps the first error for the
    /// caller. Encode jobs still queued see the error and drop their frames.
    fn force_capture_off(&mut self, cause: Option<RenderError>) {
        if let Some(err) = cause {
            self.capture_errors.report(match err {
                RenderError::CaptureSink(e) => e,
                other => EncodeError::Process(other.to_string()),
            });
        }

        warn!("Forcing capture off");
        if let Err(e) = self.stop_capture() {
            warn!("Error while stopping capture: {}", e);
        }
        if let Some(err) = self.capture_errors.take() {
            self.last_capture_error = Some(err);
        }
    }

    /// Returns the error that last forced capture off, if any.
    pub fn take_capture_error(&mut self) -> Option<EncodeError> {
        self.last_capture_error.take()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn capture_settings(&self) -> Option<&CaptureSettings> {
        self.capture.as_ref().map(|active| &active.settings)
    }

    /// Encode jobs dispatched and not yet finished.
    pub fn in_flight_encodes(&self) -> usize {
        self.capture
            .as_ref()
            .map_or(0, |active| active.pool.outstanding())
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Stops honoring further frames.
    pub fn stop(&mut self) {
        if !self.stopped {
            info!("Frame pipeline stopped after {} frames", self.frame_counter);
        }
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    /// Number of frame slots, equal to the presentation ring size.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Current render extent, `None` while the surface resources are absent.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.surface.live().map(|r| r.extent())
    }

    /// Frames submitted since the slots were last created.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }
}

impl<G: Gpu> Drop for FramePipeline<G> {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {}", e);
        }
        if let Err(e) = self.drain_slots() {
            error!("Failed to drain frame slots during shutdown: {}", e);
        }
        if let Err(e) = self.stop_capture() {
            warn!("Failed to stop capture during shutdown: {}", e);
        }

        self.slots.clear();
        self.pairs.clear();
        self.surface.release();

        info!("Frame pipeline destroyed");
    }
}

fn is_empty(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Everything one frame's command list needs.
struct FrameCommands<'a> {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    push_constants: &'a [u8],
    attachments: RenderAttachments,
    clear_color: [f32; 4],
    vertex_count: u32,
}

fn record_frame<R: CommandRecorder, C: CaptureTarget>(
    recorder: &mut R,
    frame: &FrameCommands<'_>,
    capture: Option<&C>,
) -> RenderResult<()> {
    let attachments = &frame.attachments;

    recorder.begin()?;
    record_pre_render(recorder, attachments);

    recorder.begin_rendering(attachments, frame.clear_color);
    recorder.bind_pipeline(frame.pipeline);
    recorder.bind_descriptor_set(frame.layout, frame.descriptor_set);
    recorder.push_constants(frame.layout, frame.push_constants);
    recorder.set_viewport_scissor(attachments.extent);
    recorder.draw(frame.vertex_count);
    recorder.end_rendering();

    match capture {
        Some(target) => {
            record_capture_tail(recorder, attachments.color_image, attachments.extent, target)
        }
        None => record_present_tail(recorder, attachments.color_image),
    }

    recorder.end()
}
