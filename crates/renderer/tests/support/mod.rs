//! Recording fake backend and encoder for frame pipeline tests.
//!
//! Every resource creation, destruction, submission, presentation and
//! encoder call is appended to a shared [`Log`]. Fences model the device:
//! a submitted fence completes when it is waited on or at `wait_idle`.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use streak_renderer::capture::{CaptureSettings, EncodeError, FrameEncoder};
use streak_renderer::gpu::{
    AcquireStatus, CaptureTarget, CommandRecorder, CompletionSignal, DepthTarget, Gpu,
    ImageBarrier, PresentStatus, PresentationRing, RawHandle, RenderAttachments, RenderTarget,
};
use streak_renderer::{
    FramePipeline, FramePipelineConfig, PushConstants, RenderError, RenderResult,
};
use streak_rhi::vk::{self, Handle};

pub const PARTICLES: u32 = 64;

pub fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D { width, height }
}

// =============================================================================
// Log
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Res {
    Ring,
    Depth,
    Target(usize),
    Layout,
    Pipeline,
    Capture,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Begin,
    End,
    BeginRendering(vk::Extent2D),
    EndRendering,
    BindPipeline,
    BindDescriptorSet,
    PushConstants(usize),
    Viewport(vk::Extent2D),
    Draw(u32),
    Barrier(Vec<ImageBarrier>),
    Blit { src: vk::Image, dst: vk::Image },
    Copy { src: vk::Image, dst: vk::Image },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Created(Res),
    Destroyed(Res),
    Acquire(u32),
    Submit { recorder: usize, ops: Vec<Op> },
    Present(u32),
    FenceCompleted(u64),
    WaitIdle,
    EncoderOpen,
    EncoderSubmit { frame: u64, len: usize },
    EncoderClose,
}

#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<Event>>>);

impl Log {
    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn submits(&self) -> Vec<(usize, Vec<Op>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Submit { recorder, ops } => Some((recorder, ops)),
                _ => None,
            })
            .collect()
    }

    pub fn encoded_frames(&self) -> Vec<(u64, usize)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::EncoderSubmit { frame, len } => Some((frame, len)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Event) -> usize {
        self.events().iter().filter(|e| *e == wanted).count()
    }

    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }
}

// =============================================================================
// Fences
// =============================================================================

#[derive(Default)]
struct FenceState {
    signaled: bool,
    submitted: bool,
}

pub struct FakeFence {
    id: u64,
    state: Arc<Mutex<FenceState>>,
    shared: Arc<Shared>,
}

impl FakeFence {
    /// Completes the submission if one is pending. Returns false if the
    /// fence was neither signaled nor submitted.
    fn complete(state: &Mutex<FenceState>, id: u64, shared: &Shared) -> bool {
        let mut s = state.lock();
        if s.signaled {
            return true;
        }
        if !s.submitted {
            return false;
        }
        s.signaled = true;
        s.submitted = false;
        drop(s);

        shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        shared.log.push(Event::FenceCompleted(id));
        true
    }
}

impl CompletionSignal for FakeFence {
    fn wait(&self) -> RenderResult<()> {
        if Self::complete(&self.state, self.id, &self.shared) {
            Ok(())
        } else {
            self.shared
                .violation(format!("fence {} waited but never submitted", self.id));
            Err(RenderError::SynchronizationMisuse("fake fence".into()))
        }
    }

    fn reset(&self) -> RenderResult<()> {
        let mut s = self.state.lock();
        if s.submitted && !s.signaled {
            drop(s);
            self.shared
                .violation(format!("fence {} reset while in flight", self.id));
            return Ok(());
        }
        s.signaled = false;
        Ok(())
    }
}

// =============================================================================
// Resources
// =============================================================================

/// Tracks whether an acquire signal is pending a submit wait.
pub struct FakeSemaphore {
    id: u64,
    signaled: AtomicBool,
}

pub struct FakeRecorder {
    pub id: usize,
    ops: Vec<Op>,
}

impl CommandRecorder for FakeRecorder {
    fn begin(&mut self) -> RenderResult<()> {
        self.ops.clear();
        self.ops.push(Op::Begin);
        Ok(())
    }

    fn end(&mut self) -> RenderResult<()> {
        self.ops.push(Op::End);
        Ok(())
    }

    fn begin_rendering(&mut self, attachments: &RenderAttachments, _clear_color: [f32; 4]) {
        self.ops.push(Op::BeginRendering(attachments.extent));
    }

    fn end_rendering(&mut self) {
        self.ops.push(Op::EndRendering);
    }

    fn bind_pipeline(&mut self, _pipeline: vk::Pipeline) {
        self.ops.push(Op::BindPipeline);
    }

    fn bind_descriptor_set(&mut self, _layout: vk::PipelineLayout, _set: vk::DescriptorSet) {
        self.ops.push(Op::BindDescriptorSet);
    }

    fn push_constants(&mut self, _layout: vk::PipelineLayout, bytes: &[u8]) {
        self.ops.push(Op::PushConstants(bytes.len()));
    }

    fn set_viewport_scissor(&mut self, extent: vk::Extent2D) {
        self.ops.push(Op::Viewport(extent));
    }

    fn draw(&mut self, vertex_count: u32) {
        self.ops.push(Op::Draw(vertex_count));
    }

    fn pipeline_barrier(
        &mut self,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        barriers: &[ImageBarrier],
    ) {
        self.ops.push(Op::Barrier(barriers.to_vec()));
    }

    fn blit_image(
        &mut self,
        src: vk::Image,
        _src_extent: vk::Extent2D,
        dst: vk::Image,
        _dst_extent: vk::Extent2D,
    ) {
        self.ops.push(Op::Blit { src, dst });
    }

    fn copy_image(&mut self, src: vk::Image, dst: vk::Image, _extent: vk::Extent2D) {
        self.ops.push(Op::Copy { src, dst });
    }
}

pub struct FakeRing {
    base: u64,
    extent: vk::Extent2D,
    count: usize,
    log: Log,
}

impl PresentationRing for FakeRing {
    fn image_count(&self) -> usize {
        self.count
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        vk::Format::B8G8R8A8_SRGB
    }

    fn image(&self, index: usize) -> vk::Image {
        vk::Image::from_raw(self.base + index as u64)
    }
}

impl Drop for FakeRing {
    fn drop(&mut self) {
        self.log.push(Event::Destroyed(Res::Ring));
    }
}

pub struct FakeDepth {
    handle: u64,
    log: Log,
}

impl DepthTarget for FakeDepth {
    fn format(&self) -> vk::Format {
        vk::Format::D32_SFLOAT
    }
}

impl Drop for FakeDepth {
    fn drop(&mut self) {
        self.log.push(Event::Destroyed(Res::Depth));
    }
}

pub struct FakeTarget {
    index: usize,
    attachments: RenderAttachments,
    log: Log,
}

impl RenderTarget for FakeTarget {
    fn attachments(&self) -> RenderAttachments {
        self.attachments
    }
}

impl Drop for FakeTarget {
    fn drop(&mut self) {
        self.log.push(Event::Destroyed(Res::Target(self.index)));
    }
}

pub struct FakeLayout(Log);

impl RawHandle<vk::PipelineLayout> for FakeLayout {
    fn raw(&self) -> vk::PipelineLayout {
        vk::PipelineLayout::from_raw(1)
    }
}

impl Drop for FakeLayout {
    fn drop(&mut self) {
        self.0.push(Event::Destroyed(Res::Layout));
    }
}

pub struct FakePipeline(Log);

impl RawHandle<vk::Pipeline> for FakePipeline {
    fn raw(&self) -> vk::Pipeline {
        vk::Pipeline::from_raw(1)
    }
}

impl Drop for FakePipeline {
    fn drop(&mut self) {
        self.0.push(Event::Destroyed(Res::Pipeline));
    }
}

pub struct FakeCapture {
    blit: u64,
    staging: u64,
    extent: vk::Extent2D,
    log: Log,
}

impl CaptureTarget for FakeCapture {
    fn blit_image(&self) -> vk::Image {
        vk::Image::from_raw(self.blit)
    }

    fn staging_image(&self) -> vk::Image {
        vk::Image::from_raw(self.staging)
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn read_rgba(&self, out: &mut Vec<u8>) -> RenderResult<()> {
        let len = self.extent.width as usize * self.extent.height as usize * 4;
        out.clear();
        out.resize(len, (self.staging % 251) as u8);
        Ok(())
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.log.push(Event::Destroyed(Res::Capture));
    }
}

// =============================================================================
// Gpu
// =============================================================================

/// Knobs tests turn while a pipeline owns the backend.
pub struct Controls {
    pub image_count: usize,
    pub surface_extent: Option<vk::Extent2D>,
    pub acquire_script: VecDeque<AcquireStatus>,
    pub present_script: VecDeque<PresentStatus>,
}

pub struct Shared {
    pub log: Log,
    pub controls: Mutex<Controls>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub violations: Mutex<Vec<String>>,
    fences: Mutex<Vec<(u64, Arc<Mutex<FenceState>>)>>,
    next_id: AtomicU64,
    next_image: AtomicU64,
}

impl Shared {
    fn violation(&self, what: String) {
        self.violations.lock().push(what);
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct FakeGpu {
    pub shared: Arc<Shared>,
}

impl FakeGpu {
    pub fn new(image_count: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                log: Log::default(),
                controls: Mutex::new(Controls {
                    image_count,
                    surface_extent: None,
                    acquire_script: VecDeque::new(),
                    present_script: VecDeque::new(),
                }),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                violations: Mutex::new(Vec::new()),
                fences: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                next_image: AtomicU64::new(0),
            }),
        }
    }

    pub fn log(&self) -> &Log {
        &self.shared.log
    }

    pub fn controls(&self) -> parking_lot::MutexGuard<'_, Controls> {
        self.shared.controls.lock()
    }

    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> Vec<String> {
        self.shared.violations.lock().clone()
    }
}

impl Gpu for FakeGpu {
    type Fence = FakeFence;
    type Semaphore = FakeSemaphore;
    type Recorder = FakeRecorder;
    type Ring = FakeRing;
    type Depth = FakeDepth;
    type Target = FakeTarget;
    type Layout = FakeLayout;
    type Pipeline = FakePipeline;
    type Capture = FakeCapture;

    fn create_fence(&self, signaled: bool) -> RenderResult<FakeFence> {
        let id = self.shared.id();
        let state = Arc::new(Mutex::new(FenceState {
            signaled,
            submitted: false,
        }));
        self.shared.fences.lock().push((id, Arc::clone(&state)));
        Ok(FakeFence {
            id,
            state,
            shared: Arc::clone(&self.shared),
        })
    }

    fn create_semaphore(&self) -> RenderResult<FakeSemaphore> {
        Ok(FakeSemaphore {
            id: self.shared.id(),
            signaled: AtomicBool::new(false),
        })
    }

    fn create_recorder(&self) -> RenderResult<FakeRecorder> {
        Ok(FakeRecorder {
            id: self.shared.id() as usize,
            ops: Vec::new(),
        })
    }

    fn create_ring(&self, extent: vk::Extent2D) -> RenderResult<FakeRing> {
        let count = self.controls().image_count;
        self.shared.next_image.store(0, Ordering::SeqCst);
        self.shared.log.push(Event::Created(Res::Ring));
        Ok(FakeRing {
            base: self.shared.id() * 1000,
            extent,
            count,
            log: self.shared.log.clone(),
        })
    }

    fn create_depth(&self, _extent: vk::Extent2D) -> RenderResult<FakeDepth> {
        self.shared.log.push(Event::Created(Res::Depth));
        Ok(FakeDepth {
            handle: self.shared.id(),
            log: self.shared.log.clone(),
        })
    }

    fn create_render_target(
        &self,
        ring: &FakeRing,
        index: usize,
        depth: &FakeDepth,
    ) -> RenderResult<FakeTarget> {
        self.shared.log.push(Event::Created(Res::Target(index)));
        Ok(FakeTarget {
            index,
            attachments: RenderAttachments {
                color_image: ring.image(index),
                color_view: vk::ImageView::from_raw(ring.base + index as u64),
                depth_image: vk::Image::from_raw(depth.handle),
                depth_view: vk::ImageView::from_raw(depth.handle),
                extent: ring.extent,
            },
            log: self.shared.log.clone(),
        })
    }

    fn create_pipeline_layout(&self) -> RenderResult<FakeLayout> {
        self.shared.log.push(Event::Created(Res::Layout));
        Ok(FakeLayout(self.shared.log.clone()))
    }

    fn create_pipeline(
        &self,
        _layout: &FakeLayout,
        _color_format: vk::Format,
        _depth_format: vk::Format,
    ) -> RenderResult<FakePipeline> {
        self.shared.log.push(Event::Created(Res::Pipeline));
        Ok(FakePipeline(self.shared.log.clone()))
    }

    fn create_capture_target(&self, extent: vk::Extent2D) -> RenderResult<FakeCapture> {
        self.shared.log.push(Event::Created(Res::Capture));
        Ok(FakeCapture {
            blit: self.shared.id(),
            staging: self.shared.id(),
            extent,
            log: self.shared.log.clone(),
        })
    }

    fn descriptor_set(&self) -> vk::DescriptorSet {
        vk::DescriptorSet::from_raw(1)
    }

    fn acquire_next_image(
        &self,
        ring: &FakeRing,
        image_acquired: &FakeSemaphore,
    ) -> RenderResult<AcquireStatus> {
        let scripted = self.controls().acquire_script.pop_front();
        let status = scripted.unwrap_or_else(|| {
            let next = self.shared.next_image.fetch_add(1, Ordering::SeqCst);
            let index = (next % ring.count as u64) as u32;
            self.shared.log.push(Event::Acquire(index));
            AcquireStatus::Ready {
                index,
                suboptimal: false,
            }
        });
        if matches!(status, AcquireStatus::Ready { .. })
            && image_acquired.signaled.swap(true, Ordering::SeqCst)
        {
            self.shared.violation(format!(
                "semaphore {} signaled by acquire while still pending",
                image_acquired.id
            ));
        }
        Ok(status)
    }

    fn submit(
        &self,
        recorder: &FakeRecorder,
        wait: &FakeSemaphore,
        _signal: &FakeSemaphore,
        fence: &FakeFence,
    ) -> RenderResult<()> {
        if !wait.signaled.swap(false, Ordering::SeqCst) {
            self.shared
                .violation(format!("submit waits on unsignaled semaphore {}", wait.id));
        }
        {
            let mut s = fence.state.lock();
            if s.signaled || s.submitted {
                drop(s);
                self.shared
                    .violation(format!("fence {} submitted without reset", fence.id));
            } else {
                s.submitted = true;
            }
        }

        let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.shared.log.push(Event::Submit {
            recorder: recorder.id,
            ops: recorder.ops.clone(),
        });
        Ok(())
    }

    fn present(
        &self,
        _ring: &FakeRing,
        index: u32,
        _wait: &FakeSemaphore,
    ) -> RenderResult<PresentStatus> {
        self.shared.log.push(Event::Present(index));
        Ok(self
            .controls()
            .present_script
            .pop_front()
            .unwrap_or(PresentStatus::Presented))
    }

    fn wait_idle(&self) -> RenderResult<()> {
        let fences: Vec<_> = self.shared.fences.lock().clone();
        for (id, state) in fences {
            FakeFence::complete(&state, id, &self.shared);
        }
        self.shared.log.push(Event::WaitIdle);
        Ok(())
    }

    fn surface_extent(&self) -> RenderResult<Option<vk::Extent2D>> {
        Ok(self.controls().surface_extent)
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Holds encode jobs until opened.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub fn open(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock() = true;
        cvar.notify_all();
    }

    pub fn wait(&self) {
        let (lock, cvar) = &*self.0;
        let mut open = lock.lock();
        while !*open {
            cvar.wait(&mut open);
        }
    }
}

#[derive(Default)]
pub struct FakeEncoder {
    pub log: Log,
    pub gate: Option<Gate>,
    pub fail_open: bool,
    pub fail_submit_at: Option<u64>,
    pub panic_at: Option<u64>,
}

impl FakeEncoder {
    pub fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            ..Self::default()
        }
    }
}

impl FrameEncoder for FakeEncoder {
    fn open(&mut self, settings: &CaptureSettings) -> Result<(), EncodeError> {
        if self.fail_open {
            return Err(EncodeError::Open {
                path: settings.path.clone(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.log.push(Event::EncoderOpen);
        Ok(())
    }

    fn submit_frame(&mut self, frame_index: u64, rgba: &[u8]) -> Result<(), EncodeError> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }
        if self.panic_at == Some(frame_index) {
            panic!("encoder crashed on frame {}", frame_index);
        }
        if self.fail_submit_at == Some(frame_index) {
            return Err(EncodeError::Write {
                frame: frame_index,
                source: io::Error::other("disk full"),
            });
        }
        self.log.push(Event::EncoderSubmit {
            frame: frame_index,
            len: rgba.len(),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        self.log.push(Event::EncoderClose);
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn config() -> FramePipelineConfig {
    FramePipelineConfig {
        vertex_count: PARTICLES,
        ..FramePipelineConfig::default()
    }
}

pub fn pipeline(image_count: usize, size: vk::Extent2D) -> FramePipeline<FakeGpu> {
    let gpu = FakeGpu::new(image_count);
    let encoder = FakeEncoder::new(gpu.log());
    FramePipeline::new(gpu, Box::new(encoder), config(), size).unwrap()
}

pub fn pipeline_with_encoder(
    image_count: usize,
    size: vk::Extent2D,
    configure: impl FnOnce(&mut FakeEncoder),
) -> FramePipeline<FakeGpu> {
    let gpu = FakeGpu::new(image_count);
    let mut encoder = FakeEncoder::new(gpu.log());
    configure(&mut encoder);
    FramePipeline::new(gpu, Box::new(encoder), config(), size).unwrap()
}

pub fn constants() -> PushConstants {
    PushConstants {
        res_x: 8,
        res_y: 8,
        ..PushConstants::default()
    }
}

pub fn settings(dir: &std::path::Path, width: u32, height: u32) -> CaptureSettings {
    CaptureSettings::new(dir.join("out.rgba"), width, height, 25)
}
