//! Per-image frame slots and the ordering signal ring.

use std::sync::Arc;

use tracing::trace;

use crate::capture::EncodeTicket;
use crate::error::{RenderError, RenderResult};
use crate::gpu::{CompletionSignal, Gpu};

/// Where a slot's fence is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// No submission pending; the fence may be reset.
    Idle,
    /// Fence reset, submission not yet made. Waiting now would never return.
    Armed,
    /// Submitted; the fence fires when the device finishes.
    InFlight,
}

/// Resources of one in-flight frame, one per presentation image.
pub(crate) struct FrameSlot<G: Gpu> {
    pub recorder: G::Recorder,
    fence: Arc<G::Fence>,
    state: SlotState,
    /// Set while capture is on.
    pub capture: Option<Arc<G::Capture>>,
    ticket: Option<EncodeTicket>,
}

impl<G: Gpu> FrameSlot<G> {
    pub fn new(gpu: &G) -> RenderResult<Self> {
        Ok(Self {
            recorder: gpu.create_recorder()?,
            fence: Arc::new(gpu.create_fence(true)?),
            state: SlotState::Idle,
            capture: None,
            ticket: None,
        })
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn fence(&self) -> &Arc<G::Fence> {
        &self.fence
    }

    /// Blocks until the slot's previous frame and its encode job are done.
    pub fn wait_for_reuse(&mut self) -> RenderResult<()> {
        if let Some(ticket) = self.ticket.take() {
            trace!("Waiting for encode job");
            ticket.wait();
        }

        match self.state {
            SlotState::Idle => Ok(()),
            SlotState::Armed => Err(RenderError::SynchronizationMisuse(
                "waiting on a frame fence that was reset but never submitted".into(),
            )),
            SlotState::InFlight => {
                self.fence.wait()?;
                self.state = SlotState::Idle;
                Ok(())
            }
        }
    }

    /// Resets the fence right before submission.
    pub fn arm(&mut self) -> RenderResult<()> {
        if self.state != SlotState::Idle {
            return Err(RenderError::SynchronizationMisuse(format!(
                "resetting a frame fence in state {:?}",
                self.state
            )));
        }
        self.fence.reset()?;
        self.state = SlotState::Armed;
        Ok(())
    }

    pub fn mark_submitted(&mut self) {
        self.state = SlotState::InFlight;
    }

    pub fn attach_ticket(&mut self, ticket: EncodeTicket) {
        self.ticket = Some(ticket);
    }

    /// Waits out any submission and encode job. An armed slot never reached
    /// the queue and is simply returned to idle.
    pub fn drain(&mut self) -> RenderResult<()> {
        if self.state == SlotState::Armed {
            self.state = SlotState::Idle;
        }
        self.wait_for_reuse()
    }
}

/// The "image acquired" and "submission complete" ordering signals of one
/// frame.
pub(crate) struct OrderingPair<G: Gpu> {
    pub image_acquired: G::Semaphore,
    pub render_finished: G::Semaphore,
    /// Slot whose submission last consumed this pair.
    pub last_slot: Option<usize>,
}

impl<G: Gpu> OrderingPair<G> {
    pub fn new(gpu: &G) -> RenderResult<Self> {
        Ok(Self {
            image_acquired: gpu.create_semaphore()?,
            render_finished: gpu.create_semaphore()?,
            last_slot: None,
        })
    }
}
