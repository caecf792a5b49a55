//! Asynchronous frame capture.
//!
//! While capture is on, each frame's command list ends with the capture tail
//! (see [`crate::barriers`]) and, once presented, an encode job is handed to
//! the [`EncodePool`]. The job waits on the frame's fence, reads the staging
//! image back and passes the pixels to the shared [`FrameEncoder`].

mod encoder;
mod pool;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

pub use encoder::{
    BYTES_PER_PIXEL, CaptureSettings, EncodeError, FfmpegEncoder, FrameEncoder, RawVideoEncoder,
    Resequencer,
};
pub use pool::{EncodePool, EncodeTicket};

use crate::gpu::{CaptureTarget, CompletionSignal};

/// Encoder shared by all workers; only `submit_frame` runs under the lock.
pub(crate) type SharedEncoder = Arc<Mutex<Box<dyn FrameEncoder>>>;

/// First error reported by an encode worker.
#[derive(Clone, Default)]
pub(crate) struct ErrorSlot(Arc<Mutex<Option<EncodeError>>>);

impl ErrorSlot {
    /// Keeps the first error; later ones are only logged.
    pub fn report(&self, err: EncodeError) {
        error!("Capture failed: {}", err);
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }

    pub fn take(&self) -> Option<EncodeError> {
        self.0.lock().take()
    }
}

/// State while capture is on.
pub(crate) struct ActiveCapture {
    pub settings: CaptureSettings,
    pub pool: EncodePool,
    pub next_frame: u64,
}

/// Builds the job that reads back and encodes one captured frame.
pub(crate) fn encode_job<F, C>(
    frame_index: u64,
    fence: Arc<F>,
    target: Arc<C>,
    encoder: SharedEncoder,
    errors: ErrorSlot,
) -> impl FnOnce() + Send + 'static
where
    F: CompletionSignal + 'static,
    C: CaptureTarget,
{
    move || {
        // Capture is being shut down; the remaining frames are dropped
        if errors.is_set() {
            return;
        }

        let encoded = panic::catch_unwind(AssertUnwindSafe(|| {
            encode_frame(frame_index, fence.as_ref(), target.as_ref(), &encoder)
        }));
        match encoded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.report(e),
            Err(payload) => errors.report(EncodeError::Process(format!(
                "encode job for frame {} panicked: {}",
                frame_index,
                panic_message(payload.as_ref())
            ))),
        }
    }
}

fn encode_frame<F, C>(
    frame_index: u64,
    fence: &F,
    target: &C,
    encoder: &SharedEncoder,
) -> Result<(), EncodeError>
where
    F: CompletionSignal,
    C: CaptureTarget,
{
    fence.wait().map_err(|e| EncodeError::Readback {
        frame: frame_index,
        reason: e.to_string(),
    })?;

    let extent = target.extent();
    let mut rgba =
        Vec::with_capacity(extent.width as usize * extent.height as usize * BYTES_PER_PIXEL);
    target
        .read_rgba(&mut rgba)
        .map_err(|e| EncodeError::Readback {
            frame: frame_index,
            reason: e.to_string(),
        })?;

    encoder.lock().submit_frame(frame_index, &rgba)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_slot_keeps_first_error() {
        let slot = ErrorSlot::default();
        assert!(!slot.is_set());

        slot.report(EncodeError::Closed);
        slot.report(EncodeError::Process("second".into()));
        assert!(slot.is_set());

        assert!(matches!(slot.take(), Some(EncodeError::Closed)));
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_panic_message_reads_str_and_string_payloads() {
        let payload = std::panic::catch_unwind(|| -> () { panic!("static text") }).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static text");

        let payload = std::panic::catch_unwind(|| -> () { panic!("frame {}", 3) }).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "frame 3");
    }
}
