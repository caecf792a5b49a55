//! Capture sinks.
//!
//! A [`FrameEncoder`] receives raw interleaved RGBA frames of a fixed size.
//! Encode workers run concurrently, so frames can arrive out of order; both
//! bundled sinks put them back in presentation order with a
//! [`Resequencer`] before writing.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};

use thiserror::Error;
use tracing::{info, warn};

use streak_rhi::vk;

/// Bytes per captured pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Errors raised by a capture sink or while reading a frame back.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Invalid capture settings: {0}")]
    InvalidSettings(String),

    #[error("Failed to open capture sink {path:?}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write frame {frame}: {source}")]
    Write {
        frame: u64,
        source: std::io::Error,
    },

    #[error("Frame {frame} is {actual} bytes, expected {expected}")]
    FrameSize {
        frame: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Readback of frame {frame} failed: {reason}")]
    Readback { frame: u64, reason: String },

    #[error("Encoder process failed: {0}")]
    Process(String),

    #[error("Capture sink is not open")]
    Closed,
}

/// Output file, resolution and frame rate of a capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureSettings {
    pub fn new(path: impl Into<PathBuf>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            fps,
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// Size of one tightly packed frame in bytes.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Rejects zero sizes and frame rates.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::InvalidSettings(format!(
                "resolution {}x{} has no pixels",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(EncodeError::InvalidSettings("fps must be positive".into()));
        }
        Ok(())
    }
}

/// A sink for captured frames.
///
/// `submit_frame` may be called from any encode worker; callers serialize
/// access. `frame_index` counts from 0 for each opened capture.
pub trait FrameEncoder: Send {
    fn open(&mut self, settings: &CaptureSettings) -> Result<(), EncodeError>;

    fn submit_frame(&mut self, frame_index: u64, rgba: &[u8]) -> Result<(), EncodeError>;

    /// Flushes buffered frames and releases the sink.
    fn close(&mut self) -> Result<(), EncodeError>;
}

/// Restores frame order before writing.
///
/// Frames ahead of the next expected index are buffered; stale or
/// duplicate indices are dropped.
#[derive(Debug, Default)]
pub struct Resequencer {
    next: u64,
    pending: BTreeMap<u64, Vec<u8>>,
}

impl Resequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next frame to emit.
    pub fn next_index(&self) -> u64 {
        self.next
    }

    /// Number of frames held back waiting for an earlier one.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Accepts frame `index`, calling `emit` for every frame that is now in
    /// order.
    pub fn push<E>(
        &mut self,
        index: u64,
        frame: &[u8],
        mut emit: impl FnMut(u64, &[u8]) -> Result<(), E>,
    ) -> Result<(), E> {
        if index < self.next || self.pending.contains_key(&index) {
            warn!("Dropping duplicate or late frame {}", index);
            return Ok(());
        }

        if index > self.next {
            self.pending.insert(index, frame.to_vec());
            return Ok(());
        }

        emit(index, frame)?;
        self.next += 1;

        while let Some(buffered) = self.pending.remove(&self.next) {
            emit(self.next, &buffered)?;
            self.next += 1;
        }
        Ok(())
    }

    /// Emits everything still buffered in index order, skipping gaps.
    pub fn flush<E>(&mut self, mut emit: impl FnMut(u64, &[u8]) -> Result<(), E>) -> Result<(), E> {
        while let Some((index, frame)) = self.pending.pop_first() {
            if index != self.next {
                warn!("Capture skipped frames {}..{}", self.next, index);
            }
            emit(index, &frame)?;
            self.next = index + 1;
        }
        Ok(())
    }
}

/// In-order raw RGBA frame stream over any writer.
struct OrderedStream<W: Write> {
    writer: W,
    order: Resequencer,
    frame_len: usize,
    written: u64,
}

impl<W: Write> OrderedStream<W> {
    fn new(writer: W, frame_len: usize) -> Self {
        Self {
            writer,
            order: Resequencer::new(),
            frame_len,
            written: 0,
        }
    }

    fn submit(&mut self, frame_index: u64, rgba: &[u8]) -> Result<(), EncodeError> {
        if rgba.len() != self.frame_len {
            return Err(EncodeError::FrameSize {
                frame: frame_index,
                expected: self.frame_len,
                actual: rgba.len(),
            });
        }

        let writer = &mut self.writer;
        let written = &mut self.written;
        self.order.push(frame_index, rgba, |index, frame| {
            writer
                .write_all(frame)
                .map_err(|source| EncodeError::Write {
                    frame: index,
                    source,
                })?;
            *written += 1;
            Ok(())
        })
    }

    /// Writes buffered frames and flushes, returning the frame count and
    /// the writer.
    fn finish(mut self) -> Result<(u64, W), EncodeError> {
        let writer = &mut self.writer;
        let written = &mut self.written;
        self.order.flush(|index, frame| {
            writer
                .write_all(frame)
                .map_err(|source| EncodeError::Write {
                    frame: index,
                    source,
                })?;
            *written += 1;
            Ok(())
        })?;

        let frame = self.written;
        self.writer
            .flush()
            .map_err(|source| EncodeError::Write { frame, source })?;
        Ok((self.written, self.writer))
    }
}

/// Writes the raw interleaved RGBA stream straight to a file.
///
/// Play back with e.g. `ffplay -f rawvideo -pixel_format rgba -video_size WxH`.
#[derive(Default)]
pub struct RawVideoEncoder {
    stream: Option<OrderedStream<BufWriter<File>>>,
    path: PathBuf,
}

impl RawVideoEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameEncoder for RawVideoEncoder {
    fn open(&mut self, settings: &CaptureSettings) -> Result<(), EncodeError> {
        settings.validate()?;
        if self.stream.is_some() {
            self.close()?;
        }

        let file = File::create(&settings.path).map_err(|source| EncodeError::Open {
            path: settings.path.clone(),
            source,
        })?;

        info!(
            "Raw capture opened: {:?} {}x{} @ {} fps",
            settings.path, settings.width, settings.height, settings.fps
        );

        self.path = settings.path.clone();
        self.stream = Some(OrderedStream::new(
            BufWriter::new(file),
            settings.frame_len(),
        ));
        Ok(())
    }

    fn submit_frame(&mut self, frame_index: u64, rgba: &[u8]) -> Result<(), EncodeError> {
        self.stream
            .as_mut()
            .ok_or(EncodeError::Closed)?
            .submit(frame_index, rgba)
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let (frames, _) = stream.finish()?;
        info!("Raw capture closed: {:?}, {} frames", self.path, frames);
        Ok(())
    }
}

impl Drop for RawVideoEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close raw capture: {}", e);
        }
    }
}

/// Pipes frames into an `ffmpeg` child process producing H.264.
pub struct FfmpegEncoder {
    program: PathBuf,
    child: Option<Child>,
    stream: Option<OrderedStream<BufWriter<ChildStdin>>>,
}

impl FfmpegEncoder {
    /// Uses the `ffmpeg` binary at `program` (looked up on `PATH` if bare).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            child: None,
            stream: None,
        }
    }

    /// Command line reading rawvideo RGBA on stdin.
    pub fn arguments(settings: &CaptureSettings) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", settings.width, settings.height),
            "-r".into(),
            settings.fps.to_string(),
            "-i".into(),
            "-".into(),
            "-an".into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            settings.path.to_string_lossy().into_owned(),
        ]
    }

    fn spawn(&self, settings: &CaptureSettings) -> Result<Child, EncodeError> {
        Command::new(&self.program)
            .args(Self::arguments(settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| EncodeError::Open {
                path: settings.path.clone(),
                source,
            })
    }
}

impl FrameEncoder for FfmpegEncoder {
    fn open(&mut self, settings: &CaptureSettings) -> Result<(), EncodeError> {
        settings.validate()?;
        if self.child.is_some() {
            self.close()?;
        }

        let mut child = self.spawn(settings)?;
        let Some(stdin) = child.stdin.take() else {
            // Piped above, so this only fails if the OS refused the pipe
            let _ = child.kill();
            let _ = child.wait();
            return Err(EncodeError::Process("ffmpeg stdin unavailable".into()));
        };

        info!(
            "ffmpeg capture started: {:?} {}x{} @ {} fps (pid {})",
            settings.path,
            settings.width,
            settings.height,
            settings.fps,
            child.id()
        );

        self.stream = Some(OrderedStream::new(
            BufWriter::new(stdin),
            settings.frame_len(),
        ));
        self.child = Some(child);
        Ok(())
    }

    fn submit_frame(&mut self, frame_index: u64, rgba: &[u8]) -> Result<(), EncodeError> {
        self.stream
            .as_mut()
            .ok_or(EncodeError::Closed)?
            .submit(frame_index, rgba)
    }

    fn close(&mut self) -> Result<(), EncodeError> {
        // Closing stdin is ffmpeg's end of input
        let finished = self.stream.take().map(|stream| stream.finish());

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let frames = match finished {
            Some(Ok((frames, stdin))) => {
                drop(stdin);
                frames
            }
            Some(Err(e)) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
            None => 0,
        };

        let status = child
            .wait()
            .map_err(|e| EncodeError::Process(format!("waiting for ffmpeg: {}", e)))?;
        if !status.success() {
            return Err(EncodeError::Process(format!("ffmpeg exited with {}", status)));
        }

        info!("ffmpeg capture finished, {} frames", frames);
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close ffmpeg capture: {}", e);
        }
    }
}
