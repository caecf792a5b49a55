//! Bounded encode worker pool.
//!
//! A fixed number of worker threads take jobs from a bounded channel of the
//! same capacity. Every dispatched job hands back an [`EncodeTicket`] that
//! completes when the job finishes, including when it panics. The frame
//! pipeline keeps at most one ticket per frame slot and waits on it before
//! reusing the slot, which is what bounds outstanding captures.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use super::encoder::EncodeError;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct TicketState {
    done: Mutex<bool>,
    cond: Condvar,
}

/// Completion handle of one encode job.
pub struct EncodeTicket {
    state: Arc<TicketState>,
}

impl EncodeTicket {
    /// Blocks until the job has finished.
    pub fn wait(&self) {
        let mut done = self.state.done.lock();
        while !*done {
            self.state.cond.wait(&mut done);
        }
    }

    pub fn is_done(&self) -> bool {
        *self.state.done.lock()
    }
}

/// Completes its ticket when dropped, so unwinding jobs still release it.
struct Completion {
    state: Arc<TicketState>,
    outstanding: Arc<AtomicUsize>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        *self.state.done.lock() = true;
        self.state.cond.notify_all();
    }
}

/// Fixed-size pool of encode worker threads.
pub struct EncodePool {
    sender: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
    outstanding: Arc<AtomicUsize>,
}

impl EncodePool {
    /// Spawns `size` workers fed by a channel holding at most `size` jobs.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Process`] if a worker thread cannot be spawned.
    pub fn new(size: usize) -> Result<Self, EncodeError> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Job>(size);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut pool = Self {
            sender: Some(sender),
            workers: Vec::with_capacity(size),
            outstanding: Arc::new(AtomicUsize::new(0)),
        };

        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            let worker = std::thread::Builder::new()
                .name(format!("streak-encode-{}", id))
                .spawn(move || worker_loop(id, receiver))
                .map_err(|e| EncodeError::Process(format!("spawning encode worker: {}", e)))?;
            pool.workers.push(worker);
        }

        info!("Encode pool started with {} workers", size);
        Ok(pool)
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Jobs dispatched and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Queues `job`, blocking while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Closed`] if every worker has exited.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> Result<EncodeTicket, EncodeError> {
        let sender = self.sender.as_ref().ok_or(EncodeError::Closed)?;

        let state = Arc::new(TicketState::default());
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let completion = Completion {
            state: Arc::clone(&state),
            outstanding: Arc::clone(&self.outstanding),
        };

        sender
            .send(Box::new(move || {
                let _completion = completion;
                job();
            }))
            // The rejected job is dropped here, completing its ticket
            .map_err(|_| EncodeError::Closed)?;

        Ok(EncodeTicket { state })
    }

    /// Lets queued jobs drain, then joins every worker.
    pub fn shutdown(mut self) {
        self.join_workers();
    }

    fn join_workers(&mut self) {
        // Closing the channel ends each worker's loop once the queue is empty
        self.sender = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Encode worker panicked");
            }
        }
        debug!("Encode pool joined");
    }
}

impl Drop for EncodePool {
    fn drop(&mut self) {
        self.join_workers();
    }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    debug!("Encode worker {} started", id);
    loop {
        let job = receiver.lock().recv();
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
    debug!("Encode worker {} exiting", id);
}
