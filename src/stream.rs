//! Frame-by-frame delivery of decode results across threads.
//!
//! At most one frame is decoded at a time; frames submitted meanwhile are
//! dropped. Every accepted frame gets a sequence number so a slow consumer
//! can skip results that a newer frame has already superseded.

use crate::{engine::Engine, error::Error, output::PoseNetOutput, pose::Pose};
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Arc, Mutex, PoisonError,
};
use tracing::{debug, trace};

/// Where the frame guarded by a [`FrameGuard`] is in its lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameState {
    /// No frame in flight; the next submission is accepted.
    Idle = 0,
    /// A frame is being decoded.
    Pending = 1,
    /// The decoded frame is being handed to the consumer.
    Delivering = 2,
}

impl FrameState {
    // Only the three discriminants are ever stored.
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Pending,
            2 => Self::Delivering,
            _ => Self::Idle,
        }
    }
}

/// Tracks whether a frame is in flight.
#[derive(Debug, Clone)]
pub struct FrameGuard(Arc<AtomicU8>);

impl Default for FrameGuard {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(FrameState::Idle as u8)))
    }
}

impl FrameGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FrameState {
        FrameState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Claim the guard for a new frame. `None` if one is already in flight.
    pub fn try_submit(&self) -> Option<FrameTicket> {
        self.0
            .compare_exchange(
                FrameState::Idle as u8,
                FrameState::Pending as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| FrameTicket(self.0.clone()))
    }
}

/// Proof that the holder owns the in-flight frame. Dropping it, on any path,
/// returns the guard to [`FrameState::Idle`].
#[derive(Debug)]
pub struct FrameTicket(Arc<AtomicU8>);

impl FrameTicket {
    /// The result is ready and being handed over.
    pub fn complete(&self) {
        self.0
            .store(FrameState::Delivering as u8, Ordering::Release);
    }
}

impl Drop for FrameTicket {
    fn drop(&mut self) {
        self.0.store(FrameState::Idle as u8, Ordering::Release);
    }
}

/// The outcome of decoding one submitted frame.
#[derive(Debug)]
pub struct FrameResult {
    pub sequence: u64,
    pub poses: Result<Vec<Pose>, Error>,
}

/// Connect an engine to a consumer.
pub fn frame_channel(engine: Engine) -> (FrameProducer, FrameConsumer) {
    let (sender, receiver) = channel::unbounded();
    let latest = Arc::new(AtomicU64::new(0));
    (
        FrameProducer {
            engine: Arc::new(Mutex::new(engine)),
            guard: FrameGuard::new(),
            latest: latest.clone(),
            sender,
        },
        FrameConsumer {
            receiver,
            latest,
            newest_seen: 0,
        },
    )
}

/// Submitting half; clones share the engine and the guard.
#[derive(Debug, Clone)]
pub struct FrameProducer {
    engine: Arc<Mutex<Engine>>,
    guard: FrameGuard,
    latest: Arc<AtomicU64>,
    sender: Sender<FrameResult>,
}

impl FrameProducer {
    pub fn guard(&self) -> &FrameGuard {
        &self.guard
    }

    /// Decode `output` and send the result to the consumer.
    ///
    /// Returns the frame's sequence number, or `None` if the frame was
    /// dropped because another one is still in flight.
    pub fn submit(&self, output: &PoseNetOutput) -> Option<u64> {
        let ticket = match self.guard.try_submit() {
            Some(ticket) => ticket,
            None => {
                trace!(message = "frame in flight, dropping frame");
                return None;
            }
        };
        let sequence = self.latest.fetch_add(1, Ordering::AcqRel) + 1;

        let poses = self
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect_poses(output);

        ticket.complete();
        if self.sender.send(FrameResult { sequence, poses }).is_err() {
            debug!(message = "consumer disconnected", sequence);
        }
        Some(sequence)
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct FrameConsumer {
    receiver: Receiver<FrameResult>,
    latest: Arc<AtomicU64>,
    newest_seen: u64,
}

impl FrameConsumer {
    /// Block for the next result, skipping any that a newer queued result
    /// supersedes. `None` once every producer is gone.
    pub fn recv(&mut self) -> Option<FrameResult> {
        let first = self.receiver.recv().ok()?;
        self.newest(first)
    }

    /// Like [`recv`](Self::recv) without blocking.
    pub fn try_recv(&mut self) -> Option<FrameResult> {
        let first = self.receiver.try_recv().ok()?;
        self.newest(first)
    }

    /// Whether a newer frame than `result` has been submitted.
    pub fn is_stale(&self, result: &FrameResult) -> bool {
        result.sequence < self.latest.load(Ordering::Acquire)
    }

    fn newest(&mut self, first: FrameResult) -> Option<FrameResult> {
        let newest = self
            .receiver
            .try_iter()
            .fold(first, |newest, result| {
                if result.sequence > newest.sequence {
                    trace!(message = "discarding stale result", sequence = newest.sequence);
                    result
                } else {
                    newest
                }
            });
        if newest.sequence <= self.newest_seen {
            return None;
        }
        self.newest_seen = newest.sequence;
        Some(newest)
    }
}
