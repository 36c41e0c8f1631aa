use std::{
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Session clock fed by the host's frame callbacks.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    pub time_seconds: f32,
    last_frame: Option<Instant>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
        self.last_frame = None;
    }

    pub fn advance(&mut self, delta: f32) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }

    /// Records a frame at `now` and returns the time since the previous one.
    /// The first frame after a reset reports zero.
    pub fn mark(&mut self, now: Instant) -> Duration {
        let elapsed = self
            .last_frame
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        self.last_frame = Some(now);
        self.advance(elapsed.as_secs_f32());
        elapsed
    }
}

/// Ticket for one pending frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(u64);

impl FrameRequest {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Host mechanism that calls back once per display or audio frame.
pub trait FrameScheduler: Send {
    fn request_frame(&mut self) -> FrameRequest;

    /// Withdraws a request. Cancelling an unknown request is a no-op.
    fn cancel_frame(&mut self, request: FrameRequest);
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    pending: Vec<FrameRequest>,
}

/// In-process scheduler. Clones share one queue, so the host keeps a clone
/// to collect due requests after handing another to the engine.
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    state: Arc<Mutex<QueueState>>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains every pending request in the order it was issued.
    pub fn take_due(&self) -> Vec<FrameRequest> {
        std::mem::take(&mut self.lock().pending)
    }

    pub fn outstanding(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // The queue holds plain data, so a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self) -> FrameRequest {
        let mut state = self.lock();
        let request = FrameRequest(state.next_id);
        state.next_id += 1;
        state.pending.push(request);
        request
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        self.lock().pending.retain(|pending| *pending != request);
    }
}
