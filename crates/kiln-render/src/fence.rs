//! Two-phase GPU fence: take a token when work is submitted, poll it later.
//!
//! The token is signalled from wgpu's submitted-work callback, which only runs while
//! the device is being polled, so waiting means polling with a bounded timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-iteration timeout of `wait_until_ready`
pub const WAIT_SLICE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    Ready,
    Pending,
}

/// Handle to "all work submitted before this point"
#[derive(Debug, Clone, Default)]
pub struct FenceToken {
    signaled: Arc<AtomicBool>,
}

impl FenceToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is already complete
    pub fn ready() -> Self {
        let token = Self::new();
        token.signal();
        token
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }
}

/// Something that can drive completion callbacks. `wgpu::Device` in practice.
pub trait PollDevice {
    /// Process finished work; block until the queue is idle when `block` is set.
    /// Returns true once no submitted work is left.
    fn poll_completions(&self, block: bool) -> bool;
}

impl PollDevice for wgpu::Device {
    fn poll_completions(&self, block: bool) -> bool {
        let maintain = if block {
            wgpu::Maintain::Wait
        } else {
            wgpu::Maintain::Poll
        };
        self.poll(maintain).is_queue_empty()
    }
}

/// Fence everything submitted to `queue` so far
pub fn submit(queue: &wgpu::Queue) -> FenceToken {
    let token = FenceToken::new();
    let signal = token.clone();
    queue.on_submitted_work_done(move || signal.signal());
    token
}

/// Poll until `token` signals or `timeout` elapses
pub fn wait(poller: &impl PollDevice, token: &FenceToken, timeout: Duration) -> FenceStatus {
    let start = Instant::now();
    loop {
        if token.is_signaled() {
            return FenceStatus::Ready;
        }
        let idle = poller.poll_completions(false);
        if token.is_signaled() {
            return FenceStatus::Ready;
        }
        // Every callback runs before an idle poll returns, so the signal was lost
        if idle {
            log::warn!("Queue drained without signalling the fence; treating it as ready");
            return FenceStatus::Ready;
        }
        if start.elapsed() >= timeout {
            return FenceStatus::Pending;
        }
        std::thread::yield_now();
    }
}

/// Retry short waits until the token signals. Returns the number of waits it took.
pub fn wait_until_ready(poller: &impl PollDevice, token: &FenceToken) -> u32 {
    let mut attempts = 1;
    while wait(poller, token, WAIT_SLICE) == FenceStatus::Pending {
        attempts += 1;
    }
    if attempts > 1 {
        log::trace!("Culling fence signalled after {} waits", attempts);
    }
    attempts
}
