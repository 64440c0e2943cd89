//! Consumer Port (component F): the contract surface exposed to whatever
//! façade adapts the engine to synchronous iteration, cooperative
//! suspension, or scoped lifetime. This is the only boundary such a façade
//! may touch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{PollOutcome, WatchEngine};
use crate::event::Batch;

/// A cooperative cancellation flag. Cloning shares the same underlying
/// flag, so a token handed to a consumer and one kept by its owner observe
/// the same cancellation.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag so the token can be reused for a subsequent `pull`.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What [`ConsumerPort::pull`] returns.
#[derive(Debug, PartialEq)]
pub enum Pulled {
    Batch(Batch),
    EndOfStream,
    Cancelled,
}

/// The handoff a façade adapts to its own iteration protocol.
pub struct ConsumerPort {
    engine: Arc<WatchEngine>,
    cancel: CancelToken,
}

impl ConsumerPort {
    pub fn new(engine: Arc<WatchEngine>) -> Self {
        Self {
            engine,
            cancel: CancelToken::new(),
        }
    }

    /// Retrieves the next available batch, polling in `tick`-sized slices
    /// and checking both the port's own cancellation and `cancel_token`
    /// between slices, so a blocked call notices cancellation within one
    /// tick either way.
    pub fn pull(&self, tick: Duration, cancel_token: &CancelToken) -> Pulled {
        loop {
            if self.cancel.is_cancelled() || cancel_token.is_cancelled() {
                return Pulled::Cancelled;
            }
            match self.engine.next_batch(tick) {
                PollOutcome::Batch(batch) => return Pulled::Batch(batch),
                PollOutcome::EndOfStream => return Pulled::EndOfStream,
                PollOutcome::Timeout => continue,
            }
        }
    }

    /// Sets this port's cancellation flag; any in-flight `pull` returns
    /// `Cancelled` promptly.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Equivalent to [`WatchEngine::stop`], and cancels any pending `pull`.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.engine.stop();
    }
}
