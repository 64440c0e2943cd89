//! Backend Adapter (component B): wraps one OS notification source behind
//! a uniform raw-event stream, normalizing rename pairing, recursive-watch
//! synthesis, and permission-error handling so the rest of the engine never
//! has to know which platform backend is underneath.

mod notify_backend;

pub use notify_backend::NotifyBackend;

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::Result;
use crate::event::Event;

/// Caller-supplied flags for a single watched root.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub recursive: bool,
    pub ignore_permission_errors: bool,
}

/// An [`Event`] tagged with the wall-clock time the backend observed it, fed
/// to the debouncer by the producer thread. Rename pairing has already been
/// resolved (or given up on) by the time an adapter produces one of these.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub event: Event,
    pub observed_at: Instant,
}

/// Whatever the backend needs to tear a watch back down. Opaque to callers;
/// for the `notify`-backed adapter this is every path literally registered
/// with the OS watcher for a given root (the root itself, plus any
/// synthesized per-directory watches).
#[derive(Debug, Clone, Default)]
pub struct BackendToken {
    pub(crate) watched_paths: Vec<PathBuf>,
    /// The root this token was issued for, kept alongside `watched_paths` so
    /// `remove` can retire it from the backend's overflow-attribution set
    /// even when `watched_paths` ends up empty (e.g. a permission failure
    /// suppressed under `ignore_permission_errors`).
    pub(crate) root: PathBuf,
}

/// Uniform interface over one OS notification source.
///
/// Implementations are shared between the producer thread (which calls
/// `events`/`shutdown`) and whichever thread issues `watch`/`unwatch`:
/// `add`/`remove` take `&self` and rely on interior mutability so both
/// sides can hold the same handle.
pub trait Backend: Send + Sync {
    /// Starts watching `root`, returning a token the caller must later pass
    /// to [`Backend::remove`]. Fails with [`crate::error::EngineError`]
    /// variants per the adapter's `start`/`add` contract.
    fn add(&self, root: &Path, options: WatchOptions) -> Result<BackendToken>;

    /// Tears down every path a prior `add` registered.
    fn remove(&self, token: &BackendToken);

    /// The channel the producer thread selects on alongside its tick timer.
    fn events(&self) -> crossbeam_channel::Receiver<RawEvent>;

    /// If the backend is currently faulting, the time the fault started and
    /// its latest detail. Clears once a successful event arrives. The
    /// producer polls this each tick to implement the retry-then-surface
    /// policy for `BackendError`.
    fn last_fault(&self) -> Option<(Instant, String)>;

    /// Releases all OS-level resources. Idempotent.
    fn shutdown(&self);
}

/// Backend construction parameters not tied to any single watched root.
#[derive(Debug, Clone, Copy)]
pub struct BackendConfig {
    pub force_polling: bool,
    pub poll_delay: std::time::Duration,
    /// Rename cookie pairing is only attempted within this window; an
    /// unpaired half older than this is forwarded as a bare `Delete`/
    /// `Create`. The engine keeps this bound to the debounce window,
    /// recomputing it whenever `debounce_ms` is (re)configured.
    pub rename_window: std::time::Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            force_polling: false,
            poll_delay: std::time::Duration::from_millis(50),
            rename_window: std::time::Duration::from_millis(200),
        }
    }
}
