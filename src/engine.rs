//! Watch Engine (component E): owns the registry, the producer thread, the
//! debouncer, and the batch queue, and serves the consumer port.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::backend::{Backend, BackendConfig, NotifyBackend, WatchOptions};
use crate::debounce::{DebounceConfig, Debouncer};
use crate::error::{EngineError, Result};
use crate::event::{Batch, Event};
use crate::filter::Filter;
use crate::queue::{self, QueueReceiver, QueueSender};
use crate::registry::{WatchHandle, WatchRegistry};

/// Lifecycle state. Only `Idle` accepts first [`WatchEngine::configure`];
/// `Running` accepts `watch`/`unwatch`; `Stopping` rejects new work while
/// draining; `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Construction-time parameters, settable only while `Idle`.
#[derive(Clone)]
pub struct Config {
    pub debounce_ms: u64,
    pub tick_ms: u64,
    pub event_buffer_size: usize,
    pub debug: bool,
    pub filter: Option<Filter>,
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            tick_ms: 50,
            event_buffer_size: 1024,
            debug: false,
            filter: None,
            backend: BackendConfig::default(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 || self.tick_ms > self.debounce_ms.max(1) {
            return Err(EngineError::BackendError(format!(
                "tick_ms ({}) must be in [1, debounce_ms ({})]",
                self.tick_ms, self.debounce_ms
            )));
        }
        if self.event_buffer_size == 0 {
            return Err(EngineError::BackendError("event_buffer_size must be >= 1".into()));
        }
        Ok(())
    }
}

/// What [`WatchEngine::next_batch`] returns: a batch, a plain timeout with
/// nothing ready yet, or end-of-stream once the engine is `Stopped` and its
/// queue has drained.
#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    Batch(Batch),
    Timeout,
    EndOfStream,
}

enum Command {
    Watch {
        paths: Vec<PathBuf>,
        recursive: bool,
        ignore_permission_errors: bool,
        reply: crossbeam_channel::Sender<Result<()>>,
    },
    Unwatch {
        paths: Vec<PathBuf>,
        reply: crossbeam_channel::Sender<()>,
    },
    Stop,
}

/// The core watch engine. Every instance owns its producer thread, registry,
/// queue, and filter; multiple instances in one process are independent.
pub struct WatchEngine {
    state: Arc<Mutex<EngineState>>,
    config: Mutex<Config>,
    command_tx: Mutex<Option<crossbeam_channel::Sender<Command>>>,
    queue_rx: Mutex<Option<QueueReceiver>>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl WatchEngine {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(Mutex::new(EngineState::Idle)),
            config: Mutex::new(config),
            command_tx: Mutex::new(None),
            queue_rx: Mutex::new(None),
            producer: Mutex::new(None),
        })
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Replaces the configuration. Only legal while `Idle`.
    pub fn configure(&self, config: Config) -> Result<()> {
        config.validate()?;
        let state = self.state.lock();
        if *state != EngineState::Idle {
            return Err(EngineError::InvalidState { state: *state });
        }
        *self.config.lock() = config;
        Ok(())
    }

    /// Registers `paths`. Spawns the producer thread and transitions
    /// `Idle -> Running` on the first call; extends the registry on
    /// subsequent calls. Idempotent per path.
    pub fn watch<P: AsRef<Path>>(
        &self,
        paths: &[P],
        recursive: bool,
        ignore_permission_errors: bool,
    ) -> Result<()> {
        let mut canonical = Vec::with_capacity(paths.len());
        for p in paths {
            canonical.push(canonicalize(p.as_ref())?);
        }

        {
            let mut state = self.state.lock();
            match *state {
                EngineState::Idle => {
                    self.spawn_producer();
                    *state = EngineState::Running;
                }
                EngineState::Running => {}
                EngineState::Stopping | EngineState::Stopped => {
                    return Err(EngineError::InvalidState { state: *state });
                }
            }
        }

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let sent = {
            let guard = self.command_tx.lock();
            guard.as_ref().map(|tx| {
                tx.send(Command::Watch {
                    paths: canonical,
                    recursive,
                    ignore_permission_errors,
                    reply: reply_tx,
                })
            })
        };
        match sent {
            Some(Ok(())) => reply_rx
                .recv()
                .unwrap_or_else(|_| Err(EngineError::BackendError("producer thread exited".into()))),
            _ => Err(EngineError::InvalidState { state: self.state() }),
        }
    }

    /// Removes `paths` from the registry. Unknown paths are ignored. A
    /// no-op if nothing has ever been watched.
    pub fn unwatch<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let sent = {
            let guard = self.command_tx.lock();
            guard.as_ref().map(|tx| tx.send(Command::Unwatch { paths, reply: reply_tx }))
        };
        match sent {
            Some(Ok(())) => {
                let _ = reply_rx.recv();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Idempotent shutdown: signals the producer to exit, joins it, and
    /// moves the engine to `Stopped`. Safe to call from any state and any
    /// number of times.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == EngineState::Stopped {
                return;
            }
            if *state != EngineState::Stopping {
                *state = EngineState::Stopping;
            }
        }

        if let Some(tx) = self.command_tx.lock().take() {
            let _ = tx.send(Command::Stop);
        }
        if let Some(handle) = self.producer.lock().take() {
            let _ = handle.join();
        }

        *self.state.lock() = EngineState::Stopped;
    }

    /// Blocking retrieval of the next batch, up to `timeout`.
    pub fn next_batch(&self, timeout: Duration) -> PollOutcome {
        let rx = self.queue_rx.lock().clone();
        let Some(rx) = rx else {
            return if self.state() == EngineState::Stopped {
                PollOutcome::EndOfStream
            } else {
                PollOutcome::Timeout
            };
        };
        match rx.pull(timeout) {
            Some(batch) => PollOutcome::Batch(batch),
            None if self.state() == EngineState::Stopped => PollOutcome::EndOfStream,
            None => PollOutcome::Timeout,
        }
    }

    /// Count of batches dropped so far because the consumer fell behind.
    pub fn dropped_batch_count(&self) -> u64 {
        self.queue_rx.lock().as_ref().map(|rx| rx.dropped_count()).unwrap_or(0)
    }

    fn spawn_producer(&self) {
        let config = self.config.lock().clone();
        // The exact rename-cookie timeout is left unspecified upstream; this
        // binds it to the debounce window so a pairing never outlives the
        // batch it would have landed in anyway.
        let mut backend_config = config.backend;
        backend_config.rename_window = Duration::from_millis(config.debounce_ms);
        let backend: Arc<dyn Backend> = Arc::new(
            NotifyBackend::new(backend_config)
                .expect("backend construction failure would have surfaced at configure time"),
        );
        let debouncer = Debouncer::new(DebounceConfig::new(
            Duration::from_millis(config.debounce_ms),
            Duration::from_millis(config.tick_ms),
        ));
        let (queue_tx, queue_rx) = queue::channel(config.event_buffer_size);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        *self.command_tx.lock() = Some(command_tx);
        *self.queue_rx.lock() = Some(queue_rx);

        let tick = Duration::from_millis(config.tick_ms);
        let filter = config.filter;
        let state = self.state.clone();
        let debug = config.debug;

        let handle = std::thread::spawn(move || {
            run_producer(backend, debouncer, filter, tick, queue_tx, command_rx, state, debug);
        });
        *self.producer.lock() = Some(handle);
    }
}

impl Drop for WatchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EngineError::PathNotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => EngineError::PermissionDenied(path.to_path_buf()),
        _ => EngineError::BackendError(e.to_string()),
    })
}

fn run_producer(
    backend: Arc<dyn Backend>,
    mut debouncer: Debouncer,
    filter: Option<Filter>,
    tick: Duration,
    queue_tx: QueueSender,
    command_rx: crossbeam_channel::Receiver<Command>,
    state: Arc<Mutex<EngineState>>,
    debug: bool,
) {
    let mut registry = WatchRegistry::new();
    let events_rx = backend.events();
    let mut fault_since: Option<Instant> = None;
    let mut last_dropped = queue_tx.dropped_count();

    'outer: loop {
        crossbeam_channel::select! {
            recv(command_rx) -> cmd => match cmd {
                Ok(Command::Watch { paths, recursive, ignore_permission_errors, reply }) => {
                    let result = apply_watch(&backend, &mut registry, paths, recursive, ignore_permission_errors);
                    let _ = reply.send(result);
                }
                Ok(Command::Unwatch { paths, reply }) => {
                    apply_unwatch(&backend, &mut registry, paths);
                    let _ = reply.send(());
                }
                Ok(Command::Stop) | Err(_) => break 'outer,
            },
            recv(events_rx) -> raw => {
                if let Ok(raw) = raw {
                    fault_since = None;
                    if let Some(batch) = debouncer.push(raw.event, raw.observed_at) {
                        emit(&filter, &queue_tx, batch, debug);
                    }
                }
            },
            default(tick) => {
                if let Some(batch) = debouncer.tick(Instant::now()) {
                    emit(&filter, &queue_tx, batch, debug);
                }
                if debug {
                    let dropped = queue_tx.dropped_count();
                    if dropped != last_dropped {
                        tracing::debug!(dropped, "batch queue overflow, oldest batch evicted");
                        last_dropped = dropped;
                    }
                }
                if let Some((since, detail)) = backend.last_fault() {
                    if fault_since.is_none() {
                        fault_since = Some(since);
                    }
                    if Instant::now().saturating_duration_since(since) >= Duration::from_secs(10) {
                        tracing::warn!(detail = %detail, "backend fault persisted past retry window, shutting down");
                        let sentinel: Batch = registry.paths().map(|p| Event::ModifyUnknown(p.to_path_buf())).collect();
                        if !sentinel.is_empty() {
                            queue_tx.push(sentinel);
                        }
                        break 'outer;
                    }
                    if debug {
                        tracing::debug!(detail = %detail, "backend fault, retrying");
                    }
                }
            },
        }
    }

    backend.shutdown();
    queue_tx.close();
    *state.lock() = EngineState::Stopped;
}

fn apply_watch(
    backend: &Arc<dyn Backend>,
    registry: &mut WatchRegistry,
    paths: Vec<PathBuf>,
    recursive: bool,
    ignore_permission_errors: bool,
) -> Result<()> {
    let options = WatchOptions {
        recursive,
        ignore_permission_errors,
    };
    let mut first_err = None;
    for path in paths {
        match backend.add(&path, options) {
            Ok(token) => {
                if let Some(previous) = registry.insert(
                    path,
                    WatchHandle {
                        recursive,
                        ignore_permission_errors,
                        backend_token: token,
                    },
                ) {
                    backend.remove(&previous.backend_token);
                }
            }
            Err(e) => {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn apply_unwatch(backend: &Arc<dyn Backend>, registry: &mut WatchRegistry, paths: Vec<PathBuf>) {
    for path in paths {
        if let Some(handle) = registry.remove(&path) {
            backend.remove(&handle.backend_token);
        }
    }
}

fn emit(filter: &Option<Filter>, queue_tx: &QueueSender, batch: Batch, debug: bool) {
    let original_len = batch.len();
    let batch = match filter {
        Some(f) => batch.into_iter().filter(|e| !f.is_suppressed(e)).collect::<Vec<_>>(),
        None => batch,
    };
    if batch.is_empty() {
        if debug && original_len > 0 {
            tracing::debug!(suppressed = original_len, "batch fully filtered, not emitted");
        }
        return;
    }
    queue_tx.push(batch);
}
