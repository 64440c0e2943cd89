//! `notify`-backed implementation of [`Backend`]: wraps either the
//! platform's recommended watcher or `notify`'s polling fallback, resolves
//! rename-cookie pairs into `Rename` events, and — when the target platform
//! is flagged as needing it — synthesizes recursive watching by walking the
//! tree and installing one watch per directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::{Backend, BackendConfig, BackendToken, RawEvent, WatchOptions};
use crate::error::{EngineError, Result};
use crate::event::{AccessMode, AccessType, DataType, Event, MetadataType, ObjectKind};

struct PendingRename {
    old_path: std::path::PathBuf,
    seen_at: Instant,
}

struct Shared {
    pending_renames: HashMap<usize, PendingRename>,
    rename_window: Duration,
    manual_recursive: bool,
    fault_since: Option<Instant>,
    fault_detail: Option<String>,
    /// Roots currently registered with the backend (one entry per `add`
    /// that registered at least one OS-level watch). A kernel overflow
    /// (`Event::need_rescan`) carries no path of its own on most backends,
    /// so this is what lets `ingest` attribute the resulting `ModifyUnknown`
    /// to "the affected watch root" per spec.
    roots: Vec<PathBuf>,
}

type DynWatcher = Box<dyn Watcher + Send>;

/// Backend adapter over the real `notify` crate.
pub struct NotifyBackend {
    watcher: Arc<Mutex<Option<DynWatcher>>>,
    shared: Arc<Mutex<Shared>>,
    rx: crossbeam_channel::Receiver<RawEvent>,
}

impl NotifyBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let watcher_slot: Arc<Mutex<Option<DynWatcher>>> = Arc::new(Mutex::new(None));
        let shared = Arc::new(Mutex::new(Shared {
            pending_renames: HashMap::new(),
            rename_window: config.rename_window,
            manual_recursive: cfg!(manual_recursive_watch) && !config.force_polling,
            fault_since: None,
            fault_detail: None,
            roots: Vec::new(),
        }));

        let handler_watcher = watcher_slot.clone();
        let handler_shared = shared.clone();
        let handler = move |res: notify::Result<notify::Event>| {
            handle_raw(res, &handler_shared, &handler_watcher, &tx);
        };

        let watcher: DynWatcher = if config.force_polling {
            let poll_config = notify::Config::default().with_poll_interval(config.poll_delay);
            Box::new(
                notify::PollWatcher::new(handler, poll_config)
                    .map_err(|e| EngineError::from_notify(Path::new("."), e))?,
            )
        } else {
            Box::new(
                notify::recommended_watcher(handler)
                    .map_err(|e| EngineError::from_notify(Path::new("."), e))?,
            )
        };
        *watcher_slot.lock() = Some(watcher);

        Ok(Self {
            watcher: watcher_slot,
            shared,
            rx,
        })
    }
}

impl Backend for NotifyBackend {
    fn add(&self, root: &Path, options: WatchOptions) -> Result<BackendToken> {
        let manual = options.recursive && self.shared.lock().manual_recursive;
        let mut watcher_guard = self.watcher.lock();
        let watcher = watcher_guard
            .as_mut()
            .expect("watcher is set for the lifetime of the backend");

        if !manual {
            let mode = if options.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            let watched_paths = match watcher.watch(root, mode) {
                Ok(()) => vec![root.to_path_buf()],
                // A native recursive watcher can't exclude a single
                // subtree the way the manual walk below does: honoring
                // `ignore_permission_errors` here means suppressing the
                // whole root rather than surfacing it.
                Err(e) if options.ignore_permission_errors && is_notify_permission_error(&e) => {
                    Vec::new()
                }
                Err(e) => return Err(EngineError::from_notify(root, e)),
            };
            if !watched_paths.is_empty() {
                self.shared.lock().roots.push(root.to_path_buf());
            }
            return Ok(BackendToken {
                watched_paths,
                root: root.to_path_buf(),
            });
        }

        let mut watched = Vec::new();
        for entry in walkdir::WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if options.ignore_permission_errors && is_walk_permission_error(&err) => {
                    continue;
                }
                Err(err) => {
                    return Err(EngineError::PermissionDenied(
                        err.path().unwrap_or(root).to_path_buf(),
                    ));
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            match watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
                Ok(()) => watched.push(entry.path().to_path_buf()),
                Err(e) if options.ignore_permission_errors && is_notify_permission_error(&e) => {}
                Err(e) => return Err(EngineError::from_notify(entry.path(), e)),
            }
        }
        if !watched.is_empty() {
            self.shared.lock().roots.push(root.to_path_buf());
        }
        Ok(BackendToken {
            watched_paths: watched,
            root: root.to_path_buf(),
        })
    }

    fn remove(&self, token: &BackendToken) {
        let mut watcher_guard = self.watcher.lock();
        if let Some(watcher) = watcher_guard.as_mut() {
            for path in &token.watched_paths {
                let _ = watcher.unwatch(path);
            }
        }
        drop(watcher_guard);
        self.shared.lock().roots.retain(|r| r != &token.root);
    }

    fn events(&self) -> crossbeam_channel::Receiver<RawEvent> {
        self.rx.clone()
    }

    fn last_fault(&self) -> Option<(Instant, String)> {
        let guard = self.shared.lock();
        match (guard.fault_since, &guard.fault_detail) {
            (Some(since), Some(detail)) => Some((since, detail.clone())),
            _ => None,
        }
    }

    fn shutdown(&self) {
        *self.watcher.lock() = None;
    }
}

fn is_walk_permission_error(err: &walkdir::Error) -> bool {
    err.io_error()
        .map(|e| e.kind() == std::io::ErrorKind::PermissionDenied)
        .unwrap_or(false)
}

fn is_notify_permission_error(err: &notify::Error) -> bool {
    matches!(&err.kind, notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied)
}

fn handle_raw(
    res: notify::Result<notify::Event>,
    shared: &Arc<Mutex<Shared>>,
    watcher: &Arc<Mutex<Option<DynWatcher>>>,
    tx: &crossbeam_channel::Sender<RawEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(err) => {
            tracing::warn!(error = %err, "backend reported an error");
            let mut guard = shared.lock();
            if guard.fault_since.is_none() {
                guard.fault_since = Some(Instant::now());
            }
            guard.fault_detail = Some(err.to_string());
            return;
        }
    };

    // Install the watch on a freshly created subdirectory before the event
    // that announced it propagates any further.
    maybe_watch_new_dir(&event, shared, watcher);

    let mut guard = shared.lock();
    guard.fault_since = None;
    guard.fault_detail = None;
    ingest(event, &mut guard, Instant::now(), tx);
}

fn maybe_watch_new_dir(
    event: &notify::Event,
    shared: &Arc<Mutex<Shared>>,
    watcher: &Arc<Mutex<Option<DynWatcher>>>,
) {
    if !shared.lock().manual_recursive {
        return;
    }
    if !matches!(
        event.kind,
        EventKind::Create(CreateKind::Folder) | EventKind::Create(CreateKind::Any)
    ) {
        return;
    }
    let Some(path) = event.paths.first() else {
        return;
    };
    if !path.is_dir() {
        return;
    }
    if let Some(w) = watcher.lock().as_mut() {
        let _ = w.watch(path, RecursiveMode::NonRecursive);
    }
}

fn ingest(
    event: notify::Event,
    shared: &mut Shared,
    now: Instant,
    tx: &crossbeam_channel::Sender<RawEvent>,
) {
    reap_stale_renames(shared, now, tx);

    // A kernel buffer overflow surfaces as `need_rescan()`, typically with
    // no paths of its own (the kernel lost track of what changed). Emit a
    // `ModifyUnknown` per affected root rather than falling through to the
    // generic kind match below, which would silently drop a pathless event.
    if event.need_rescan() {
        let affected: Vec<PathBuf> = if event.paths.is_empty() {
            shared.roots.clone()
        } else {
            event.paths.clone()
        };
        for root in affected {
            send(tx, Event::ModifyUnknown(root), now);
        }
        return;
    }

    let cookie = event.attrs.tracker();
    let paths = &event.paths;

    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            send(tx, Event::Rename(paths[0].clone(), paths[1].clone()), now);
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => match (cookie, paths.first()) {
            (Some(cookie), Some(path)) => {
                shared.pending_renames.insert(
                    cookie,
                    PendingRename {
                        old_path: path.clone(),
                        seen_at: now,
                    },
                );
            }
            (None, Some(path)) => send(tx, Event::Delete(path.clone(), ObjectKind::Unknown), now),
            _ => {}
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            let paired = cookie.and_then(|c| shared.pending_renames.remove(&c));
            match (paired, paths.first()) {
                (Some(pending), Some(new_path)) => {
                    send(tx, Event::Rename(pending.old_path, new_path.clone()), now);
                }
                (None, Some(new_path)) => {
                    send(tx, Event::Create(new_path.clone(), ObjectKind::Unknown), now);
                }
                _ => {}
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Other)) => {
            if let Some(path) = paths.first() {
                send(tx, Event::ModifyOther(path.clone()), now);
            }
        }
        EventKind::Create(kind) => {
            if let Some(path) = paths.first() {
                send(tx, Event::Create(path.clone(), object_kind_of_create(*kind)), now);
            }
        }
        EventKind::Remove(kind) => {
            if let Some(path) = paths.first() {
                send(tx, Event::Delete(path.clone(), object_kind_of_remove(*kind)), now);
            }
        }
        EventKind::Modify(ModifyKind::Data(data_kind)) => {
            if let Some(path) = paths.first() {
                send(tx, Event::ModifyData(path.clone(), data_type_of(*data_kind)), now);
            }
        }
        EventKind::Modify(ModifyKind::Metadata(meta_kind)) => {
            if let Some(path) = paths.first() {
                send(
                    tx,
                    Event::ModifyMetadata(path.clone(), metadata_type_of(*meta_kind)),
                    now,
                );
            }
        }
        EventKind::Modify(ModifyKind::Any | ModifyKind::Other) => {
            if let Some(path) = paths.first() {
                send(tx, Event::ModifyOther(path.clone()), now);
            }
        }
        EventKind::Access(access_kind) => {
            if let Some(path) = paths.first() {
                let (access_type, access_mode) = access_of(*access_kind);
                send(tx, Event::Access(path.clone(), access_type, access_mode), now);
            }
        }
        EventKind::Other => {
            if let Some(path) = paths.first() {
                send(tx, Event::ModifyOther(path.clone()), now);
            }
        }
        EventKind::Any => {
            if let Some(path) = paths.first() {
                send(tx, Event::ModifyUnknown(path.clone()), now);
            }
        }
    }
}

/// Unpaired rename halves older than the rename window are forwarded as a
/// bare `Delete`: the corresponding `To` never arrived under this root.
fn reap_stale_renames(shared: &mut Shared, now: Instant, tx: &crossbeam_channel::Sender<RawEvent>) {
    let window = shared.rename_window;
    let stale: Vec<usize> = shared
        .pending_renames
        .iter()
        .filter(|(_, pending)| now.saturating_duration_since(pending.seen_at) > window)
        .map(|(cookie, _)| *cookie)
        .collect();
    for cookie in stale {
        if let Some(pending) = shared.pending_renames.remove(&cookie) {
            send(tx, Event::Delete(pending.old_path, ObjectKind::Unknown), now);
        }
    }
}

fn send(tx: &crossbeam_channel::Sender<RawEvent>, event: Event, now: Instant) {
    let _ = tx.send(RawEvent {
        event,
        observed_at: now,
    });
}

fn object_kind_of_create(kind: CreateKind) -> ObjectKind {
    match kind {
        CreateKind::File => ObjectKind::File,
        CreateKind::Folder => ObjectKind::Dir,
        CreateKind::Other => ObjectKind::Other,
        CreateKind::Any => ObjectKind::Unknown,
    }
}

fn object_kind_of_remove(kind: RemoveKind) -> ObjectKind {
    match kind {
        RemoveKind::File => ObjectKind::File,
        RemoveKind::Folder => ObjectKind::Dir,
        RemoveKind::Other => ObjectKind::Other,
        RemoveKind::Any => ObjectKind::Unknown,
    }
}

fn data_type_of(kind: notify::event::DataChange) -> DataType {
    use notify::event::DataChange;
    match kind {
        DataChange::Content => DataType::Content,
        DataChange::Size => DataType::Size,
        DataChange::Any | DataChange::Other => DataType::Other,
    }
}

fn metadata_type_of(kind: notify::event::MetadataKind) -> MetadataType {
    use notify::event::MetadataKind;
    match kind {
        MetadataKind::Permissions => MetadataType::Permissions,
        MetadataKind::Ownership => MetadataType::Ownership,
        MetadataKind::AccessTime => MetadataType::AccessTime,
        MetadataKind::WriteTime => MetadataType::WriteTime,
        MetadataKind::Any => MetadataType::Timestamp,
        MetadataKind::Extended | MetadataKind::Other => MetadataType::Other,
    }
}

fn access_of(kind: notify::event::AccessKind) -> (AccessType, AccessMode) {
    use notify::event::AccessKind;
    match kind {
        AccessKind::Read => (AccessType::Read, AccessMode::Read),
        AccessKind::Open(mode) => (AccessType::Open, access_mode_of(mode)),
        AccessKind::Close(mode) => (AccessType::Close, access_mode_of(mode)),
        AccessKind::Any | AccessKind::Other => (AccessType::Other, AccessMode::Other),
    }
}

fn access_mode_of(mode: notify::event::AccessMode) -> AccessMode {
    use notify::event::AccessMode as NotifyAccessMode;
    match mode {
        NotifyAccessMode::Read => AccessMode::Read,
        NotifyAccessMode::Write => AccessMode::Write,
        NotifyAccessMode::Execute => AccessMode::Execute,
        NotifyAccessMode::Any | NotifyAccessMode::Other => AccessMode::Other,
    }
}
