//! Path registry (part of component E): tracks which paths are watched and
//! under what flags. Owned exclusively by the producer thread; other
//! threads only ever reach it through commands the producer applies
//! between debouncer ticks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::backend::BackendToken;

/// Per-path watch flags plus whatever the backend needs to tear the watch
/// back down again.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    pub recursive: bool,
    pub ignore_permission_errors: bool,
    pub backend_token: BackendToken,
}

/// `Path -> WatchHandle`. Keys are unique; registering an already-watched
/// path is idempotent and just refreshes its flags.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    handles: HashMap<PathBuf, WatchHandle>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a path's handle, returning the handle it
    /// displaced, if any (the backend registration tied to a displaced
    /// handle should already have been torn down by the caller).
    pub fn insert(&mut self, path: PathBuf, handle: WatchHandle) -> Option<WatchHandle> {
        self.handles.insert(path, handle)
    }

    pub fn remove(&mut self, path: &Path) -> Option<WatchHandle> {
        self.handles.remove(path)
    }

    pub fn get(&self, path: &Path) -> Option<&WatchHandle> {
        self.handles.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.handles.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.handles.keys().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
