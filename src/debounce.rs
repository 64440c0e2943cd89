//! Debouncer (component C): coalesces a stream of [`Event`]s into
//! deduplicated, ordered [`Batch`]es flushed on a tick.
//!
//! The pending map is keyed by the path an event's subject currently lives
//! at ("identity"), not by `(kind, path)` pairs: this is what lets a
//! `Create` absorb a following `Modify*` and lets chained renames collapse,
//! while still tracking first-observation order the way `IndexMap::insert`
//! leaves an existing key's position untouched on update.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::event::{Batch, Event};

struct Pending {
    event: Event,
    last_seen: Instant,
}

/// Coalescing window parameters. `tick_ms` must not exceed `debounce_ms`:
/// the producer cannot notice a flush-ready entry less often than it wakes.
#[derive(Debug, Clone, Copy)]
pub struct DebounceConfig {
    pub debounce: Duration,
    pub tick: Duration,
}

impl DebounceConfig {
    pub fn new(debounce: Duration, tick: Duration) -> Self {
        assert!(
            tick <= debounce || debounce.is_zero(),
            "tick_ms must be <= debounce_ms"
        );
        Self { debounce, tick }
    }
}

pub struct Debouncer {
    window: Duration,
    pending: IndexMap<PathBuf, Pending>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            window: config.debounce,
            pending: IndexMap::new(),
        }
    }

    /// Feeds one already rename-resolved event into the coalescer.
    ///
    /// Returns `Some(batch)` if the event was a backend overflow sentinel,
    /// which must be flushed alone and immediately rather than waiting for
    /// the next tick.
    pub fn push(&mut self, event: Event, now: Instant) -> Option<Batch> {
        if let Event::ModifyUnknown(root) = &event {
            let root = root.clone();
            self.pending.retain(|path, _| !path_under(&root, path));
            return Some(vec![Event::ModifyUnknown(root)]);
        }

        if let Event::Rename(old, new) = &event {
            let chains = matches!(
                self.pending.get(old),
                Some(p) if matches!(p.event, Event::Rename(_, _))
            );
            if chains {
                let (slot, _, existing) =
                    self.pending.shift_remove_full(old).expect("just checked present");
                let Event::Rename(origin, _) = existing.event else {
                    unreachable!("checked above");
                };
                if origin == *new {
                    // a -> b -> a collapses to nothing.
                    return None;
                }
                self.pending.insert(
                    new.clone(),
                    Pending {
                        event: Event::Rename(origin, new.clone()),
                        last_seen: now,
                    },
                );
                // `insert` under the new key always appends at the back;
                // move it back to the slot the chain first occupied so
                // collapsing a rename never reorders it within the batch.
                let appended_at = self.pending.len() - 1;
                self.pending.move_index(appended_at, slot);
                return None;
            }
        }

        let identity = event.path().to_path_buf();

        if let Some(existing) = self.pending.get(&identity) {
            match coalesce(&existing.event, &event) {
                Coalesced::Annihilate => {
                    self.pending.shift_remove(&identity);
                }
                Coalesced::Keep(resulting) => {
                    // `insert` on an existing key updates the value in
                    // place without moving its position.
                    self.pending.insert(
                        identity,
                        Pending {
                            event: resulting,
                            last_seen: now,
                        },
                    );
                }
            }
        } else {
            self.pending.insert(identity, Pending { event, last_seen: now });
        }

        None
    }

    /// Drains every entry whose deadline has passed, in insertion order.
    /// Returns `None` if nothing was ready.
    pub fn tick(&mut self, now: Instant) -> Option<Batch> {
        let mut ready = Vec::new();
        self.pending.retain(|_, pending| {
            if now.saturating_duration_since(pending.last_seen) >= self.window {
                ready.push(pending.event.clone());
                false
            } else {
                true
            }
        });

        if ready.is_empty() {
            None
        } else {
            Some(ready)
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

enum Coalesced {
    Keep(Event),
    Annihilate,
}

fn coalesce(existing: &Event, incoming: &Event) -> Coalesced {
    use Event::*;
    match (existing, incoming) {
        (Create(path, kind), Delete(_, _)) => {
            let _ = (path, kind);
            Coalesced::Annihilate
        }
        (Create(path, kind), ModifyData(_, _) | ModifyMetadata(_, _)) => {
            Coalesced::Keep(Create(path.clone(), *kind))
        }
        (ModifyData(path, _), ModifyData(_, data_type)) => {
            Coalesced::Keep(ModifyData(path.clone(), *data_type))
        }
        (ModifyMetadata(path, _), ModifyMetadata(_, metadata_type)) => {
            Coalesced::Keep(ModifyMetadata(path.clone(), *metadata_type))
        }
        _ => Coalesced::Keep(incoming.clone()),
    }
}

fn path_under(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ObjectKind;
    use std::time::Duration;

    fn cfg(debounce_ms: u64, tick_ms: u64) -> DebounceConfig {
        DebounceConfig::new(Duration::from_millis(debounce_ms), Duration::from_millis(tick_ms))
    }

    #[test]
    fn emits_after_window_in_insertion_order() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(Event::Create(PathBuf::from("/w/b"), ObjectKind::File), t0);
        d.push(Event::Create(PathBuf::from("/w/a"), ObjectKind::File), t0);

        assert!(d.tick(t0 + Duration::from_millis(50)).is_none());

        let batch = d.tick(t0 + Duration::from_millis(150)).unwrap();
        assert_eq!(
            batch,
            vec![
                Event::Create(PathBuf::from("/w/b"), ObjectKind::File),
                Event::Create(PathBuf::from("/w/a"), ObjectKind::File),
            ]
        );
    }

    #[test]
    fn create_then_delete_is_net_no_op() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(Event::Create(PathBuf::from("/w/a"), ObjectKind::File), t0);
        d.push(Event::Delete(PathBuf::from("/w/a"), ObjectKind::File), t0);
        assert_eq!(d.pending_len(), 0);
        assert!(d.tick(t0 + Duration::from_millis(200)).is_none());
    }

    #[test]
    fn create_then_modify_keeps_create_only() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(Event::Create(PathBuf::from("/w/a"), ObjectKind::File), t0);
        d.push(
            Event::ModifyData(PathBuf::from("/w/a"), crate::event::DataType::Content),
            t0,
        );
        let batch = d.tick(t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(batch, vec![Event::Create(PathBuf::from("/w/a"), ObjectKind::File)]);
    }

    #[test]
    fn repeated_modify_data_merges_to_latest_type() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(
            Event::ModifyData(PathBuf::from("/w/a"), crate::event::DataType::Size),
            t0,
        );
        d.push(
            Event::ModifyData(PathBuf::from("/w/a"), crate::event::DataType::Content),
            t0 + Duration::from_millis(10),
        );
        assert_eq!(d.pending_len(), 1);
        let batch = d.tick(t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(
            batch,
            vec![Event::ModifyData(
                PathBuf::from("/w/a"),
                crate::event::DataType::Content
            )]
        );
    }

    #[test]
    fn chained_rename_collapses() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(Event::Rename(PathBuf::from("/w/a"), PathBuf::from("/w/b")), t0);
        d.push(Event::Rename(PathBuf::from("/w/b"), PathBuf::from("/w/c")), t0);
        let batch = d.tick(t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(batch, vec![Event::Rename(PathBuf::from("/w/a"), PathBuf::from("/w/c"))]);
    }

    #[test]
    fn chained_rename_preserves_original_slot() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(Event::Rename(PathBuf::from("/w/a"), PathBuf::from("/w/b")), t0);
        d.push(Event::Create(PathBuf::from("/w/y"), ObjectKind::File), t0);
        d.push(
            Event::Rename(PathBuf::from("/w/b"), PathBuf::from("/w/c")),
            t0 + Duration::from_millis(5),
        );
        let batch = d.tick(t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(
            batch,
            vec![
                Event::Rename(PathBuf::from("/w/a"), PathBuf::from("/w/c")),
                Event::Create(PathBuf::from("/w/y"), ObjectKind::File),
            ]
        );
    }

    #[test]
    fn rename_round_trip_drops_entirely() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(Event::Rename(PathBuf::from("/w/a"), PathBuf::from("/w/b")), t0);
        d.push(Event::Rename(PathBuf::from("/w/b"), PathBuf::from("/w/a")), t0);
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn reobservation_does_not_reorder() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(Event::Create(PathBuf::from("/w/a"), ObjectKind::File), t0);
        d.push(Event::Create(PathBuf::from("/w/b"), ObjectKind::File), t0);
        // re-touch `a`: must stay first in the batch.
        d.push(
            Event::ModifyData(PathBuf::from("/w/a"), crate::event::DataType::Content),
            t0 + Duration::from_millis(5),
        );
        let batch = d.tick(t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(batch[0].path(), Path::new("/w/a"));
        assert_eq!(batch[1].path(), Path::new("/w/b"));
    }

    #[test]
    fn overflow_invalidates_root_and_flushes_alone() {
        let mut d = Debouncer::new(cfg(100, 10));
        let t0 = Instant::now();
        d.push(Event::Create(PathBuf::from("/w/a"), ObjectKind::File), t0);
        d.push(Event::Create(PathBuf::from("/w/sub/b"), ObjectKind::File), t0);

        let overflow = d.push(Event::ModifyUnknown(PathBuf::from("/w")), t0).unwrap();
        assert_eq!(overflow, vec![Event::ModifyUnknown(PathBuf::from("/w"))]);
        assert_eq!(d.pending_len(), 0);
    }
}
