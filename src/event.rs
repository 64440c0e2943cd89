//! Typed event model (component A).
//!
//! Every variant carries one or two paths plus kind-specific attributes.
//! Equality is attribute-wise; destructuring follows the declaration order
//! below.

use std::path::PathBuf;

/// What kind of filesystem object an event's path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    File,
    Dir,
    Other,
    Unknown,
}

/// Refinement of a data-modifying event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Content,
    Size,
    Other,
}

/// Refinement of a metadata-modifying event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataType {
    Permissions,
    Ownership,
    Timestamp,
    AccessTime,
    WriteTime,
    Other,
}

/// Refinement of an access event: what kind of access occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    Read,
    Open,
    Close,
    Other,
}

/// Refinement of an access event: which mode the access used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
    Other,
}

/// A single, high-level filesystem change, already debounced and filtered.
///
/// Two events are equal iff every attribute is equal. Positional
/// destructuring (`let Event::Create(path, object) = ev`) follows the
/// attribute order declared here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event {
    Create(PathBuf, ObjectKind),
    Delete(PathBuf, ObjectKind),
    Rename(PathBuf, PathBuf),
    ModifyData(PathBuf, DataType),
    ModifyMetadata(PathBuf, MetadataType),
    ModifyOther(PathBuf),
    ModifyUnknown(PathBuf),
    Access(PathBuf, AccessType, AccessMode),
}

impl Event {
    /// The primary path this event concerns. For `Rename`, this is the
    /// destination (`new_path`); callers that need `old_path` should match
    /// on the variant directly.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Event::Create(p, _)
            | Event::Delete(p, _)
            | Event::ModifyData(p, _)
            | Event::ModifyMetadata(p, _)
            | Event::ModifyOther(p)
            | Event::ModifyUnknown(p)
            | Event::Access(p, _, _) => p,
            Event::Rename(_, new_path) => new_path,
        }
    }

    /// Both paths a `Rename` carries; `None` for every other variant.
    pub fn rename_paths(&self) -> Option<(&std::path::Path, &std::path::Path)> {
        match self {
            Event::Rename(old, new) => Some((old, new)),
            _ => None,
        }
    }
}

/// A non-empty, ordered sequence of events flushed together by one
/// debouncer tick. Batches carry no timestamp: the member events are the
/// only payload.
pub type Batch = Vec<Event>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_attribute_wise() {
        let a = Event::Create(PathBuf::from("/w/a.txt"), ObjectKind::File);
        let b = Event::Create(PathBuf::from("/w/a.txt"), ObjectKind::File);
        let c = Event::Create(PathBuf::from("/w/a.txt"), ObjectKind::Dir);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn rename_destructures_positionally() {
        let ev = Event::Rename(PathBuf::from("/w/old"), PathBuf::from("/w/new"));
        let Event::Rename(old, new) = &ev else {
            panic!("expected rename");
        };
        assert_eq!(old, std::path::Path::new("/w/old"));
        assert_eq!(new, std::path::Path::new("/w/new"));
    }

    #[test]
    fn path_returns_new_path_for_rename() {
        let ev = Event::Rename(PathBuf::from("/w/old"), PathBuf::from("/w/new"));
        assert_eq!(ev.path(), std::path::Path::new("/w/new"));
    }
}
