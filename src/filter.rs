//! Filter engine (component D): suppresses events by directory name,
//! filename pattern, or path prefix.
//!
//! Three ordered rules (directory name, filename pattern, path prefix)
//! decide suppression. Extension is by data (supplying different sets),
//! not by subclassing: [`Filter`] is a plain value plus a pure decision
//! function.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use regex::Regex;

/// A suppression rule set evaluated against an event's path(s).
///
/// Three ordered checks are applied; a match on *any* of them suppresses the
/// event. `Rename` events are suppressed only when *both* `old_path` and
/// `new_path` match.
#[derive(Debug, Clone)]
pub struct Filter {
    ignore_dirs: HashSet<String>,
    ignore_patterns: Vec<Regex>,
    ignore_paths: Vec<PathBuf>,
}

impl Default for Filter {
    fn default() -> Self {
        Filter::builder().build()
    }
}

impl Filter {
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// `true` if `event` must be suppressed.
    pub fn is_suppressed(&self, event: &crate::event::Event) -> bool {
        if let Some((old, new)) = event.rename_paths() {
            self.path_is_ignored(old) && self.path_is_ignored(new)
        } else {
            self.path_is_ignored(event.path())
        }
    }

    fn path_is_ignored(&self, path: &Path) -> bool {
        if path
            .components()
            .any(|c| matches!(c, Component::Normal(name) if self.ignore_dirs.contains(name.to_string_lossy().as_ref())))
        {
            return true;
        }

        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if self.ignore_patterns.iter().any(|re| re.is_match(name)) {
                return true;
            }
        }

        self.ignore_paths
            .iter()
            .any(|prefix| path_under(prefix, path))
    }
}

/// Component-wise prefix comparison: `path` lies under `prefix` iff every
/// component of `prefix` is a matching prefix of `path`'s components.
fn path_under(prefix: &Path, path: &Path) -> bool {
    let mut prefix_components = prefix.components();
    let mut path_components = path.components();
    loop {
        match prefix_components.next() {
            None => return true,
            Some(p) => match path_components.next() {
                Some(q) if p == q => continue,
                _ => return false,
            },
        }
    }
}

/// Builds a [`Filter`] from ignored directory names, basename patterns, and
/// path prefixes.
#[derive(Debug, Default)]
pub struct FilterBuilder {
    ignore_dirs: HashSet<String>,
    ignore_patterns: Vec<String>,
    ignore_paths: Vec<PathBuf>,
}

impl FilterBuilder {
    pub fn ignore_dir(mut self, name: impl Into<String>) -> Self {
        self.ignore_dirs.insert(name.into());
        self
    }

    pub fn ignore_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_dirs.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds a basename regex. Panics on an invalid pattern: these are meant
    /// to be compiled once at configuration time, the same way `EventFilter`
    /// compiles its patterns in `__init__`.
    pub fn ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    pub fn ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn ignore_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignore_paths.push(path.into());
        self
    }

    pub fn try_build(self) -> Result<Filter, regex::Error> {
        let ignore_patterns = self
            .ignore_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Filter {
            ignore_dirs: self.ignore_dirs,
            ignore_patterns,
            ignore_paths: self.ignore_paths,
        })
    }

    pub fn build(self) -> Filter {
        self.try_build().expect("ignore patterns must be valid regexes")
    }
}

/// Default filter covering transient caches and version-control metadata.
pub fn common_filter() -> Filter {
    Filter::builder()
        .ignore_dirs([
            "__pycache__",
            ".git",
            ".hg",
            ".svn",
            ".tox",
            ".venv",
            "site-packages",
            ".idea",
            "node_modules",
            ".mypy_cache",
            ".ruff_cache",
            ".pytest_cache",
            ".hypothesis",
        ])
        .ignore_patterns([
            r"\.py[cod]$",
            r"\.___jb_...___$",
            r"\.sw.$",
            "~$",
            r"^\.\#",
            r"^\.DS_Store$",
            r"^flycheck_",
        ])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, ObjectKind};

    #[test]
    fn ignores_exact_dir_component() {
        let filter = common_filter();
        let ev = Event::Create(PathBuf::from("/w/.git/HEAD"), ObjectKind::File);
        assert!(filter.is_suppressed(&ev));
    }

    #[test]
    fn does_not_ignore_substring_match() {
        let filter = common_filter();
        // `.git` must match a whole component, not a substring of one.
        let ev = Event::Create(PathBuf::from("/w/gitignore.txt"), ObjectKind::File);
        assert!(!filter.is_suppressed(&ev));
    }

    #[test]
    fn ignores_pyc_pattern() {
        let filter = common_filter();
        let ev = Event::Create(PathBuf::from("/w/foo.pyc"), ObjectKind::File);
        assert!(filter.is_suppressed(&ev));
    }

    #[test]
    fn keeps_unmatched_file() {
        let filter = common_filter();
        let ev = Event::Create(PathBuf::from("/w/app.py"), ObjectKind::File);
        assert!(!filter.is_suppressed(&ev));
    }

    #[test]
    fn rename_requires_both_paths_to_match() {
        let filter = Filter::builder().ignore_dir("build").build();
        let mixed = Event::Rename(PathBuf::from("/w/build/a"), PathBuf::from("/w/b"));
        assert!(!filter.is_suppressed(&mixed));

        let both = Event::Rename(PathBuf::from("/w/build/a"), PathBuf::from("/w/build/b"));
        assert!(filter.is_suppressed(&both));
    }

    #[test]
    fn path_prefix_is_component_wise() {
        let filter = Filter::builder().ignore_path("/w/cache").build();
        let under = Event::Create(PathBuf::from("/w/cache/x"), ObjectKind::File);
        assert!(filter.is_suppressed(&under));

        // `/w/cache2` is not actually under `/w/cache`.
        let sibling = Event::Create(PathBuf::from("/w/cache2/x"), ObjectKind::File);
        assert!(!filter.is_suppressed(&sibling));
    }

    #[test]
    fn empty_batch_after_filtering_is_suppressed_not_emitted() {
        // Exercised at the engine level; documented here as the contract
        // the filter's caller must uphold (open question resolved in
        // DESIGN.md: suppression, not an empty batch).
        let filter = common_filter();
        let batch = vec![Event::Create(PathBuf::from("/w/.git/x"), ObjectKind::File)];
        let kept: Vec<_> = batch
            .into_iter()
            .filter(|e| !filter.is_suppressed(e))
            .collect();
        assert!(kept.is_empty());
    }
}
