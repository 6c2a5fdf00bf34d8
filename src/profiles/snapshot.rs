//! # Read-only view of an input path.
//!
//! A [`Snapshot`] fixes the set of entry names visible at the input (sorted, so rule
//! evaluation never depends on directory iteration order). File contents are read
//! lazily, at most once per entry, the first time a content predicate asks for them,
//! and only up to [`MAX_CONTENT_BYTES`]; predicates match against that prefix.
//!
//! - directory input → its direct children (files and directories)
//! - file input      → exactly that file

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::error::RuntimeError;

/// Upper bound on the bytes read from one entry for content predicates.
pub const MAX_CONTENT_BYTES: usize = 1 << 20;

#[derive(Debug)]
struct Entry {
    contents: OnceLock<Option<Arc<[u8]>>>,
}

/// Immutable listing of the entries at an input path.
#[derive(Debug)]
pub struct Snapshot {
    root: Option<PathBuf>,
    is_dir: bool,
    entries: BTreeMap<String, Entry>,
}

impl Snapshot {
    /// Lists the input at `path`.
    pub fn capture(path: &Path) -> Result<Self, RuntimeError> {
        let unavailable = |e: std::io::Error| RuntimeError::InputUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let meta = std::fs::metadata(path).map_err(unavailable)?;
        let mut entries = BTreeMap::new();

        if meta.is_dir() {
            for item in std::fs::read_dir(path).map_err(unavailable)? {
                let item = item.map_err(unavailable)?;
                entries.insert(
                    item.file_name().to_string_lossy().into_owned(),
                    Entry {
                        contents: OnceLock::new(),
                    },
                );
            }
            Ok(Self {
                root: Some(path.to_path_buf()),
                is_dir: true,
                entries,
            })
        } else {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.insert(
                name,
                Entry {
                    contents: OnceLock::new(),
                },
            );
            Ok(Self {
                root: path.parent().map(Path::to_path_buf),
                is_dir: false,
                entries,
            })
        }
    }

    /// Builds an in-memory snapshot of a directory from `(name, contents)` pairs.
    pub fn from_entries<I, N, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: AsRef<[u8]>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, contents)| {
                let cell = OnceLock::new();
                let _ = cell.set(Some(Arc::from(contents.as_ref())));
                (name.into(), Entry { contents: cell })
            })
            .collect();
        Self {
            root: None,
            is_dir: true,
            entries,
        }
    }

    /// True if the input is a directory.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Contents of `name`, read on first access and truncated to [`MAX_CONTENT_BYTES`].
    ///
    /// `None` if the entry is unknown or cannot be read as a file (e.g. a directory).
    pub fn contents(&self, name: &str) -> Option<Arc<[u8]>> {
        let entry = self.entries.get(name)?;
        entry
            .contents
            .get_or_init(|| {
                let root = self.root.as_ref()?;
                read_prefix(&root.join(name), MAX_CONTENT_BYTES)
                    .ok()
                    .map(Arc::from)
            })
            .clone()
    }
}

fn read_prefix(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::new();
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}
