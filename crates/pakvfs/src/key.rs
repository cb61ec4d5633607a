//! Lookup keys accepted by every container accessor.

use std::fmt;
use std::sync::Arc;

use crate::entry::FileEntry;

/// What to look up: a path, a numeric id, or an entry already in hand.
#[derive(Clone)]
pub enum Key {
    /// Relative path, possibly with nesting (`"outer.pak:inner/x"`)
    Path(String),
    /// Format-defined numeric id; requires the id index
    Id(i64),
    /// An entry previously obtained from a container
    Entry(Arc<FileEntry>),
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Self::Entry(entry) => f.debug_tuple("Entry").field(&entry.path).finish(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.write_str(path),
            Self::Id(id) => write!(f, "#{id}"),
            Self::Entry(entry) => f.write_str(&entry.path),
        }
    }
}

impl From<&str> for Key {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for Key {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

impl From<&String> for Key {
    fn from(path: &String) -> Self {
        Self::Path(path.clone())
    }
}

impl From<i64> for Key {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<i32> for Key {
    fn from(id: i32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl From<u32> for Key {
    fn from(id: u32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl From<Arc<FileEntry>> for Key {
    fn from(entry: Arc<FileEntry>) -> Self {
        Self::Entry(entry)
    }
}

impl From<&Arc<FileEntry>> for Key {
    fn from(entry: &Arc<FileEntry>) -> Self {
        Self::Entry(Arc::clone(entry))
    }
}
