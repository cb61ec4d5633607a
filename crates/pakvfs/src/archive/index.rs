//! Entry index built once per open.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::entry::FileEntry;
use crate::path;
use crate::{Result, VfsError};

/// Path and id lookup over an archive's entries. Immutable once built.
#[derive(Debug, Default)]
pub struct EntryIndex {
    entries: Vec<Arc<FileEntry>>,
    by_path: HashMap<String, Vec<usize>>,
    by_id: Option<HashMap<i64, Vec<usize>>>,
}

impl EntryIndex {
    /// Index `entries`. The id map is built only when `use_file_id` is set.
    pub fn build(entries: Vec<Arc<FileEntry>>, use_file_id: bool) -> Self {
        let mut by_path: HashMap<String, Vec<usize>> = HashMap::with_capacity(entries.len());
        let mut by_id: Option<HashMap<i64, Vec<usize>>> = use_file_id.then(HashMap::new);

        for (i, entry) in entries.iter().enumerate() {
            let slot = by_path.entry(path::lookup_key(&entry.path)).or_default();
            slot.push(i);
            if slot.len() == 2 {
                warn!("Duplicate path in index: {}", entry.path);
            }

            if let (Some(ids), Some(id)) = (by_id.as_mut(), entry.id) {
                let slot = ids.entry(id).or_default();
                slot.push(i);
                if slot.len() == 2 {
                    warn!("Duplicate id in index: {id}");
                }
            }
        }

        debug!(
            "Indexed {} entries ({} paths, id index: {})",
            entries.len(),
            by_path.len(),
            by_id.is_some()
        );

        Self {
            entries,
            by_path,
            by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in table-of-contents order.
    pub fn entries(&self) -> &[Arc<FileEntry>] {
        &self.entries
    }

    pub const fn has_id_index(&self) -> bool {
        self.by_id.is_some()
    }

    /// The single entry stored under `path`.
    pub fn resolve_path(&self, path: &str) -> Result<&Arc<FileEntry>> {
        let slots = self
            .by_path
            .get(&path::lookup_key(path))
            .map(Vec::as_slice)
            .unwrap_or_default();
        self.single(path.to_string(), slots)
    }

    /// The single entry carrying `id`. Fails with
    /// [`VfsError::InvalidConfiguration`] when the id index was not built.
    pub fn resolve_id(&self, id: i64) -> Result<&Arc<FileEntry>> {
        let ids = self.by_id.as_ref().ok_or_else(|| {
            VfsError::InvalidConfiguration(format!(
                "lookup by id #{id} requires an archive opened with use_file_id"
            ))
        })?;
        let slots = ids.get(&id).map(Vec::as_slice).unwrap_or_default();
        self.single(format!("#{id}"), slots)
    }

    fn single(&self, key: String, slots: &[usize]) -> Result<&Arc<FileEntry>> {
        match slots {
            [] => Err(VfsError::NotFound(key)),
            [i] => self
                .entries
                .get(*i)
                .ok_or(VfsError::NotFound(key)),
            many => Err(VfsError::Ambiguous {
                key,
                count: many.len(),
            }),
        }
    }

    /// Whether `entry` is this very entry object.
    pub fn owns(&self, entry: &Arc<FileEntry>) -> bool {
        self.resolve_path(&entry.path)
            .map(|found| Arc::ptr_eq(found, entry))
            .unwrap_or_else(|_| self.entries.iter().any(|e| Arc::ptr_eq(e, entry)))
    }
}
