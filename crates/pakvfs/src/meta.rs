//! Folder/file projection of a container for browsing.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::Result;
use crate::archive::{Archive, BinaryArchive};
use crate::entry::FileEntry;
use crate::path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKind {
    Folder,
    File,
    /// Container-valued entry, expanded in place
    Archive,
}

/// One node of the browse tree.
#[derive(Debug, Clone)]
pub struct MetaItem {
    pub name: String,
    /// Entry path for files and containers, folder path for folders
    pub path: String,
    pub kind: MetaKind,
    /// Uncompressed size; zero for folders
    pub size: u64,
    pub children: Vec<MetaItem>,
    /// Entry backing a file or container node
    pub source: Option<Arc<FileEntry>>,
}

impl PartialEq for MetaItem {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.path == other.path
            && self.kind == other.kind
            && self.size == other.size
            && self.children == other.children
    }
}

impl MetaItem {
    pub fn folder(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: MetaKind::Folder,
            size: 0,
            children: Vec::new(),
            source: None,
        }
    }

    fn from_entry(entry: &Arc<FileEntry>, kind: MetaKind, children: Vec<Self>) -> Self {
        Self {
            name: path::file_name(&entry.path).to_string(),
            path: entry.path.clone(),
            kind,
            size: entry.file_size(),
            children,
            source: Some(Arc::clone(entry)),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == MetaKind::Folder
    }

    /// Total number of file nodes below and including this one.
    pub fn file_count(&self) -> usize {
        let own = usize::from(self.kind == MetaKind::File);
        own + self.children.iter().map(Self::file_count).sum::<usize>()
    }
}

fn folder_children<'a>(level: &'a mut Vec<MetaItem>, name: &str, path: &str) -> &'a mut Vec<MetaItem> {
    let pos = level
        .iter()
        .position(|item| item.is_folder() && item.name == name)
        .unwrap_or_else(|| {
            level.push(MetaItem::folder(name, path));
            level.len() - 1
        });
    &mut level[pos].children
}

/// Fold the container's entries into nested folder nodes.
///
/// Entries are visited in path order. The first `path_skip` characters of
/// each path are dropped and entries left empty are omitted. Container
/// entries are opened and their trees attached under a single node.
pub fn build_tree(archive: &BinaryArchive) -> BoxFuture<'_, Result<Vec<MetaItem>>> {
    Box::pin(async move {
        let skip = archive.options().path_skip;
        let game = archive.game();
        let mut root: Vec<MetaItem> = Vec::new();

        for entry in archive.entries()? {
            // Skip counts characters, not bytes
            let Some((start, _)) = entry.path.char_indices().nth(skip) else {
                continue;
            };
            let relative = &entry.path[start..];
            let relative = path::normalize(relative);
            if relative.is_empty() {
                continue;
            }

            let item = if game.is_archive_path(&entry.path) || entry.has_flag(FileEntry::FLAG_NESTED) {
                let nested = archive.nested(&entry).await?;
                MetaItem::from_entry(&entry, MetaKind::Archive, build_tree(&nested).await?)
            } else {
                MetaItem::from_entry(&entry, MetaKind::File, Vec::new())
            };

            let parts: Vec<&str> = relative.split('/').collect();
            let folders = parts.len().saturating_sub(1);
            let mut level = &mut root;
            for depth in 0..folders {
                level = folder_children(level, parts[depth], &parts[..=depth].join("/"));
            }
            level.push(item);
        }

        Ok(root)
    })
}
