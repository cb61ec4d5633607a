//! Flat union over loose files.

use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::archive::{Archive, ArchiveContext, BinaryArchive};
use crate::codec::FormatCodec;
use crate::decode::FileOption;
use crate::entry::{EntryStat, FileEntry};
use crate::fs::ReadHandle;
use crate::path;
use crate::{Result, VfsError};

/// Codec whose "table of contents" is a path list relative to the
/// container path. Sizes are stat'd on first access; paths naming a
/// container extension become nested containers.
#[derive(Debug, Clone, Default)]
pub struct ManyCodec {
    paths: Vec<String>,
}

impl ManyCodec {
    pub const NAME: &'static str = "many";

    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| path::normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

#[async_trait]
impl FormatCodec for ManyCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn uses_reader(&self) -> bool {
        false
    }

    async fn read(
        &self,
        archive: &BinaryArchive,
        _reader: Option<&mut dyn ReadHandle>,
    ) -> Result<Vec<FileEntry>> {
        let game = archive.game();
        let entries = self
            .paths
            .iter()
            .map(|relative| {
                let full = path::join(archive.path(), relative);
                let fs = Arc::clone(archive.fs());
                let entry = FileEntry::new(relative).with_lazy(Arc::new(move |_entry: &FileEntry| {
                    let stat = fs
                        .stat(&full)
                        .ok_or_else(|| VfsError::NotFound(full.clone()))?;
                    Ok(EntryStat {
                        file_size: stat.length,
                        packed_size: stat.length,
                        hash: None,
                    })
                }));
                if game.is_archive_path(relative) {
                    entry.with_flags(FileEntry::FLAG_NESTED)
                } else {
                    entry
                }
            })
            .collect();
        Ok(entries)
    }

    /// Container entries included: their bytes are the package file itself.
    async fn read_data(
        &self,
        archive: &BinaryArchive,
        _reader: Option<&mut dyn ReadHandle>,
        entry: &FileEntry,
        _option: FileOption,
    ) -> Result<Bytes> {
        let full = path::join(archive.path(), &entry.path);
        let mut reader = archive
            .get_reader(Some(&full), false)?
            .ok_or_else(|| VfsError::NotFound(full.clone()))?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Bytes::from(data))
    }

    /// Loose container files are opened in place with the game's codec.
    async fn open_nested(
        &self,
        archive: &BinaryArchive,
        entry: &Arc<FileEntry>,
    ) -> Result<Arc<BinaryArchive>> {
        let full = path::join(archive.path(), &entry.path);
        BinaryArchive::for_game(archive.context().clone(), full)
    }
}

impl BinaryArchive {
    /// Flat union over `paths`, relative to the directory `root`.
    pub fn many<I, S>(ctx: ArchiveContext, root: impl AsRef<str>, paths: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(ctx, root, Arc::new(ManyCodec::new(paths)))
    }
}
