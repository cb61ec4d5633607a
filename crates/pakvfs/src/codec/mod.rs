//! Per-format codec contract and the registry that selects codecs by name.
//!
//! A [`FormatCodec`] knows one package layout: how to turn its table of
//! contents into [`FileEntry`] records and how to pull one entry's bytes back
//! out. Everything not overridden reports [`VfsError::UnsupportedOperation`],
//! so read-only formats implement only the read half.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::debug;

use crate::archive::BinaryArchive;
use crate::decode::FileOption;
use crate::entry::FileEntry;
use crate::fs::{ReadHandle, WriteHandle};
use crate::{Result, VfsError};

/// Strategy for one package format.
#[async_trait]
pub trait FormatCodec: Send + Sync + fmt::Debug {
    /// Format identifier, as registered in [`FormatRegistry`].
    fn name(&self) -> &str;

    /// Whether [`read`](Self::read) needs a handle onto the backing path.
    /// Codecs that build entries from elsewhere (a path list, a sidecar
    /// index) return `false` and receive `None`.
    fn uses_reader(&self) -> bool {
        true
    }

    /// Parse the table of contents.
    async fn read(
        &self,
        archive: &BinaryArchive,
        reader: Option<&mut dyn ReadHandle>,
    ) -> Result<Vec<FileEntry>> {
        let _ = (archive, reader);
        Err(VfsError::unsupported(self.name(), "read"))
    }

    /// Bytes of one entry. `reader` is positioned at the start of the
    /// backing file, or `None` when the backing file is absent.
    async fn read_data(
        &self,
        archive: &BinaryArchive,
        reader: Option<&mut dyn ReadHandle>,
        entry: &FileEntry,
        option: FileOption,
    ) -> Result<Bytes> {
        let _ = (archive, reader, entry, option);
        Err(VfsError::unsupported(self.name(), "read_data"))
    }

    /// Write a complete package holding `entries`.
    async fn write(
        &self,
        archive: &BinaryArchive,
        writer: &mut dyn WriteHandle,
        entries: &[(Arc<FileEntry>, Bytes)],
    ) -> Result<()> {
        let _ = (archive, writer, entries);
        Err(VfsError::unsupported(self.name(), "write"))
    }

    /// Write one entry's payload at the writer's current position.
    async fn write_data(
        &self,
        archive: &BinaryArchive,
        writer: &mut dyn WriteHandle,
        entry: &FileEntry,
        data: &[u8],
        option: FileOption,
    ) -> Result<()> {
        let _ = (archive, writer, entry, data, option);
        Err(VfsError::unsupported(self.name(), "write_data"))
    }

    /// Post-index hook, run once the index is built.
    async fn process(&self, archive: &BinaryArchive, entries: &[Arc<FileEntry>]) -> Result<()> {
        let _ = (archive, entries);
        Ok(())
    }

    /// Construct the container behind a container-valued entry. The default
    /// reads the entry's bytes into an in-memory container using the game's
    /// registered codec.
    async fn open_nested(
        &self,
        archive: &BinaryArchive,
        entry: &Arc<FileEntry>,
    ) -> Result<Arc<BinaryArchive>> {
        archive.nested_over_slice(entry).await
    }
}

/// Constructor registered for a format identifier.
pub type CodecFactory = Arc<dyn Fn() -> Arc<dyn FormatCodec> + Send + Sync>;

/// Map from format identifier to codec constructor.
///
/// Cloning shares the underlying table.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    factories: Arc<DashMap<String, CodecFactory>>,
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the codec for `format`. Identifiers compare
    /// case-insensitively.
    pub fn register<F>(&self, format: &str, factory: F)
    where
        F: Fn() -> Arc<dyn FormatCodec> + Send + Sync + 'static,
    {
        debug!("Registering codec for format {format}");
        self.factories
            .insert(format.to_lowercase(), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(self, format: &str, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn FormatCodec> + Send + Sync + 'static,
    {
        self.register(format, factory);
        self
    }

    pub fn create(&self, format: &str) -> Result<Arc<dyn FormatCodec>> {
        let factory = self
            .factories
            .get(&format.to_lowercase())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                VfsError::InvalidConfiguration(format!("no codec registered for format {format}"))
            })?;
        Ok(factory())
    }

    pub fn contains(&self, format: &str) -> bool {
        self.factories.contains_key(&format.to_lowercase())
    }

    /// Registered identifiers, sorted.
    pub fn formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        formats.sort();
        formats
    }
}
