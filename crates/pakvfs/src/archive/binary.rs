//! Concrete container over a single backing file.

use std::any::{Any, TypeId};
use std::fmt;
use std::io::{Cursor, Write};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::index::EntryIndex;
use super::{Archive, ArchiveContext, Lifecycle, ObjectTransformer, OpenState, PathFinders, Source};
use crate::codec::FormatCodec;
use crate::config::ArchiveOptions;
use crate::decode::{DecodeContext, DecodedObject, FileOption};
use crate::entry::FileEntry;
use crate::error::recover;
use crate::fs::{BoxReader, BoxWriter, FileSystem, ReadHandle, WriteHandle};
use crate::game::GameDescriptor;
use crate::key::Key;
use crate::meta::{self, MetaItem};
use crate::path::{self, NESTING_SEPARATOR};
use crate::pool::{HandlePool, PoolStats, PooledHandle};
use crate::{Result, VfsError};

fn as_reader(handle: &mut PooledHandle<BoxReader>) -> &mut dyn ReadHandle {
    &mut ***handle
}

/// Container whose table of contents is parsed by a [`FormatCodec`].
///
/// Backed either by a file on the context filesystem, read through a
/// per-path [`HandlePool`], or by a fixed in-memory buffer when the
/// container lives inside another container's entry.
pub struct BinaryArchive {
    this: Weak<Self>,
    ctx: ArchiveContext,
    name: String,
    path: String,
    codec: Arc<dyn FormatCodec>,
    memory: Option<Bytes>,
    readers: DashMap<String, Arc<HandlePool<BoxReader>>>,
    lifecycle: Lifecycle,
    index: RwLock<Option<Arc<EntryIndex>>>,
    finders: PathFinders,
    transformer: RwLock<Option<Arc<dyn ObjectTransformer>>>,
    tag: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl fmt::Debug for BinaryArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryArchive")
            .field("path", &self.path)
            .field("codec", &self.codec.name())
            .field("in_memory", &self.memory.is_some())
            .field("state", &self.lifecycle.state())
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

impl BinaryArchive {
    /// Container over `path` on the context filesystem.
    pub fn new(ctx: ArchiveContext, path: impl AsRef<str>, codec: Arc<dyn FormatCodec>) -> Arc<Self> {
        Self::build(ctx, path::normalize(path.as_ref()), None, codec)
    }

    /// Container over a fixed buffer. Reads use a single-use cursor rather
    /// than a pool.
    pub fn from_bytes(
        ctx: ArchiveContext,
        path: impl AsRef<str>,
        data: Bytes,
        codec: Arc<dyn FormatCodec>,
    ) -> Arc<Self> {
        Self::build(ctx, path::normalize(path.as_ref()), Some(data), codec)
    }

    /// Container over `path` using the codec registered for the game's format.
    pub fn for_game(ctx: ArchiveContext, path: impl AsRef<str>) -> Result<Arc<Self>> {
        let codec = ctx.registry.create(ctx.game.format())?;
        Ok(Self::new(ctx, path, codec))
    }

    fn build(
        ctx: ArchiveContext,
        path: String,
        memory: Option<Bytes>,
        codec: Arc<dyn FormatCodec>,
    ) -> Arc<Self> {
        let name = match path::file_name(&path) {
            "" => ctx.game.id().to_string(),
            name => name.to_string(),
        };
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            ctx,
            name,
            path,
            codec,
            memory,
            readers: DashMap::new(),
            lifecycle: Lifecycle::default(),
            index: RwLock::new(None),
            finders: PathFinders::default(),
            transformer: RwLock::new(None),
            tag: Mutex::new(None),
        })
    }

    fn arc(&self) -> Result<Arc<Self>> {
        self.this
            .upgrade()
            .ok_or_else(|| VfsError::NotOpened(self.name.clone()))
    }

    pub const fn context(&self) -> &ArchiveContext {
        &self.ctx
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.ctx.fs
    }

    pub const fn options(&self) -> &ArchiveOptions {
        &self.ctx.options
    }

    pub fn codec(&self) -> &Arc<dyn FormatCodec> {
        &self.codec
    }

    pub fn is_in_memory(&self) -> bool {
        self.memory.is_some()
    }

    pub(crate) fn index(&self) -> Result<Arc<EntryIndex>> {
        self.lifecycle.ensure_opened(&self.name)?;
        self.index
            .read()
            .clone()
            .ok_or_else(|| VfsError::NotOpened(self.name.clone()))
    }

    /// Snapshot of the index, sorted by path.
    pub fn entries(&self) -> Result<Vec<Arc<FileEntry>>> {
        let index = self.index()?;
        let mut entries = index.entries().to_vec();
        entries.sort_by_cached_key(|e| path::lookup_key(&e.path));
        Ok(entries)
    }

    pub fn set_transformer(&self, transformer: Arc<dyn ObjectTransformer>) {
        *self.transformer.write() = Some(transformer);
    }

    /// Attach codec-private state. Dropped on close.
    pub fn set_tag<T: Any + Send + Sync>(&self, tag: T) {
        *self.tag.lock() = Some(Arc::new(tag));
    }

    pub fn tag<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.tag.lock().clone()?.downcast::<T>().ok()
    }

    /// Statistics of the reader pool for `path` (default: the backing path).
    pub fn reader_stats(&self, path: Option<&str>) -> Option<PoolStats> {
        let key = path::lookup_key(path.unwrap_or(&self.path));
        self.readers.get(&key).map(|pool| pool.stats())
    }

    /// Reader positioned at the start of `path` (default: the backing path).
    ///
    /// Returns `None` when the file does not exist. With `pooled = false` the
    /// handle is single-use and never retained.
    pub fn get_reader(
        &self,
        path: Option<&str>,
        pooled: bool,
    ) -> Result<Option<PooledHandle<BoxReader>>> {
        if let (Some(data), None) = (&self.memory, path) {
            let reader: BoxReader = Box::new(Cursor::new(data.clone()));
            return PooledHandle::detached(reader).map(Some);
        }

        let target = path.unwrap_or(&self.path);
        let fs = &self.ctx.fs;
        if fs.stat(target).is_none() {
            debug!("No backing file for {target}");
            return Ok(None);
        }
        if !pooled {
            return PooledHandle::detached(fs.open_read(target)?).map(Some);
        }

        let pool = Arc::clone(
            self.readers
                .entry(path::lookup_key(target))
                .or_insert_with(|| {
                    let fs = Arc::clone(fs);
                    let target = target.to_string();
                    Arc::new(HandlePool::new(self.ctx.options.pool_retain, move || {
                        fs.open_read(&target)
                    }))
                })
                .value(),
        );
        pool.checkout().map(Some)
    }

    /// Fresh writer onto `path` (default: the backing path). The target is
    /// created or truncated; writers are never pooled.
    pub fn get_writer(&self, path: Option<&str>) -> Result<BoxWriter> {
        if self.memory.is_some() && path.is_none() {
            return Err(VfsError::UnsupportedOperation(format!(
                "{} is an in-memory container",
                self.path
            )));
        }
        self.ctx.fs.open_write(path.unwrap_or(&self.path))
    }

    async fn opening(&self) -> Result<()> {
        let entries = self.read().await?;
        let result = self.process(entries).await;
        if result.is_err() {
            self.index.write().take();
        }
        result
    }

    async fn read(&self) -> Result<Vec<FileEntry>> {
        if !self.codec.uses_reader() {
            return self.codec.read(self, None).await;
        }

        let mut reader = self
            .get_reader(None, self.ctx.options.use_reader)?
            .ok_or_else(|| VfsError::NotFound(self.path.clone()))?;
        self.codec.read(self, Some(as_reader(&mut reader))).await
    }

    async fn process(&self, entries: Vec<FileEntry>) -> Result<()> {
        let entries: Vec<Arc<FileEntry>> = entries.into_iter().map(Arc::new).collect();
        let index = Arc::new(EntryIndex::build(entries, self.ctx.options.use_file_id));
        *self.index.write() = Some(Arc::clone(&index));
        self.codec.process(self, index.entries()).await
    }

    async fn closing(&self) -> Result<()> {
        for pool in self.readers.iter() {
            pool.clear();
        }
        self.readers.clear();
        self.tag.lock().take();

        // Every nested container is closed even if an earlier one fails
        let mut first_error = None;
        let index = self.index.write().take();
        if let Some(index) = index {
            for nested in index.entries().iter().filter_map(|e| e.nested.get()) {
                if let Err(e) = nested.close().await {
                    warn!("Failed to close nested {}: {e}", nested.path);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Undo an open whose metadata projection failed, returning `error`.
    async fn abandon_open(&self, error: VfsError) -> VfsError {
        if let Err(e) = self.close().await {
            warn!("Failed to close {} after a failed open: {e}", self.name);
        }
        error
    }

    fn resolve<'a>(&'a self, key: &'a Key, target: Option<TypeId>) -> BoxFuture<'a, Result<Source>> {
        Box::pin(async move {
            let index = self.index()?;
            match key {
                Key::Id(id) => Ok(Source {
                    archive: self.arc()?,
                    entry: Arc::clone(index.resolve_id(*id)?),
                }),
                Key::Entry(entry) => self.resolve_entry(&index, entry).await,
                Key::Path(path) => {
                    let path = self.find_path_override(target, path);
                    self.resolve_path(&index, &path).await
                }
            }
        })
    }

    async fn resolve_path(&self, index: &EntryIndex, path: &str) -> Result<Source> {
        match index.resolve_path(path) {
            Ok(entry) => {
                return Ok(Source {
                    archive: self.arc()?,
                    entry: Arc::clone(entry),
                });
            }
            Err(VfsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let Some((outer, inner)) = path::split_nested(path) else {
            return Err(VfsError::NotFound(format!("{path} in {}", self.name)));
        };
        let entry = Arc::clone(index.resolve_path(outer)?);
        let nested = self.nested(&entry).await?;
        nested.resolve(&Key::Path(inner.to_string()), None).await
    }

    /// Find the container that owns `entry`, searching opened nested
    /// containers when this index does not hold it.
    async fn resolve_entry(&self, index: &EntryIndex, entry: &Arc<FileEntry>) -> Result<Source> {
        if index.owns(entry) {
            return Ok(Source {
                archive: self.arc()?,
                entry: Arc::clone(entry),
            });
        }

        let key = Key::Entry(Arc::clone(entry));
        for nested in index.entries().iter().filter_map(|e| e.nested.get()) {
            if nested.state() != OpenState::Opened {
                continue;
            }
            match nested.resolve(&key, None).await {
                Ok(source) => return Ok(source),
                Err(VfsError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Err(VfsError::NotFound(format!(
            "{} is not an entry of {}",
            entry.path, self.name
        )))
    }

    /// Open the container behind a container-valued entry, constructing it
    /// on first use. The nested container is owned by the entry and closed
    /// with this one.
    pub async fn nested(&self, entry: &Arc<FileEntry>) -> Result<Arc<Self>> {
        if !entry.has_flag(FileEntry::FLAG_NESTED) && !self.ctx.game.is_archive_path(&entry.path) {
            return Err(VfsError::NotFound(format!(
                "{} is not a container",
                entry.path
            )));
        }

        let nested = entry
            .nested
            .get_or_try_init(|| self.codec.open_nested(self, entry))
            .await?;
        nested.open(None).await?;
        Ok(Arc::clone(nested))
    }

    /// In-memory container over one entry's bytes, parsed with the game's
    /// registered codec.
    pub async fn nested_over_slice(&self, entry: &Arc<FileEntry>) -> Result<Arc<Self>> {
        let data = self.read_entry_data(entry, FileOption::DEFAULT).await?;
        let codec = self.ctx.registry.create(self.ctx.game.format())?;
        debug!("Nested container {} ({} bytes)", entry.path, data.len());
        Ok(Self::from_bytes(
            self.ctx.clone(),
            format!("{}{NESTING_SEPARATOR}{}", self.path, entry.path),
            data,
            codec,
        ))
    }

    /// Raw bytes of `entry` as produced by the codec.
    pub async fn read_entry_data(&self, entry: &FileEntry, option: FileOption) -> Result<Bytes> {
        let mut reader = if self.codec.uses_reader() {
            self.get_reader(None, true)?
        } else {
            None
        };
        self.codec
            .read_data(self, reader.as_mut().map(as_reader), entry, option)
            .await
    }

    /// Decode `entry` through its cached decoder binding.
    ///
    /// Container-valued entries yield `None`. Entries without a binding, or
    /// loads with [`FileOption::STREAM`], yield their bytes unchanged. The
    /// binding's option is combined with `option` for both the read and the
    /// decoder.
    pub async fn decode_entry(
        &self,
        entry: &Arc<FileEntry>,
        option: FileOption,
    ) -> Result<Option<DecodedObject>> {
        if self.ctx.game.is_archive_path(&entry.path) {
            return Ok(None);
        }
        if option.contains(FileOption::STREAM) {
            let data = self.read_entry_data(entry, option).await?;
            return Ok(Some(DecodedObject::new(data)));
        }

        let binding = entry
            .decoder
            .get_or_init(|| {
                let factory = self.ctx.object_factory.as_ref()?;
                factory(entry, self.ctx.game.as_ref())
            })
            .clone();
        let Some(binding) = binding else {
            let data = self.read_entry_data(entry, option).await?;
            return Ok(Some(DecodedObject::new(data)));
        };

        let option = binding.option | option;
        let data = self.read_entry_data(entry, option).await?;
        let ctx = DecodeContext {
            reader: Cursor::new(data),
            entry: Arc::clone(entry),
            archive: self.arc()?,
            option,
        };
        match (binding.decode)(ctx).await {
            Ok(object) => Ok(Some(object)),
            Err(source) => {
                error!("Failed to decode {}: {source}", entry.path);
                Err(VfsError::DecodeFailure {
                    path: entry.path.clone(),
                    source,
                })
            }
        }
    }

    /// Write `entries` as a complete package through the codec.
    ///
    /// The package is staged in memory so a codec that cannot write leaves
    /// the target untouched.
    pub async fn write_entries(
        &self,
        path: Option<&str>,
        entries: Vec<(FileEntry, Bytes)>,
    ) -> Result<()> {
        let entries: Vec<(Arc<FileEntry>, Bytes)> = entries
            .into_iter()
            .map(|(entry, data)| (Arc::new(entry), data))
            .collect();

        let mut staged = Cursor::new(Vec::new());
        let handle: &mut dyn WriteHandle = &mut staged;
        self.codec.write(self, handle, &entries).await?;

        let mut writer = self.get_writer(path)?;
        writer.write_all(staged.get_ref())?;
        writer.flush()?;
        info!(
            "Wrote {} entries to {}",
            entries.len(),
            path.unwrap_or(&self.path)
        );
        Ok(())
    }
}

#[async_trait]
impl Archive for BinaryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn game(&self) -> &Arc<dyn GameDescriptor> {
        &self.ctx.game
    }

    fn state(&self) -> OpenState {
        self.lifecycle.state()
    }

    fn valid(&self) -> bool {
        if self.memory.is_some() {
            return true;
        }
        if self.codec.uses_reader() {
            self.ctx.fs.stat(&self.path).is_some()
        } else {
            self.ctx.fs.exists(&self.path)
        }
    }

    fn count(&self) -> usize {
        self.index.read().as_ref().map_or(0, |index| index.len())
    }

    fn path_finders(&self) -> &PathFinders {
        &self.finders
    }

    fn transformer(&self) -> Option<Arc<dyn ObjectTransformer>> {
        self.transformer.read().clone()
    }

    async fn open(&self, meta: Option<&mut Vec<MetaItem>>) -> Result<()> {
        let opened = self
            .lifecycle
            .open_with(&self.name, || self.opening())
            .await?;
        if opened && let Some(meta) = meta {
            match meta::build_tree(self).await {
                Ok(items) => meta.extend(items),
                Err(e) => return Err(self.abandon_open(e).await),
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.lifecycle
            .close_with(&self.name, || self.closing())
            .await
            .map(|_| ())
    }

    async fn contains(&self, key: &Key) -> Result<bool> {
        match self.resolve(key, None).await {
            Ok(_) => Ok(true),
            Err(VfsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_source(&self, key: &Key, throw_on_error: bool) -> Result<Option<Source>> {
        match self.resolve(key, None).await {
            Ok(source) => Ok(Some(source)),
            Err(e) => recover(e, throw_on_error),
        }
    }

    async fn get_data(
        &self,
        key: &Key,
        option: FileOption,
        throw_on_error: bool,
    ) -> Result<Option<Bytes>> {
        let source = match self.resolve(key, None).await {
            Ok(source) => source,
            Err(e) => return recover(e, throw_on_error),
        };
        match source.archive.read_entry_data(&source.entry, option).await {
            Ok(data) => Ok(Some(data)),
            Err(e) => recover(e, throw_on_error),
        }
    }

    async fn get_object_dyn(
        &self,
        key: &Key,
        target: Option<TypeId>,
        option: FileOption,
        throw_on_error: bool,
    ) -> Result<Option<DecodedObject>> {
        let source = match self.resolve(key, target).await {
            Ok(source) => source,
            Err(e) => return recover(e, throw_on_error),
        };
        source.archive.decode_entry(&source.entry, option).await
    }

    async fn meta_items(&self) -> Result<Vec<MetaItem>> {
        meta::build_tree(self).await
    }
}
