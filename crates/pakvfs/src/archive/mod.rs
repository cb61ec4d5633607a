//! Container abstraction.
//!
//! Every container kind implements [`Archive`]: an open/close state machine
//! plus four primitive accessors (`contains`, `get_source`, `get_data`,
//! `get_object`). Concrete behavior lives in [`BinaryArchive`] and the
//! composite types under [`crate::composite`].

mod binary;
mod index;

pub use binary::BinaryArchive;
pub use index::EntryIndex;

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::codec::FormatRegistry;
use crate::config::ArchiveOptions;
use crate::decode::{DecodedObject, FileOption, ObjectFactory};
use crate::entry::FileEntry;
use crate::fs::FileSystem;
use crate::game::GameDescriptor;
use crate::key::Key;
use crate::meta::MetaItem;
use crate::{Result, VfsError};

/// Open state of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OpenState {
    #[default]
    Closed,
    Opening,
    Opened,
    Closing,
}

/// Shared collaborators handed to every container built for one game.
#[derive(Clone)]
pub struct ArchiveContext {
    pub fs: Arc<dyn FileSystem>,
    pub game: Arc<dyn GameDescriptor>,
    pub registry: FormatRegistry,
    pub options: ArchiveOptions,
    /// Decoder dispatch; `None` leaves every entry as raw bytes
    pub object_factory: Option<ObjectFactory>,
}

impl ArchiveContext {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        game: Arc<dyn GameDescriptor>,
        registry: FormatRegistry,
    ) -> Self {
        Self {
            fs,
            game,
            registry,
            options: ArchiveOptions::default(),
            object_factory: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ArchiveOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_object_factory(mut self, factory: ObjectFactory) -> Self {
        self.object_factory = Some(factory);
        self
    }
}

impl fmt::Debug for ArchiveContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveContext")
            .field("fs", &self.fs)
            .field("game", &self.game.id())
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("object_factory", &self.object_factory.is_some())
            .finish()
    }
}

/// Open/close state machine shared by every container kind.
///
/// Opens are serialized by an async gate so that concurrent `open()` calls
/// observe a single `Closed -> Opening -> Opened` transition.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: Mutex<OpenState>,
    gate: tokio::sync::Mutex<()>,
}

impl Lifecycle {
    pub(crate) fn state(&self) -> OpenState {
        *self.state.lock()
    }

    fn set(&self, state: OpenState) {
        *self.state.lock() = state;
    }

    /// Run `opening` if closed. Returns whether this call opened the
    /// container; a failed opening leaves it closed.
    pub(crate) async fn open_with<F, Fut>(&self, name: &str, opening: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _gate = self.gate.lock().await;
        if self.state() != OpenState::Closed {
            return Ok(false);
        }

        self.set(OpenState::Opening);
        let started = Instant::now();
        match opening().await {
            Ok(()) => {
                self.set(OpenState::Opened);
                info!("Opened {name} in {:?}", started.elapsed());
                Ok(true)
            }
            Err(e) => {
                self.set(OpenState::Closed);
                Err(e)
            }
        }
    }

    /// Run `closing` if opened. Closing an unopened container is a no-op.
    pub(crate) async fn close_with<F, Fut>(&self, name: &str, closing: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let _gate = self.gate.lock().await;
        if self.state() != OpenState::Opened {
            return Ok(false);
        }

        self.set(OpenState::Closing);
        let result = closing().await;
        self.set(OpenState::Closed);
        debug!("Closed {name}");
        result.map(|()| true)
    }

    pub(crate) fn ensure_opened(&self, name: &str) -> Result<()> {
        match self.state() {
            OpenState::Opened => Ok(()),
            _ => Err(VfsError::NotOpened(name.to_string())),
        }
    }
}

/// Rewrites a logical path before lookup.
pub type PathFinder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Per-type path overrides: at most one per target type plus one universal
/// override used when no typed one matches.
#[derive(Default)]
pub struct PathFinders {
    finders: RwLock<HashMap<Option<TypeId>, PathFinder>>,
}

impl fmt::Debug for PathFinders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathFinders")
            .field("count", &self.finders.read().len())
            .finish()
    }
}

impl PathFinders {
    /// Register the override for `target` (`None` = universal).
    pub fn register(&self, target: Option<TypeId>, finder: PathFinder) -> Result<()> {
        let mut finders = self.finders.write();
        if finders.contains_key(&target) {
            return Err(VfsError::InvalidConfiguration(
                "path finder already registered for this type".to_string(),
            ));
        }
        finders.insert(target, finder);
        Ok(())
    }

    /// Register the override used when loading objects of type `T`.
    pub fn register_for<T: Any>(
        &self,
        finder: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Result<()> {
        self.register(Some(TypeId::of::<T>()), Arc::new(finder))
            .map_err(|_| {
                VfsError::InvalidConfiguration(format!(
                    "path finder already registered for {}",
                    type_name::<T>()
                ))
            })
    }

    /// Rewrite `path` with the typed override, else the universal one.
    pub fn apply(&self, target: Option<TypeId>, path: &str) -> String {
        let finders = self.finders.read();
        let finder = target
            .and_then(|t| finders.get(&Some(t)))
            .or_else(|| finders.get(&None));
        finder.map_or_else(|| path.to_string(), |find| find(path))
    }
}

/// Converts objects decoded by one container into another container's
/// representation.
#[async_trait]
pub trait ObjectTransformer: Send + Sync {
    /// Whether `source` can become a value of type `target`.
    fn can_transform(&self, target: TypeId, source: &DecodedObject) -> bool;

    async fn transform(&self, target: TypeId, source: DecodedObject) -> Result<DecodedObject>;
}

/// A resolved entry and the binary container that owns it.
#[derive(Debug, Clone)]
pub struct Source {
    pub archive: Arc<BinaryArchive>,
    pub entry: Arc<FileEntry>,
}

/// Addressable set of files, whatever the backing layout.
#[async_trait]
pub trait Archive: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Backing path, relative to the filesystem root.
    fn path(&self) -> &str;

    fn game(&self) -> &Arc<dyn GameDescriptor>;

    fn state(&self) -> OpenState;

    fn is_opened(&self) -> bool {
        self.state() == OpenState::Opened
    }

    /// Whether the backing data is present and the container can be opened.
    fn valid(&self) -> bool;

    /// Number of indexed entries; zero while closed.
    fn count(&self) -> usize;

    fn path_finders(&self) -> &PathFinders;

    fn find_path_override(&self, target: Option<TypeId>, path: &str) -> String {
        self.path_finders().apply(target, path)
    }

    fn transformer(&self) -> Option<Arc<dyn ObjectTransformer>> {
        None
    }

    /// Open if closed. When this call performs the open and `meta` is
    /// given, the container's metadata tree is appended to it.
    async fn open(&self, meta: Option<&mut Vec<MetaItem>>) -> Result<()>;

    /// Release handles and indices. Safe to call repeatedly.
    async fn close(&self) -> Result<()>;

    /// Whether `key` resolves to exactly one entry. Ambiguity is an error.
    async fn contains(&self, key: &Key) -> Result<bool>;

    async fn get_source(&self, key: &Key, throw_on_error: bool) -> Result<Option<Source>>;

    async fn get_data(
        &self,
        key: &Key,
        option: FileOption,
        throw_on_error: bool,
    ) -> Result<Option<Bytes>>;

    /// Decode the entry behind `key`. `target` selects the path finder and
    /// is otherwise advisory; use [`ArchiveExt::get_object`] for typed access.
    async fn get_object_dyn(
        &self,
        key: &Key,
        target: Option<TypeId>,
        option: FileOption,
        throw_on_error: bool,
    ) -> Result<Option<DecodedObject>>;

    /// Browsable folder/file projection of the contents.
    async fn meta_items(&self) -> Result<Vec<MetaItem>>;
}

fn mismatch<T>(actual: &str) -> VfsError {
    VfsError::TypeMismatch {
        expected: type_name::<T>().to_string(),
        actual: actual.to_string(),
    }
}

/// Typed accessors layered over [`Archive`].
pub trait ArchiveExt: Archive {
    /// Load and downcast the object behind `key`.
    ///
    /// Entries without a decoder yield [`Bytes`]; asking for any other type
    /// is a [`VfsError::TypeMismatch`].
    fn get_object<T: Any + Send + Sync>(
        &self,
        key: impl Into<Key>,
        option: FileOption,
        throw_on_error: bool,
    ) -> impl Future<Output = Result<Option<Arc<T>>>> + Send;

    /// Load the native object behind `key` and convert it to `T` through
    /// `transform_to`'s transformer, falling back to this container's own.
    fn load_object<T: Any + Send + Sync>(
        &self,
        key: impl Into<Key>,
        transform_to: &dyn Archive,
        option: FileOption,
    ) -> impl Future<Output = Result<Arc<T>>> + Send;
}

impl<A: Archive + ?Sized> ArchiveExt for A {
    fn get_object<T: Any + Send + Sync>(
        &self,
        key: impl Into<Key>,
        option: FileOption,
        throw_on_error: bool,
    ) -> impl Future<Output = Result<Option<Arc<T>>>> + Send {
        let key = key.into();
        async move {
            let object = self
                .get_object_dyn(&key, Some(TypeId::of::<T>()), option, throw_on_error)
                .await?;
            match object {
                None => Ok(None),
                Some(object) => object
                    .downcast::<T>()
                    .map(Some)
                    .map_err(|object| mismatch::<T>(object.type_name())),
            }
        }
    }

    fn load_object<T: Any + Send + Sync>(
        &self,
        key: impl Into<Key>,
        transform_to: &dyn Archive,
        option: FileOption,
    ) -> impl Future<Output = Result<Arc<T>>> + Send {
        let key = key.into();
        async move {
            let native = self
                .get_object_dyn(&key, Some(TypeId::of::<T>()), option, true)
                .await?
                .ok_or_else(|| VfsError::NotFound(key.to_string()))?;
            if native.is::<T>() {
                return native
                    .downcast::<T>()
                    .map_err(|object| mismatch::<T>(object.type_name()));
            }

            let target = TypeId::of::<T>();
            let transformer = [transform_to.transformer(), self.transformer()]
                .into_iter()
                .flatten()
                .find(|t| t.can_transform(target, &native));
            let Some(transformer) = transformer else {
                return Err(mismatch::<T>(native.type_name()));
            };

            transformer
                .transform(target, native)
                .await?
                .downcast::<T>()
                .map_err(|object| mismatch::<T>(object.type_name()))
        }
    }
}
