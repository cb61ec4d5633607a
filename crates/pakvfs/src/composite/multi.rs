//! Union of independent containers addressed by name prefix.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::archive::{Archive, Lifecycle, OpenState, PathFinders, Source};
use crate::decode::{DecodedObject, FileOption};
use crate::error::recover;
use crate::game::GameDescriptor;
use crate::key::Key;
use crate::meta::MetaItem;
use crate::path;
use crate::{Result, VfsError};

/// Several containers sharing one logical namespace.
///
/// A path lookup splits off its first component and tries the children
/// whose name starts with it, asking each for the remainder. When no such
/// child holds it, every child is asked for the full path. The first valid
/// child that contains the key serves the request.
pub struct MultiArchive {
    name: String,
    path: String,
    game: Arc<dyn GameDescriptor>,
    children: Vec<Arc<dyn Archive>>,
    lifecycle: Lifecycle,
    finders: PathFinders,
}

impl fmt::Debug for MultiArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiArchive")
            .field("path", &self.path)
            .field("children", &self.children.len())
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl MultiArchive {
    pub fn new(
        path: impl AsRef<str>,
        game: Arc<dyn GameDescriptor>,
        children: Vec<Arc<dyn Archive>>,
    ) -> Self {
        let path = path::normalize(path.as_ref());
        let name = match path::file_name(&path) {
            "" => game.id().to_string(),
            name => name.to_string(),
        };
        Self {
            name,
            path,
            game,
            children,
            lifecycle: Lifecycle::default(),
            finders: PathFinders::default(),
        }
    }

    /// Union of `children`, or the child itself when there is exactly one.
    pub fn compose(
        path: impl AsRef<str>,
        game: Arc<dyn GameDescriptor>,
        children: Vec<Arc<dyn Archive>>,
    ) -> Result<Arc<dyn Archive>> {
        match <[Arc<dyn Archive>; 1]>::try_from(children) {
            Ok([only]) => Ok(only),
            Err(children) if children.is_empty() => Err(VfsError::InvalidConfiguration(format!(
                "no containers to join at {}",
                path.as_ref()
            ))),
            Err(children) => Ok(Arc::new(Self::new(path, game, children))),
        }
    }

    pub fn children(&self) -> &[Arc<dyn Archive>] {
        &self.children
    }

    async fn probe(child: &Arc<dyn Archive>, key: &Key) -> Result<bool> {
        if !child.valid() {
            return Ok(false);
        }
        child.open(None).await?;
        child.contains(key).await
    }

    /// The child serving `key` and the key to ask it with.
    async fn route(&self, key: &Key, target: Option<TypeId>) -> Result<Option<(Arc<dyn Archive>, Key)>> {
        self.lifecycle.ensure_opened(&self.name)?;

        let Key::Path(path) = key else {
            for child in &self.children {
                if Self::probe(child, key).await? {
                    return Ok(Some((Arc::clone(child), key.clone())));
                }
            }
            return Ok(None);
        };

        let path = self.find_path_override(target, path);
        if let Some((prefix, rest)) = path::split_prefix(&path) {
            let prefix = prefix.to_lowercase();
            let inner = Key::Path(rest.to_string());
            let candidates = self
                .children
                .iter()
                .filter(|child| child.name().to_lowercase().starts_with(&prefix));
            for child in candidates {
                if Self::probe(child, &inner).await? {
                    debug!("{path} routed to {} by prefix", child.name());
                    return Ok(Some((Arc::clone(child), inner)));
                }
            }
        }

        let full = Key::Path(path);
        for child in &self.children {
            if Self::probe(child, &full).await? {
                return Ok(Some((Arc::clone(child), full)));
            }
        }
        Ok(None)
    }

    fn not_found(&self, key: &Key) -> VfsError {
        VfsError::NotFound(format!("{key} in {}", self.name))
    }
}

#[async_trait]
impl Archive for MultiArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn game(&self) -> &Arc<dyn GameDescriptor> {
        &self.game
    }

    fn state(&self) -> OpenState {
        self.lifecycle.state()
    }

    fn valid(&self) -> bool {
        self.children.iter().any(|child| child.valid())
    }

    fn count(&self) -> usize {
        self.children.iter().map(|child| child.count()).sum()
    }

    fn path_finders(&self) -> &PathFinders {
        &self.finders
    }

    async fn open(&self, meta: Option<&mut Vec<MetaItem>>) -> Result<()> {
        let opened = self
            .lifecycle
            .open_with(&self.name, || async {
                let mut started: Vec<&Arc<dyn Archive>> = Vec::new();
                for child in self.children.iter().filter(|child| child.valid()) {
                    if let Err(e) = child.open(None).await {
                        // Children opened so far must not outlive the failed open
                        for done in started {
                            if let Err(close_err) = done.close().await {
                                warn!("Failed to close {} after open error: {close_err}", done.name());
                            }
                        }
                        return Err(e);
                    }
                    started.push(child);
                }
                Ok::<(), VfsError>(())
            })
            .await?;
        if opened && let Some(meta) = meta {
            match self.meta_items().await {
                Ok(items) => meta.extend(items),
                Err(e) => {
                    if let Err(close_err) = self.close().await {
                        warn!("Failed to close {} after open error: {close_err}", self.name);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.lifecycle
            .close_with(&self.name, || async {
                let mut first_error = None;
                for child in &self.children {
                    if let Err(e) = child.close().await {
                        warn!("Failed to close {}: {e}", child.name());
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            })
            .await
            .map(|_| ())
    }

    async fn contains(&self, key: &Key) -> Result<bool> {
        Ok(self.route(key, None).await?.is_some())
    }

    async fn get_source(&self, key: &Key, throw_on_error: bool) -> Result<Option<Source>> {
        match self.route(key, None).await? {
            Some((child, inner)) => child.get_source(&inner, throw_on_error).await,
            None => recover(self.not_found(key), throw_on_error),
        }
    }

    async fn get_data(
        &self,
        key: &Key,
        option: FileOption,
        throw_on_error: bool,
    ) -> Result<Option<Bytes>> {
        match self.route(key, None).await? {
            Some((child, inner)) => child.get_data(&inner, option, throw_on_error).await,
            None => recover(self.not_found(key), throw_on_error),
        }
    }

    async fn get_object_dyn(
        &self,
        key: &Key,
        target: Option<TypeId>,
        option: FileOption,
        throw_on_error: bool,
    ) -> Result<Option<DecodedObject>> {
        match self.route(key, target).await? {
            Some((child, inner)) => {
                child
                    .get_object_dyn(&inner, target, option, throw_on_error)
                    .await
            }
            None => recover(self.not_found(key), throw_on_error),
        }
    }

    /// One folder node per child, holding that child's tree.
    async fn meta_items(&self) -> Result<Vec<MetaItem>> {
        self.lifecycle.ensure_opened(&self.name)?;
        let mut items = Vec::with_capacity(self.children.len());
        for child in self.children.iter().filter(|child| child.is_opened()) {
            let mut folder = MetaItem::folder(child.name(), child.path());
            folder.children = child.meta_items().await?;
            items.push(folder);
        }
        Ok(items)
    }
}
