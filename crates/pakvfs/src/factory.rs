//! Picks the container kind for an install root.

use std::sync::Arc;

use tracing::info;

use crate::archive::{Archive, ArchiveContext, BinaryArchive};
use crate::composite::MultiArchive;
use crate::discover::discover_paths;
use crate::game::SearchBy;
use crate::path;
use crate::{Result, VfsError};

/// Builds containers for one game from its search policy.
#[derive(Debug, Clone)]
pub struct ArchiveFactory {
    ctx: ArchiveContext,
}

impl ArchiveFactory {
    pub const fn new(ctx: ArchiveContext) -> Self {
        Self { ctx }
    }

    pub const fn context(&self) -> &ArchiveContext {
        &self.ctx
    }

    /// Container for `root`.
    ///
    /// With [`SearchBy::Default`], `root` must itself name a container. Any
    /// other policy runs the search pass and hands the result to
    /// [`create_from_paths`](Self::create_from_paths).
    pub fn create(&self, root: &str) -> Result<Arc<dyn Archive>> {
        let game = &self.ctx.game;
        if game.search_by() == SearchBy::Default {
            if !game.is_archive_path(root) {
                return Err(VfsError::InvalidConfiguration(format!(
                    "{root} is not a {} container and {} has no search policy",
                    game.format(),
                    game.id()
                )));
            }
            let archive: Arc<dyn Archive> = BinaryArchive::for_game(self.ctx.clone(), root)?;
            return Ok(archive);
        }

        let paths = discover_paths(self.ctx.fs.as_ref(), root, game.as_ref())?;
        if paths.is_empty() {
            return Err(VfsError::NotFound(format!(
                "no {:?} candidates under {root}",
                game.search_by()
            )));
        }
        self.create_from_paths(root, &paths)
    }

    /// Container over `paths`, relative to `root`.
    ///
    /// When every path names a container each becomes an independent child
    /// of a [`MultiArchive`] (collapsed when there is one). Otherwise the
    /// paths form a flat union.
    pub fn create_from_paths(&self, root: &str, paths: &[String]) -> Result<Arc<dyn Archive>> {
        let game = &self.ctx.game;
        if !paths.is_empty() && paths.iter().all(|p| game.is_archive_path(p)) {
            let children = paths
                .iter()
                .map(|p| {
                    BinaryArchive::for_game(self.ctx.clone(), path::join(root, p))
                        .map(|archive| archive as Arc<dyn Archive>)
                })
                .collect::<Result<Vec<_>>>()?;
            info!("Joining {} containers under {root}", children.len());
            return MultiArchive::compose(root, Arc::clone(game), children);
        }

        info!("Flat union of {} files under {root}", paths.len());
        let archive: Arc<dyn Archive> = BinaryArchive::many(self.ctx.clone(), root, paths);
        Ok(archive)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ArchiveOptions;
    use crate::fs::MemoryFileSystem;
    use crate::game::GameConfig;
    use crate::key::Key;
    use crate::test_utils::{IpakBuilder, ipak_registry};

    fn factory(fs: &MemoryFileSystem, search_by: SearchBy) -> ArchiveFactory {
        let game = GameConfig::new("demo", "ipak")
            .with_extensions(["pak"])
            .with_search(search_by, "*");
        let ctx = ArchiveContext::new(Arc::new(fs.clone()), Arc::new(game), ipak_registry())
            .with_options(ArchiveOptions::default());
        ArchiveFactory::new(ctx)
    }

    fn install() -> MemoryFileSystem {
        let fs = MemoryFileSystem::new("mem");
        fs.insert("game/a.pak", IpakBuilder::new().file(1, "x.txt", b"a").build());
        fs.insert("game/b.pak", IpakBuilder::new().file(1, "y.txt", b"b").build());
        fs.insert("game/readme.txt", &b"hi"[..]);
        fs
    }

    #[tokio::test]
    async fn test_pak_search_joins_packages() {
        let fs = install();
        let archive = factory(&fs, SearchBy::Pak).create("game").expect("create");
        archive.open(None).await.expect("open");
        assert_eq!(archive.count(), 2);
        assert!(archive.contains(&Key::from("y.txt")).await.expect("contains"));
    }

    #[tokio::test]
    async fn test_directory_search_builds_flat_union() {
        let fs = install();
        let archive = factory(&fs, SearchBy::TopDir).create("game").expect("create");
        archive.open(None).await.expect("open");
        assert_eq!(archive.count(), 3);
        assert!(archive.contains(&Key::from("a.pak:x.txt")).await.expect("contains"));
    }

    #[test]
    fn test_default_policy_needs_container_root() {
        let fs = install();
        let factory = factory(&fs, SearchBy::Default);
        assert!(factory.create("game/a.pak").is_ok());
        assert!(matches!(
            factory.create("game"),
            Err(VfsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_empty_search_is_not_found() {
        let fs = MemoryFileSystem::new("mem");
        assert!(matches!(
            factory(&fs, SearchBy::Pak).create("game"),
            Err(VfsError::NotFound(_))
        ));
    }
}
