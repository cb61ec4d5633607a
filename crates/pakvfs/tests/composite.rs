#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Flat unions and container-of-containers

mod common;

use std::sync::Arc;

use pakvfs::test_utils::{IpakBuilder, demo_game, ipak_registry, memory_context};
use pakvfs::{
    Archive, ArchiveContext, ArchiveFactory, ArchiveOptions, BinaryArchive, FileOption, GameConfig,
    Key, MemoryFileSystem, MultiArchive, SearchBy, VfsError,
};
use pretty_assertions::assert_eq;

fn install(fs: &MemoryFileSystem) {
    fs.insert(
        "game/base.pak",
        IpakBuilder::new()
            .file(1, "shared.txt", b"from base")
            .file(2, "base/only.txt", b"base only")
            .build(),
    );
    fs.insert(
        "game/patch.pak",
        IpakBuilder::new()
            .file(1, "shared.txt", b"from patch")
            .file(3, "patch/only.txt", b"patch only")
            .build(),
    );
    fs.insert("game/notes/readme.txt", &b"loose"[..]);
}

fn context(fs: &MemoryFileSystem, search_by: SearchBy) -> ArchiveContext {
    let game = GameConfig::new("demo", "ipak")
        .with_extensions(["pak"])
        .with_search(search_by, "*");
    ArchiveContext::new(Arc::new(fs.clone()), Arc::new(game), ipak_registry())
}

async fn read(archive: &dyn Archive, path: &str) -> Option<Vec<u8>> {
    archive
        .get_data(&Key::from(path), FileOption::DEFAULT, false)
        .await
        .expect("read")
        .map(|b| b.to_vec())
}

#[tokio::test]
async fn package_search_prefers_first_child() {
    common::init_tracing();
    let (_ctx, fs) = memory_context(ArchiveOptions::default());
    install(&fs);

    let archive = ArchiveFactory::new(context(&fs, SearchBy::Pak))
        .create("game")
        .expect("create");
    archive.open(None).await.expect("open");

    assert_eq!(read(archive.as_ref(), "shared.txt").await, Some(b"from base".to_vec()));
    assert_eq!(read(archive.as_ref(), "patch/only.txt").await, Some(b"patch only".to_vec()));
    // Name prefix selects the child explicitly
    assert_eq!(read(archive.as_ref(), "patch:shared.txt").await, Some(b"from patch".to_vec()));
    assert_eq!(read(archive.as_ref(), "missing.txt").await, None);
}

#[tokio::test]
async fn composite_of_one_is_the_child() {
    common::init_tracing();
    let (ctx, fs) = memory_context(ArchiveOptions::default());
    install(&fs);

    let child: Arc<dyn Archive> = BinaryArchive::for_game(ctx, "game/base.pak").expect("child");
    let composite = MultiArchive::compose("game", Arc::new(demo_game()), vec![Arc::clone(&child)])
        .expect("compose");
    assert!(Arc::ptr_eq(&composite, &child));

    composite.open(None).await.expect("open");
    assert!(child.is_opened());
    assert_eq!(composite.count(), child.count());
    assert_eq!(read(composite.as_ref(), "shared.txt").await, read(child.as_ref(), "shared.txt").await);
}

#[tokio::test]
async fn source_comes_from_owning_child() {
    common::init_tracing();
    let (ctx, fs) = memory_context(ArchiveOptions::default());
    install(&fs);

    let base = BinaryArchive::for_game(ctx.clone(), "game/base.pak").expect("base");
    let patch = BinaryArchive::for_game(ctx, "game/patch.pak").expect("patch");
    let multi = MultiArchive::new(
        "game",
        Arc::new(demo_game()),
        vec![Arc::clone(&base) as Arc<dyn Archive>, Arc::clone(&patch) as Arc<dyn Archive>],
    );
    multi.open(None).await.expect("open");

    let source = multi
        .get_source(&Key::from("patch/only.txt"), true)
        .await
        .expect("resolve")
        .expect("present");
    assert!(Arc::ptr_eq(&source.archive, &patch));

    // Entry keys route to whichever child owns the entry
    let by_entry = multi
        .get_source(&Key::from(&source.entry), true)
        .await
        .expect("resolve")
        .expect("present");
    assert!(Arc::ptr_eq(&by_entry.entry, &source.entry));
}

#[tokio::test]
async fn accessors_require_open_composite() {
    let (ctx, fs) = memory_context(ArchiveOptions::default());
    install(&fs);
    let base = BinaryArchive::for_game(ctx, "game/base.pak").expect("base");
    let multi = MultiArchive::new("game", Arc::new(demo_game()), vec![base as Arc<dyn Archive>]);

    assert!(matches!(
        multi.contains(&Key::from("shared.txt")).await,
        Err(VfsError::NotOpened(_))
    ));
}

#[tokio::test]
async fn directory_search_unions_loose_files() {
    common::init_tracing();
    let (_ctx, fs) = memory_context(ArchiveOptions::default());
    install(&fs);

    let archive = ArchiveFactory::new(context(&fs, SearchBy::AllDir))
        .create("game")
        .expect("create");
    let mut meta = Vec::new();
    archive.open(Some(&mut meta)).await.expect("open");

    assert_eq!(archive.count(), 3);
    assert_eq!(read(archive.as_ref(), "notes/readme.txt").await, Some(b"loose".to_vec()));
    assert_eq!(
        read(archive.as_ref(), "patch.pak:shared.txt").await,
        Some(b"from patch".to_vec())
    );

    let names: Vec<&str> = meta.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["base.pak", "notes", "patch.pak"]);
}
