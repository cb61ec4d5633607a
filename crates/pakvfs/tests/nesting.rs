#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Containers stored as entries of other containers

mod common;

use std::sync::Arc;

use bytes::Bytes;
use pakvfs::test_utils::{IpakBuilder, memory_context};
use pakvfs::{Archive, ArchiveOptions, BinaryArchive, FileOption, Key, MetaKind, VfsError};
use pretty_assertions::assert_eq;

fn inner_pak() -> Bytes {
    IpakBuilder::new()
        .file(1, "y.txt", b"inner text")
        .compressed(2, "deep/z.bin", &[3u8; 64])
        .build()
}

fn outer_archive() -> Arc<BinaryArchive> {
    common::init_tracing();
    let (ctx, fs) = memory_context(ArchiveOptions::default());
    fs.insert(
        "data/outer.pak",
        IpakBuilder::new()
            .file(1, "readme.txt", b"outer")
            .file(2, "x.pak", &inner_pak())
            .build(),
    );
    BinaryArchive::for_game(ctx, "data/outer.pak").expect("ipak registered")
}

#[tokio::test]
async fn nested_path_matches_standalone_container() {
    let outer = outer_archive();
    outer.open(None).await.expect("open");

    let (ctx, _fs) = memory_context(ArchiveOptions::default());
    let standalone = BinaryArchive::from_bytes(
        ctx.clone(),
        "x.pak",
        inner_pak(),
        ctx.registry.create("ipak").expect("codec"),
    );
    standalone.open(None).await.expect("open");

    for path in ["y.txt", "deep/z.bin"] {
        let via_outer = outer
            .get_data(&Key::from(format!("x.pak:{path}")), FileOption::DEFAULT, true)
            .await
            .expect("nested read")
            .expect("data");
        let direct = standalone
            .get_data(&Key::from(path), FileOption::DEFAULT, true)
            .await
            .expect("direct read")
            .expect("data");
        assert_eq!(via_outer, direct, "{path}");
    }
}

#[tokio::test]
async fn nested_source_points_at_inner_container() {
    let outer = outer_archive();
    outer.open(None).await.expect("open");

    let source = outer
        .get_source(&Key::from("X.PAK:y.txt"), true)
        .await
        .expect("resolve")
        .expect("present");
    assert_eq!(source.entry.path, "y.txt");
    assert_eq!(source.archive.path(), "data/outer.pak:x.pak");
    assert!(!Arc::ptr_eq(&source.archive, &outer));

    // The inner entry also resolves through the outer container
    assert!(outer.contains(&Key::from(&source.entry)).await.expect("contains"));
}

#[tokio::test]
async fn nested_container_is_opened_once() {
    let outer = outer_archive();
    outer.open(None).await.expect("open");

    let first = outer
        .get_source(&Key::from("x.pak:y.txt"), true)
        .await
        .expect("resolve")
        .expect("present");
    let second = outer
        .get_source(&Key::from("x.pak:deep/z.bin"), true)
        .await
        .expect("resolve")
        .expect("present");
    assert!(Arc::ptr_eq(&first.archive, &second.archive));

    let holder = outer
        .get_source(&Key::from("x.pak"), true)
        .await
        .expect("resolve")
        .expect("present")
        .entry;
    let nested = holder.nested_archive().expect("materialized");
    assert!(Arc::ptr_eq(nested, &first.archive));
}

#[tokio::test]
async fn close_releases_nested_containers() {
    let outer = outer_archive();
    outer.open(None).await.expect("open");
    let inner = outer
        .get_source(&Key::from("x.pak:y.txt"), true)
        .await
        .expect("resolve")
        .expect("present")
        .archive;
    assert!(inner.is_opened());

    outer.close().await.expect("close");
    assert!(!inner.is_opened());
}

#[tokio::test]
async fn missing_nested_path_is_not_found() {
    let outer = outer_archive();
    outer.open(None).await.expect("open");

    assert!(!outer.contains(&Key::from("x.pak:none.txt")).await.expect("contains"));
    assert!(!outer.contains(&Key::from("none.pak:y.txt")).await.expect("contains"));
    // A plain file is not a container
    assert!(matches!(
        outer.get_data(&Key::from("readme.txt:y.txt"), FileOption::DEFAULT, true).await,
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn metadata_expands_nested_containers() {
    let outer = outer_archive();
    let mut meta = Vec::new();
    outer.open(Some(&mut meta)).await.expect("open");

    let nested = meta
        .iter()
        .find(|item| item.name == "x.pak")
        .expect("container item");
    assert_eq!(nested.kind, MetaKind::Archive);
    assert_eq!(nested.file_count(), 2);
}

#[tokio::test]
async fn nesting_resolves_through_two_levels() {
    common::init_tracing();
    let (ctx, fs) = memory_context(ArchiveOptions::default());
    let innermost = IpakBuilder::new().file(1, "c.txt", b"deepest").build();
    let middle = IpakBuilder::new().file(1, "b.pak", &innermost).build();
    fs.insert("a.pak", IpakBuilder::new().file(1, "mid.pak", &middle).build());
    let outer = BinaryArchive::for_game(ctx, "a.pak").expect("ipak registered");
    outer.open(None).await.expect("open");

    let key = Key::from("mid.pak:b.pak:c.txt");
    let data = outer
        .get_data(&key, FileOption::DEFAULT, true)
        .await
        .expect("read")
        .expect("data");
    assert_eq!(&data[..], b"deepest");

    let source = outer.get_source(&key, true).await.expect("resolve").expect("present");
    assert_eq!(source.entry.path, "c.txt");
    assert!(outer.contains(&Key::from(&source.entry)).await.expect("contains"));

    outer.close().await.expect("close");
    assert!(!source.archive.is_opened());
}
