//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use pakvfs::test_utils::{IpakBuilder, memory_context};
use pakvfs::{ArchiveContext, ArchiveOptions, BinaryArchive, MemoryFileSystem};

/// Install a subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Package with two text entries and one compressed binary entry.
pub fn base_pak() -> Bytes {
    IpakBuilder::new()
        .file(10, "a/b.txt", b"0123456789")
        .file(11, "a/c.txt", b"12345")
        .compressed(12, "bin/blob.dat", &[7u8; 256])
        .build()
}

/// Memory filesystem holding `data/base.pak` and return an unopened
/// container over it.
pub fn base_archive(options: ArchiveOptions) -> (ArchiveContext, MemoryFileSystem, Arc<BinaryArchive>) {
    init_tracing();
    let (ctx, fs) = memory_context(options);
    fs.insert("data/base.pak", base_pak());
    let archive = BinaryArchive::for_game(ctx.clone(), "data/base.pak").expect("ipak registered");
    (ctx, fs, archive)
}
