#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Object decoding, redirects and transformation

mod common;

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use pakvfs::test_utils::{IpakBuilder, memory_context, text_decoders};
use pakvfs::{
    Archive, ArchiveExt, ArchiveOptions, BinaryArchive, DecodedObject, FileOption, Key,
    ObjectTransformer, VfsError,
};
use pretty_assertions::assert_eq;

fn decoding_archive() -> (Arc<BinaryArchive>, Arc<std::sync::atomic::AtomicUsize>) {
    common::init_tracing();
    let (ctx, fs) = memory_context(ArchiveOptions::default());
    let (factory, calls) = text_decoders();
    fs.insert(
        "data/objects.pak",
        IpakBuilder::new()
            .file(1, "docs/readme.txt", b"hello")
            .file(2, "docs/alias.ref", b"docs/readme.txt")
            .file(3, "docs/broken.bad", b"\x00\x01")
            .file(4, "bin/raw.dat", b"\xde\xad")
            .compressed(5, "docs/packed.txt", b"packed text")
            .compressed(6, "docs/size.z", &[b'q'; 512])
            .build(),
    );
    let archive = BinaryArchive::for_game(ctx.with_object_factory(factory), "data/objects.pak")
        .expect("ipak registered");
    (archive, calls)
}

#[tokio::test]
async fn decoder_is_bound_once_per_entry() {
    let (archive, calls) = decoding_archive();
    archive.open(None).await.expect("open");

    for _ in 0..3 {
        let text = archive
            .get_object::<String>("docs/readme.txt", FileOption::DEFAULT, true)
            .await
            .expect("decode")
            .expect("object");
        assert_eq!(text.as_str(), "hello");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let entry = archive
        .get_source(&Key::from("docs/readme.txt"), true)
        .await
        .expect("resolve")
        .expect("present")
        .entry;
    assert!(entry.has_decoder_binding());
}

#[tokio::test]
async fn compressed_entries_decode_after_inflation() {
    let (archive, _calls) = decoding_archive();
    archive.open(None).await.expect("open");

    let text = archive
        .get_object::<String>("docs/packed.txt", FileOption::DEFAULT, true)
        .await
        .expect("decode")
        .expect("object");
    assert_eq!(text.as_str(), "packed text");
}

#[tokio::test]
async fn redirect_yields_target_object() {
    let (archive, _calls) = decoding_archive();
    archive.open(None).await.expect("open");

    let text = archive
        .get_object::<String>("docs/alias.ref", FileOption::DEFAULT, true)
        .await
        .expect("decode")
        .expect("object");
    assert_eq!(text.as_str(), "hello");
}

#[tokio::test]
async fn entries_without_decoder_yield_bytes() {
    let (archive, _calls) = decoding_archive();
    archive.open(None).await.expect("open");

    let bytes = archive
        .get_object::<Bytes>("bin/raw.dat", FileOption::DEFAULT, true)
        .await
        .expect("decode")
        .expect("object");
    assert_eq!(&bytes[..], b"\xde\xad");

    let err = archive
        .get_object::<String>("bin/raw.dat", FileOption::DEFAULT, true)
        .await
        .expect_err("bytes are not a string");
    assert!(matches!(err, VfsError::TypeMismatch { .. }));
}

#[tokio::test]
async fn stream_loads_skip_the_decoder() {
    let (archive, calls) = decoding_archive();
    archive.open(None).await.expect("open");

    let data = archive
        .get_object::<Bytes>("docs/readme.txt", FileOption::STREAM, true)
        .await
        .expect("load")
        .expect("object");
    assert_eq!(&data[..], b"hello");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let entry = archive
        .get_source(&Key::from("docs/readme.txt"), true)
        .await
        .expect("resolve")
        .expect("present")
        .entry;
    assert!(!entry.has_decoder_binding());
}

#[tokio::test]
async fn binding_option_applies_to_the_read() {
    let (archive, _calls) = decoding_archive();
    archive.open(None).await.expect("open");

    let stored = archive
        .get_object::<usize>("docs/size.z", FileOption::DEFAULT, true)
        .await
        .expect("decode")
        .expect("object");
    let raw = archive
        .get_data(&Key::from("docs/size.z"), FileOption::RAW, true)
        .await
        .expect("read")
        .expect("data");
    assert!(*stored < 512);
    assert_eq!(*stored, raw.len());
}

#[tokio::test]
async fn decoder_failure_is_reported_with_path() {
    let (archive, _calls) = decoding_archive();
    archive.open(None).await.expect("open");

    let err = archive
        .get_object::<String>("docs/broken.bad", FileOption::DEFAULT, false)
        .await
        .expect_err("decoder fails");
    match err {
        VfsError::DecodeFailure { path, .. } => assert_eq!(path, "docs/broken.bad"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_object_respects_throw_flag() {
    let (archive, _calls) = decoding_archive();
    archive.open(None).await.expect("open");

    let quiet = archive
        .get_object::<String>("docs/none.txt", FileOption::DEFAULT, false)
        .await
        .expect("gated");
    assert!(quiet.is_none());

    assert!(matches!(
        archive
            .get_object::<String>("docs/none.txt", FileOption::DEFAULT, true)
            .await,
        Err(VfsError::NotFound(_))
    ));
}

/// Host-side representation produced by the transformer below.
#[derive(Debug, PartialEq, Eq)]
struct Shouted(String);

struct Shouter;

#[async_trait]
impl ObjectTransformer for Shouter {
    fn can_transform(&self, target: TypeId, object: &DecodedObject) -> bool {
        target == TypeId::of::<Shouted>() && object.is::<String>()
    }

    async fn transform(&self, _target: TypeId, object: DecodedObject) -> pakvfs::Result<DecodedObject> {
        let text = object
            .downcast::<String>()
            .map_err(|o| VfsError::Codec(format!("cannot shout {}", o.type_name())))?;
        Ok(DecodedObject::new(Shouted(text.to_uppercase())))
    }
}

#[tokio::test]
async fn load_object_converts_through_transformer() {
    let (archive, _calls) = decoding_archive();
    archive.open(None).await.expect("open");

    // Native type needs no transformer
    let native = archive
        .load_object::<String>("docs/readme.txt", archive.as_ref(), FileOption::DEFAULT)
        .await
        .expect("native");
    assert_eq!(native.as_str(), "hello");

    assert!(matches!(
        archive
            .load_object::<Shouted>("docs/readme.txt", archive.as_ref(), FileOption::DEFAULT)
            .await,
        Err(VfsError::TypeMismatch { .. })
    ));

    archive.set_transformer(Arc::new(Shouter));
    let shouted = archive
        .load_object::<Shouted>("docs/readme.txt", archive.as_ref(), FileOption::DEFAULT)
        .await
        .expect("transformed");
    assert_eq!(*shouted, Shouted("HELLO".to_string()));
}
