//! Test utilities: a small reference package format and fixtures.
//!
//! "ipak" is a little-endian indexed package:
//!
//! ```text
//! header:  magic "IPAK" | version u16 | count u32
//! record:  id u32 | offset u64 | file_size u32 | packed_size u32
//!          | flags u8 (bit 0 = zlib) | path_len u16 | path bytes
//! data:    entry payloads at their recorded absolute offsets
//! ```

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use binrw::{BinRead, BinWrite};
use bytes::Bytes;
use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};

use crate::archive::{Archive, ArchiveContext, BinaryArchive};
use crate::codec::{FormatCodec, FormatRegistry};
use crate::config::ArchiveOptions;
use crate::decode::{DecodedObject, DecoderBinding, FileOption, ObjectFactory};
use crate::entry::FileEntry;
use crate::fs::{MemoryFileSystem, ReadHandle, WriteHandle};
use crate::error::BoxError;
use crate::game::{GameConfig, GameDescriptor};
use crate::key::Key;
use crate::path;
use crate::{Result, VfsError};

/// ipak magic bytes
pub const IPAK_MAGIC: [u8; 4] = *b"IPAK";

const IPAK_VERSION: u16 = 1;
const HEADER_SIZE: u64 = 10;
const RECORD_FIXED_SIZE: u64 = 23;

/// Entry flag: payload is zlib-compressed
pub const IPAK_ZLIB: u8 = 0x1;

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
struct IpakHeader {
    #[br(assert(magic == IPAK_MAGIC, "bad ipak magic {:?}", magic))]
    magic: [u8; 4],
    version: u16,
    count: u32,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little)]
struct IpakRecord {
    id: u32,
    offset: u64,
    file_size: u32,
    packed_size: u32,
    flags: u8,
    path_len: u16,
    #[br(count = path_len)]
    path: Vec<u8>,
}

fn codec_error(e: &binrw::Error) -> VfsError {
    VfsError::Codec(format!("ipak: {e}"))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(data, Compression::default());
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed)?;
    Ok(compressed)
}

fn inflate(data: &[u8], expected: u64) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::with_capacity(expected as usize);
    decoder.read_to_end(&mut decompressed)?;
    if decompressed.len() as u64 != expected {
        return Err(VfsError::Codec(format!(
            "ipak: inflated {} bytes, expected {expected}",
            decompressed.len()
        )));
    }
    Ok(decompressed)
}

/// Offset of the first payload: everything before it is header and records.
fn data_start(entries: &[(Arc<FileEntry>, Bytes)]) -> u64 {
    let toc_size: u64 = entries
        .iter()
        .map(|(entry, _)| RECORD_FIXED_SIZE + entry.path.len() as u64)
        .sum();
    HEADER_SIZE + toc_size
}

fn write_payload(
    writer: &mut dyn WriteHandle,
    entry: &FileEntry,
    data: &[u8],
    option: FileOption,
) -> Result<()> {
    if entry.is_compressed() && !option.contains(FileOption::RAW) {
        writer.write_all(&deflate(data)?)?;
    } else {
        writer.write_all(data)?;
    }
    Ok(())
}

/// Write header and records at the start, given where each payload landed
/// as `(offset, packed_size)`, then leave the writer at the end.
fn write_toc(
    mut writer: &mut dyn WriteHandle,
    entries: &[(Arc<FileEntry>, Bytes)],
    spans: &[(u64, u64)],
) -> Result<()> {
    writer.seek(SeekFrom::Start(0))?;
    IpakHeader {
        magic: IPAK_MAGIC,
        version: IPAK_VERSION,
        count: entries.len() as u32,
    }
    .write_le(&mut writer)
    .map_err(|e| codec_error(&e))?;

    for ((entry, data), &(offset, packed_size)) in entries.iter().zip(spans) {
        let path = entry.path.as_bytes().to_vec();
        IpakRecord {
            id: entry.id.unwrap_or_default() as u32,
            offset,
            file_size: data.len() as u32,
            packed_size: packed_size as u32,
            flags: if entry.is_compressed() { IPAK_ZLIB } else { 0 },
            path_len: path.len() as u16,
            path,
        }
        .write_le(&mut writer)
        .map_err(|e| codec_error(&e))?;
    }
    writer.seek(SeekFrom::End(0))?;
    Ok(())
}

/// Serialize a complete ipak package.
pub fn write_package(
    writer: &mut dyn WriteHandle,
    entries: &[(Arc<FileEntry>, Bytes)],
) -> Result<()> {
    writer.seek(SeekFrom::Start(data_start(entries)))?;
    let mut spans = Vec::with_capacity(entries.len());
    for (entry, data) in entries {
        let offset = writer.stream_position()?;
        write_payload(writer, entry, data, FileOption::DEFAULT)?;
        spans.push((offset, writer.stream_position()? - offset));
    }
    write_toc(writer, entries, &spans)
}

/// Reference codec for the ipak format.
#[derive(Debug, Default, Clone, Copy)]
pub struct IpakCodec;

impl IpakCodec {
    pub const NAME: &'static str = "ipak";
}

#[async_trait]
impl FormatCodec for IpakCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn read(
        &self,
        _archive: &BinaryArchive,
        reader: Option<&mut dyn ReadHandle>,
    ) -> Result<Vec<FileEntry>> {
        let Some(mut reader) = reader else {
            return Err(VfsError::NotFound("ipak backing file".to_string()));
        };
        let header = IpakHeader::read_le(&mut reader).map_err(|e| codec_error(&e))?;

        let mut entries = Vec::with_capacity(header.count as usize);
        for _ in 0..header.count {
            let record = IpakRecord::read_le(&mut reader).map_err(|e| codec_error(&e))?;
            let path = String::from_utf8_lossy(&record.path);
            entries.push(
                FileEntry::new(path.as_ref())
                    .with_id(i64::from(record.id))
                    .with_offset(record.offset)
                    .with_size(u64::from(record.file_size), u64::from(record.packed_size))
                    .with_compression(u32::from(record.flags & IPAK_ZLIB)),
            );
        }
        Ok(entries)
    }

    async fn read_data(
        &self,
        _archive: &BinaryArchive,
        reader: Option<&mut dyn ReadHandle>,
        entry: &FileEntry,
        option: FileOption,
    ) -> Result<Bytes> {
        let Some(reader) = reader else {
            return Err(VfsError::NotFound(entry.path.clone()));
        };
        reader.seek(SeekFrom::Start(entry.offset))?;
        let mut packed = vec![0u8; entry.packed_size() as usize];
        reader.read_exact(&mut packed)?;

        if entry.is_compressed() && !option.contains(FileOption::RAW) {
            inflate(&packed, entry.file_size()).map(Bytes::from)
        } else {
            Ok(Bytes::from(packed))
        }
    }

    /// Payloads go through [`write_data`](FormatCodec::write_data) first;
    /// the records are filled in once their spans are known.
    async fn write(
        &self,
        archive: &BinaryArchive,
        writer: &mut dyn WriteHandle,
        entries: &[(Arc<FileEntry>, Bytes)],
    ) -> Result<()> {
        writer.seek(SeekFrom::Start(data_start(entries)))?;
        let mut spans = Vec::with_capacity(entries.len());
        for (entry, data) in entries {
            let offset = writer.stream_position()?;
            self.write_data(archive, writer, entry, data, FileOption::DEFAULT)
                .await?;
            spans.push((offset, writer.stream_position()? - offset));
        }
        write_toc(writer, entries, &spans)
    }

    async fn write_data(
        &self,
        _archive: &BinaryArchive,
        writer: &mut dyn WriteHandle,
        entry: &FileEntry,
        data: &[u8],
        option: FileOption,
    ) -> Result<()> {
        write_payload(writer, entry, data, option)
    }
}

/// Builds ipak bytes for fixtures.
#[derive(Debug, Default)]
pub struct IpakBuilder {
    entries: Vec<(Arc<FileEntry>, Bytes)>,
}

impl IpakBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn file(mut self, id: u32, path: &str, data: &[u8]) -> Self {
        let entry = FileEntry::new(path).with_id(i64::from(id));
        self.entries
            .push((Arc::new(entry), Bytes::copy_from_slice(data)));
        self
    }

    #[must_use]
    pub fn compressed(mut self, id: u32, path: &str, data: &[u8]) -> Self {
        let entry = FileEntry::new(path)
            .with_id(i64::from(id))
            .with_compression(u32::from(IPAK_ZLIB));
        self.entries
            .push((Arc::new(entry), Bytes::copy_from_slice(data)));
        self
    }

    #[allow(clippy::expect_used)]
    pub fn build(self) -> Bytes {
        let mut cursor = std::io::Cursor::new(Vec::new());
        write_package(&mut cursor, &self.entries).expect("in-memory ipak write");
        Bytes::from(cursor.into_inner())
    }
}

/// Registry with the ipak codec.
pub fn ipak_registry() -> FormatRegistry {
    FormatRegistry::new().with(IpakCodec::NAME, || Arc::new(IpakCodec))
}

/// Game using ipak packages with the `.pak` extension.
pub fn demo_game() -> GameConfig {
    GameConfig::new("demo", IpakCodec::NAME).with_extensions(["pak"])
}

/// Context over a fresh in-memory filesystem, for the demo game.
pub fn memory_context(options: ArchiveOptions) -> (ArchiveContext, MemoryFileSystem) {
    let fs = MemoryFileSystem::new("mem");
    let ctx = ArchiveContext::new(Arc::new(fs.clone()), Arc::new(demo_game()), ipak_registry())
        .with_options(options);
    (ctx, fs)
}

/// Decoder dispatch for fixtures, with a count of dispatch calls.
///
/// - `.txt` decodes to `String`
/// - `.ref` holds another path and redirects to that entry's object
/// - `.z` decodes to the stored (possibly compressed) length as `usize`
/// - `.bad` always fails
/// - anything else has no decoder
pub fn text_decoders() -> (ObjectFactory, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let factory: ObjectFactory = Arc::new(move |entry: &FileEntry, _game: &dyn GameDescriptor| {
        counter.fetch_add(1, Ordering::SeqCst);
        match path::extension(&entry.path).as_deref() {
            Some(".txt") => Some(DecoderBinding::sync(FileOption::DEFAULT, |ctx| {
                let text = String::from_utf8(ctx.reader.into_inner().to_vec())?;
                Ok(DecodedObject::new(text))
            })),
            Some(".ref") => Some(DecoderBinding::new(FileOption::DEFAULT, |ctx| async move {
                let target = String::from_utf8(ctx.reader.into_inner().to_vec())?;
                let object = ctx
                    .archive
                    .get_object_dyn(&Key::from(target.trim()), None, FileOption::DEFAULT, true)
                    .await?
                    .ok_or("redirect target has no object")?;
                Ok::<_, BoxError>(DecodedObject::redirect(object))
            })),
            // Decodes to the stored length, so compressed entries stay packed
            Some(".z") => Some(DecoderBinding::sync(FileOption::RAW, |ctx| {
                Ok(DecodedObject::new(ctx.reader.into_inner().len()))
            })),
            Some(".bad") => Some(DecoderBinding::sync(FileOption::DEFAULT, |_ctx| {
                Err("corrupt payload".into())
            })),
            _ => None,
        }
    });
    (factory, calls)
}
