//! File entries: one indexed file inside a container.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::OnceCell;
use tracing::warn;

use crate::Result;
use crate::archive::BinaryArchive;
use crate::decode::DecoderBinding;

/// Sizes and hash that a codec may defer until first access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryStat {
    /// Uncompressed size
    pub file_size: u64,
    /// Size as stored
    pub packed_size: u64,
    /// Optional content hash
    pub hash: Option<u64>,
}

/// Deferred population of [`EntryStat`], run at most once per entry.
pub type LazyStat = Arc<dyn Fn(&FileEntry) -> Result<EntryStat> + Send + Sync>;

/// Descriptor for one logical file inside a container.
///
/// Owned by exactly one container index; composites hand out the same
/// `Arc<FileEntry>` rather than copies.
pub struct FileEntry {
    /// Format-defined numeric id
    pub id: Option<i64>,
    /// Normalized path (forward slashes, case preserved)
    pub path: String,
    /// Byte offset inside the backing store
    pub offset: u64,
    /// Compression method bits; zero means stored
    pub compressed: u32,
    /// Format-defined flag bits
    pub flags: u32,
    stat: OnceLock<EntryStat>,
    lazy: Option<LazyStat>,
    tag: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) decoder: OnceLock<Option<DecoderBinding>>,
    pub(crate) nested: OnceCell<Arc<BinaryArchive>>,
}

impl FileEntry {
    /// Flag set on entries whose path names a container format.
    pub const FLAG_NESTED: u32 = 0x1;

    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            id: None,
            path: crate::path::normalize(path.as_ref()),
            offset: 0,
            compressed: 0,
            flags: 0,
            stat: OnceLock::new(),
            lazy: None,
            tag: None,
            decoder: OnceLock::new(),
            nested: OnceCell::new(),
        }
    }

    #[must_use]
    pub const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub const fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Known sizes; no lazy population happens for this entry.
    #[must_use]
    pub fn with_size(self, file_size: u64, packed_size: u64) -> Self {
        self.with_stat(EntryStat {
            file_size,
            packed_size,
            hash: None,
        })
    }

    #[must_use]
    pub fn with_stat(mut self, stat: EntryStat) -> Self {
        self.stat = OnceLock::from(stat);
        self
    }

    #[must_use]
    pub const fn with_compression(mut self, compressed: u32) -> Self {
        self.compressed = compressed;
        self
    }

    #[must_use]
    pub const fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Defer sizes and hash to `lazy`, called on first access.
    #[must_use]
    pub fn with_lazy(mut self, lazy: LazyStat) -> Self {
        self.lazy = Some(lazy);
        self
    }

    /// Attach codec-private data.
    #[must_use]
    pub fn with_tag<T: Any + Send + Sync>(mut self, tag: T) -> Self {
        self.tag = Some(Arc::new(tag));
        self
    }

    /// Sizes and hash, populating them on first call if deferred.
    pub fn stat(&self) -> EntryStat {
        *self.stat.get_or_init(|| {
            let Some(lazy) = &self.lazy else {
                return EntryStat::default();
            };
            lazy(self).unwrap_or_else(|e| {
                warn!("Failed to populate {}: {e}", self.path);
                EntryStat::default()
            })
        })
    }

    pub fn file_size(&self) -> u64 {
        self.stat().file_size
    }

    pub fn packed_size(&self) -> u64 {
        self.stat().packed_size
    }

    pub fn hash(&self) -> Option<u64> {
        self.stat().hash
    }

    /// Whether sizes are available without running the lazy callback.
    pub fn is_populated(&self) -> bool {
        self.stat.get().is_some()
    }

    pub const fn is_compressed(&self) -> bool {
        self.compressed != 0
    }

    pub const fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn tag<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.tag.as_ref()?.downcast_ref::<T>()
    }

    /// Nested container, if it has been opened through this entry.
    pub fn nested_archive(&self) -> Option<&Arc<BinaryArchive>> {
        self.nested.get()
    }

    /// Whether a decoder binding has been resolved for this entry.
    pub fn has_decoder_binding(&self) -> bool {
        matches!(self.decoder.get(), Some(Some(_)))
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("compressed", &self.compressed)
            .field("flags", &self.flags)
            .field("stat", &self.stat.get())
            .field("lazy", &self.lazy.is_some())
            .field("nested", &self.nested.initialized())
            .finish_non_exhaustive()
    }
}
