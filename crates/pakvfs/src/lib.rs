//! Uniform access to game data across package formats.
//!
//! Callers address files by path or numeric id without knowing whether they
//! live in a flat directory, a single package file, a set of packages or a
//! package nested inside another package. The layers are:
//!
//! - **Codec** ([`FormatCodec`]): parses one package format's table of
//!   contents and extracts entry bytes. Selected by name from a
//!   [`FormatRegistry`].
//! - **Container** ([`Archive`]): open/close state machine plus the
//!   `contains`/`get_source`/`get_data`/`get_object` accessors.
//!   [`BinaryArchive`] is the concrete container; it owns the entry index,
//!   the reader [`HandlePool`]s and the decode pipeline.
//! - **Composites**: [`ManyCodec`] unions loose files, [`MultiArchive`]
//!   unions independent containers by name prefix.
//! - **Projection**: [`build_tree`] folds entries into a browsable tree.
//!
//! # Path syntax
//!
//! Paths are relative and case-insensitive; either slash works. A colon
//! descends into a container-valued entry:
//!
//! ```text
//! data/outer.pak:textures/stone.dds
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use pakvfs::{ArchiveContext, ArchiveExt, ArchiveFactory, FileOption, Key};
//!
//! # async fn example(ctx: ArchiveContext) -> pakvfs::Result<()> {
//! let archive = ArchiveFactory::new(ctx).create("Data")?;
//! archive.open(None).await?;
//!
//! let bytes = archive
//!     .get_data(&Key::from("base.pak:scripts/init.lua"), FileOption::DEFAULT, true)
//!     .await?;
//! let text = archive
//!     .get_object::<String>("readme.txt", FileOption::DEFAULT, false)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_wrap)] // Format-defined ids and sizes
#![allow(clippy::cast_lossless)]

// Ambient
pub mod config;
pub mod error;

// Paths and backing stores
pub mod fs;
pub mod path;
pub mod pool;

// Entry model and lookup keys
pub mod decode;
pub mod entry;
pub mod key;

// Game collaborator seam
pub mod game;

// Containers
pub mod archive;
pub mod codec;
pub mod composite;
pub mod meta;

// Container selection
pub mod discover;
pub mod factory;

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub mod test_utils;

pub use archive::{
    Archive, ArchiveContext, ArchiveExt, BinaryArchive, EntryIndex, ObjectTransformer, OpenState,
    PathFinder, PathFinders, Source,
};
pub use codec::{CodecFactory, FormatCodec, FormatRegistry};
pub use composite::{ManyCodec, MultiArchive};
pub use config::ArchiveOptions;
pub use decode::{DecodeContext, DecodedObject, DecoderBinding, FileOption, ObjectFactory};
pub use discover::discover_paths;
pub use entry::{EntryStat, FileEntry, LazyStat};
pub use error::{BoxError, Result, VfsError};
pub use factory::ArchiveFactory;
pub use fs::{BoxReader, BoxWriter, FileStat, FileSystem, MemoryFileSystem, StandardFileSystem};
pub use game::{GameConfig, GameDescriptor, SearchBy};
pub use key::Key;
pub use meta::{MetaItem, MetaKind, build_tree};
pub use pool::{HandlePool, PoolStats, PooledHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
