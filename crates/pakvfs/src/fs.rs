//! Filesystem seam.
//!
//! Containers never touch the OS filesystem directly. Everything goes
//! through [`FileSystem`], so network- or memory-backed stores work the
//! same way as a local directory.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use glob::{MatchOptions, Pattern};
use tracing::debug;
use walkdir::WalkDir;

use crate::path;
use crate::{Result, VfsError};

/// Readable, seekable handle onto backing bytes.
pub trait ReadHandle: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadHandle for T {}

/// Writable, seekable handle onto backing bytes.
pub trait WriteHandle: Write + Seek + Send {}
impl<T: Write + Seek + Send> WriteHandle for T {}

/// Boxed reader handed out by a [`FileSystem`].
pub type BoxReader = Box<dyn ReadHandle>;

/// Boxed writer handed out by a [`FileSystem`].
pub type BoxWriter = Box<dyn WriteHandle>;

/// Result of [`FileSystem::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Path as passed to `stat`
    pub path: String,
    /// Length in bytes
    pub length: u64,
}

/// Backing store for containers. Paths are relative to [`FileSystem::root`].
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Describes where the filesystem is anchored.
    fn root(&self) -> &str;

    /// Files below `path` whose path relative to `path` matches `pattern`.
    /// Returned paths are relative to the root and sorted.
    fn glob(&self, path: &str, pattern: &str) -> Result<Vec<String>>;

    /// True for existing files and directories.
    fn exists(&self, path: &str) -> bool;

    /// Size of a file, `None` if it does not exist.
    fn stat(&self, path: &str) -> Option<FileStat>;

    fn open_read(&self, path: &str) -> Result<BoxReader>;

    /// Creates or truncates the file.
    fn open_write(&self, path: &str) -> Result<BoxWriter>;
}

fn compile_pattern(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern)
        .map_err(|e| VfsError::InvalidConfiguration(format!("bad search pattern {pattern}: {e}")))
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Filesystem rooted at an OS directory.
#[derive(Debug, Clone)]
pub struct StandardFileSystem {
    root: PathBuf,
    display: String,
}

impl StandardFileSystem {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let display = root.display().to_string();
        Self { root, display }
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        let relative = path::normalize(relative);
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

impl FileSystem for StandardFileSystem {
    fn root(&self) -> &str {
        &self.display
    }

    fn glob(&self, path: &str, pattern: &str) -> Result<Vec<String>> {
        let pattern = compile_pattern(pattern)?;
        let base = self.resolve(path);
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&base).follow_links(true).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&base) else {
                continue;
            };
            let relative = path::normalize(&relative.to_string_lossy());
            if pattern.matches_with(&relative, MATCH_OPTIONS) {
                found.push(path::join(path, &relative));
            }
        }
        found.sort();
        debug!("glob {}/{} matched {} files", self.display, path, found.len());
        Ok(found)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn stat(&self, path: &str) -> Option<FileStat> {
        let metadata = fs::metadata(self.resolve(path)).ok()?;
        metadata.is_file().then(|| FileStat {
            path: path.to_string(),
            length: metadata.len(),
        })
    }

    fn open_read(&self, path: &str) -> Result<BoxReader> {
        let file = File::open(self.resolve(path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self, path: &str) -> Result<BoxWriter> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(File::create(target)?))
    }
}

/// In-memory filesystem. Lookups are case-insensitive; writes become visible
/// when the writer is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    root: String,
    files: Arc<DashMap<String, (String, Bytes)>>,
}

impl MemoryFileSystem {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            files: Arc::new(DashMap::new()),
        }
    }

    /// Add or replace a file.
    pub fn insert(&self, path: &str, data: impl Into<Bytes>) {
        self.files
            .insert(path::lookup_key(path), (path::normalize(path), data.into()));
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.remove(&path::lookup_key(path)).is_some()
    }

    /// Current contents of a file.
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.files
            .get(&path::lookup_key(path))
            .map(|entry| entry.value().1.clone())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileSystem for MemoryFileSystem {
    fn root(&self) -> &str {
        &self.root
    }

    fn glob(&self, path: &str, pattern: &str) -> Result<Vec<String>> {
        let pattern = compile_pattern(pattern)?;
        let base = path::lookup_key(path);
        let mut found: Vec<String> = self
            .files
            .iter()
            .filter_map(|entry| {
                let (original, _) = entry.value();
                let relative = if base.is_empty() {
                    original.as_str()
                } else {
                    let rest = entry.key().strip_prefix(&base)?.strip_prefix('/')?;
                    original.get(original.len().checked_sub(rest.len())?..)?
                };
                pattern
                    .matches_with(relative, MATCH_OPTIONS)
                    .then(|| original.clone())
            })
            .collect();
        found.sort();
        Ok(found)
    }

    fn exists(&self, path: &str) -> bool {
        let key = path::lookup_key(path);
        if key.is_empty() || self.files.contains_key(&key) {
            return true;
        }
        let dir = format!("{key}/");
        self.files.iter().any(|entry| entry.key().starts_with(&dir))
    }

    fn stat(&self, path: &str) -> Option<FileStat> {
        self.files
            .get(&path::lookup_key(path))
            .map(|entry| FileStat {
                path: path.to_string(),
                length: entry.value().1.len() as u64,
            })
    }

    fn open_read(&self, path: &str) -> Result<BoxReader> {
        let data = self
            .get(path)
            .ok_or_else(|| VfsError::NotFound(format!("{}/{path}", self.root)))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_write(&self, path: &str) -> Result<BoxWriter> {
        Ok(Box::new(MemoryWriter {
            files: Arc::clone(&self.files),
            path: path::normalize(path),
            buffer: Cursor::new(Vec::new()),
        }))
    }
}

/// Buffers writes and publishes them to the owning [`MemoryFileSystem`] on drop.
struct MemoryWriter {
    files: Arc<DashMap<String, (String, Bytes)>>,
    path: String,
    buffer: Cursor<Vec<u8>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryWriter {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let data = Bytes::from(std::mem::take(self.buffer.get_mut()));
        self.files
            .insert(path::lookup_key(&self.path), (self.path.clone(), data));
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_round_trip_and_case_insensitivity() {
        let fs = MemoryFileSystem::new("mem");
        fs.insert("Data/Readme.TXT", &b"hello"[..]);

        assert!(fs.exists("data/readme.txt"));
        assert!(fs.exists("data"));
        assert!(!fs.exists("other"));
        assert_eq!(fs.stat("DATA/README.txt").map(|s| s.length), Some(5));

        let mut reader = fs.open_read("data/readme.txt").expect("open");
        let mut out = String::new();
        reader.read_to_string(&mut out).expect("read");
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_memory_writer_publishes_on_drop() {
        let fs = MemoryFileSystem::new("mem");
        {
            let mut writer = fs.open_write("out/a.bin").expect("open");
            writer.write_all(b"abcdef").expect("write");
            writer.seek(SeekFrom::Start(0)).expect("seek");
            writer.write_all(b"X").expect("write");
            assert!(fs.get("out/a.bin").is_none());
        }
        assert_eq!(fs.get("out/a.bin").as_deref(), Some(&b"Xbcdef"[..]));
    }

    #[test]
    fn test_memory_glob_relative_to_path() {
        let fs = MemoryFileSystem::new("mem");
        fs.insert("game/a.pak", &b"1"[..]);
        fs.insert("game/sub/b.PAK", &b"2"[..]);
        fs.insert("game/c.txt", &b"3"[..]);
        fs.insert("other/d.pak", &b"4"[..]);

        let found = fs.glob("game", "*.pak").expect("glob");
        assert_eq!(found, vec!["game/a.pak".to_string(), "game/sub/b.PAK".to_string()]);
    }

    #[test]
    fn test_standard_filesystem() {
        let dir = tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("x/y")).expect("mkdir");
        std::fs::write(dir.path().join("x/a.pak"), b"abc").expect("write");
        std::fs::write(dir.path().join("x/y/b.txt"), b"hello").expect("write");

        let fs = StandardFileSystem::new(dir.path());
        assert!(fs.exists("x"));
        assert_eq!(fs.stat("x/y/b.txt").map(|s| s.length), Some(5));
        assert!(fs.stat("x").is_none());

        let all = fs.glob("x", "*").expect("glob");
        assert_eq!(all, vec!["x/a.pak".to_string(), "x/y/b.txt".to_string()]);

        {
            let mut writer = fs.open_write("new/dir/c.bin").expect("write");
            writer.write_all(b"zz").expect("write");
        }
        assert_eq!(fs.stat("new/dir/c.bin").map(|s| s.length), Some(2));
    }

    #[test]
    fn test_bad_pattern_is_configuration_error() {
        let fs = MemoryFileSystem::new("mem");
        let err = fs.glob("", "[").expect_err("bad pattern");
        assert!(matches!(err, VfsError::InvalidConfiguration(_)));
    }
}
