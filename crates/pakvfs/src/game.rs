//! Game descriptors: the catalog collaborator seen from the archive layer.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path;
use crate::{Result, VfsError};

/// How candidate paths are enumerated below an install root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchBy {
    /// No search; the root itself is the container
    #[default]
    Default,
    /// Package files matching the container extensions, any depth
    Pak,
    /// Files directly under the root
    TopDir,
    /// Files at most two levels deep
    TwoDir,
    /// Files below the first directory level
    DirDown,
    /// Every file, any depth
    AllDir,
}

/// What the archive layer needs to know about a game edition.
pub trait GameDescriptor: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Format identifier resolved through [`crate::FormatRegistry`].
    fn format(&self) -> &str;

    /// Container extensions, lowercase with a leading dot.
    fn archive_extensions(&self) -> &[String];

    fn search_by(&self) -> SearchBy {
        SearchBy::Default
    }

    /// Glob applied by the search pass.
    fn search_pattern(&self) -> &str {
        "*"
    }

    /// Whether `path` names a container this game recognizes.
    fn is_archive_path(&self, path: &str) -> bool {
        path::extension(path)
            .is_some_and(|ext| self.archive_extensions().iter().any(|e| *e == ext))
    }
}

fn default_pattern() -> String {
    "*".to_string()
}

/// Serde-backed [`GameDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub id: String,
    pub format: String,
    #[serde(default)]
    pub archive_extensions: Vec<String>,
    #[serde(default)]
    pub search_by: SearchBy,
    #[serde(default = "default_pattern")]
    pub search_pattern: String,
}

impl GameConfig {
    pub fn new(id: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            format: format.into(),
            archive_extensions: Vec::new(),
            search_by: SearchBy::Default,
            search_pattern: default_pattern(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| VfsError::InvalidConfiguration(format!("game config: {e}")))?;
        Ok(config.normalized())
    }

    /// Accepts `"pak"`, `".PAK"` and similar.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.archive_extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_search(mut self, search_by: SearchBy, pattern: impl Into<String>) -> Self {
        self.search_by = search_by;
        self.search_pattern = pattern.into();
        self
    }

    fn normalized(mut self) -> Self {
        self.archive_extensions = self
            .archive_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .collect();
        self
    }
}

fn normalize_extension(extension: &str) -> String {
    let lower = extension.trim().to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

impl GameDescriptor for GameConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn format(&self) -> &str {
        &self.format
    }

    fn archive_extensions(&self) -> &[String] {
        &self.archive_extensions
    }

    fn search_by(&self) -> SearchBy {
        self.search_by
    }

    fn search_pattern(&self) -> &str {
        &self.search_pattern
    }
}
