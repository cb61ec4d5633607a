//! Per-archive configuration

use serde::{Deserialize, Serialize};

use crate::{Result, VfsError};

/// Default number of idle handles retained per backing path.
pub const DEFAULT_POOL_RETAIN: usize = 10;

/// Options applied to a container when it is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// Build the numeric id index on open
    pub use_file_id: bool,

    /// Read the table of contents through the handle pool instead of a
    /// one-shot handle
    pub use_reader: bool,

    /// Idle handles kept per backing path
    pub pool_retain: usize,

    /// Characters stripped from entry paths in the metadata projection
    pub path_skip: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            use_file_id: false,
            use_reader: true,
            pool_retain: DEFAULT_POOL_RETAIN,
            path_skip: 0,
        }
    }
}

impl ArchiveOptions {
    /// Parse options from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VfsError::InvalidConfiguration(format!("archive options: {e}")))
    }

    /// Enable or disable the id index
    #[must_use]
    pub const fn with_file_id(mut self, enable: bool) -> Self {
        self.use_file_id = enable;
        self
    }

    /// Enable or disable pooled table-of-contents reads
    #[must_use]
    pub const fn with_reader(mut self, pooled: bool) -> Self {
        self.use_reader = pooled;
        self
    }

    /// Set the idle-handle retention threshold
    #[must_use]
    pub const fn with_pool_retain(mut self, retain: usize) -> Self {
        self.pool_retain = retain;
        self
    }

    /// Set the metadata path-prefix skip
    #[must_use]
    pub const fn with_path_skip(mut self, skip: usize) -> Self {
        self.path_skip = skip;
        self
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ArchiveOptions::default();
        assert!(!options.use_file_id);
        assert!(options.use_reader);
        assert_eq!(options.pool_retain, DEFAULT_POOL_RETAIN);
        assert_eq!(options.path_skip, 0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options =
            ArchiveOptions::from_json(r#"{ "use_file_id": true, "pool_retain": 2 }"#).expect("parse");
        assert!(options.use_file_id);
        assert_eq!(options.pool_retain, 2);
        assert!(options.use_reader);
    }

    #[test]
    fn test_bad_json_is_configuration_error() {
        let err = ArchiveOptions::from_json("{ not json").expect_err("should fail");
        assert!(matches!(err, VfsError::InvalidConfiguration(_)));
    }
}
