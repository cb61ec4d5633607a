//! Search pass: enumerate candidate paths below an install root.

use tracing::debug;

use crate::Result;
use crate::fs::FileSystem;
use crate::game::{GameDescriptor, SearchBy};
use crate::path;

fn relative_to<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    if root.is_empty() {
        return Some(path);
    }
    let head = path.get(..root.len())?;
    if !head.eq_ignore_ascii_case(root) {
        return None;
    }
    path.get(root.len()..)?.strip_prefix('/')
}

/// Paths below `root`, relative to it and sorted, selected by the game's
/// [`SearchBy`] policy and search pattern.
pub fn discover_paths(
    fs: &dyn FileSystem,
    root: &str,
    game: &dyn GameDescriptor,
) -> Result<Vec<String>> {
    let search_by = game.search_by();
    if search_by == SearchBy::Default {
        return Ok(Vec::new());
    }

    let root = path::normalize(root);
    let mut found: Vec<String> = fs
        .glob(&root, game.search_pattern())?
        .iter()
        .filter_map(|p| relative_to(&root, p))
        .filter(|p| {
            let depth = path::depth(p);
            match search_by {
                SearchBy::Default => false,
                SearchBy::Pak => game.is_archive_path(p),
                SearchBy::TopDir => depth == 1,
                SearchBy::TwoDir => depth <= 2,
                SearchBy::DirDown => depth >= 2,
                SearchBy::AllDir => true,
            }
        })
        .map(str::to_string)
        .collect();
    found.sort();

    debug!(
        "Search {:?} under {}/{root} found {} paths",
        search_by,
        fs.root(),
        found.len()
    );
    Ok(found)
}
