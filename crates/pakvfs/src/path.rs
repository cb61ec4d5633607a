//! Path syntax shared by every container kind.
//!
//! Paths are relative, may use either slash, and compare case-insensitively.
//! A colon addresses an entry inside a container-valued entry:
//! `"data/outer.pak:textures/stone.dds"`.

/// Separator between a container entry and the path inside it.
pub const NESTING_SEPARATOR: char = ':';

/// Normalize a path to forward slashes without leading, trailing or
/// repeated separators. Case is preserved.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for part in path.split(['/', '\\']) {
        if part.is_empty() || part == "." {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

/// Key used for case-insensitive lookups.
pub fn lookup_key(path: &str) -> String {
    normalize(path).to_lowercase()
}

/// Split `"outer.pak:inner/path"` into its container entry and inner path.
pub fn split_nested(path: &str) -> Option<(&str, &str)> {
    path.split_once(NESTING_SEPARATOR)
        .filter(|(outer, _)| !outer.is_empty())
}

/// Split on the first path separator or nesting colon.
pub fn split_prefix(path: &str) -> Option<(&str, &str)> {
    let pos = path.find(['/', '\\', NESTING_SEPARATOR])?;
    Some((&path[..pos], &path[pos + 1..]))
}

/// Final path component.
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\', NESTING_SEPARATOR])
        .next()
        .unwrap_or(path)
}

/// Lowercase extension including the dot, e.g. `".pak"`.
pub fn extension(path: &str) -> Option<String> {
    let name = file_name(path);
    let pos = name.rfind('.')?;
    if pos == 0 {
        return None;
    }
    Some(name[pos..].to_lowercase())
}

/// Join a base directory and a relative path.
pub fn join(base: &str, relative: &str) -> String {
    let base = normalize(base);
    let relative = normalize(relative);
    match (base.is_empty(), relative.is_empty()) {
        (true, _) => relative,
        (false, true) => base,
        (false, false) => format!("{base}/{relative}"),
    }
}

/// Number of components in a normalized relative path.
pub fn depth(path: &str) -> usize {
    normalize(path).split('/').filter(|p| !p.is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a\\b//c/"), "a/b/c");
        assert_eq!(normalize("/./Textures\\Stone.dds"), "Textures/Stone.dds");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_lookup_key_is_case_insensitive() {
        assert_eq!(lookup_key("A\\B.TXT"), lookup_key("a/b.txt"));
    }

    #[test]
    fn test_split_nested() {
        assert_eq!(
            split_nested("a/outer.pak:inner/x.txt"),
            Some(("a/outer.pak", "inner/x.txt"))
        );
        assert_eq!(split_nested("x.pak:y.pak:z"), Some(("x.pak", "y.pak:z")));
        assert_eq!(split_nested("plain/path"), None);
        assert_eq!(split_nested(":x"), None);
    }

    #[test]
    fn test_split_prefix() {
        assert_eq!(split_prefix("data/x.txt"), Some(("data", "x.txt")));
        assert_eq!(split_prefix("data:x.txt"), Some(("data", "x.txt")));
        assert_eq!(split_prefix("x.txt"), None);
    }

    #[test]
    fn test_file_name_and_extension() {
        assert_eq!(file_name("a/b/c.PAK"), "c.PAK");
        assert_eq!(file_name("outer.pak:inner.pak"), "inner.pak");
        assert_eq!(extension("a/b/c.PAK").as_deref(), Some(".pak"));
        assert_eq!(extension("a/.hidden"), None);
        assert_eq!(extension("a/noext"), None);
    }

    #[test]
    fn test_join_and_depth() {
        assert_eq!(join("", "a/b"), "a/b");
        assert_eq!(join("root\\", "a"), "root/a");
        assert_eq!(join("root", ""), "root");
        assert_eq!(depth("a/b/c"), 3);
        assert_eq!(depth(""), 0);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(path in "[a-zA-Z0-9_./\\\\]{0,40}") {
            let once = normalize(&path);
            prop_assert_eq!(normalize(&once), once.clone());
            prop_assert!(!once.contains('\\'));
            prop_assert!(!once.starts_with('/'));
            prop_assert!(!once.ends_with('/'));
            prop_assert!(!once.contains("//"));
        }
    }
}
