//! Cross-file reference repair: after a batch of moves, relative `src=`,
//! `href=`, and `url(...)` references in text files would dangle. This module
//! finds them, resolves them against where the referencing file *used* to
//! be, and rewrites them relative to where it ends up.
//!
//! Everything works off the global path map — original path to destination
//! for every node in the tree — which the execution engine computes before
//! any disk mutation.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::tree::FileTree;

/// Extensions whose files get a reference-repair pass after execution.
pub const REPAIRABLE_EXTENSIONS: &[&str] = &["html", "htm", "css", "js", "php"];

/// The global original→destination mapping over every tree node, with a
/// reverse index for looking up where a destination file came from.
#[derive(Debug, Default)]
pub struct PathMap {
    forward: HashMap<PathBuf, PathBuf>,
    reverse: HashMap<PathBuf, PathBuf>,
}

impl PathMap {
    /// Builds the map over the full tree, not just staged nodes — reference
    /// resolution needs to know where every possible link target ends up,
    /// including files that aren't moving.
    pub fn from_tree(tree: &FileTree) -> PathMap {
        let mut map = PathMap::default();

        for node in tree.descendants(tree.root_id()) {
            map.forward
                .insert(node.original_path.clone(), node.destination_path.clone());
            map.reverse
                .insert(node.destination_path.clone(), node.original_path.clone());
        }

        map
    }

    pub fn destination_of(&self, original: &Path) -> Option<&PathBuf> {
        self.forward.get(original)
    }

    pub fn original_of(&self, destination: &Path) -> Option<&PathBuf> {
        self.reverse.get(destination)
    }

    /// Every (original, destination) pair.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &PathBuf)> {
        self.forward.iter()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

pub fn is_repairable(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            REPAIRABLE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn attribute_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:src|href)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
    })
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^"')\s]+))\s*\)"#).unwrap()
    })
}

/// A reference value found in file text, with the byte range of just the
/// value (not the surrounding attribute syntax).
#[derive(Debug, Clone, PartialEq, Eq)]
struct FoundReference {
    range: Range<usize>,
    value: String,
}

fn find_references(contents: &str) -> Vec<FoundReference> {
    let mut found = Vec::new();

    for regex in [attribute_regex(), url_regex()] {
        for captures in regex.captures_iter(contents) {
            let group = (1..captures.len()).find_map(|index| captures.get(index));
            if let Some(group) = group {
                found.push(FoundReference {
                    range: group.range(),
                    value: group.as_str().to_owned(),
                });
            }
        }
    }

    found.sort_by_key(|reference| reference.range.start);
    found.dedup_by_key(|reference| reference.range.start);
    found
}

/// Values that aren't relative filesystem references and must be left alone.
fn is_external(value: &str) -> bool {
    value.is_empty()
        || value.contains("://")
        || value.starts_with('#')
        || value.starts_with("mailto:")
        || value.starts_with("data:")
}

/// Lexically normalizes a path, folding `.` and `..` segments without
/// touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Renders a relative path with forward slashes, the separator references
/// use regardless of platform.
fn to_reference_string(path: &Path) -> String {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => parts.push("..".to_owned()),
            Component::CurDir => {}
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}

/// Rewrites every repairable reference in `contents`.
///
/// `original_dir` is the directory the file lived in before the move (the
/// base its relative references were authored against); `new_dir` is where
/// the file lives now. Returns `Some(new_contents)` when at least one
/// reference changed, `None` otherwise.
pub fn rewrite_references(
    contents: &str,
    original_dir: &Path,
    new_dir: &Path,
    map: &PathMap,
) -> Option<String> {
    let mut replacements: Vec<(Range<usize>, String)> = Vec::new();

    for reference in find_references(contents) {
        if is_external(&reference.value) {
            continue;
        }

        // Queries and fragments ride along unchanged.
        let split_at = reference
            .value
            .find(['#', '?'])
            .unwrap_or(reference.value.len());
        let (path_part, suffix) = reference.value.split_at(split_at);
        if path_part.is_empty() {
            continue;
        }

        let resolved = normalize(&original_dir.join(path_part));
        let target_destination = match map.destination_of(&resolved) {
            Some(destination) => destination,
            None => continue,
        };

        let relative = match pathdiff::diff_paths(target_destination, new_dir) {
            Some(relative) => relative,
            None => continue,
        };

        let new_value = format!("{}{}", to_reference_string(&relative), suffix);
        if new_value != reference.value {
            replacements.push((reference.range, new_value));
        }
    }

    if replacements.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(contents.len());
    let mut cursor = 0;
    for (range, value) in replacements {
        out.push_str(&contents[cursor..range.start]);
        out.push_str(&value);
        cursor = range.end;
    }
    out.push_str(&contents[cursor..]);

    Some(out)
}

#[cfg(test)]
mod test {
    use super::*;

    fn map_of(pairs: &[(&str, &str)]) -> PathMap {
        let mut map = PathMap::default();
        for (original, destination) in pairs {
            map.forward
                .insert(PathBuf::from(original), PathBuf::from(destination));
            map.reverse
                .insert(PathBuf::from(destination), PathBuf::from(original));
        }
        map
    }

    #[test]
    fn finds_src_href_and_url_values() {
        let found = find_references(
            r#"<img src="a.png"> <a href='b.html'>x</a> <style>div { background: url(img/c.gif); }</style>"#,
        );

        let values: Vec<&str> = found
            .iter()
            .map(|reference| reference.value.as_str())
            .collect();
        assert_eq!(values, vec!["a.png", "b.html", "img/c.gif"]);
    }

    #[test]
    fn rewrites_when_target_moves() {
        let map = map_of(&[
            ("/root/page.html", "/root/page.html"),
            ("/root/logo.png", "/root/Images/logo.png"),
        ]);

        let out = rewrite_references(
            r#"<img src="logo.png">"#,
            Path::new("/root"),
            Path::new("/root"),
            &map,
        )
        .unwrap();

        assert_eq!(out, r#"<img src="Images/logo.png">"#);
    }

    #[test]
    fn rewrites_when_referencing_file_moves() {
        let map = map_of(&[
            ("/root/page.html", "/root/Pages/page.html"),
            ("/root/logo.png", "/root/logo.png"),
        ]);

        let out = rewrite_references(
            r#"<img src="logo.png">"#,
            Path::new("/root"),
            Path::new("/root/Pages"),
            &map,
        )
        .unwrap();

        assert_eq!(out, r#"<img src="../logo.png">"#);
    }

    #[test]
    fn round_trip_when_both_sides_move() {
        // page: /root/site/page.html -> /root/pages/page.html
        // target: /root/site/img/logo.png -> /root/assets/logo.png
        let map = map_of(&[
            ("/root/site/page.html", "/root/pages/page.html"),
            ("/root/site/img/logo.png", "/root/assets/logo.png"),
        ]);

        let out = rewrite_references(
            r#"<img src="img/logo.png">"#,
            Path::new("/root/site"),
            Path::new("/root/pages"),
            &map,
        )
        .unwrap();

        assert_eq!(out, r#"<img src="../assets/logo.png">"#);

        // Resolving the rewritten reference from the new location lands
        // exactly on the target's new location.
        let resolved = normalize(&Path::new("/root/pages").join("../assets/logo.png"));
        assert_eq!(resolved, PathBuf::from("/root/assets/logo.png"));
    }

    #[test]
    fn parent_relative_references_resolve() {
        let map = map_of(&[
            ("/root/site/sub/page.html", "/root/site/sub/page.html"),
            ("/root/site/style.css", "/root/Styles/style.css"),
        ]);

        let out = rewrite_references(
            r#"<link href="../style.css">"#,
            Path::new("/root/site/sub"),
            Path::new("/root/site/sub"),
            &map,
        )
        .unwrap();

        assert_eq!(out, r#"<link href="../../Styles/style.css">"#);
    }

    #[test]
    fn external_and_fragment_references_are_skipped() {
        let map = map_of(&[("/root/logo.png", "/root/Images/logo.png")]);

        let contents = concat!(
            r#"<a href="https://example.com/logo.png">x</a>"#,
            r##"<a href="#section">y</a>"##,
            r#"<a href="mailto:someone@example.com">z</a>"#,
        );

        assert!(
            rewrite_references(contents, Path::new("/root"), Path::new("/root"), &map).is_none()
        );
    }

    #[test]
    fn unknown_targets_are_left_alone() {
        let map = map_of(&[("/root/page.html", "/root/Pages/page.html")]);

        let out = rewrite_references(
            r#"<img src="not-tracked.png">"#,
            Path::new("/root"),
            Path::new("/root/Pages"),
            &map,
        );

        assert!(out.is_none());
    }

    #[test]
    fn fragment_suffix_rides_along() {
        let map = map_of(&[("/root/doc.html", "/root/Docs/doc.html")]);

        let out = rewrite_references(
            r#"<a href="doc.html#part2">x</a>"#,
            Path::new("/root"),
            Path::new("/root"),
            &map,
        )
        .unwrap();

        assert_eq!(out, r#"<a href="Docs/doc.html#part2">x</a>"#);
    }

    #[test]
    fn unchanged_references_return_none() {
        let map = map_of(&[("/root/logo.png", "/root/logo.png")]);

        let out = rewrite_references(
            r#"<img src="logo.png">"#,
            Path::new("/root"),
            Path::new("/root"),
            &map,
        );

        assert!(out.is_none());
    }

    #[test]
    fn repairable_extension_check() {
        assert!(is_repairable(Path::new("/a/index.html")));
        assert!(is_repairable(Path::new("/a/style.CSS")));
        assert!(!is_repairable(Path::new("/a/photo.jpg")));
        assert!(!is_repairable(Path::new("/a/Makefile")));
    }
}
