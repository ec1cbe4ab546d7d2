//! Multi-file content search and staged text replacement.
//!
//! Both operations are computed against a tree snapshot plus the Vfs and
//! return plain data; the session applies computed edits to canonical state
//! as one atomic update. Nothing here writes to disk — a staged edit only
//! fills in a node's `pending_content`, which the execution engine writes at
//! commit.

use std::path::PathBuf;

use serde::Serialize;
use shadowfs::Vfs;

use crate::matching::{expand_replacement, MatchMode, Matcher};
use crate::tree::{FileTree, Node, NodeRef};

/// Which part of the tree a search or replacement covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    EntireTree,
    Subtree(NodeRef),
}

/// One file that matched a content search. Ephemeral; not part of the
/// tree's persistent state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: NodeRef,
    pub path: PathBuf,
    pub match_count: usize,
    /// The line containing the first match, trimmed.
    pub preview: String,
}

/// Replacement text computed for one file by [`compute_content_edits`].
#[derive(Debug, Clone)]
pub struct ContentEdit {
    pub id: NodeRef,
    pub path: PathBuf,
    pub replacements: usize,
    pub new_content: String,
}

/// Per-file summary of an applied staging pass, for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    pub id: NodeRef,
    pub path: PathBuf,
    pub replacements: usize,
}

impl From<&ContentEdit> for EditRecord {
    fn from(edit: &ContentEdit) -> Self {
        EditRecord {
            id: edit.id,
            path: edit.path.clone(),
            replacements: edit.replacements,
        }
    }
}

/// Searches file contents under the given scope. Files that are not valid
/// UTF-8 or cannot be read are skipped. An invalid pattern yields no
/// results.
pub fn search(
    tree: &FileTree,
    vfs: &Vfs,
    text: &str,
    mode: MatchMode,
    case_sensitive: bool,
) -> Vec<SearchResult> {
    let matcher = Matcher::compile(text, mode, case_sensitive);
    let mut results = Vec::new();

    for node in files_in_scope(tree, EditScope::EntireTree) {
        let contents = match read_current_content(vfs, node) {
            Some(contents) => contents,
            None => continue,
        };

        let hits = matcher.find_all(&contents);
        if hits.is_empty() {
            continue;
        }

        results.push(SearchResult {
            id: node.id,
            path: node.original_path.clone(),
            match_count: hits.len(),
            preview: preview_line(&contents, hits[0].range.start),
        });
    }

    results
}

/// Computes replacement content for every file in scope that the pattern
/// matches. `extensions` filters by lower-cased extension (dots stripped);
/// `None` means all files. Already-staged content is used as the input where
/// present, so successive edits compose.
#[allow(clippy::too_many_arguments)]
pub fn compute_content_edits(
    tree: &FileTree,
    vfs: &Vfs,
    find: &str,
    replace: &str,
    scope: EditScope,
    extensions: Option<&[String]>,
    mode: MatchMode,
    case_sensitive: bool,
) -> Vec<ContentEdit> {
    let matcher = Matcher::compile(find, mode, case_sensitive);
    let wanted: Option<Vec<String>> = extensions.map(|extensions| {
        extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    });

    let mut edits = Vec::new();

    for node in files_in_scope(tree, scope) {
        if let Some(wanted) = &wanted {
            match node.extension() {
                Some(extension) if wanted.contains(&extension) => {}
                _ => continue,
            }
        }

        let contents = match read_current_content(vfs, node) {
            Some(contents) => contents,
            None => continue,
        };

        let hits = matcher.find_all(&contents);
        if hits.is_empty() {
            continue;
        }

        let mut new_content = String::with_capacity(contents.len());
        let mut cursor = 0;
        for hit in &hits {
            new_content.push_str(&contents[cursor..hit.range.start]);
            new_content.push_str(&expand_replacement(replace, &hit.groups));
            cursor = hit.range.end;
        }
        new_content.push_str(&contents[cursor..]);

        edits.push(ContentEdit {
            id: node.id,
            path: node.original_path.clone(),
            replacements: hits.len(),
            new_content,
        });
    }

    edits
}

fn files_in_scope(tree: &FileTree, scope: EditScope) -> impl Iterator<Item = &Node> {
    let start = match scope {
        EditScope::EntireTree => tree.root_id(),
        EditScope::Subtree(id) => id,
    };

    tree.descendants(start)
        .filter(|node| !node.is_directory && !node.is_virtual)
}

/// The text a file currently holds from the engine's point of view: staged
/// replacement content if any, otherwise what's on disk at the original
/// path (files haven't moved yet before commit).
fn read_current_content(vfs: &Vfs, node: &Node) -> Option<String> {
    if let Some(pending) = &node.pending_content {
        return Some(pending.clone());
    }

    match vfs.read_to_string(&node.original_path) {
        Ok(contents) => Some(contents),
        Err(err) => {
            log::debug!(
                "Skipping {} during content pass: {}",
                node.original_path.display(),
                err
            );
            None
        }
    }
}

fn preview_line(contents: &str, offset: usize) -> String {
    let start = contents[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let end = contents[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(contents.len());

    let line = contents[start..end].trim();
    if line.len() > 120 {
        line.chars().take(120).collect()
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::scan;
    use shadowfs::{InMemoryFs, VfsSnapshot};
    use std::path::Path;

    fn fixture() -> (FileTree, Vfs) {
        let mut imfs = InMemoryFs::new();
        imfs.load_snapshot(
            "/root",
            VfsSnapshot::dir([
                ("index.html", VfsSnapshot::file("<title>Old Site</title>\n")),
                ("about.html", VfsSnapshot::file("<p>old site info</p>\n")),
                ("notes.txt", VfsSnapshot::file("nothing here\n")),
                (
                    "sub",
                    VfsSnapshot::dir([("deep.html", VfsSnapshot::file("old site deep"))]),
                ),
            ]),
        )
        .unwrap();

        let vfs = Vfs::new(imfs);
        let tree = scan(&vfs, Path::new("/root")).unwrap();
        (tree, vfs)
    }

    fn find(tree: &FileTree, name: &str) -> NodeRef {
        tree.descendants(tree.root_id())
            .find(|node| node.name == name)
            .map(|node| node.id)
            .unwrap()
    }

    #[test]
    fn search_counts_matches_per_file() {
        let (tree, vfs) = fixture();
        let results = search(&tree, &vfs, "old site", MatchMode::Literal, false);

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|result| result.match_count == 1));
    }

    #[test]
    fn search_case_sensitive() {
        let (tree, vfs) = fixture();
        let results = search(&tree, &vfs, "Old Site", MatchMode::Literal, true);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].preview, "<title>Old Site</title>");
    }

    #[test]
    fn invalid_pattern_finds_nothing() {
        let (tree, vfs) = fixture();
        let results = search(&tree, &vfs, "(bad", MatchMode::Regex, true);
        assert!(results.is_empty());
    }

    #[test]
    fn edits_filtered_by_extension() {
        let (tree, vfs) = fixture();
        let extensions = vec!["html".to_string()];
        let edits = compute_content_edits(
            &tree,
            &vfs,
            "old site",
            "new site",
            EditScope::EntireTree,
            Some(&extensions),
            MatchMode::Literal,
            false,
        );

        assert_eq!(edits.len(), 3);
        assert!(edits
            .iter()
            .all(|edit| edit.path.extension().unwrap() == "html"));
    }

    #[test]
    fn edits_respect_subtree_scope() {
        let (tree, vfs) = fixture();
        let sub = find(&tree, "sub");
        let edits = compute_content_edits(
            &tree,
            &vfs,
            "old site",
            "new site",
            EditScope::Subtree(sub),
            None,
            MatchMode::Literal,
            false,
        );

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_content, "new site deep");
    }

    #[test]
    fn wildcard_edit_substitutes_captures() {
        let (tree, vfs) = fixture();
        let edits = compute_content_edits(
            &tree,
            &vfs,
            "<title>*</title>",
            "<title>* v2</title>",
            EditScope::EntireTree,
            None,
            MatchMode::Wildcard,
            true,
        );

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_content, "<title>Old Site v2</title>\n");
    }

    #[test]
    fn pending_content_composes() {
        let (mut tree, vfs) = fixture();
        let notes = find(&tree, "notes.txt");
        tree.update(notes, |node| {
            node.is_content_modified = true;
            node.pending_content = Some("everything here\n".to_owned());
        });

        let edits = compute_content_edits(
            &tree,
            &vfs,
            "everything",
            "something",
            EditScope::EntireTree,
            None,
            MatchMode::Literal,
            true,
        );

        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].new_content, "something here\n");
    }
}
