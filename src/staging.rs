//! Derives the canonical set of pending changes from the tree.
//!
//! The staged-change list is computed, never stored: it is recomputed after
//! every state-changing operation and is the single source of truth read by
//! both the preview surface and the execution engine.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use shadowfs::Vfs;

use crate::tree::{FileTree, NodeRef};

/// A snapshot of one pending filesystem mutation: a move, a folder creation,
/// or a content rewrite. Also covers folders synthesized because some staged
/// destination needs a parent that doesn't exist yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedChange {
    pub id: NodeRef,
    pub name: String,
    pub original_path: PathBuf,
    pub destination_path: PathBuf,
    pub is_directory: bool,
    /// Folder created explicitly by the user, existing only in staging.
    pub is_virtual: bool,
    /// Folder synthesized as a side effect of some other staged move whose
    /// destination parent doesn't exist yet.
    pub is_implicit: bool,
    pub is_content_modified: bool,
    #[serde(skip)]
    pub pending_content: Option<String>,
}

impl StagedChange {
    pub fn is_moved(&self) -> bool {
        self.destination_path != self.original_path
    }
}

/// Collects every pending change in the tree, pre-order, then prepends one
/// synthesized implicit folder per missing destination parent that isn't
/// already represented by a virtual folder or an earlier synthesized entry.
pub fn compute_staged_changes(tree: &FileTree, vfs: &Vfs) -> Vec<StagedChange> {
    let mut changes: Vec<StagedChange> = Vec::new();

    for node in tree.descendants(tree.root_id()) {
        if node.id == tree.root_id() {
            continue;
        }

        if node.is_moved() || node.is_virtual || node.is_content_modified {
            changes.push(StagedChange {
                id: node.id,
                name: node.name.clone(),
                original_path: node.original_path.clone(),
                destination_path: node.destination_path.clone(),
                is_directory: node.is_directory,
                is_virtual: node.is_virtual,
                is_implicit: false,
                is_content_modified: node.is_content_modified,
                pending_content: node.pending_content.clone(),
            });
        }
    }

    // Destinations already covered by a staged folder, virtual or moved.
    let mut covered: HashSet<PathBuf> = changes
        .iter()
        .filter(|change| change.is_directory)
        .map(|change| change.destination_path.clone())
        .collect();

    let mut implicit: Vec<StagedChange> = Vec::new();
    for change in &changes {
        let parent = match change.destination_path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => continue,
        };

        if covered.contains(&parent) {
            continue;
        }
        if vfs.exists(&parent).unwrap_or(false) {
            continue;
        }

        log::debug!(
            "Destination parent {} does not exist yet; staging it for creation",
            parent.display()
        );

        covered.insert(parent.clone());
        implicit.push(StagedChange {
            id: NodeRef::new(),
            name: parent
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| parent.display().to_string()),
            original_path: parent.clone(),
            destination_path: parent,
            is_directory: true,
            is_virtual: false,
            is_implicit: true,
            is_content_modified: false,
            pending_content: None,
        });
    }

    implicit.extend(changes);
    implicit
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rules::{apply_rules, Rule, RuleKind};
    use crate::tree::scan;
    use shadowfs::{InMemoryFs, VfsSnapshot};
    use std::path::Path;

    fn fixture() -> (FileTree, Vfs) {
        let mut imfs = InMemoryFs::new();
        imfs.load_snapshot(
            "/root",
            VfsSnapshot::dir([
                ("a.jpg", VfsSnapshot::file("")),
                ("b.txt", VfsSnapshot::file("")),
                ("Existing", VfsSnapshot::empty_dir()),
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
    fn clean_tree_stages_nothing() {
        let (tree, vfs) = fixture();
        assert!(compute_staged_changes(&tree, &vfs).is_empty());
    }

    #[test]
    fn missing_destination_parent_is_synthesized_and_prepended() {
        let (mut tree, vfs) = fixture();
        apply_rules(&mut tree, &[Rule::new(RuleKind::Extension, "jpg", "Images")]);

        let staged = compute_staged_changes(&tree, &vfs);

        assert_eq!(staged.len(), 2);
        assert!(staged[0].is_implicit);
        assert!(staged[0].is_directory);
        assert_eq!(staged[0].destination_path, Path::new("/root/Images"));
        assert_eq!(staged[1].name, "a.jpg");
        assert_eq!(staged[1].destination_path, Path::new("/root/Images/a.jpg"));
    }

    #[test]
    fn existing_destination_parent_is_not_synthesized() {
        let (mut tree, vfs) = fixture();
        apply_rules(
            &mut tree,
            &[Rule::new(RuleKind::Extension, "jpg", "Existing")],
        );

        let staged = compute_staged_changes(&tree, &vfs);

        assert_eq!(staged.len(), 1);
        assert!(!staged[0].is_implicit);
    }

    #[test]
    fn one_synthesized_folder_per_missing_parent() {
        let (mut tree, vfs) = fixture();
        let rules = vec![
            Rule::new(RuleKind::Extension, "jpg", "Sorted"),
            Rule::new(RuleKind::Extension, "txt", "Sorted"),
        ];
        apply_rules(&mut tree, &rules);

        let staged = compute_staged_changes(&tree, &vfs);

        let implicit: Vec<_> = staged.iter().filter(|change| change.is_implicit).collect();
        assert_eq!(implicit.len(), 1);
        assert_eq!(implicit[0].destination_path, Path::new("/root/Sorted"));
        assert_eq!(staged.len(), 3);
    }

    #[test]
    fn virtual_folder_covers_its_own_destination() {
        let (mut tree, vfs) = fixture();
        let docs = tree.insert_virtual_folder("Docs", None);
        let b = find(&tree, "b.txt");
        let docs_destination = tree.get(docs).unwrap().destination_path.clone();
        tree.update(b, |node| {
            node.destination_path = docs_destination.join(&node.name);
            node.is_manually_moved = true;
        });

        let staged = compute_staged_changes(&tree, &vfs);

        assert_eq!(staged.len(), 2);
        assert!(staged.iter().all(|change| !change.is_implicit));
        assert!(staged.iter().any(|change| change.is_virtual));
    }

    #[test]
    fn content_modified_files_are_collected() {
        let (mut tree, vfs) = fixture();
        let b = find(&tree, "b.txt");
        tree.update(b, |node| {
            node.is_content_modified = true;
            node.pending_content = Some("rewritten".to_owned());
        });

        let staged = compute_staged_changes(&tree, &vfs);

        assert_eq!(staged.len(), 1);
        assert!(staged[0].is_content_modified);
        assert!(!staged[0].is_moved());
        assert_eq!(staged[0].pending_content.as_deref(), Some("rewritten"));
    }

    #[test]
    fn diff_is_complete_over_moved_virtual_and_modified() {
        let (mut tree, vfs) = fixture();
        apply_rules(&mut tree, &[Rule::new(RuleKind::Extension, "jpg", "Images")]);
        tree.insert_virtual_folder("Docs", None);
        let b = find(&tree, "b.txt");
        tree.update(b, |node| {
            node.is_content_modified = true;
            node.pending_content = Some("x".to_owned());
        });

        let staged = compute_staged_changes(&tree, &vfs);
        let names: Vec<&str> = staged.iter().map(|change| change.name.as_str()).collect();

        // Implicit Images folder first, then pre-order tree collection.
        assert_eq!(names, vec!["Images", "Docs", "a.jpg", "b.txt"]);
    }
}
