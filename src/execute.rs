//! The commit phase: applies the staged diff to disk, then repairs
//! cross-file references that the moves would otherwise break.
//!
//! Execution is best-effort. Each item that fails is counted and reported,
//! and the batch keeps going — the worst outcome is "completed with N
//! errors", after which the caller rescans so the preview reflects true
//! on-disk state.

use std::path::PathBuf;

use serde::Serialize;
use shadowfs::{IoResultExt, Vfs};

use crate::links::{is_repairable, rewrite_references, PathMap};
use crate::staging::StagedChange;
use crate::tree::FileTree;

/// Outcome of one execution batch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub folders_created: usize,
    pub items_moved: usize,
    pub files_written: usize,
    pub files_relinked: usize,
    pub errors: Vec<String>,
}

impl ExecutionReport {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_success() {
            format!(
                "Executed {} move(s), {} folder(s), {} write(s), {} file(s) relinked",
                self.items_moved, self.folders_created, self.files_written, self.files_relinked
            )
        } else {
            format!(
                "Execution completed with {} error(s): {} move(s), {} folder(s), {} write(s)",
                self.error_count(),
                self.items_moved,
                self.folders_created,
                self.files_written
            )
        }
    }
}

/// Applies the staged changes to disk, in the listed order, then runs the
/// reference-repair pass.
pub fn execute(tree: &FileTree, staged: &[StagedChange], vfs: &Vfs) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    // The full original -> destination map has to exist before anything on
    // disk changes: reference resolution needs to know both where a
    // referencing file used to be and where every possible target ends up.
    let map = PathMap::from_tree(tree);

    create_destination_parents(staged, vfs, &mut report);
    apply_changes(staged, vfs, &mut report);
    repair_references(&map, vfs, &mut report);

    log::info!("{}", report.summary());
    report
}

/// Creates every distinct destination parent directory referenced by the
/// staged changes. Already-existing directories are fine.
fn create_destination_parents(staged: &[StagedChange], vfs: &Vfs, report: &mut ExecutionReport) {
    let mut seen: Vec<PathBuf> = Vec::new();

    for change in staged {
        let parent = match change.destination_path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => continue,
        };

        if seen.contains(&parent) {
            continue;
        }
        seen.push(parent.clone());

        if vfs.exists(&parent).unwrap_or(false) {
            continue;
        }

        match vfs.create_dir_all(&parent) {
            Ok(()) => report.folders_created += 1,
            Err(err) => report
                .errors
                .push(format!("create {}: {}", parent.display(), err)),
        }
    }
}

fn apply_changes(staged: &[StagedChange], vfs: &Vfs, report: &mut ExecutionReport) {
    for change in staged {
        if change.is_directory {
            if change.is_virtual || change.is_implicit {
                if vfs.exists(&change.destination_path).unwrap_or(false) {
                    continue;
                }
                match vfs.create_dir_all(&change.destination_path) {
                    Ok(()) => report.folders_created += 1,
                    Err(err) => report.errors.push(format!(
                        "create {}: {}",
                        change.destination_path.display(),
                        err
                    )),
                }
            } else if change.is_moved() {
                move_item(change, vfs, report);
            }
        } else if change.is_moved() {
            move_item(change, vfs, report);
        }

        if change.is_content_modified {
            if let Some(content) = &change.pending_content {
                // Written to the destination, post-move, overwriting.
                match vfs.write(&change.destination_path, content) {
                    Ok(()) => report.files_written += 1,
                    Err(err) => report.errors.push(format!(
                        "write {}: {}",
                        change.destination_path.display(),
                        err
                    )),
                }
            }
        }
    }
}

fn move_item(change: &StagedChange, vfs: &Vfs, report: &mut ExecutionReport) {
    // A vanished source is not an error: a prior partial run may have
    // already moved it.
    if !vfs.exists(&change.original_path).unwrap_or(false) {
        log::debug!(
            "Skipping move of {}: source no longer exists",
            change.original_path.display()
        );
        return;
    }

    match vfs.rename(&change.original_path, &change.destination_path) {
        Ok(()) => report.items_moved += 1,
        Err(err) => report.errors.push(format!(
            "move {} -> {}: {}",
            change.original_path.display(),
            change.destination_path.display(),
            err
        )),
    }
}

/// Re-opens every text file at its destination and rewrites relative
/// references that the batch invalidated. Failures here never roll back the
/// moves that already happened.
fn repair_references(map: &PathMap, vfs: &Vfs, report: &mut ExecutionReport) {
    for (_original, destination) in map.iter() {
        if !is_repairable(destination) {
            continue;
        }

        let original = match map.original_of(destination) {
            Some(original) => original,
            None => continue,
        };
        let original_dir = match original.parent() {
            Some(dir) => dir,
            None => continue,
        };
        let new_dir = match destination.parent() {
            Some(dir) => dir,
            None => continue,
        };

        let contents = match vfs.read_to_string(destination).with_not_found() {
            Ok(Some(contents)) => contents,
            Ok(None) => continue,
            Err(err) => {
                log::debug!("Skipping relink of {}: {}", destination.display(), err);
                continue;
            }
        };

        if let Some(rewritten) = rewrite_references(&contents, original_dir, new_dir, map) {
            match vfs.write(destination, rewritten) {
                Ok(()) => report.files_relinked += 1,
                Err(err) => report
                    .errors
                    .push(format!("relink {}: {}", destination.display(), err)),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rules::{apply_rules, Rule, RuleKind};
    use crate::staging::compute_staged_changes;
    use crate::tree::{scan, NodeRef};
    use shadowfs::{InMemoryFs, VfsSnapshot};
    use std::path::Path;

    fn vfs_with(snapshot: VfsSnapshot) -> Vfs {
        let mut imfs = InMemoryFs::new();
        imfs.load_snapshot("/root", snapshot).unwrap();
        Vfs::new(imfs)
    }

    fn find(tree: &FileTree, name: &str) -> NodeRef {
        tree.descendants(tree.root_id())
            .find(|node| node.name == name)
            .map(|node| node.id)
            .unwrap()
    }

    #[test]
    fn rule_moves_are_applied_to_disk() {
        let vfs = vfs_with(VfsSnapshot::dir([
            ("a.jpg", VfsSnapshot::file("jpeg")),
            ("b.txt", VfsSnapshot::file("text")),
        ]));
        let mut tree = scan(&vfs, Path::new("/root")).unwrap();
        apply_rules(&mut tree, &[Rule::new(RuleKind::Extension, "jpg", "Images")]);
        let staged = compute_staged_changes(&tree, &vfs);

        let report = execute(&tree, &staged, &vfs);

        assert!(report.is_success(), "errors: {:?}", report.errors);
        assert_eq!(report.items_moved, 1);
        assert!(vfs.exists("/root/Images/a.jpg").unwrap());
        assert!(!vfs.exists("/root/a.jpg").unwrap());
        assert!(vfs.exists("/root/b.txt").unwrap());
    }

    #[test]
    fn virtual_folders_are_created() {
        let vfs = vfs_with(VfsSnapshot::dir([("b.txt", VfsSnapshot::file("text"))]));
        let mut tree = scan(&vfs, Path::new("/root")).unwrap();
        let docs = tree.insert_virtual_folder("Docs", None);
        let docs_destination = tree.get(docs).unwrap().destination_path.clone();
        let b = find(&tree, "b.txt");
        tree.update(b, |node| {
            node.destination_path = docs_destination.join(&node.name);
            node.is_manually_moved = true;
        });
        let staged = compute_staged_changes(&tree, &vfs);

        let report = execute(&tree, &staged, &vfs);

        assert!(report.is_success(), "errors: {:?}", report.errors);
        assert!(vfs.metadata("/root/Docs").unwrap().is_dir());
        assert!(vfs.exists("/root/Docs/b.txt").unwrap());
    }

    #[test]
    fn content_writes_land_at_destination_after_move() {
        let vfs = vfs_with(VfsSnapshot::dir([("page.txt", VfsSnapshot::file("old"))]));
        let mut tree = scan(&vfs, Path::new("/root")).unwrap();
        let page = find(&tree, "page.txt");
        tree.update(page, |node| {
            node.destination_path = PathBuf::from("/root/Text/page.txt");
            node.is_manually_moved = true;
            node.is_content_modified = true;
            node.pending_content = Some("new".to_owned());
        });
        let staged = compute_staged_changes(&tree, &vfs);

        let report = execute(&tree, &staged, &vfs);

        assert!(report.is_success(), "errors: {:?}", report.errors);
        assert_eq!(vfs.read_to_string("/root/Text/page.txt").unwrap(), "new");
        assert!(!vfs.exists("/root/page.txt").unwrap());
    }

    #[test]
    fn vanished_source_is_skipped_silently_and_rest_succeeds() {
        let vfs = vfs_with(VfsSnapshot::dir([("real.txt", VfsSnapshot::file("x"))]));
        let mut tree = scan(&vfs, Path::new("/root")).unwrap();

        // Stage a move for a file that disappears before execution, plus a
        // content write that should still land.
        let ghost = tree.insert_child(
            tree.root_id(),
            "ghost.txt".to_owned(),
            PathBuf::from("/root/ghost.txt"),
            false,
        );
        tree.update(ghost, |node| {
            node.destination_path = PathBuf::from("/root/Gone/ghost.txt");
            node.is_manually_moved = true;
        });
        let real = find(&tree, "real.txt");
        tree.update(real, |node| {
            node.is_content_modified = true;
            node.pending_content = Some("updated".to_owned());
        });
        let staged = compute_staged_changes(&tree, &vfs);

        let report = execute(&tree, &staged, &vfs);

        assert!(report.is_success(), "errors: {:?}", report.errors);
        assert_eq!(report.items_moved, 0);
        assert_eq!(report.files_written, 1);
        assert_eq!(vfs.read_to_string("/root/real.txt").unwrap(), "updated");
    }

    #[test]
    fn reference_repair_follows_moves() {
        let vfs = vfs_with(VfsSnapshot::dir([
            ("index.html", VfsSnapshot::file(r#"<img src="logo.png">"#)),
            ("logo.png", VfsSnapshot::file("png")),
        ]));
        let mut tree = scan(&vfs, Path::new("/root")).unwrap();
        apply_rules(&mut tree, &[Rule::new(RuleKind::Extension, "png", "Images")]);
        let staged = compute_staged_changes(&tree, &vfs);

        let report = execute(&tree, &staged, &vfs);

        assert!(report.is_success(), "errors: {:?}", report.errors);
        assert_eq!(report.files_relinked, 1);
        assert_eq!(
            vfs.read_to_string("/root/index.html").unwrap(),
            r#"<img src="Images/logo.png">"#
        );
    }

    #[test]
    fn moved_referencing_file_is_repaired_at_destination() {
        let vfs = vfs_with(VfsSnapshot::dir([
            ("page.html", VfsSnapshot::file(r#"<img src="logo.png">"#)),
            ("logo.png", VfsSnapshot::file("png")),
        ]));
        let mut tree = scan(&vfs, Path::new("/root")).unwrap();
        apply_rules(
            &mut tree,
            &[
                Rule::new(RuleKind::Extension, "html", "Pages"),
                Rule::new(RuleKind::Extension, "png", "Images"),
            ],
        );
        let staged = compute_staged_changes(&tree, &vfs);

        let report = execute(&tree, &staged, &vfs);

        assert!(report.is_success(), "errors: {:?}", report.errors);
        assert_eq!(
            vfs.read_to_string("/root/Pages/page.html").unwrap(),
            r#"<img src="../Images/logo.png">"#
        );
    }

    #[test]
    fn report_summary_mentions_errors() {
        let report = ExecutionReport {
            errors: vec!["move /a -> /b: denied".to_owned()],
            ..Default::default()
        };

        assert!(!report.is_success());
        assert!(report.summary().contains("1 error(s)"));
    }
}
