//! The in-memory file tree: every scanned filesystem entry as a [`Node`]
//! carrying its staged destination and status flags.
//!
//! The tree is an arena — a node table keyed by opaque [`NodeRef`] handles
//! with parent/children handle lists — so mutations address nodes by id and
//! never by path. Paths are exactly the thing under negotiation here: a
//! node's `original_path` is where it was last observed on disk, and its
//! `destination_path` is where it will end up after commit. Nothing in this
//! module touches disk except [`scan`], which goes through the `Vfs`
//! collaborator.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shadowfs::Vfs;
use uuid::Uuid;

/// Opaque, copyable identity for one node. Stable for the lifetime of a tree,
/// never reused, and independent of the node's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(Uuid);

impl NodeRef {
    pub fn new() -> Self {
        NodeRef(Uuid::new_v4())
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One filesystem entry, real or virtual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeRef,
    /// Leaf name shown to the user. Mutable via rename.
    pub name: String,
    /// Absolute path as last observed on disk. For virtual folders this is
    /// the nominal path the folder will be created at.
    pub original_path: PathBuf,
    /// Where this entry will live after commit. Defaults to `original_path`.
    pub destination_path: PathBuf,
    pub is_directory: bool,
    pub parent: Option<NodeRef>,
    /// Child handles, subdirectories first, then case-insensitive by name.
    /// Always empty for files.
    pub children: Vec<NodeRef>,
    /// True for folders that exist only in staging, with no on-disk
    /// counterpart until commit.
    pub is_virtual: bool,
    /// Set by a user-directed move. While set, rule evaluation never
    /// rewrites this node's destination.
    pub is_manually_moved: bool,
    pub is_content_modified: bool,
    /// Replacement text staged for this file, written at commit.
    pub pending_content: Option<String>,
}

impl Node {
    pub fn is_moved(&self) -> bool {
        self.destination_path != self.original_path
    }

    /// Lower-cased extension of the node's name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

/// The tree for one scanned root. Discarded and rebuilt wholesale on every
/// refresh; node ids do not survive a rescan.
#[derive(Debug, Clone)]
pub struct FileTree {
    root: NodeRef,
    root_path: PathBuf,
    nodes: HashMap<NodeRef, Node>,
}

impl FileTree {
    /// Creates a tree containing only a root directory node.
    pub fn new(root_path: PathBuf) -> FileTree {
        let root = NodeRef::new();
        let name = root_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_path.display().to_string());

        let root_node = Node {
            id: root,
            name,
            original_path: root_path.clone(),
            destination_path: root_path.clone(),
            is_directory: true,
            parent: None,
            children: Vec::new(),
            is_virtual: false,
            is_manually_moved: false,
            is_content_modified: false,
            pending_content: None,
        };

        let mut nodes = HashMap::new();
        nodes.insert(root, root_node);

        FileTree {
            root,
            root_path,
            nodes,
        }
    }

    pub fn root_id(&self) -> NodeRef {
        self.root
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn get(&self, id: NodeRef) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeRef) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn parent_of(&self, id: NodeRef) -> Option<NodeRef> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    /// Inserts a new child under `parent` and re-sorts that parent's
    /// children. Returns the new node's handle.
    pub fn insert_child(
        &mut self,
        parent: NodeRef,
        name: String,
        original_path: PathBuf,
        is_directory: bool,
    ) -> NodeRef {
        let id = NodeRef::new();
        let node = Node {
            id,
            name,
            destination_path: original_path.clone(),
            original_path,
            is_directory,
            parent: Some(parent),
            children: Vec::new(),
            is_virtual: false,
            is_manually_moved: false,
            is_content_modified: false,
            pending_content: None,
        };

        self.nodes.insert(id, node);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        self.sort_children(parent);

        id
    }

    /// Creates a virtual folder under `parent` (the root when `None`). The
    /// folder's nominal path is resolved against the parent's destination so
    /// it lands where the parent will be after commit.
    pub fn insert_virtual_folder(&mut self, name: &str, parent: Option<NodeRef>) -> NodeRef {
        let parent = parent.unwrap_or(self.root);
        let parent_destination = self
            .nodes
            .get(&parent)
            .map(|node| node.destination_path.clone())
            .unwrap_or_else(|| self.root_path.clone());

        let id = self.insert_child(parent, name.to_owned(), parent_destination.join(name), true);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.is_virtual = true;
        }

        id
    }

    /// Pre-order traversal starting at (and including) `id`.
    pub fn descendants(&self, id: NodeRef) -> Descendants<'_> {
        Descendants {
            stack: vec![id],
            tree: self,
        }
    }

    /// Pre-order list of every node id, starting at the root.
    pub fn ids(&self) -> Vec<NodeRef> {
        self.descendants(self.root).map(|node| node.id).collect()
    }

    /// Applies a mutation to the node with the given id, wherever it is in
    /// the tree. Returns whether the node was found.
    pub fn update<F: FnOnce(&mut Node)>(&mut self, id: NodeRef, mutator: F) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                mutator(node);
                true
            }
            None => false,
        }
    }

    /// Applies a mutation to every node, pre-order.
    pub fn update_all<F: FnMut(&mut Node)>(&mut self, mut mutator: F) {
        for id in self.ids() {
            if let Some(node) = self.nodes.get_mut(&id) {
                mutator(node);
            }
        }
    }

    /// Resets the destination of every automatically placed node back to its
    /// original path. Manual moves and virtual folders are left alone. This
    /// is the required first step of rule evaluation, so destinations from a
    /// deleted rule don't linger.
    pub fn reset_auto_destinations(&mut self) {
        self.update_all(|node| {
            if !node.is_manually_moved && !node.is_virtual {
                node.destination_path = node.original_path.clone();
            }
        });
    }

    /// Re-sorts a directory's children: subdirectories first, then
    /// case-insensitive lexicographic by name.
    pub fn sort_children(&mut self, id: NodeRef) {
        let mut children = match self.nodes.get(&id) {
            Some(node) => node.children.clone(),
            None => return,
        };

        children.sort_by(|a, b| {
            let a = &self.nodes[a];
            let b = &self.nodes[b];
            b.is_directory
                .cmp(&a.is_directory)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });

        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = children;
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<NodeRef>,
    tree: &'a FileTree,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.stack.pop()?;
            let node = match self.tree.nodes.get(&id) {
                Some(node) => node,
                None => continue,
            };

            // Children pushed in reverse so traversal visits them in order.
            self.stack.extend(node.children.iter().rev());

            return Some(node);
        }
    }
}

/// Builds a tree by scanning the given root directory through the Vfs.
///
/// Hidden entries (leading `.`) are excluded. A subdirectory that cannot be
/// read is logged and yields an empty subtree; only a failure to read the
/// root itself is an error.
pub fn scan(vfs: &Vfs, root_path: &Path) -> io::Result<FileTree> {
    let mut tree = FileTree::new(root_path.to_path_buf());
    let root = tree.root_id();

    scan_children(vfs, &mut tree, root, root_path, true)?;

    log::debug!(
        "Scanned {} entries under {}",
        tree.len() - 1,
        root_path.display()
    );
    Ok(tree)
}

fn scan_children(
    vfs: &Vfs,
    tree: &mut FileTree,
    parent: NodeRef,
    path: &Path,
    is_root: bool,
) -> io::Result<()> {
    let entries = match vfs.read_dir(path) {
        Ok(entries) => entries,
        Err(err) if is_root => return Err(err),
        Err(err) => {
            log::warn!("Skipping unreadable directory {}: {}", path.display(), err);
            return Ok(());
        }
    };

    let mut children: Vec<(String, PathBuf, bool)> = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("Skipping unreadable entry in {}: {}", path.display(), err);
                continue;
            }
        };

        let entry_path = entry.path().to_path_buf();
        let name = match entry_path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };

        if name.starts_with('.') {
            continue;
        }

        let is_directory = match vfs.metadata(&entry_path) {
            Ok(metadata) => metadata.is_dir(),
            Err(err) => {
                log::warn!("Skipping {}: {}", entry_path.display(), err);
                continue;
            }
        };

        children.push((name, entry_path, is_directory));
    }

    for (name, entry_path, is_directory) in children {
        let id = tree.insert_child(parent, name, entry_path.clone(), is_directory);
        if is_directory {
            scan_children(vfs, tree, id, &entry_path, false)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use shadowfs::{InMemoryFs, VfsSnapshot};

    fn scan_fixture() -> FileTree {
        let mut imfs = InMemoryFs::new();
        imfs.load_snapshot(
            "/root",
            VfsSnapshot::dir([
                ("zeta.txt", VfsSnapshot::file("z")),
                ("alpha.txt", VfsSnapshot::file("a")),
                (".hidden", VfsSnapshot::file("h")),
                (
                    "sub",
                    VfsSnapshot::dir([("inner.txt", VfsSnapshot::file("i"))]),
                ),
            ]),
        )
        .unwrap();

        scan(&Vfs::new(imfs), Path::new("/root")).unwrap()
    }

    #[test]
    fn scan_excludes_hidden_and_sorts_directories_first() {
        let tree = scan_fixture();
        let root = tree.get(tree.root_id()).unwrap();

        let names: Vec<&str> = root
            .children
            .iter()
            .map(|id| tree.get(*id).unwrap().name.as_str())
            .collect();

        assert_eq!(names, vec!["sub", "alpha.txt", "zeta.txt"]);
    }

    #[test]
    fn descendants_are_pre_order() {
        let tree = scan_fixture();
        let names: Vec<&str> = tree
            .descendants(tree.root_id())
            .map(|node| node.name.as_str())
            .collect();

        assert_eq!(
            names,
            vec!["root", "sub", "inner.txt", "alpha.txt", "zeta.txt"]
        );
    }

    #[test]
    fn update_addresses_nodes_by_id() {
        let mut tree = scan_fixture();
        let target = tree
            .descendants(tree.root_id())
            .find(|node| node.name == "alpha.txt")
            .map(|node| node.id)
            .unwrap();

        assert!(tree.update(target, |node| {
            node.destination_path = PathBuf::from("/root/Docs/alpha.txt");
        }));
        assert!(tree.get(target).unwrap().is_moved());

        assert!(!tree.update(NodeRef::new(), |_| {}));
    }

    #[test]
    fn reset_auto_destinations_skips_manual_and_virtual() {
        let mut tree = scan_fixture();
        let manual = tree
            .descendants(tree.root_id())
            .find(|node| node.name == "alpha.txt")
            .map(|node| node.id)
            .unwrap();
        let auto = tree
            .descendants(tree.root_id())
            .find(|node| node.name == "zeta.txt")
            .map(|node| node.id)
            .unwrap();

        tree.update(manual, |node| {
            node.destination_path = PathBuf::from("/root/Docs/alpha.txt");
            node.is_manually_moved = true;
        });
        tree.update(auto, |node| {
            node.destination_path = PathBuf::from("/root/Docs/zeta.txt");
        });
        let virtual_id = tree.insert_virtual_folder("Keep", None);

        tree.reset_auto_destinations();

        assert!(tree.get(manual).unwrap().is_moved());
        assert!(!tree.get(auto).unwrap().is_moved());
        assert!(tree.get(virtual_id).unwrap().is_virtual);
    }

    #[test]
    fn virtual_folder_nominal_path_follows_parent_destination() {
        let mut tree = scan_fixture();
        let id = tree.insert_virtual_folder("Docs", None);
        let node = tree.get(id).unwrap();

        assert!(node.is_virtual);
        assert!(node.is_directory);
        assert_eq!(node.original_path, PathBuf::from("/root/Docs"));
        assert_eq!(node.destination_path, PathBuf::from("/root/Docs"));
        assert!(!node.is_moved());
    }

    #[test]
    fn scan_unreadable_root_is_an_error() {
        let vfs = Vfs::new(InMemoryFs::new());
        assert!(scan(&vfs, Path::new("/missing")).is_err());
    }
}
