use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::{DirEntry, Metadata, ReadDir, VfsBackend, VfsSnapshot};

#[derive(Debug, Clone)]
enum Entry {
    File(Vec<u8>),
    Dir,
}

/// An in-memory filesystem that can be used as a `VfsBackend` in tests.
///
/// Paths are stored as given, keyed in a sorted map. There is no working
/// directory; callers are expected to use absolute paths.
#[derive(Default)]
pub struct InMemoryFs {
    entries: BTreeMap<PathBuf, Entry>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `VfsSnapshot` into the filesystem at the given path, creating
    /// any missing parent directories.
    pub fn load_snapshot<P: AsRef<Path>>(
        &mut self,
        path: P,
        snapshot: VfsSnapshot,
    ) -> io::Result<()> {
        let path = path.as_ref();

        for ancestor in path.ancestors().skip(1) {
            if !ancestor.as_os_str().is_empty() {
                self.entries.entry(ancestor.to_path_buf()).or_insert(Entry::Dir);
            }
        }

        match snapshot {
            VfsSnapshot::File { contents } => {
                self.entries.insert(path.to_path_buf(), Entry::File(contents));
            }
            VfsSnapshot::Dir { children } => {
                self.entries.insert(path.to_path_buf(), Entry::Dir);

                for (name, child) in children {
                    self.load_snapshot(path.join(name), child)?;
                }
            }
        }

        Ok(())
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("path not found: {}", path.display()),
        )
    }
}

impl VfsBackend for InMemoryFs {
    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>> {
        match self.entries.get(path) {
            Some(Entry::File(contents)) => Ok(contents.clone()),
            Some(Entry::Dir) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot read a directory: {}", path.display()),
            )),
            None => Err(Self::not_found(path)),
        }
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.entries.contains_key(parent) {
                return Err(Self::not_found(parent));
            }
        }

        self.entries
            .insert(path.to_path_buf(), Entry::File(data.to_vec()));
        Ok(())
    }

    fn exists(&mut self, path: &Path) -> io::Result<bool> {
        Ok(self.entries.contains_key(path))
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<ReadDir> {
        match self.entries.get(path) {
            Some(Entry::Dir) => {}
            Some(Entry::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a directory: {}", path.display()),
                ))
            }
            None => return Err(Self::not_found(path)),
        }

        let children: Vec<_> = self
            .entries
            .keys()
            .filter(|candidate| candidate.parent() == Some(path))
            .map(|candidate| Ok(DirEntry {
                path: candidate.clone(),
            }))
            .collect();

        Ok(ReadDir {
            inner: Box::new(children.into_iter()),
        })
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            match self.entries.get(ancestor) {
                Some(Entry::File(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("not a directory: {}", ancestor.display()),
                    ))
                }
                Some(Entry::Dir) => {}
                None => {
                    self.entries.insert(ancestor.to_path_buf(), Entry::Dir);
                }
            }
        }

        Ok(())
    }

    fn metadata(&mut self, path: &Path) -> io::Result<Metadata> {
        match self.entries.get(path) {
            Some(Entry::File(_)) => Ok(Metadata { is_file: true }),
            Some(Entry::Dir) => Ok(Metadata { is_file: false }),
            None => Err(Self::not_found(path)),
        }
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        let entry = match self.entries.remove(from) {
            Some(entry) => entry,
            None => return Err(Self::not_found(from)),
        };

        if let Entry::Dir = entry {
            // Move every descendant along with the directory itself.
            let descendants: Vec<PathBuf> = self
                .entries
                .keys()
                .filter(|candidate| candidate.starts_with(from))
                .cloned()
                .collect();

            for old_path in descendants {
                let suffix = old_path.strip_prefix(from).unwrap().to_path_buf();
                let moved = self.entries.remove(&old_path).unwrap();
                self.entries.insert(to.join(suffix), moved);
            }
        }

        self.entries.insert(to.to_path_buf(), entry);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snapshot_builds_nested_tree() {
        let mut imfs = InMemoryFs::new();
        imfs.load_snapshot(
            "/root",
            VfsSnapshot::dir([
                ("a.txt", VfsSnapshot::file("A")),
                ("sub", VfsSnapshot::dir([("b.txt", VfsSnapshot::file("B"))])),
            ]),
        )
        .unwrap();

        assert!(imfs.exists(Path::new("/root/sub/b.txt")).unwrap());
        assert!(imfs.metadata(Path::new("/root/sub")).unwrap().is_dir());
        assert_eq!(imfs.read(Path::new("/root/a.txt")).unwrap(), b"A");
    }

    #[test]
    fn read_dir_lists_direct_children_only() {
        let mut imfs = InMemoryFs::new();
        imfs.load_snapshot(
            "/root",
            VfsSnapshot::dir([
                ("a.txt", VfsSnapshot::file("A")),
                ("sub", VfsSnapshot::dir([("b.txt", VfsSnapshot::file("B"))])),
            ]),
        )
        .unwrap();

        let children: Vec<PathBuf> = imfs
            .read_dir(Path::new("/root"))
            .unwrap()
            .map(|entry| entry.unwrap().path().to_path_buf())
            .collect();

        assert_eq!(
            children,
            vec![PathBuf::from("/root/a.txt"), PathBuf::from("/root/sub")]
        );
    }

    #[test]
    fn rename_directory_carries_descendants() {
        let mut imfs = InMemoryFs::new();
        imfs.load_snapshot(
            "/root",
            VfsSnapshot::dir([(
                "old",
                VfsSnapshot::dir([("deep.txt", VfsSnapshot::file("D"))]),
            )]),
        )
        .unwrap();

        imfs.rename(Path::new("/root/old"), Path::new("/root/new"))
            .unwrap();

        assert!(!imfs.exists(Path::new("/root/old")).unwrap());
        assert!(!imfs.exists(Path::new("/root/old/deep.txt")).unwrap());
        assert_eq!(imfs.read(Path::new("/root/new/deep.txt")).unwrap(), b"D");
    }

    #[test]
    fn write_requires_existing_parent() {
        let mut imfs = InMemoryFs::new();
        let err = imfs.write(Path::new("/missing/file.txt"), b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn create_dir_all_is_idempotent() {
        let mut imfs = InMemoryFs::new();
        imfs.create_dir_all(Path::new("/a/b/c")).unwrap();
        imfs.create_dir_all(Path::new("/a/b/c")).unwrap();

        assert!(imfs.metadata(Path::new("/a/b")).unwrap().is_dir());
    }
}
