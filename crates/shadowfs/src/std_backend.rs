use std::io;
use std::path::Path;

use crate::{DirEntry, Metadata, ReadDir, VfsBackend};

/// `VfsBackend` that uses `std::fs` (via `fs-err` for error messages that
/// include the offending path).
#[derive(Default)]
pub struct StdBackend {
    _private: (),
}

impl StdBackend {
    pub fn new() -> StdBackend {
        Self::default()
    }
}

impl VfsBackend for StdBackend {
    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>> {
        fs_err::read(path)
    }

    fn write(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs_err::write(path, data)
    }

    fn exists(&mut self, path: &Path) -> io::Result<bool> {
        Ok(path.exists())
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<ReadDir> {
        let inner = fs_err::read_dir(path)?.map(|entry| {
            let entry = entry?;
            Ok(DirEntry { path: entry.path() })
        });

        Ok(ReadDir {
            inner: Box::new(inner.collect::<Vec<_>>().into_iter()),
        })
    }

    fn create_dir_all(&mut self, path: &Path) -> io::Result<()> {
        fs_err::create_dir_all(path)
    }

    fn metadata(&mut self, path: &Path) -> io::Result<Metadata> {
        let metadata = fs_err::metadata(path)?;

        Ok(Metadata {
            is_file: metadata.is_file(),
        })
    }

    fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        fs_err::rename(from, to)
    }
}
