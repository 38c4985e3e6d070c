//! Temporary file storage for materialized pieces.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Prefix of temp file names.
const TEMP_PREFIX: &str = "fstmp";

/// A file created by a [`FileStore`], open for reading and writing.
#[derive(Debug)]
pub struct TempFile {
    file: File,
    path: PathBuf,
}

impl TempFile {
    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the file.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Close the handle, returning the path.
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

impl Read for TempFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for TempFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Creates and deletes files holding materialized pieces.
pub trait FileStore: Send + Sync {
    /// Create a new, empty file with a unique name.
    fn create_temp(&self) -> io::Result<TempFile>;

    /// Delete a file previously created by this store.
    fn delete(&self, path: &Path) -> io::Result<()>;
}

/// File store rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirFileStore {
    base: PathBuf,
}

impl DirFileStore {
    /// Store files under `base`. The directory is created on first use.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Directory holding the files.
    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl FileStore for DirFileStore {
    fn create_temp(&self) -> io::Result<TempFile> {
        fs::create_dir_all(&self.base)?;
        let named = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.base)?;
        // removed through `delete` from here on
        let (file, path) = named.keep()?;
        Ok(TempFile { file, path })
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirFileStore::new(dir.path().join("pieces"));

        let mut a = store.create_temp().unwrap();
        let b = store.create_temp().unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(store.base()));
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(TEMP_PREFIX));

        // handing a file out does not delete it
        let kept = b.into_path();
        assert!(kept.exists());
        store.delete(&kept).unwrap();

        a.write_all(b"piece").unwrap();
        a.flush().unwrap();
        assert_eq!(a.len().unwrap(), 5);

        let path = a.into_path();
        assert!(path.exists());
        store.delete(&path).unwrap();
        assert!(!path.exists());
        assert!(store.delete(&path).is_err());
    }
}
