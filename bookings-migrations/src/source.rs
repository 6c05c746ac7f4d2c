use crate::error::Error;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Reads the SQL text of migration files.
pub trait MigrationSource {
    fn read(&self, path: &Path) -> Result<String, Error>;

    /// Whether `path` can be read. Used for previews, so it must not have side effects.
    fn exists(&self, path: &Path) -> bool;
}

/// Reads migration files from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemSource;

impl MigrationSource for FileSystemSource {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read(&self, path: &Path) -> Result<String, Error> {
        if !path.is_file() {
            return Err(Error::FileRead {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such migration file"),
            });
        }

        std::fs::read_to_string(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<T: MigrationSource + ?Sized> MigrationSource for Arc<T> {
    fn read(&self, path: &Path) -> Result<String, Error> {
        (**self).read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}

impl<T: MigrationSource + ?Sized> MigrationSource for Box<T> {
    fn read(&self, path: &Path) -> Result<String, Error> {
        (**self).read(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }
}
