use crate::{
    config::Config,
    error::{Error, Result},
    source::SourceFile,
};
use std::{
    ffi::OsString,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Replaces a source file with its rewritten text, keeping a backup.
pub(crate) struct Writer {
    backup_path: PathBuf,
}

impl Writer {
    /// Creates a new writer from configuration.
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            backup_path: config.backup_path(),
        }
    }

    /// Returns where the original is copied to.
    pub(crate) fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Backs up the original and writes `content` over it.
    ///
    /// # Process
    ///
    /// 1. Checks the file on disk still holds what was read
    /// 2. Copies the original to the backup path
    /// 3. Writes `content` to a temporary sibling, syncs, and renames it
    ///
    /// # Errors
    ///
    /// Returns an error if the file changed since it was read or any file
    /// operation fails. The original is left untouched in both cases.
    pub(crate) fn persist(&self, source: &SourceFile, content: &str) -> Result<PathBuf> {
        let path = source.path();

        let on_disk = fs::read(path).map_err(|e| Error::io(path, e))?;
        if on_disk != source.content().as_bytes() {
            return Err(Error::io(
                path,
                io::Error::other("file changed on disk since it was read"),
            ));
        }

        self.backup_file(path)?;
        write_file_atomic(path, content)?;

        info!(
            "Rewrote {} (backup at {})",
            path.display(),
            self.backup_path.display()
        );
        Ok(self.backup_path.clone())
    }

    fn backup_file(&self, path: &Path) -> Result<()> {
        if self.backup_path.exists() {
            warn!("Overwriting existing backup {}", self.backup_path.display());
        }

        fs::copy(path, &self.backup_path).map_err(|e| Error::io(&self.backup_path, e))?;

        debug!("Created backup: {}", self.backup_path.display());
        Ok(())
    }
}

/// Writes a file atomically, keeping the permissions of the file it replaces.
fn write_file_atomic(path: &Path, content: &str) -> Result<()> {
    let temp_path = temp_path_for(path);
    let permissions = fs::metadata(path)
        .map_err(|e| Error::io(path, e))?
        .permissions();

    let write = || -> io::Result<()> {
        let mut temp_file = fs::File::create(&temp_path)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.sync_all()?;
        drop(temp_file);
        fs::set_permissions(&temp_path, permissions)
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::io(path, e)
    })
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".debloat.tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn writer_for(path: &Path) -> Writer {
        let config = Config::builder().source_path(path).build().unwrap();
        Writer::new(&config)
    }

    #[test]
    fn test_persist_writes_content_and_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("app.py");
        file.write_str("x = 1\n# noise\n").unwrap();

        let source = SourceFile::read(file.path()).unwrap();
        let backup = writer_for(file.path()).persist(&source, "x = 1\n").unwrap();

        assert_eq!(backup, temp.child("app.py.bak").path());
        file.assert("x = 1\n");
        temp.child("app.py.bak").assert("x = 1\n# noise\n");
        assert!(!temp.child(".app.py.debloat.tmp").exists());
    }

    #[test]
    fn test_persist_overwrites_stale_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("lib.rs");
        file.write_str("fn a() {}\n").unwrap();
        temp.child("lib.rs.bak").write_str("stale").unwrap();

        let source = SourceFile::read(file.path()).unwrap();
        writer_for(file.path()).persist(&source, "fn b() {}\n").unwrap();

        temp.child("lib.rs.bak").assert("fn a() {}\n");
        file.assert("fn b() {}\n");
    }

    #[test]
    fn test_persist_refuses_changed_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("app.py");
        file.write_str("x = 1\n").unwrap();

        let source = SourceFile::read(file.path()).unwrap();
        file.write_str("x = 2\n").unwrap();

        let err = writer_for(file.path()).persist(&source, "y\n").unwrap_err();

        assert!(err.is_io());
        file.assert("x = 2\n");
        assert!(!temp.child("app.py.bak").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_persist_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("run.sh");
        file.write_str("echo hi\n").unwrap();
        fs::set_permissions(file.path(), fs::Permissions::from_mode(0o755)).unwrap();

        let source = SourceFile::read(file.path()).unwrap();
        writer_for(file.path()).persist(&source, "echo hi\n").unwrap();

        let mode = fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let path = temp_path_for(Path::new("/work/src/main.rs"));
        assert_eq!(path, Path::new("/work/src/.main.rs.debloat.tmp"));
    }
}
