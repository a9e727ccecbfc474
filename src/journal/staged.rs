// src/journal/staged.rs

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::TMP_SUFFIX;

/// A snapshot being written at `<final>.tmp`.
///
/// Dropping it without calling [`StagedFile::persist`] removes the
/// temporary file, so failed writes never leave `.tmp` files behind.
#[derive(Debug)]
pub struct StagedFile {
    file: Option<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl StagedFile {
    pub fn create(final_path: &Path) -> io::Result<Self> {
        let tmp_path = tmp_path_for(final_path);
        let file = File::create(&tmp_path)?;
        Ok(Self {
            file: Some(file),
            tmp_path,
            final_path: final_path.to_path_buf(),
        })
    }

    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(bytes),
            None => Err(io::Error::other("staged file already closed")),
        }
    }

    /// Flush to stable storage, atomically rename over the final path and
    /// flush the parent directory that now holds the new name.
    pub fn persist(mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        fs::rename(&self.tmp_path, &self.final_path)?;
        // Renamed: nothing left for Drop to clean up.
        self.tmp_path = PathBuf::new();
        match self.final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => sync_dir(parent),
            _ => sync_dir(Path::new(".")),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.file.take();
        if self.tmp_path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = ?self.tmp_path, error = %e, "failed to remove staged snapshot");
            }
        }
    }
}

/// Flush a directory's entry table to stable storage.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// `<path>.tmp`
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(TMP_SUFFIX);
    PathBuf::from(os)
}

/// Whether a directory entry is an uncommitted staged snapshot.
pub fn is_staged(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TMP_SUFFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_stage_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("7");
        {
            let mut staged = StagedFile::create(&target).unwrap();
            staged.write_all(b"{}").unwrap();
            assert!(staged.tmp_path().exists());
        }
        assert!(!dir.path().join("7.tmp").exists());
        assert!(!target.exists());
    }

    #[test]
    fn persist_moves_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("7");
        let mut staged = StagedFile::create(&target).unwrap();
        staged.write_all(b"{\"a\":1}").unwrap();
        staged.persist().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "{\"a\":1}");
        assert!(!dir.path().join("7.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn directory_sync_opens_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).unwrap();

        let err = sync_dir(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn staged_names() {
        assert!(is_staged(Path::new("/x/files/abc.tmp")));
        assert!(!is_staged(Path::new("/x/files/abc")));
        assert_eq!(tmp_path_for(Path::new("/x/3")), PathBuf::from("/x/3.tmp"));
    }
}
