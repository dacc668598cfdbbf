//! Temporary file management module
//!
//! This module provides RAII-based temporary file and directory handling with
//! automatic cleanup. Per-request cookie files and yt-dlp output directories
//! live in these guards so nothing outlives the request that created it.

use std::fs::{self, File};
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Guard for temporary resources that automatically cleans up on drop
#[derive(Debug)]
pub(crate) enum TempGuard {
    /// Temporary file that will be deleted when dropped
    File(PathBuf),
    /// Temporary directory that will be deleted recursively when dropped
    Directory(PathBuf),
}

impl TempGuard {
    /// Get the path to the temporary resource
    pub(crate) fn path(&self) -> &Path {
        match self {
            TempGuard::File(path) | TempGuard::Directory(path) => path,
        }
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        // Silently ignore errors during cleanup
        match self {
            TempGuard::File(path) => {
                let _ = fs::remove_file(path);
            }
            TempGuard::Directory(path) => {
                let _ = fs::remove_dir_all(path);
            }
        }
    }
}

impl Deref for TempGuard {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.path()
    }
}

/// Builds a unique name using ULID (monotonic, sortable unique identifier)
fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, ulid::Ulid::new())
}

/// Creates an empty temporary file inside `dir` and returns a guard that
/// will remove it on drop
///
/// # Examples
///
/// ```ignore
/// let temp = create_temp_file(&std::env::temp_dir(), "req_cookies", "txt")?;
/// // File is automatically deleted when temp goes out of scope
/// ```
pub(crate) fn create_temp_file(dir: &Path, prefix: &str, extension: &str) -> io::Result<TempGuard> {
    fs::create_dir_all(dir)?;

    let path = dir.join(format!("{}.{}", unique_name(prefix), extension));
    File::create(&path)?;

    Ok(TempGuard::File(path))
}

/// Creates an empty temporary directory inside `dir` and returns a guard that
/// will remove it, including its contents, on drop
pub(crate) fn create_temp_dir(dir: &Path, prefix: &str) -> io::Result<TempGuard> {
    let path = dir.join(unique_name(prefix));
    fs::create_dir_all(&path)?;

    Ok(TempGuard::Directory(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_temp_file() {
        let base = tempfile::tempdir().unwrap();
        let temp = create_temp_file(base.path(), "test", "txt").unwrap();
        let path = temp.path().to_path_buf();

        assert!(path.exists());
        assert!(path.is_file());

        let filename = path.file_name().unwrap().to_str().unwrap();
        assert!(filename.starts_with("test_"));
        assert!(filename.ends_with(".txt"));

        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn test_multiple_temp_files_unique() {
        let base = tempfile::tempdir().unwrap();
        let temp1 = create_temp_file(base.path(), "test", "txt").unwrap();
        let temp2 = create_temp_file(base.path(), "test", "txt").unwrap();

        assert_ne!(temp1.path(), temp2.path());
        assert!(temp1.path().exists());
        assert!(temp2.path().exists());
    }

    #[test]
    fn test_temp_file_creates_missing_parent() {
        let base = tempfile::tempdir().unwrap();
        let nested = base.path().join("a").join("b");

        let temp = create_temp_file(&nested, "nested", "tmp").unwrap();
        assert!(temp.path().starts_with(&nested));
        assert!(temp.path().exists());
    }

    #[test]
    fn test_temp_dir_cleanup_removes_contents() {
        let base = tempfile::tempdir().unwrap();
        let path = {
            let temp = create_temp_dir(base.path(), "ytdlp").unwrap();
            fs::write(temp.join("video.en.vtt"), "WEBVTT\n").unwrap();
            assert!(temp.path().is_dir());
            temp.path().to_path_buf()
        };

        assert!(!path.exists());
    }
}
