//! Per-request scratch space for backend output.
//!
//! Each synthesis call gets its own `tts-<uuid>` directory under the scratch
//! root.  The directory is removed when the [`ScratchFile`] is dropped, which
//! also covers panics that unwind through the blocking worker.  Entries left
//! behind by a crashed process are collected by [`sweep_stale`] at startup.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// Prefix of every per-request scratch directory.
pub const PREFIX: &str = "tts-";

const OUTPUT_NAME: &str = "output.wav";

pub struct ScratchFile {
    dir: TempDir,
    output: PathBuf,
}

impl ScratchFile {
    /// Create a fresh, uniquely named directory under `root`.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("Cannot create scratch root: {}", root.display()))?;
        let name = format!("{PREFIX}{}", uuid::Uuid::new_v4().simple());
        let dir = tempfile::Builder::new()
            .prefix(&name)
            .rand_bytes(0)
            .tempdir_in(root)
            .with_context(|| format!("Cannot create scratch directory in {}", root.display()))?;
        let output = dir.path().join(OUTPUT_NAME);
        Ok(Self { dir, output })
    }

    /// Where the backend should write its WAV output.
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Read the backend output back.  `None` when nothing (or nothing but an
    /// empty file) was produced.
    pub fn read_back(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.output) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Cannot read backend output: {}", self.output.display())),
        }
    }

    /// Remove the directory now, logging instead of failing on error.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

/// Delete `tts-*` entries under `root` whose modification time is older than
/// `max_age`.  Returns how many were removed; a missing root counts as zero.
pub fn sweep_stale(root: &Path, max_age: Duration) -> Result<usize> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(e).with_context(|| format!("Cannot list scratch root: {}", root.display()))
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries {
        let entry = entry.context("Cannot read scratch root entry")?;
        if !entry.file_name().to_string_lossy().starts_with(PREFIX) {
            continue;
        }
        let path = entry.path();
        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .map(|modified| now.duration_since(modified).unwrap_or(Duration::ZERO));
        if !matches!(age, Some(age) if age >= max_age) {
            continue;
        }

        let result = if path.is_dir() { fs::remove_dir_all(&path) } else { fs::remove_file(&path) };
        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "removed stale scratch entry");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove stale scratch entry")
            }
        }
    }
    Ok(removed)
}

/// Number of `tts-*` entries currently under `root`.
pub fn count_entries(root: &Path) -> usize {
    fs::read_dir(root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(PREFIX))
                .count()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create(root.path()).unwrap();
        let dir = scratch.dir().to_path_buf();
        fs::write(scratch.output_path(), b"data").unwrap();
        assert!(dir.exists());
        drop(scratch);
        assert!(!dir.exists());
    }

    #[test]
    fn test_release_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create(root.path()).unwrap();
        let dir = scratch.dir().to_path_buf();
        scratch.release();
        assert!(!dir.exists());
    }

    #[test]
    fn test_names_are_unique() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchFile::create(root.path()).unwrap();
        let b = ScratchFile::create(root.path()).unwrap();
        assert_ne!(a.output_path(), b.output_path());
        assert!(a.dir().file_name().unwrap().to_string_lossy().starts_with(PREFIX));
        assert_eq!(count_entries(root.path()), 2);
    }

    #[test]
    fn test_read_back() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::create(root.path()).unwrap();
        assert_eq!(scratch.read_back().unwrap(), None);
        fs::write(scratch.output_path(), b"").unwrap();
        assert_eq!(scratch.read_back().unwrap(), None);
        fs::write(scratch.output_path(), b"RIFF").unwrap();
        assert_eq!(scratch.read_back().unwrap(), Some(b"RIFF".to_vec()));
    }

    #[test]
    fn test_create_makes_missing_root() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("nested").join("scratch");
        let scratch = ScratchFile::create(&root).unwrap();
        assert!(scratch.dir().starts_with(&root));
    }

    #[test]
    fn test_sweep_stale_only_touches_old_prefixed_entries() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("tts-orphan")).unwrap();
        fs::write(root.path().join("tts-orphan").join(OUTPUT_NAME), b"x").unwrap();
        fs::write(root.path().join("unrelated.wav"), b"x").unwrap();

        // Nothing is older than an hour yet.
        assert_eq!(sweep_stale(root.path(), Duration::from_secs(3600)).unwrap(), 0);
        assert!(root.path().join("tts-orphan").exists());

        // With a zero max age every prefixed entry is stale.
        assert_eq!(sweep_stale(root.path(), Duration::ZERO).unwrap(), 1);
        assert!(!root.path().join("tts-orphan").exists());
        assert!(root.path().join("unrelated.wav").exists());
    }

    #[test]
    fn test_sweep_missing_root() {
        let base = tempfile::tempdir().unwrap();
        assert_eq!(sweep_stale(&base.path().join("absent"), Duration::ZERO).unwrap(), 0);
    }
}
