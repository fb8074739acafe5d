//! Developer maintenance: repair a dictionary data install.
//!
//! Some text front-ends ship a dictionary package whose data directory is
//! empty until a large separate download completes, alongside a "lite"
//! package that bundles a smaller copy.  [`patch_dictionary`] fills the empty
//! target from the bundled copy so the backend can load without the download.
//!
//! ```text
//! <package>/dicdir/    ← target (filled from the lite package's dicdir/)
//! <package>/version    ← written when absent
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

/// Version string written next to a freshly patched dictionary.
pub const DEFAULT_VERSION: &str = "3.1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Target did not exist and was copied from source.
    Copied,
    /// Target existed but was empty; it was replaced.
    Replaced,
    /// Target already had content; left untouched.
    AlreadyPresent,
}

/// Copy `source` into `target` unless `target` already has content, then
/// write `version` to `<target parent>/version` if that file is missing.
pub fn patch_dictionary(source: &Path, target: &Path, version: &str) -> Result<PatchOutcome> {
    if !source.is_dir() {
        bail!("Source dictionary directory not found: {}", source.display());
    }

    let outcome = if target.exists() {
        let has_content = fs::read_dir(target)
            .with_context(|| format!("Cannot list {}", target.display()))?
            .next()
            .is_some();
        if has_content {
            tracing::info!(target = %target.display(), "dictionary already present");
            PatchOutcome::AlreadyPresent
        } else {
            fs::remove_dir_all(target)
                .with_context(|| format!("Cannot remove empty {}", target.display()))?;
            let files = copy_tree(source, target)?;
            tracing::info!(target = %target.display(), files, "empty dictionary replaced");
            PatchOutcome::Replaced
        }
    } else {
        let files = copy_tree(source, target)?;
        tracing::info!(target = %target.display(), files, "dictionary copied");
        PatchOutcome::Copied
    };

    if let Some(parent) = target.parent() {
        let version_file = parent.join("version");
        if !version_file.exists() {
            fs::write(&version_file, version)
                .with_context(|| format!("Cannot write {}", version_file.display()))?;
            tracing::info!(path = %version_file.display(), "version file created");
        }
    }

    Ok(outcome)
}

/// Recursively copy `source` to `target`; returns the number of files copied.
fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
    let mut files = 0;
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.with_context(|| format!("Cannot walk {}", source.display()))?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .context("walkdir yielded a path outside the source")?;
        let dest: PathBuf = target.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("Cannot create {}", dest.display()))?;
        } else {
            fs::copy(entry.path(), &dest).with_context(|| {
                format!("Cannot copy {} → {}", entry.path().display(), dest.display())
            })?;
            files += 1;
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lite_dicdir(base: &Path) -> PathBuf {
        let src = base.join("lite").join("dicdir");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sys.dic"), b"dic").unwrap();
        fs::write(src.join("sub").join("matrix.def"), b"def").unwrap();
        src
    }

    #[test]
    fn test_copies_into_missing_target() {
        let base = tempfile::tempdir().unwrap();
        let src = lite_dicdir(base.path());
        let target = base.path().join("full").join("dicdir");
        fs::create_dir_all(target.parent().unwrap()).unwrap();

        assert_eq!(patch_dictionary(&src, &target, "3.1.0").unwrap(), PatchOutcome::Copied);
        assert_eq!(fs::read(target.join("sys.dic")).unwrap(), b"dic");
        assert_eq!(fs::read(target.join("sub").join("matrix.def")).unwrap(), b"def");
        assert_eq!(fs::read_to_string(base.path().join("full").join("version")).unwrap(), "3.1.0");
    }

    #[test]
    fn test_replaces_empty_target() {
        let base = tempfile::tempdir().unwrap();
        let src = lite_dicdir(base.path());
        let target = base.path().join("full").join("dicdir");
        fs::create_dir_all(&target).unwrap();

        assert_eq!(patch_dictionary(&src, &target, "3.1.0").unwrap(), PatchOutcome::Replaced);
        assert!(target.join("sys.dic").exists());
    }

    #[test]
    fn test_leaves_populated_target_and_existing_version() {
        let base = tempfile::tempdir().unwrap();
        let src = lite_dicdir(base.path());
        let target = base.path().join("full").join("dicdir");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("own.dic"), b"mine").unwrap();
        fs::write(base.path().join("full").join("version"), "9.9").unwrap();

        assert_eq!(
            patch_dictionary(&src, &target, "3.1.0").unwrap(),
            PatchOutcome::AlreadyPresent
        );
        assert!(!target.join("sys.dic").exists());
        assert_eq!(fs::read_to_string(base.path().join("full").join("version")).unwrap(), "9.9");
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let base = tempfile::tempdir().unwrap();
        let err = patch_dictionary(&base.path().join("nope"), &base.path().join("t"), "1");
        assert!(err.is_err());
        assert!(!base.path().join("t").exists());
    }
}
