use std::fs;
use std::path::{Path, PathBuf};

use crate::primitives::unique_name;
use crate::{Error, Result};

/// Scratch directory created under `root` and removed on drop.
///
/// Files staged here become visible elsewhere only through [`commit`],
/// which renames them into place. `root` should live on the same
/// filesystem as the commit destinations.
///
/// [`commit`]: Workspace::commit
pub struct Workspace {
    staging_path: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let staging_path = root.as_ref().join(unique_name(".ws-"));
        fs::create_dir_all(&staging_path).map_err(|e| Error::Write {
            path: staging_path.clone(),
            source: e,
        })?;
        Ok(Self { staging_path })
    }

    pub fn path(&self) -> &Path {
        &self.staging_path
    }

    /// Path of a staged file inside this workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.staging_path.join(name)
    }

    /// Move a staged file to `destination`, creating parent directories.
    ///
    /// Returns `false` without touching `destination` when it already exists
    /// and `overwrite` is not set.
    pub fn commit(&self, name: &str, destination: &Path, overwrite: bool) -> Result<bool> {
        if !overwrite && destination.exists() {
            return Ok(false);
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::rename(self.file(name), destination).map_err(|e| Error::Write {
            path: destination.to_path_buf(),
            source: e,
        })?;
        Ok(true)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.staging_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_workspace_commit() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("objects/ab/cdef");
        let workspace = Workspace::new(dir.path().join("tmp")).unwrap();
        fs::write(workspace.file("blob"), "data").unwrap();

        assert!(workspace.commit("blob", &dest, false).unwrap());
        assert_eq!(fs::read(&dest).unwrap(), b"data");
    }

    #[test]
    fn test_workspace_commit_keeps_existing() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("existing");
        fs::write(&dest, "old").unwrap();

        let workspace = Workspace::new(dir.path().join("tmp")).unwrap();
        fs::write(workspace.file("blob"), "new").unwrap();

        assert!(!workspace.commit("blob", &dest, false).unwrap());
        assert_eq!(fs::read(&dest).unwrap(), b"old");
    }

    #[test]
    fn test_workspace_cleanup_on_drop() {
        let dir = tempdir().unwrap();
        let staging;
        {
            let workspace = Workspace::new(dir.path()).unwrap();
            staging = workspace.path().to_path_buf();
            fs::write(workspace.file("file.txt"), "data").unwrap();
            assert!(staging.exists());
        }
        assert!(!staging.exists());
    }

    #[test]
    fn test_workspaces_are_distinct() {
        let dir = tempdir().unwrap();
        let a = Workspace::new(dir.path()).unwrap();
        let b = Workspace::new(dir.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
