use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Private working root for one extraction run, removed when dropped.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn new_in(parent: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(parent)
            .map_err(|source| Error::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        Ok(ScratchDir { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        // `TempDir` removes the tree after this, ignoring failures.
        make_writable(self.dir.path());
    }
}

/// Clears the read-only bit on everything under `root`.
#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(root: &Path) {
    for entry in WalkDir::new(root).into_iter().filter_map(|entry| entry.ok()) {
        let Ok(metadata) = entry.metadata() else { continue };
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            permissions.set_readonly(false);
            if let Err(e) = fs::set_permissions(entry.path(), permissions) {
                debug!("Could not reset permissions on {}: {}", entry.path().display(), e);
            }
        }
    }
}

/// Best-effort recursive delete. Never fails; leftovers are logged.
pub fn remove_tree(path: &Path) {
    if !path.exists() {
        return;
    }
    make_writable(path);
    if let Err(e) = fs::remove_dir_all(path) {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removes_read_only_trees() {
        let parent = tempdir().unwrap();
        let tree = parent.path().join("work");
        fs::create_dir_all(tree.join("nested")).unwrap();
        let file = tree.join("nested/locked.bin");
        fs::write(&file, b"data").unwrap();

        let mut permissions = fs::metadata(&file).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&file, permissions).unwrap();
        let mut permissions = fs::metadata(tree.join("nested")).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(tree.join("nested"), permissions).unwrap();

        remove_tree(&tree);
        assert!(!tree.exists());
        remove_tree(&tree);
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let parent = tempdir().unwrap();
        let scratch = ScratchDir::new_in(parent.path()).unwrap();
        let root = scratch.path().to_path_buf();
        fs::write(root.join("x.txt"), b"x").unwrap();
        assert!(root.is_dir());
        drop(scratch);
        assert!(!root.exists());
    }
}
