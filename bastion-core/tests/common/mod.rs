//! Shared helpers for integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// A scratch directory for one test's vault files; removed on drop.
pub struct TempVaultDir {
    dir: PathBuf,
}

impl TempVaultDir {
    pub fn new(prefix: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("create temp dir");
        Self { dir }
    }

    pub fn vault_path(&self) -> PathBuf {
        self.dir.join("vault.db")
    }

    #[allow(dead_code)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for TempVaultDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}
