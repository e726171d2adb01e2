use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::CoreError;

/// Scratch directory for one run.
///
/// A temporary directory is removed when the value is dropped, on success and
/// on every error path. A persistent directory is owned by the caller and kept
/// so raw downloads can be re-parsed offline.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    temporary: Option<TempDir>,
}

impl WorkDir {
    pub fn temporary() -> Result<Self, CoreError> {
        let dir = tempfile::Builder::new()
            .prefix("fuzzboard-")
            .tempdir()
            .map_err(|error| {
                CoreError::FileAccess(format!("failed to create scratch directory: {error}"))
            })?;
        debug!(path = %dir.path().display(), "created temporary scratch directory");
        Ok(Self {
            path: dir.path().to_path_buf(),
            temporary: Some(dir),
        })
    }

    pub fn persistent(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        std::fs::create_dir_all(&path)
            .map_err(|error| CoreError::file_access(&path, "create scratch directory", error))?;
        Ok(Self {
            path,
            temporary: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary.is_some()
    }

    pub fn scratch_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    pub fn write_scratch(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, CoreError> {
        let path = self.scratch_path(file_name);
        std::fs::write(&path, contents)
            .map_err(|error| CoreError::file_access(&path, "write scratch file", error))?;
        Ok(path)
    }

    pub fn read_scratch(&self, file_name: &str) -> Result<String, CoreError> {
        let path = self.scratch_path(file_name);
        std::fs::read_to_string(&path)
            .map_err(|error| CoreError::file_access(&path, "read scratch file", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_workdir_is_removed_on_drop() {
        let workdir = WorkDir::temporary().expect("create workdir");
        let path = workdir.path().to_path_buf();
        workdir
            .write_scratch("temp-fuzzer-find-reports.csv", b"Bug ID\n")
            .expect("write scratch");
        assert!(path.join("temp-fuzzer-find-reports.csv").exists());

        drop(workdir);

        assert!(!path.exists());
    }

    #[test]
    fn persistent_workdir_survives_drop_and_overwrites_scratch_files() {
        let root = tempfile::tempdir().expect("tempdir");
        let scratch = root.path().join("temp");

        let workdir = WorkDir::persistent(&scratch).expect("create workdir");
        assert!(!workdir.is_temporary());
        workdir.write_scratch("raw.csv", b"first").expect("first write");
        workdir.write_scratch("raw.csv", b"second").expect("second write");
        drop(workdir);

        let reopened = WorkDir::persistent(&scratch).expect("reopen workdir");
        assert_eq!(reopened.read_scratch("raw.csv").expect("read"), "second");
    }

    #[test]
    fn read_scratch_reports_missing_files() {
        let workdir = WorkDir::temporary().expect("create workdir");

        let error = workdir.read_scratch("missing.csv").expect_err("missing file");

        assert!(matches!(error, CoreError::FileAccess(_)));
    }
}
