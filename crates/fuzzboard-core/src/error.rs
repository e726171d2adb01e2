use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error(
        "paginated fetch accumulated {accumulated} items but the server reported a total of {expected}"
    )]
    Consistency { expected: u64, accumulated: u64 },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("file access error: {0}")]
    FileAccess(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn file_access(
        path: &std::path::Path,
        action: &str,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::FileAccess(format!("failed to {action} '{}': {error}", path.display()))
    }
}
