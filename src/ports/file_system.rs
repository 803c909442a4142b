use std::{io, path::Path};

use http::StatusCode;
use thiserror::Error;
use tokio::io::AsyncRead;

/// `EMFILE`: the process ran out of file descriptors.
#[cfg(unix)]
const EMFILE: i32 = 24;
/// `ERROR_TOO_MANY_OPEN_FILES`
#[cfg(windows)]
const EMFILE: i32 = 4;

/// Error type for file system operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FileSystemError {
    /// Error when encountering an IO issue
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Error when path is invalid or resolves outside the served root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The path exists but is neither a regular file nor a directory
    #[error("Cannot access file: {0}")]
    NotAFile(String),
}

impl FileSystemError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileSystemError::IoError(err) if err.kind() == io::ErrorKind::NotFound)
    }

    /// HTTP status used when this error escapes a handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FileSystemError::IoError(err) => io_status_code(err),
            FileSystemError::InvalidPath(_) | FileSystemError::NotAFile(_) => StatusCode::FORBIDDEN,
        }
    }
}

/// Map an OS error onto an HTTP status.
///
/// Missing files are 404, permission problems 403 and descriptor exhaustion
/// 500. Any other error carrying an OS code is blamed on the request (400);
/// errors without one are server faults.
pub fn io_status_code(err: &io::Error) -> StatusCode {
    match err.kind() {
        io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        _ => match err.raw_os_error() {
            Some(EMFILE) => StatusCode::INTERNAL_SERVER_ERROR,
            Some(_) => StatusCode::BAD_REQUEST,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

/// Result type for file system operations
pub type FileSystemResult<T> = Result<T, FileSystemError>;

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// The subset of file metadata the static file handler needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: EntryKind,
    pub len: u64,
}

/// FileSystem defines the port (interface) used to serve static files
pub trait FileSystem: Send + Sync + 'static {
    /// Reader handed to the response stream
    type Reader: AsyncRead + Unpin + Send + 'static;

    /// Resolve `relative` (a list of already validated path segments) below
    /// `root`, refusing anything that ends up outside of it.
    fn resolve(
        &self,
        root: &Path,
        relative: &[String],
    ) -> impl std::future::Future<Output = FileSystemResult<std::path::PathBuf>> + Send;

    /// Inspect a resolved path
    fn stat(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = FileSystemResult<FileStat>> + Send;

    /// Open a resolved path for reading
    fn open(
        &self,
        path: &Path,
    ) -> impl std::future::Future<Output = FileSystemResult<Self::Reader>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_status_mapping() {
        let not_found = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(io_status_code(&not_found), StatusCode::NOT_FOUND);

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(io_status_code(&denied), StatusCode::FORBIDDEN);

        let exhausted = io::Error::from_raw_os_error(EMFILE);
        assert_eq!(io_status_code(&exhausted), StatusCode::INTERNAL_SERVER_ERROR);

        let other = io::Error::other("no code");
        assert_eq!(io_status_code(&other), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[cfg(unix)]
    #[test]
    fn test_os_code_is_client_error() {
        // ENOTDIR
        let err = io::Error::from_raw_os_error(20);
        assert_eq!(io_status_code(&err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_file_system_error_status() {
        let err = FileSystemError::from(io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = FileSystemError::NotAFile("/dev/null".into());
        assert!(!err.is_not_found());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }
}
