use std::path::{Path, PathBuf};

use http::{Method, StatusCode};

use crate::{
    core::{
        handler::{BoxFuture, Endpoint, Handler},
        media::MediaType,
        request::Request,
        response::Response,
    },
    error::HandlerResult,
    ports::file_system::{EntryKind, FileStat, FileSystem, FileSystemError, FileSystemResult},
};

/// File system adapter backed by `tokio::fs`
#[derive(Debug, Default, Clone)]
pub struct FileSystemAdapter;

impl FileSystemAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for FileSystemAdapter {
    type Reader = tokio::fs::File;

    async fn resolve(&self, root: &Path, relative: &[String]) -> FileSystemResult<PathBuf> {
        let mut full_path = root.to_path_buf();
        full_path.extend(relative);

        // Security check: ensure the resolved path is still within root
        let canonical_root = tokio::fs::canonicalize(root).await?;
        let canonical_path = tokio::fs::canonicalize(&full_path).await?;

        if !canonical_path.starts_with(&canonical_root) {
            return Err(FileSystemError::InvalidPath(
                "Path traversal attempt detected".to_string(),
            ));
        }

        Ok(canonical_path)
    }

    async fn stat(&self, path: &Path) -> FileSystemResult<FileStat> {
        let metadata = tokio::fs::metadata(path).await?;

        let kind = if metadata.is_file() {
            EntryKind::File
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        };

        Ok(FileStat {
            kind,
            len: metadata.len(),
        })
    }

    async fn open(&self, path: &Path) -> FileSystemResult<Self::Reader> {
        Ok(tokio::fs::File::open(path).await?)
    }
}

/// Serves files below a root directory.
///
/// Meant to be mounted with [`Router::use_handler`](crate::core::Router::use_handler):
/// the request path below the mount point is looked up under `root`. Only
/// `GET` and `HEAD` are handled. Missing files (and directories without an
/// index file) are left to the rest of the chain; other failures surface as
/// errors and are mapped to a status by the server.
#[derive(Debug, Clone)]
pub struct StaticFiles<F = FileSystemAdapter> {
    root: PathBuf,
    fs: F,
    index_file: Option<String>,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_file_system(root, FileSystemAdapter::new())
    }
}

impl<F: FileSystem> StaticFiles<F> {
    pub fn with_file_system(root: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            root: root.into(),
            fs,
            index_file: Some("index.html".to_string()),
        }
    }

    /// File served for directory requests, `None` to disable.
    pub fn index_file(mut self, name: Option<&str>) -> Self {
        self.index_file = name.map(str::to_string);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn into_handler(self) -> Handler {
        Handler::endpoint(self)
    }

    /// Resolve the request to a regular file, `None` when it should fall
    /// through.
    async fn lookup(&self, req: &Request) -> FileSystemResult<Option<(PathBuf, FileStat)>> {
        let path = match self.fs.resolve(&self.root, req.path()).await {
            Ok(path) => path,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        let stat = self.fs.stat(&path).await?;

        match stat.kind {
            EntryKind::File => Ok(Some((path, stat))),
            EntryKind::Directory => {
                let Some(index_file) = &self.index_file else {
                    tracing::debug!(path = %req.pathname(), "Directory without index file");
                    return Ok(None);
                };

                let index_path = path.join(index_file);

                match self.fs.stat(&index_path).await {
                    Ok(stat) if stat.kind == EntryKind::File => Ok(Some((index_path, stat))),
                    Ok(_) => Err(FileSystemError::NotAFile(req.pathname().to_string())),
                    Err(err) if err.is_not_found() => Ok(None),
                    Err(err) => Err(err),
                }
            }
            EntryKind::Other => Err(FileSystemError::NotAFile(req.pathname().to_string())),
        }
    }
}

impl<F: FileSystem> Endpoint for StaticFiles<F> {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let head = *req.method() == Method::HEAD;

            if *req.method() != Method::GET && !head {
                return Ok(());
            }

            let Some((path, stat)) = self.lookup(req).await? else {
                return Ok(());
            };

            let reader = self.fs.open(&path).await?;
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();

            res.set_status(StatusCode::OK)
                .set_type(MediaType::from_file_name(name))
                .set_length(stat.len);

            if head {
                return res.end().await;
            }

            res.stream(reader).await
        })
    }
}
