//! Errors raised while a request travels through a handler chain.
//!
//! Construction-time problems (bad route patterns, bad middleware options)
//! are reported through [`RouteError`](crate::core::RouteError) when the
//! router is built. Everything here happens per request and is turned into an
//! HTTP status by the server's error path.
use std::io;

use http::StatusCode;
use thiserror::Error;

use crate::{
    core::url::UrlError,
    ports::file_system::{FileSystemError, io_status_code},
};

/// Result type returned by handlers and middleware
pub type HandlerResult = Result<(), Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The request target could not be canonicalized
    #[error(transparent)]
    Url(#[from] UrlError),

    /// The chain ran out of handlers without one claiming the request
    #[error("No route matched the request")]
    NotFound,

    /// A handler asked for a specific status
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A second terminal operation was attempted on a response
    #[error("Response already sent")]
    AlreadySent,

    /// The transport reported the client as gone
    #[error("Request cancelled")]
    Cancelled,

    /// Writing to the underlying connection failed
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("Invalid header value for {0}")]
    InvalidHeader(String),

    #[error("Failed to serialize response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// An error carrying an explicit HTTP status.
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Status {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        Error::Internal(message.to_string())
    }

    /// HTTP status to answer with when this error reaches the server.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Url(_) => StatusCode::BAD_REQUEST,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Status { status, .. } => *status,
            Error::FileSystem(err) => err.status_code(),
            Error::Io(err) => io_status_code(err),
            Error::AlreadySent
            | Error::Cancelled
            | Error::Transport(_)
            | Error::InvalidHeader(_)
            | Error::Json(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
