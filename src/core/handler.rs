//! Handlers and the continuation passed to chained handlers.
//!
//! Handlers come in two shapes. A *terminal* handler gets the request and the
//! response and is done. A *chained* handler additionally receives a [`Next`]
//! it may run to hand control to the rest of the chain. Dropping `Next`
//! without running it stops the chain.
//!
//! ```
//! use http::StatusCode;
//! use routekit::core::{Handler, Router};
//!
//! # fn main() -> Result<(), routekit::core::RouteError> {
//! let mut router = Router::new();
//!
//! router.hook(
//!     "/",
//!     Handler::chained(|req, res, next| {
//!         Box::pin(async move {
//!             tracing::debug!(path = %req.pathname(), "before");
//!             next.run(req, res).await
//!         })
//!     }),
//! )?;
//!
//! router.get(
//!     "/hello/:name",
//!     Handler::terminal(|req, res| {
//!         Box::pin(async move {
//!             let name = req.param("name").unwrap_or("world").to_string();
//!             res.text(StatusCode::OK, format!("hello {name}")).await
//!         })
//!     }),
//! )?;
//! # Ok(())
//! # }
//! ```
use std::{fmt, future::Future, pin::Pin, sync::Arc};

use crate::{
    core::{
        request::{Request, UrlState},
        response::Response,
        router::{Cursor, Router},
    },
    error::{Error, HandlerResult},
};

/// A boxed, sendable future borrowing from the request cycle.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler that ends its part of the chain.
pub trait Endpoint: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Endpoint for F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, HandlerResult> {
        (self)(req, res)
    }
}

/// A handler that decides whether the rest of the chain runs.
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Middleware for F
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next<'a>) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        (self)(req, res, next)
    }
}

/// A registered handler.
#[derive(Clone)]
pub enum Handler {
    Terminal(Arc<dyn Endpoint>),
    Chained(Arc<dyn Middleware>),
}

impl Handler {
    /// Wrap a closure taking `(req, res)`.
    pub fn terminal<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Handler::Terminal(Arc::new(f))
    }

    /// Wrap a closure taking `(req, res, next)`.
    pub fn chained<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response, Next<'a>) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Handler::Chained(Arc::new(f))
    }

    pub fn endpoint<E: Endpoint>(endpoint: E) -> Self {
        Handler::Terminal(Arc::new(endpoint))
    }

    pub fn middleware<M: Middleware>(middleware: M) -> Self {
        Handler::Chained(Arc::new(middleware))
    }

    pub fn is_chained(&self) -> bool {
        matches!(self, Handler::Chained(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Terminal(_) => f.write_str("Handler::Terminal"),
            Handler::Chained(_) => f.write_str("Handler::Chained"),
        }
    }
}

/// The remainder of a handler chain.
///
/// Running it resumes dispatch right after the handler that received it:
/// later hooks and mounts, then later routes for the same method and, once
/// the router is exhausted, whatever follows the mount point in the parent
/// router. A chain that runs out entirely yields [`Error::NotFound`].
#[must_use = "the chain only continues when `Next::run` is awaited"]
pub struct Next<'a> {
    router: &'a Router,
    cursor: Cursor,
    restore: Option<UrlState>,
    parent: Option<Box<Next<'a>>>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(router: &'a Router, cursor: Cursor, parent: Option<Box<Next<'a>>>) -> Self {
        Self {
            router,
            cursor,
            restore: None,
            parent,
        }
    }

    /// Put `state` back on the request before resuming.
    pub(crate) fn restoring(mut self, state: UrlState) -> Self {
        self.restore = Some(state);
        self
    }

    /// Continue the chain.
    pub fn run<'b>(self, req: &'b mut Request, res: &'b mut Response) -> BoxFuture<'b, HandlerResult>
    where
        'a: 'b,
    {
        Box::pin(async move {
            let Next {
                router,
                cursor,
                restore,
                parent,
            } = self;

            if let Some(state) = restore {
                req.restore_url(state);
            }

            router.resume(cursor, parent, req, res).await
        })
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("cursor", &self.cursor)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

/// Stop a chain with an explicit status.
pub fn reject(status: http::StatusCode, message: impl Into<String>) -> HandlerResult {
    Err(Error::status(status, message))
}
