//! routekit - an embeddable HTTP routing core.
//!
//! routekit turns raw request targets into canonical URLs, dispatches them through an ordered
//! chain of hooks, mounted sub-routers and method routes, and gives handlers a small
//! request/response API with single-send semantics. It follows a **hexagonal architecture**:
//! the routing logic in `core` only talks to the outside world through the traits in `ports`,
//! with `tokio`/`hyper` backed implementations living in `adapters`.
//!
//! # Features
//! - URL normalization with traversal rejection and configurable limits
//! - Routes with `:name` parameters, prefix hooks and mounted routers that see
//!   paths relative to their mount point
//! - Chained (`next`) and terminal handlers, with fall-through to the next match
//! - Typed responses (text, HTML, JSON, form, redirect, streams) sent exactly once
//! - Static files, CORS, basic auth and header middleware
//! - HTTP/1.1 serving over hyper with graceful shutdown and structured tracing
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::StatusCode;
//! use routekit::{Handler, HttpHandler, Router, Server};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let mut router = Router::new();
//! router.get(
//!     "/hello/:name",
//!     Handler::terminal(|req, res| {
//!         Box::pin(async move {
//!             let name = req.param("name").unwrap_or("world").to_string();
//!             res.text(StatusCode::OK, format!("hello {name}")).await
//!         })
//!     }),
//! )?;
//!
//! let handler = Arc::new(HttpHandler::new(Arc::new(Server::new(router))));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! handler.serve(listener, CancellationToken::new()).await?;
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Handlers return [`HandlerResult`]. Any [`Error`] aborts the chain and is turned into a
//! plain text `HTTP Error: <code>.` response by the [`Server`] unless a response was already
//! sent. Binary and configuration code uses `eyre::Result<T>` with context attached.
//!
//! # License
//! Dual-licensed under either MIT or Apache-2.0 at your option.
pub mod app;
pub mod config;
pub mod error;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{ChannelSink, FileSystemAdapter, HttpHandler, StaticFiles},
    core::{
        Handler, Hook, MediaType, Next, Request, Response, Route, RouteError, Router, Server,
        ServerEvent, UrlLimits,
    },
    error::{Error, HandlerResult},
    ports::{IncomingRequest, ResponseSink},
};
