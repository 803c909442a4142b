use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use http::StatusCode;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, warn};

use crate::{
    core::{request::Request, response::Response, router::Router, url::UrlLimits},
    error::Error,
    ports::transport::{IncomingRequest, ResponseSink},
};

/// Lifecycle notifications published by a [`Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Open,
    /// A request ended in the top-level error handler
    Error {
        status: u16,
        message: String,
    },
    Close,
}

/// The top-level request handler.
///
/// Owns the frozen root [`Router`] and turns every incoming request into
/// exactly one response: whatever the chain sends, or `HTTP Error: <code>.`
/// when it fails or finishes without sending.
pub struct Server {
    router: Arc<Router>,
    limits: UrlLimits,
    events: broadcast::Sender<ServerEvent>,
    open: AtomicBool,
}

impl Server {
    pub fn new(router: impl Into<Arc<Router>>) -> Self {
        Self::with_limits(router, UrlLimits::default())
    }

    pub fn with_limits(router: impl Into<Arc<Router>>, limits: UrlLimits) -> Self {
        let (events, _) = broadcast::channel(64);

        Self {
            router: router.into(),
            limits,
            events,
            open: AtomicBool::new(false),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn limits(&self) -> UrlLimits {
        self.limits
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Mark the server as accepting requests.
    pub fn open(&self) {
        if !self.open.swap(true, Ordering::Relaxed) {
            tracing::info!("Server opened");
            self.publish(ServerEvent::Open);
        }
    }

    /// Mark the server as closed.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::Relaxed) {
            tracing::info!("Server closed");
            self.publish(ServerEvent::Close);
        }
    }

    /// Report a failure outside of request handling, e.g. a listener error.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        error!(%message, "Server failure");
        self.publish(ServerEvent::Error {
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message,
        });
    }

    pub async fn handle(&self, incoming: IncomingRequest, sink: Box<dyn ResponseSink>) {
        self.handle_with_cancel(incoming, sink, CancellationToken::new())
            .await
    }

    /// Handle a request whose transport fires `cancel` when the client leaves.
    pub async fn handle_with_cancel(
        &self,
        incoming: IncomingRequest,
        sink: Box<dyn ResponseSink>,
        cancel: CancellationToken,
    ) {
        let mut res = Response::new(sink);
        let method = incoming.method.clone();

        let mut req = match Request::from_incoming(incoming, self.limits) {
            Ok(req) => req.with_cancellation(cancel),
            Err(err) => {
                warn!(%method, error = %err, "Rejected request target");
                self.handle_error(Error::from(err), &mut res).await;
                return;
            }
        };

        let span = tracing::debug_span!("dispatch", method = %req.method(), path = %req.pathname());

        let result = self
            .router
            .handle(&mut req, &mut res)
            .instrument(span)
            .await;

        match result {
            Ok(()) if res.is_sent() => {}
            Ok(()) => {
                debug!(path = %req.pathname(), "Chain finished without a response");
                self.handle_error(Error::NotFound, &mut res).await;
            }
            Err(err) => self.handle_error(err, &mut res).await,
        }
    }

    async fn handle_error(&self, err: Error, res: &mut Response) {
        match &err {
            Error::AlreadySent => {
                error!("Handler attempted to send a response twice");
                return;
            }
            Error::Cancelled => {
                debug!("Request cancelled by client");
                return;
            }
            _ => {}
        }

        let status = err.status_code();

        if !matches!(err, Error::NotFound) {
            if status.is_server_error() {
                error!(status = status.as_u16(), error = %err, "Request failed");
            } else {
                debug!(status = status.as_u16(), error = %err, "Request rejected");
            }

            self.publish(ServerEvent::Error {
                status: status.as_u16(),
                message: err.to_string(),
            });
        }

        if res.is_sent() {
            error!(error = %err, "Error raised after the response was sent");
            return;
        }

        let body = format!("HTTP Error: {}.", status.as_u16());

        if let Err(send_err) = res.text(status, body).await {
            error!(error = %send_err, "Failed to send error response");
        }
    }

    fn publish(&self, event: ServerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("router", &self.router)
            .field("limits", &self.limits)
            .field("open", &self.is_open())
            .finish()
    }
}
