use std::{convert::Infallible, sync::Arc};

use bytes::Bytes;
use eyre::{Result, WrapErr};
use http::{HeaderValue, StatusCode, header};
use http_body_util::{BodyExt, Full, Limited};
use hyper::{Request, Response, body::Body, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{adapters::sink::ChannelSink, core::Server, ports::transport::IncomingRequest};

/// Default cap on request bodies read into memory.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// HTTP/1.1 transport for a [`Server`]
pub struct HttpHandler {
    server: Arc<Server>,
    max_body_bytes: usize,
}

impl HttpHandler {
    pub fn new(server: Arc<Server>) -> Self {
        Self {
            server,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn server(&self) -> &Arc<Server> {
        &self.server
    }

    /// Read the body, run the request through the server and collect the
    /// response it produced.
    ///
    /// The request is cancelled if this future is dropped before completing,
    /// which hyper does when the client disconnects.
    pub async fn handle_request<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();

        let body = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                return plain_error(StatusCode::BAD_REQUEST);
            }
        };

        let incoming = IncomingRequest {
            method: parts.method,
            target: parts.uri.to_string(),
            headers: parts.headers,
            body,
        };

        let (sink, rx) = ChannelSink::new();
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        self.server
            .handle_with_cancel(incoming, Box::new(sink), cancel)
            .await;
        guard.disarm();

        match rx.await {
            Ok(response) => response.map(Full::new),
            Err(_) => {
                tracing::error!("Request finished without producing a response");
                plain_error(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Accept connections until `shutdown` fires, then wait for in-flight
    /// connections to finish before closing the server.
    ///
    /// Bounding the wait is up to the caller, see
    /// [`GracefulShutdown::drain`](crate::utils::GracefulShutdown::drain).
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .wrap_err("Failed to get local addr")?;

        tracing::info!("routekit server listening on {}", local_addr);
        self.server.open();
        let connections = TaskTracker::new();

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let handler = self.clone();
            let shutdown = shutdown.clone();

            connections.spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler.handle_request(req).await) }
                });

                let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                tokio::pin!(conn);

                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = shutdown.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                };

                if let Err(e) = result {
                    tracing::debug!(%peer, "Connection error: {}", e);
                }
            });
        }

        connections.close();
        if !connections.is_empty() {
            tracing::info!(
                "Waiting for {} in-flight connection(s) to finish",
                connections.len()
            );
        }
        connections.wait().await;

        self.server.close();
        tracing::info!("routekit server on {} stopped", local_addr);
        Ok(())
    }
}

impl Clone for HttpHandler {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

fn plain_error(status: StatusCode) -> Response<Full<Bytes>> {
    let body = Bytes::from(format!("HTTP Error: {}.", status.as_u16()));

    let mut response = Response::new(Full::new(body.clone()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    response
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use http::Method;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::core::{Handler, Router, ServerEvent};

    fn echo_server() -> Arc<Server> {
        let mut router = Router::new();
        router
            .post(
                "/echo",
                Handler::terminal(|req, res| {
                    Box::pin(async move {
                        let body = req.body().clone();
                        res.buffer(StatusCode::OK, body).await
                    })
                }),
            )
            .unwrap();
        router
            .get(
                "/hello/:name",
                Handler::terminal(|req, res| {
                    Box::pin(async move {
                        let name = req.param("name").unwrap_or_default().to_string();
                        res.text(StatusCode::OK, format!("hello {name}")).await
                    })
                }),
            )
            .unwrap();
        Arc::new(Server::new(router))
    }

    async fn body_of(response: Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_handle_request() {
        let handler = HttpHandler::new(echo_server());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(Full::new(Bytes::from_static(b"ping")))
            .unwrap();
        let response = handler.handle_request(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(body_of(response).await, "ping");

        let req = Request::builder()
            .uri("http://example.com/hello/world%21")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = handler.handle_request(req).await;
        assert_eq!(body_of(response).await, "hello world!");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let handler = HttpHandler::new(echo_server()).with_max_body_bytes(4);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .body(Full::new(Bytes::from_static(b"too large")))
            .unwrap();
        let response = handler.handle_request(req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(response).await, "HTTP Error: 400.");
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_requests() {
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let started_tx = std::sync::Mutex::new(Some(started_tx));

        let mut router = Router::new();
        router
            .get(
                "/slow",
                Handler::terminal(move |_req, res| {
                    if let Some(tx) = started_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    Box::pin(async move {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        res.text(StatusCode::OK, "finally").await
                    })
                }),
            )
            .unwrap();
        let server = Arc::new(Server::new(router));
        let mut events = server.subscribe();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handler = Arc::new(HttpHandler::new(server.clone()));
        let serving = tokio::spawn(handler.serve(listener, shutdown.clone()));

        let client = tokio::spawn(async move {
            let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            let mut raw = String::new();
            stream.read_to_string(&mut raw).await.unwrap();
            raw
        });

        started_rx.await.unwrap();
        let cancelled_at = Instant::now();
        shutdown.cancel();
        serving.await.unwrap().unwrap();

        assert!(cancelled_at.elapsed() >= Duration::from_millis(300));
        assert!(!server.is_open());

        let raw = client.await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
        assert!(raw.ends_with("finally"), "{raw}");

        assert_eq!(events.try_recv().unwrap(), ServerEvent::Open);
        assert_eq!(events.try_recv().unwrap(), ServerEvent::Close);
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let handler = Arc::new(HttpHandler::new(echo_server()));
        let task = tokio::spawn(handler.serve(listener, shutdown.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /hello/tcp HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
        assert!(raw.ends_with("hello tcp"), "{raw}");

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}
