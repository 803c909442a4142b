//! Assembles a [`Server`] from a [`ServerConfig`] for the `routekit` binary.
use std::sync::Arc;

use crate::{
    adapters::{
        BasicAuth, Cors, StaticFiles, custom_headers_middleware, request_id_middleware,
        request_timing_middleware, security_headers_middleware,
    },
    config::ServerConfig,
    core::{RouteError, Router, Server, ServerEvent},
};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

/// Build the root router described by `config`.
///
/// Diagnostics hooks come first so they observe everything, followed by the
/// header hooks, CORS, basic auth and finally one static mount per
/// configured directory in declaration order.
pub fn build_router(config: &ServerConfig) -> Result<Router, RouteError> {
    let mut router = Router::new();

    router
        .hook("/", request_id_middleware())?
        .hook("/", request_timing_middleware())?;

    if config.security_headers {
        router.hook("/", security_headers_middleware())?;
    }

    if !config.headers.is_empty() {
        router.hook("/", custom_headers_middleware(Arc::new(config.headers.clone())))?;
    }

    if let Some(cors) = &config.cors {
        router.hook("/", Cors::new(cors.origins.clone())?.into_handler())?;
    }

    if let Some(auth) = &config.basic_auth {
        let basic_auth = BasicAuth::new(
            auth.username.as_deref(),
            &auth.password,
            auth.realm.as_deref(),
        )?;
        router.hook("/", basic_auth.into_handler())?;
    }

    for mount in &config.static_files {
        let files = StaticFiles::new(&mount.root).index_file(mount.index_file.as_deref());
        router.use_handler(&mount.prefix, files.into_handler())?;
        tracing::info!(prefix = %mount.prefix, root = %mount.root, "Serving static files");
    }

    Ok(router)
}

/// Build the server for `config`, applying its URL limits.
pub fn build_server(config: &ServerConfig) -> Result<Server, RouteError> {
    let router = build_router(config)?;
    Ok(Server::with_limits(router, config.limits))
}

/// Mirror lifecycle events into the log until the server closes.
///
/// A lagging receiver logs how many events it skipped and keeps going.
pub fn log_server_events(server: &Server) -> JoinHandle<()> {
    let mut events = server.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ServerEvent::Open) => tracing::info!("Server open"),
                Ok(ServerEvent::Error { status, message }) => {
                    tracing::warn!(status, "Request failed: {}", message)
                }
                Ok(ServerEvent::Close) => {
                    tracing::info!("Server closed");
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Server event log fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use http::{Method, StatusCode, header};

    use super::*;
    use crate::{adapters::ChannelSink, ports::IncomingRequest};

    async fn call(server: &Server, incoming: IncomingRequest) -> http::Response<Bytes> {
        let (sink, rx) = ChannelSink::new();
        server.handle(incoming, Box::new(sink)).await;
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_static_site_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<p>home</p>").unwrap();

        let config = ServerConfig::builder()
            .static_files("/", dir.path().to_string_lossy())
            .security_headers(true)
            .header("X-Served-By", "routekit")
            .build()
            .unwrap();
        let server = build_server(&config).unwrap();

        let res = call(&server, IncomingRequest::new(Method::GET, "/")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), "<p>home</p>");
        assert_eq!(res.headers()["x-served-by"], "routekit");
        assert_eq!(res.headers()[header::X_FRAME_OPTIONS], "DENY");
        assert!(res.headers().contains_key("x-request-id"));

        let res = call(&server, IncomingRequest::new(Method::GET, "/missing")).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()["x-served-by"], "routekit");
    }

    #[tokio::test]
    async fn test_basic_auth_guards_everything() {
        let config = ServerConfig::builder()
            .basic_auth(Some("admin".to_string()), "secret", Some("files".to_string()))
            .build()
            .unwrap();
        let server = build_server(&config).unwrap();

        let res = call(&server, IncomingRequest::new(Method::GET, "/anything")).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            res.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"files\""
        );

        // admin:secret
        let incoming = IncomingRequest::new(Method::GET, "/anything")
            .with_header(
                header::AUTHORIZATION,
                http::HeaderValue::from_static("Basic YWRtaW46c2VjcmV0"),
            );
        let res = call(&server, incoming).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        let config = ServerConfig::builder()
            .cors(vec!["null".to_string()])
            .build()
            .unwrap();
        assert!(matches!(
            build_router(&config),
            Err(RouteError::InvalidOptions { middleware: "cors", .. })
        ));
    }

    #[tokio::test]
    async fn test_event_log_survives_lagging() {
        let server = Server::new(Router::new());
        let logger = log_server_events(&server);

        // More failures than the event channel holds
        for i in 0..100 {
            server.fail(format!("failure {i}"));
        }
        server.open();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!logger.is_finished());

        server.close();
        tokio::time::timeout(Duration::from_secs(1), logger)
            .await
            .unwrap()
            .unwrap();
    }
}
