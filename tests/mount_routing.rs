// Dispatch through hooks, mounted routers and fall-through, observed end to end
#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use http::{Method, StatusCode};
    use routekit::{ChannelSink, Handler, IncomingRequest, Request, Router, Server};

    async fn call(server: &Server, method: Method, target: &str) -> http::Response<Bytes> {
        let (sink, rx) = ChannelSink::new();
        server
            .handle(IncomingRequest::new(method, target), Box::new(sink))
            .await;
        rx.await.unwrap()
    }

    fn text(res: &http::Response<Bytes>) -> &str {
        std::str::from_utf8(res.body()).unwrap()
    }

    fn describe(req: &Request) -> String {
        format!(
            "pathname={} path={} trailing={} url={} prefix={}",
            req.pathname(),
            req.path().join(","),
            req.trailing(),
            req.url(),
            req.prefix()
        )
    }

    /// Terminal route answering with a description of the request it saw
    fn echo() -> Handler {
        Handler::terminal(|req, res| {
            Box::pin(async move {
                let body = describe(req);
                res.text(StatusCode::OK, body).await
            })
        })
    }

    #[tokio::test]
    async fn test_mounted_router_sees_relative_path() {
        let mut child = Router::new();
        child.get("/foo", echo()).unwrap();

        let mut root = Router::new();
        root.mount("/routes", child).unwrap();
        let server = Server::new(root);

        let res = call(&server, Method::GET, "/routes/foo/?a=1").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            text(&res),
            "pathname=/foo path=foo trailing=true url=/routes/foo?a=1 prefix=/routes"
        );
    }

    #[tokio::test]
    async fn test_mount_root_request() {
        let mut child = Router::new();
        child.get("/", echo()).unwrap();

        let mut root = Router::new();
        root.mount("/routes", child).unwrap();
        let server = Server::new(root);

        let res = call(&server, Method::GET, "/routes").await;
        assert_eq!(
            text(&res),
            "pathname=/ path= trailing=false url=/routes prefix=/routes"
        );

        // Prefixes match whole segments only
        let res = call(&server, Method::GET, "/routesx").await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_nested_mounts_accumulate_prefix() {
        let mut leaf = Router::new();
        leaf.get("/:id", echo()).unwrap();

        let mut middle = Router::new();
        middle.mount("/users", leaf).unwrap();

        let mut root = Router::new();
        root.mount("/api", middle).unwrap();
        let server = Server::new(root);

        let res = call(&server, Method::GET, "/api/users/42").await;
        assert_eq!(
            text(&res),
            "pathname=/42 path=42 trailing=false url=/api/users/42 prefix=/api/users"
        );
    }

    #[tokio::test]
    async fn test_fall_through_restores_url() {
        let mut child = Router::new();
        child.get("/known", echo()).unwrap();

        let mut root = Router::new();
        root.mount("/docs", child).unwrap();
        root.get("/docs/:page", echo()).unwrap();
        let server = Server::new(root);

        let res = call(&server, Method::GET, "/docs/known").await;
        assert_eq!(
            text(&res),
            "pathname=/known path=known trailing=false url=/docs/known prefix=/docs"
        );

        let res = call(&server, Method::GET, "/docs/other").await;
        assert_eq!(
            text(&res),
            "pathname=/docs/other path=docs,other trailing=false url=/docs/other prefix="
        );
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut child = Router::new();
        {
            let seen = seen.clone();
            child
                .hook(
                    "/",
                    Handler::terminal(move |req, _res| {
                        let seen = seen.clone();
                        Box::pin(async move {
                            seen.lock().unwrap().push(format!("child {}", req.pathname()));
                            Ok(())
                        })
                    }),
                )
                .unwrap();
        }
        child.get("/b", echo()).unwrap();

        let mut root = Router::new();
        {
            let seen = seen.clone();
            root.hook(
                "/a",
                Handler::chained(move |req, res, next| {
                    let seen = seen.clone();
                    Box::pin(async move {
                        seen.lock().unwrap().push(format!("before {}", req.pathname()));
                        let result = next.run(req, res).await;
                        seen.lock().unwrap().push(format!("after {}", req.pathname()));
                        result
                    })
                }),
            )
            .unwrap();
        }
        root.mount("/a", child).unwrap();
        let server = Server::new(root);

        let res = call(&server, Method::GET, "/a/b").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            *seen.lock().unwrap(),
            ["before /a/b", "child /b", "after /a/b"]
        );
    }

    #[tokio::test]
    async fn test_route_params_and_navigate() {
        let mut root = Router::new();
        root.hook(
            "/old",
            Handler::terminal(|req, _res| {
                Box::pin(async move {
                    let rest = req.path()[1..].join("/");
                    req.navigate(&format!("/new/{rest}"))?;
                    Ok(())
                })
            }),
        )
        .unwrap();
        root.get(
            "/new/:name/:id",
            Handler::terminal(|req, res| {
                Box::pin(async move {
                    let body = format!(
                        "{} {} {:?}",
                        req.param("name").unwrap_or_default(),
                        req.param("id").unwrap_or_default(),
                        req.param("1")
                    );
                    res.text(StatusCode::OK, body).await
                })
            }),
        )
        .unwrap();
        let server = Server::new(root);

        let res = call(&server, Method::GET, "/old/widget/7").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(text(&res), "widget 7 Some(\"7\")");
    }

    #[tokio::test]
    async fn test_mounted_handler_falls_through() {
        let mut root = Router::new();
        root.use_handler(
            "/files",
            Handler::terminal(|req, res| {
                Box::pin(async move {
                    if req.pathname() == "/present" {
                        res.text(StatusCode::OK, "from mount").await?;
                    }
                    Ok(())
                })
            }),
        )
        .unwrap();
        root.get("/files/:name", echo()).unwrap();
        let server = Server::new(root);

        let res = call(&server, Method::GET, "/files/present").await;
        assert_eq!(text(&res), "from mount");

        let res = call(&server, Method::GET, "/files/absent").await;
        assert_eq!(
            text(&res),
            "pathname=/files/absent path=files,absent trailing=false url=/files/absent prefix="
        );
    }
}
