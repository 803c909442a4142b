use std::{collections::HashMap, sync::Arc};

use http::Method;
use tracing::{debug, trace};

use crate::{
    core::{
        handler::{BoxFuture, Handler, Next},
        request::Request,
        response::Response,
        route::{Hook, Route, RouteError, normalize_prefix, prefix_matches},
    },
    error::{Error, HandlerResult},
};

/// Where a resumed chain picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cursor {
    /// Layer index; routes follow once the layers are exhausted
    Layer(usize),
    /// Index into the route list for the request method
    Route(usize),
}

enum Layer {
    Hook(Hook),
    Mount { prefix: String, target: MountTarget },
}

enum MountTarget {
    Router(Arc<Router>),
    Handler(Handler),
}

/// Ordered hooks, mounts and per-method routes.
///
/// A request first walks the layers (hooks and mounts) in registration order,
/// each one only when its prefix covers the request path, then the routes
/// registered for its method. The first route whose pattern matches runs.
/// Registration order is the only priority: nothing is re-ordered by
/// specificity.
///
/// Routers are built with `&mut self` and then frozen, usually by handing
/// them to [`Server::new`](crate::core::Server::new) or by mounting them.
#[derive(Default)]
pub struct Router {
    layers: Vec<Layer>,
    routes: HashMap<Method, Vec<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route for `method`.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<&mut Self, RouteError> {
        let route = Route::new(pattern, handler)?;
        debug!(%method, pattern, "Registered route");
        self.routes.entry(method).or_default().push(route);
        Ok(self)
    }

    pub fn get(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        self.route(Method::POST, pattern, handler)
    }

    pub fn put(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        self.route(Method::PUT, pattern, handler)
    }

    pub fn patch(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        self.route(Method::PATCH, pattern, handler)
    }

    pub fn delete(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        self.route(Method::DELETE, pattern, handler)
    }

    pub fn head(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        self.route(Method::HEAD, pattern, handler)
    }

    pub fn options(&mut self, pattern: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        self.route(Method::OPTIONS, pattern, handler)
    }

    /// Run `handler` for every request below `prefix`.
    ///
    /// A chained hook decides through `next` whether the chain goes on. A
    /// terminal hook runs and the chain goes on unless it sent the response.
    pub fn hook(&mut self, prefix: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        let hook = Hook::new(prefix, handler)?;
        debug!(prefix = hook.prefix(), "Registered hook");
        self.layers.push(Layer::Hook(hook));
        Ok(self)
    }

    /// Delegate everything below `prefix` to `router`.
    ///
    /// Inside the mounted router the request path is relative to `prefix`.
    /// When the mounted router has nothing for the request, dispatch carries
    /// on in this router with the original path.
    pub fn mount(
        &mut self,
        prefix: &str,
        router: impl Into<Arc<Router>>,
    ) -> Result<&mut Self, RouteError> {
        self.push_mount(prefix, MountTarget::Router(router.into()))
    }

    /// Delegate everything below `prefix` to a single handler, with the
    /// request path made relative to `prefix` as for [`Router::mount`].
    pub fn use_handler(&mut self, prefix: &str, handler: Handler) -> Result<&mut Self, RouteError> {
        self.push_mount(prefix, MountTarget::Handler(handler))
    }

    fn push_mount(&mut self, prefix: &str, target: MountTarget) -> Result<&mut Self, RouteError> {
        let prefix = normalize_prefix(prefix)?;
        debug!(prefix = %prefix, "Registered mount");
        self.layers.push(Layer::Mount { prefix, target });
        Ok(self)
    }

    /// Methods with a route matching `pathname`, in a stable order.
    pub fn allowed(&self, pathname: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self
            .routes
            .iter()
            .filter(|(_, routes)| routes.iter().any(|route| route.matches(pathname).is_some()))
            .map(|(method, _)| method.clone())
            .collect();

        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    /// Number of routes across all methods, mounted routers excluded.
    pub fn route_count(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    /// Routes registered for `method`, in registration order.
    pub fn routes(&self, method: &Method) -> &[Route] {
        self.routes.get(method).map(Vec::as_slice).unwrap_or_default()
    }

    /// Dispatch a request.
    ///
    /// Resolves to [`Error::NotFound`] when the chain runs out without a
    /// route claiming the request.
    pub fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, HandlerResult> {
        self.resume(Cursor::Layer(0), None, req, res)
    }

    pub(crate) fn resume<'a>(
        &'a self,
        cursor: Cursor,
        parent: Option<Box<Next<'a>>>,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if let Cursor::Layer(start) = cursor {
                for index in start..self.layers.len() {
                    match &self.layers[index] {
                        Layer::Hook(hook) => {
                            if !hook.matches(req.pathname()) {
                                continue;
                            }

                            req.check_cancelled()?;
                            trace!(prefix = hook.prefix(), "Running hook");

                            match hook.handler() {
                                Handler::Terminal(endpoint) => {
                                    endpoint.call(req, res).await?;
                                    if res.is_sent() {
                                        return Ok(());
                                    }
                                }
                                Handler::Chained(middleware) => {
                                    let next = Next::new(self, Cursor::Layer(index + 1), parent);
                                    return middleware.call(req, res, next).await;
                                }
                            }
                        }
                        Layer::Mount { prefix, target } => {
                            if !prefix_matches(prefix, req.pathname()) {
                                continue;
                            }

                            req.check_cancelled()?;
                            return self
                                .enter_mount(index, prefix, target, parent, req, res)
                                .await;
                        }
                    }
                }
            }

            let start = match cursor {
                Cursor::Layer(_) => 0,
                Cursor::Route(index) => index,
            };

            if let Some(routes) = self.routes.get(req.method()) {
                for (index, route) in routes.iter().enumerate().skip(start) {
                    let Some(params) = route.match_segments(req.path()) else {
                        continue;
                    };

                    req.check_cancelled()?;
                    debug!(pattern = route.pattern(), "Matched route");
                    req.set_params(params);

                    return match route.handler() {
                        Handler::Terminal(endpoint) => endpoint.call(req, res).await,
                        Handler::Chained(middleware) => {
                            let next = Next::new(self, Cursor::Route(index + 1), parent);
                            middleware.call(req, res, next).await
                        }
                    };
                }
            }

            match parent {
                Some(next) => next.run(req, res).await,
                None => Err(Error::NotFound),
            }
        })
    }

    async fn enter_mount<'a>(
        &'a self,
        index: usize,
        prefix: &'a str,
        target: &'a MountTarget,
        parent: Option<Box<Next<'a>>>,
        req: &'a mut Request,
        res: &'a mut Response,
    ) -> HandlerResult {
        let saved = req.url_state();
        req.rebase(prefix);
        trace!(prefix, pathname = %req.pathname(), "Entering mount");

        // Falling out of the mounted side resumes here with the URL restored.
        let resume = Next::new(self, Cursor::Layer(index + 1), parent).restoring(saved.clone());

        let result = match target {
            MountTarget::Router(router) => {
                router
                    .resume(Cursor::Layer(0), Some(Box::new(resume)), req, res)
                    .await
            }
            MountTarget::Handler(Handler::Chained(middleware)) => {
                middleware.call(req, res, resume).await
            }
            MountTarget::Handler(Handler::Terminal(endpoint)) => {
                match endpoint.call(req, res).await {
                    Ok(()) if !res.is_sent() => resume.run(req, res).await,
                    other => other,
                }
            }
        };

        req.restore_url(saved);
        result
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("layers", &self.layers.len())
            .field("routes", &self.route_count())
            .finish()
    }
}
