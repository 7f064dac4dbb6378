use std::sync::Arc;

use matchit::Router as PathRouter;
use tower_service::Service;

use crate::context::RequestContext;
use crate::error::ProxyError;
use crate::handler::{BoxHandler, IntoHandler};
use crate::http::{HandlerFuture, Request, Response};
use crate::middleware::{BoxMiddleware, Middleware, Next};
use crate::response::IntoResponse;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    path: String,
}

impl RouteInfo {
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Default)]
pub struct RouterBuilder {
    routes: PathRouter<BoxHandler>,
    middlewares: Vec<BoxMiddleware>,
    route_info: Vec<RouteInfo>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route every method on `path` to `handler`, leaving method checks to the handler.
    pub fn any<H>(mut self, path: &str, handler: H) -> Self
    where
        H: IntoHandler,
    {
        self.routes
            .insert(path, handler.into_handler())
            .unwrap_or_else(|err| panic!("duplicate route definition for {}: {}", path, err));
        self.route_info.push(RouteInfo {
            path: path.to_string(),
        });
        self
    }

    /// Middleware runs in registration order, the first one outermost.
    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> RouterService {
        RouterService {
            inner: Arc::new(RouterInner {
                routes: self.routes,
                middlewares: self.middlewares,
                route_info: self.route_info,
            }),
        }
    }
}

#[derive(Clone)]
pub struct RouterService {
    inner: Arc<RouterInner>,
}

impl RouterService {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn routes(&self) -> &[RouteInfo] {
        &self.inner.route_info
    }

    /// Dispatch a request, rendering any error into a response.
    pub async fn oneshot(&self, request: Request) -> Response {
        let mut service = self.clone();
        match service.call(request).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }
}

struct RouterInner {
    routes: PathRouter<BoxHandler>,
    middlewares: Vec<BoxMiddleware>,
    route_info: Vec<RouteInfo>,
}

impl RouterInner {
    async fn dispatch(&self, request: Request) -> Result<Response, ProxyError> {
        let path = request.uri().path().to_string();

        match self.routes.at(&path) {
            Ok(matched) => {
                let ctx = RequestContext::new(request);
                Next::new(&self.middlewares, matched.value.as_ref())
                    .run(ctx)
                    .await
            }
            Err(_) => {
                let err = ProxyError::not_found(path.clone());
                // Middleware only wraps matched routes, so the fallback logs for itself.
                tracing::info!(
                    "request method={} path={} status={}",
                    request.method(),
                    path,
                    err.status().as_u16()
                );
                Err(err)
            }
        }
    }
}

impl Service<Request> for RouterService {
    type Response = Response;
    type Error = ProxyError;
    type Future = HandlerFuture;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { inner.dispatch(request).await })
    }
}
