use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body as AxumBody;
use axum::http::{Request, Response};
use tokio::{runtime::Handle, task};
use tower::Service;

use recipe_proxy_core::router::RouterService;

use crate::request::into_core_request;
use crate::response::into_axum_response;

/// Tower service that feeds Axum/Hyper requests through the core router.
///
/// Core handler futures are not `Send`, so each request is driven on the current worker with
/// `block_in_place`. This requires the multi-threaded tokio runtime.
#[derive(Clone)]
pub struct RecipeProxyAxumService {
    router: RouterService,
}

impl RecipeProxyAxumService {
    pub fn new(router: RouterService) -> Self {
        Self { router }
    }
}

impl Service<Request<AxumBody>> for RecipeProxyAxumService {
    type Response = Response<AxumBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<AxumBody>) -> Self::Future {
        let router = self.router.clone();
        Box::pin(async move {
            let core_request = into_core_request(request);
            let core_response = task::block_in_place(move || {
                Handle::current().block_on(router.oneshot(core_request))
            });
            Ok(into_axum_response(core_response))
        })
    }
}
