//! Origin allow-list and the middleware that advertises it.
//!
//! The policy is a plain value with a pure [`CorsPolicy::allows`] predicate; the [`Cors`]
//! middleware evaluates it once per request and decorates whatever response the rest of the chain
//! produced, errors included. Origins that do not match get no CORS headers at all and the browser
//! blocks the response client-side.

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::ProxyError;
use crate::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, VARY,
};
use crate::http::{HeaderMap, HeaderValue, Response, Uri};
use crate::middleware::{Middleware, Next};
use crate::response::IntoResponse;

pub const ALLOWED_METHODS: &str = "GET, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsPolicy {
    exact_origins: Vec<String>,
    origin_suffixes: Vec<String>,
    dev_markers: Vec<String>,
}

impl CorsPolicy {
    pub fn new<E, S, M>(exact_origins: E, origin_suffixes: S, dev_markers: M) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            exact_origins: exact_origins.into_iter().map(Into::into).collect(),
            origin_suffixes: origin_suffixes.into_iter().map(Into::into).collect(),
            dev_markers: dev_markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Policy that trusts no origin.
    pub fn deny_all() -> Self {
        Self::new(
            Vec::<String>::new(),
            Vec::<String>::new(),
            Vec::<String>::new(),
        )
    }

    pub fn exact_origins(&self) -> &[String] {
        &self.exact_origins
    }

    pub fn origin_suffixes(&self) -> &[String] {
        &self.origin_suffixes
    }

    pub fn dev_markers(&self) -> &[String] {
        &self.dev_markers
    }

    /// Whether `origin` may read responses.
    ///
    /// Exact origins compare the whole header value, suffixes apply to the host component only,
    /// and development markers match anywhere in the value.
    pub fn allows(&self, origin: &str) -> bool {
        if origin.is_empty() {
            return false;
        }

        if self.exact_origins.iter().any(|exact| exact == origin) {
            return true;
        }

        if let Some(host) = origin_host(origin) {
            if self
                .origin_suffixes
                .iter()
                .any(|suffix| !suffix.is_empty() && host.ends_with(suffix.as_str()))
            {
                return true;
            }
        }

        self.dev_markers
            .iter()
            .any(|marker| !marker.is_empty() && origin.contains(marker.as_str()))
    }

    /// Insert the CORS headers for `origin` when it is allowed. Returns whether it was.
    pub fn apply(&self, origin: Option<&str>, headers: &mut HeaderMap) -> bool {
        let Some(origin) = origin.filter(|origin| self.allows(origin)) else {
            return false;
        };
        let Ok(value) = HeaderValue::from_str(origin) else {
            return false;
        };

        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.append(VARY, HeaderValue::from_static("Origin"));
        true
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self::new(["https://reav.space"], [".reav.space"], ["localhost"])
    }
}

fn origin_host(origin: &str) -> Option<String> {
    let uri: Uri = origin.parse().ok()?;
    uri.host().map(|host| host.to_ascii_lowercase())
}

/// Middleware attaching CORS headers for trusted origins to every response.
pub struct Cors {
    policy: CorsPolicy,
}

impl Cors {
    pub fn new(policy: CorsPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CorsPolicy {
        &self.policy
    }
}

#[async_trait(?Send)]
impl Middleware for Cors {
    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Result<Response, ProxyError> {
        let origin = ctx.origin().map(str::to_owned);

        let mut response = match next.run(ctx).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };

        if !self.policy.apply(origin.as_deref(), response.headers_mut()) {
            if let Some(origin) = origin {
                log::debug!("origin {} is not trusted; omitting CORS headers", origin);
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::handler::IntoHandler;
    use crate::http::header::ORIGIN;
    use crate::http::{request_builder, Method, StatusCode};
    use crate::middleware::BoxMiddleware;
    use crate::response::response_with_body;
    use futures::executor::block_on;
    use std::sync::{Arc, Mutex};

    #[test]
    fn default_policy_trusts_production_origins() {
        let policy = CorsPolicy::default();
        assert!(policy.allows("https://reav.space"));
        assert!(policy.allows("https://app.reav.space"));
        assert!(policy.allows("https://staging.app.reav.space"));
    }

    #[test]
    fn default_policy_trusts_localhost_anywhere() {
        let policy = CorsPolicy::default();
        assert!(policy.allows("http://localhost:5173"));
        assert!(policy.allows("http://localhost"));
    }

    #[test]
    fn default_policy_rejects_lookalikes() {
        let policy = CorsPolicy::default();
        assert!(!policy.allows("https://evilreav.space"));
        assert!(!policy.allows("http://reav.space"));
        assert!(!policy.allows("https://reav.space.evil.com"));
        assert!(!policy.allows("https://example.com"));
        assert!(!policy.allows(""));
        assert!(!policy.allows("null"));
    }

    #[test]
    fn suffix_ignores_port() {
        let policy = CorsPolicy::default();
        assert!(policy.allows("https://app.reav.space:8443"));
    }

    #[test]
    fn deny_all_rejects_everything() {
        let policy = CorsPolicy::deny_all();
        assert!(!policy.allows("https://reav.space"));
        assert!(!policy.allows("http://localhost"));
    }

    #[test]
    fn apply_sets_all_headers_for_allowed_origin() {
        let policy = CorsPolicy::default();
        let mut headers = HeaderMap::new();
        assert!(policy.apply(Some("https://app.reav.space"), &mut headers));
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://app.reav.space"
        );
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(), "GET, OPTIONS");
        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_HEADERS).unwrap(), "Content-Type");
        assert_eq!(headers.get(VARY).unwrap(), "Origin");
    }

    #[test]
    fn apply_leaves_headers_untouched_for_unknown_origin() {
        let policy = CorsPolicy::default();
        let mut headers = HeaderMap::new();
        assert!(!policy.apply(Some("https://example.com"), &mut headers));
        assert!(!policy.apply(None, &mut headers));
        assert!(headers.is_empty());
    }

    fn run(origin: Option<&'static str>, status: StatusCode) -> Response {
        let mut builder = request_builder().method(Method::GET).uri("/generate-recipe");
        if let Some(origin) = origin {
            builder = builder.header(ORIGIN, origin);
        }
        let ctx = RequestContext::new(builder.body(Body::empty()).expect("request"));
        let handler = (move |_ctx: RequestContext| async move {
            if status.is_success() {
                Ok(response_with_body(status, Body::from("ok")))
            } else {
                Err(ProxyError::NoMatchingRecipes)
            }
        })
        .into_handler();
        let cors = Cors::new(CorsPolicy::default());
        block_on(cors.handle(ctx, Next::new(&[], handler.as_ref()))).expect("response")
    }

    #[test]
    fn middleware_decorates_success_responses() {
        let response = run(Some("http://localhost:3000"), StatusCode::OK);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );
    }

    #[test]
    fn middleware_decorates_error_responses() {
        let response = run(Some("https://reav.space"), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://reav.space"
        );
        assert!(response.body().as_bytes().starts_with(br#"{"error":"#));
    }

    #[test]
    fn middleware_skips_headers_without_origin() {
        let response = run(None, StatusCode::OK);
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert!(response.headers().get(VARY).is_none());
    }

    struct ErrorRecorder {
        saw_error: Arc<Mutex<bool>>,
    }

    #[async_trait(?Send)]
    impl Middleware for ErrorRecorder {
        async fn handle(
            &self,
            ctx: RequestContext,
            next: Next<'_>,
        ) -> Result<Response, ProxyError> {
            let result = next.run(ctx).await;
            *self.saw_error.lock().unwrap() = result.is_err();
            result
        }
    }

    #[test]
    fn inner_middleware_sees_errors_before_they_are_rendered() {
        let saw_error = Arc::new(Mutex::new(false));
        let middlewares: Vec<BoxMiddleware> = vec![
            Arc::new(Cors::new(CorsPolicy::default())),
            Arc::new(ErrorRecorder {
                saw_error: Arc::clone(&saw_error),
            }),
        ];
        let handler = (|_ctx: RequestContext| async move {
            Err::<Response, ProxyError>(ProxyError::Unauthorized)
        })
        .into_handler();
        let ctx = RequestContext::new(
            request_builder()
                .uri("/generate-recipe")
                .header(ORIGIN, "https://reav.space")
                .body(Body::empty())
                .expect("request"),
        );

        let response =
            block_on(Next::new(&middlewares, handler.as_ref()).run(ctx)).expect("response");
        assert!(*saw_error.lock().unwrap());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://reav.space"
        );
    }
}
