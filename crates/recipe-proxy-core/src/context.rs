use serde::de::DeserializeOwned;

use crate::body::Body;
use crate::error::ProxyError;
use crate::http::header::ORIGIN;
use crate::http::{Method, Request};

/// Request context exposed to handlers and middleware.
pub struct RequestContext {
    request: Request,
}

impl RequestContext {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn body(&self) -> &Body {
        self.request.body()
    }

    /// Value of the `Origin` header, if present and valid UTF-8.
    pub fn origin(&self) -> Option<&str> {
        self.request
            .headers()
            .get(ORIGIN)
            .and_then(|value| value.to_str().ok())
    }

    pub fn query<T>(&self) -> Result<T, ProxyError>
    where
        T: DeserializeOwned,
    {
        let query = self.request.uri().query().unwrap_or("");
        serde_urlencoded::from_str(query)
            .map_err(|err| ProxyError::bad_request(format!("invalid query string: {}", err)))
    }
}
