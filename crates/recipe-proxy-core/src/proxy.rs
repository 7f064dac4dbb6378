use std::fmt;

use async_trait::async_trait;

use crate::body::Body;
use crate::error::ProxyError;
use crate::http::{HeaderMap, Method, StatusCode, Uri};

/// Outbound request for a proxy operation. The upstream API takes everything in the URI, so no
/// headers or body are carried.
pub struct ProxyRequest {
    method: Method,
    uri: Uri,
}

impl ProxyRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri }
    }

    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn into_parts(self) -> (Method, Uri) {
        (self.method, self.uri)
    }
}

// The URI carries the upstream credential, so only the path is shown.
impl fmt::Debug for ProxyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRequest")
            .field("method", &self.method)
            .field("path", &self.uri.path())
            .finish()
    }
}

pub struct ProxyResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
}

impl ProxyResponse {
    pub fn new(status: StatusCode, body: Body) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }
}

impl fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("body", &self.body)
            .finish()
    }
}

/// Transport used to reach the upstream API.
///
/// Implementations return `Ok` for any HTTP response, whatever its status; `Err` is reserved for
/// failures to obtain one (DNS, connect, timeout, unreadable body) and should be built with
/// [`ProxyError::transport`].
#[async_trait(?Send)]
pub trait ProxyClient: Send + Sync {
    async fn send(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError>;
}
