use axum::body::Body as AxumBody;
use axum::http::Request;

use recipe_proxy_core::body::Body;
use recipe_proxy_core::http::Request as CoreRequest;

/// Convert an Axum/Hyper request into a core request.
///
/// The proxy never reads inbound bodies, so the body is dropped unread and the core request
/// carries an empty one.
pub fn into_core_request(request: Request<AxumBody>) -> CoreRequest {
    let (parts, _body) = request.into_parts();
    CoreRequest::from_parts(parts, Body::empty())
}
