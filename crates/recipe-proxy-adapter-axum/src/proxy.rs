use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::Client;

use recipe_proxy_core::body::Body;
use recipe_proxy_core::error::ProxyError;
use recipe_proxy_core::http::{HeaderName, HeaderValue, Method, StatusCode};
use recipe_proxy_core::proxy::{ProxyClient, ProxyRequest, ProxyResponse};

/// `reqwest`-backed upstream client.
///
/// Transport errors are stripped of their URL before they are wrapped, since the upstream URL
/// carries the API key in its query string.
#[derive(Clone)]
pub struct ReqwestProxyClient {
    client: Client,
}

impl ReqwestProxyClient {
    /// Build a client; `None` leaves reqwest's default of no overall timeout.
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("failed to build reqwest client")?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait(?Send)]
impl ProxyClient for ReqwestProxyClient {
    async fn send(&self, request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        let (method, uri) = request.into_parts();
        let reqwest_method = reqwest_method(&method)?;

        let response = self
            .client
            .request(reqwest_method, uri.to_string())
            .send()
            .await
            .map_err(|err| ProxyError::transport(err.without_url()))?;
        let status =
            StatusCode::from_u16(response.status().as_u16()).map_err(ProxyError::internal)?;
        let mut proxy_response = ProxyResponse::new(status, Body::empty());

        for (name, value) in response.headers().iter() {
            let header_name =
                HeaderName::from_bytes(name.as_str().as_bytes()).map_err(ProxyError::internal)?;
            let header_value =
                HeaderValue::from_bytes(value.as_bytes()).map_err(ProxyError::internal)?;
            proxy_response
                .headers_mut()
                .append(header_name, header_value);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| ProxyError::transport(err.without_url()))?;
        *proxy_response.body_mut() = Body::from_bytes(bytes);

        Ok(proxy_response)
    }
}

fn reqwest_method(method: &Method) -> Result<reqwest::Method, ProxyError> {
    reqwest::Method::from_bytes(method.as_str().as_bytes()).map_err(ProxyError::internal)
}
