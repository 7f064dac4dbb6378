use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use log::{info, warn};
use simple_logger::SimpleLogger;
use tokio::runtime::Builder as RuntimeBuilder;
use tokio::signal;
use tower::{service_fn, Service};

use recipe_proxy_core::app::App;
use recipe_proxy_core::config::{LoggingSection, ProxyConfig};
use recipe_proxy_core::router::RouterService;

use crate::proxy::ReqwestProxyClient;
use crate::service::RecipeProxyAxumService;

/// Listener settings for [`AxumDevServer`].
#[derive(Clone)]
pub struct AxumDevServerConfig {
    pub addr: SocketAddr,
    pub enable_ctrl_c: bool,
}

impl Default for AxumDevServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            enable_ctrl_c: true,
        }
    }
}

/// Blocking server runner used by the `recipe-proxy` binary.
pub struct AxumDevServer {
    router: RouterService,
    config: AxumDevServerConfig,
}

impl AxumDevServer {
    pub fn new(router: RouterService) -> Self {
        Self {
            router,
            config: AxumDevServerConfig::default(),
        }
    }

    pub fn with_config(router: RouterService, config: AxumDevServerConfig) -> Self {
        Self { router, config }
    }

    pub fn run(self) -> anyhow::Result<()> {
        let runtime = RuntimeBuilder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;

        runtime.block_on(async move { self.run_async().await })
    }

    async fn run_async(self) -> anyhow::Result<()> {
        let AxumDevServer { router, config } = self;

        // Bind synchronously so address errors surface before the runtime starts serving.
        let listener = StdTcpListener::bind(config.addr)
            .with_context(|| format!("failed to bind recipe proxy to {}", config.addr))?;
        listener
            .set_nonblocking(true)
            .context("failed to set listener to non-blocking")?;

        let listener = tokio::net::TcpListener::from_std(listener)
            .context("failed to adopt std listener into tokio")?;

        info!("recipe proxy listening on http://{}", config.addr);
        serve_with_listener(router, listener, config.enable_ctrl_c).await
    }

    #[cfg(test)]
    async fn run_with_listener(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        let AxumDevServer { router, config } = self;
        serve_with_listener(router, listener, config.enable_ctrl_c).await
    }
}

async fn serve_with_listener(
    router: RouterService,
    listener: tokio::net::TcpListener,
    enable_ctrl_c: bool,
) -> anyhow::Result<()> {
    let service = RecipeProxyAxumService::new(router);
    let router = Router::new().fallback_service(service_fn(move |req| {
        let mut svc = service.clone();
        async move { svc.call(req).await }
    }));

    let server = axum::serve(listener, router);
    if enable_ctrl_c {
        server
            .with_graceful_shutdown(async {
                let _ = signal::ctrl_c().await;
            })
            .await
            .context("axum server error")?;
    } else {
        server.await.context("axum server error")?;
    }

    Ok(())
}

/// Install `simple_logger` at the configured level. Later calls are no-ops.
pub fn init_logger(logging: &LoggingSection) {
    SimpleLogger::new()
        .with_level(logging.level_filter())
        .init()
        .ok();
}

/// Wire the application from `config`, resolving the API key through `lookup`.
pub fn build_app<F>(config: &ProxyConfig, lookup: F) -> anyhow::Result<App>
where
    F: FnOnce(&str) -> Option<String>,
{
    let upstream = config.upstream_config(lookup);
    if !upstream.has_api_key() {
        warn!(
            "{} is not set; /generate-recipe will report a configuration error",
            config.upstream.api_key_env
        );
    }

    let client = ReqwestProxyClient::new(config.upstream.timeout())?;
    Ok(App::new(upstream, config.cors_policy(), Arc::new(client)))
}

/// Initialise logging, wire the application and serve it until ctrl-c.
pub fn run_proxy<F>(config: &ProxyConfig, lookup: F) -> anyhow::Result<()>
where
    F: FnOnce(&str) -> Option<String>,
{
    init_logger(&config.logging);

    let app = build_app(config, lookup)?;
    info!("starting {}", app.name());

    let server_config = AxumDevServerConfig {
        addr: config.server.addr,
        enable_ctrl_c: true,
    };
    AxumDevServer::with_config(app.into_router(), server_config).run()
}


#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::extract::RawQuery;
    use axum::http::StatusCode as AxumStatusCode;
    use axum::routing::get;
    use recipe_proxy_core::config::ConfigLoader;
    use std::time::{Duration, Instant};

    struct TestServer {
        base_url: String,
        handle: tokio::task::JoinHandle<()>,
    }

    async fn start_test_server(router: RouterService) -> TestServer {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let config = AxumDevServerConfig {
            addr,
            enable_ctrl_c: false,
        };
        let server = AxumDevServer::with_config(router, config);

        let handle = tokio::spawn(async move {
            let _ = server.run_with_listener(listener).await;
        });

        TestServer {
            base_url: format!("http://{}", addr),
            handle,
        }
    }

    /// Stand-in for the recipe API answering every call with `status` and `body`.
    async fn start_upstream(status: AxumStatusCode, body: &'static str) -> String {
        let app = Router::new().route(
            "/recipes/random",
            get(move || async move { (status, body) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind upstream");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn proxy_router(upstream_url: &str, api_key: Option<&str>) -> RouterService {
        let loader = ConfigLoader::load_from_str(&format!(
            "[upstream]\nbase_url = \"{}\"\ntimeout_secs = 5\n",
            upstream_url
        ))
        .expect("config");
        build_app(loader.config(), |_| api_key.map(str::to_string))
            .expect("app")
            .into_router()
    }

    async fn send_with_retry<F>(
        client: &reqwest::Client,
        mut make_request: F,
    ) -> reqwest::Response
    where
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let start = Instant::now();
        let timeout = Duration::from_secs(2);

        loop {
            match make_request(client).send().await {
                Ok(response) => return response,
                Err(err) => {
                    if start.elapsed() >= timeout {
                        panic!("server did not respond before timeout: {}", err);
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn error_message(response: reqwest::Response) -> String {
        let text = response.text().await.expect("body");
        let body: serde_json::Value = serde_json::from_str(&text).expect("json body");
        body["error"].as_str().expect("error string").to_string()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn relays_first_recipe_with_cors_headers() {
        let upstream = start_upstream(
            AxumStatusCode::OK,
            r#"{"recipes":[{"id":1,"title":"Oatmeal"}, {"id":2}]}"#,
        )
        .await;
        let server = start_test_server(proxy_router(&upstream, Some("test-key"))).await;

        let client = reqwest::Client::new();
        let url = format!(
            "{}/generate-recipe?diet=vegan&mealType=breakfast",
            server.base_url
        );
        let response = send_with_retry(&client, |client| {
            client
                .get(url.as_str())
                .header("origin", "https://app.reav.space")
        })
        .await;

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers["access-control-allow-origin"],
            "https://app.reav.space"
        );
        assert_eq!(headers["access-control-allow-methods"], "GET, OPTIONS");
        assert_eq!(headers["access-control-allow-headers"], "Content-Type");
        assert_eq!(headers["vary"], "Origin");
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(
            response.text().await.unwrap(),
            r#"{"id":1,"title":"Oatmeal"}"#
        );

        server.handle.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upstream_receives_encoded_filters() {
        // The stand-in upstream hands the query string it saw back inside the recipe.
        let app = Router::new().route(
            "/recipes/random",
            get(|RawQuery(query): RawQuery| async move {
                serde_json::json!({ "recipes": [{ "query": query }] }).to_string()
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let server = start_test_server(proxy_router(&upstream, Some("k&y"))).await;

        let client = reqwest::Client::new();
        let url = format!(
            "{}/generate-recipe?diet=gluten%20free&mealType=main+course",
            server.base_url
        );
        let response = send_with_retry(&client, |client| client.get(url.as_str())).await;

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let recipe: serde_json::Value =
            serde_json::from_str(&response.text().await.unwrap()).expect("json");
        assert_eq!(
            recipe["query"],
            "number=1&apiKey=k%26y&diet=gluten%20free&type=main%20course"
        );

        server.handle.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn maps_upstream_failures_to_server_errors() {
        let cases = [
            (
                AxumStatusCode::UNAUTHORIZED,
                "Unauthorized: Invalid API Key or missing API Key. Please check the server environment variables.",
            ),
            (
                AxumStatusCode::PAYMENT_REQUIRED,
                "Payment Required: API quota exceeded. Try again later.",
            ),
            (
                AxumStatusCode::NOT_FOUND,
                "No recipes found. Try broader filters.",
            ),
        ];

        let client = reqwest::Client::new();
        for (status, expected) in cases {
            let upstream = start_upstream(status, r#"{"message":"nope"}"#).await;
            let server = start_test_server(proxy_router(&upstream, Some("k"))).await;
            let url = format!("{}/generate-recipe", server.base_url);

            let response = send_with_retry(&client, |client| client.get(url.as_str())).await;
            assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(error_message(response).await, expected);

            server.handle.abort();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn generic_upstream_failure_includes_details() {
        let upstream = start_upstream(AxumStatusCode::BAD_GATEWAY, "not json").await;
        let server = start_test_server(proxy_router(&upstream, Some("k"))).await;

        let client = reqwest::Client::new();
        let url = format!("{}/generate-recipe", server.base_url);
        let response = send_with_retry(&client, |client| client.get(url.as_str())).await;

        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error_message(response).await,
            r#"Failed to fetch recipe: 502 - Bad Gateway. Details: {"message":"No JSON error response."}"#
        );

        server.handle.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_recipe_list_is_a_server_error() {
        let upstream = start_upstream(AxumStatusCode::OK, r#"{"recipes":[]}"#).await;
        let server = start_test_server(proxy_router(&upstream, Some("k"))).await;

        let client = reqwest::Client::new();
        let url = format!("{}/generate-recipe", server.base_url);
        let response = send_with_retry(&client, |client| client.get(url.as_str())).await;

        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error_message(response).await,
            "No recipes found for the given criteria. Try adjusting your selections."
        );

        server.handle.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_upstream_reports_network_error() {
        let server = start_test_server(proxy_router("http://127.0.0.1:1", Some("k"))).await;

        let client = reqwest::Client::new();
        let url = format!("{}/generate-recipe", server.base_url);
        let response = send_with_retry(&client, |client| client.get(url.as_str())).await;

        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            error_message(response).await,
            "An unexpected error occurred. Please check your network connection."
        );

        server.handle.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_key_never_calls_upstream() {
        let server = start_test_server(proxy_router("http://127.0.0.1:1", None)).await;

        let client = reqwest::Client::new();
        let url = format!("{}/generate-recipe?diet=vegan", server.base_url);
        let response = send_with_retry(&client, |client| client.get(url.as_str())).await;

        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.text().await.unwrap(),
            r#"{"error":"API key not configured on the server. Please contact the administrator."}"#
        );

        server.handle.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn preflight_and_method_gate() {
        let server = start_test_server(proxy_router("http://127.0.0.1:1", Some("k"))).await;

        let client = reqwest::Client::new();
        let url = format!("{}/generate-recipe", server.base_url);

        let response = send_with_retry(&client, |client| {
            client
                .request(reqwest::Method::OPTIONS, url.as_str())
                .header("origin", "http://localhost:3000")
        })
        .await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
        assert!(response.text().await.unwrap().is_empty());

        let response = send_with_retry(&client, |client| {
            client
                .post(url.as_str())
                .header("origin", "https://evil.example")
        })
        .await;
        assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
        assert!(response
            .headers()
            .get("access-control-allow-origin")
            .is_none());
        assert_eq!(
            response.text().await.unwrap(),
            r#"{"error":"Method Not Allowed. This endpoint only supports GET requests."}"#
        );

        server.handle.abort();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_fails_to_bind_to_used_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind first");
        let addr = listener.local_addr().expect("listener addr");

        let config = AxumDevServerConfig {
            addr,
            enable_ctrl_c: false,
        };
        let server = AxumDevServer::with_config(RouterService::builder().build(), config);

        let result = tokio::task::spawn_blocking(move || server.run()).await;
        match result {
            Ok(Err(e)) => {
                let err_str = e.to_string();
                assert!(err_str.contains("bind"), "expected bind error, got: {}", err_str);
            }
            _ => panic!("expected bind error"),
        }

        drop(listener);
    }
}
