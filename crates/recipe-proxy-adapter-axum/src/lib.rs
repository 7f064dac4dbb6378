//! Axum host for the recipe proxy: request/response conversion, the `reqwest` upstream client
//! and the blocking server runner behind the `recipe-proxy` binary.

mod dev_server;
mod proxy;
mod request;
mod response;
mod service;

pub use dev_server::{build_app, init_logger, run_proxy, AxumDevServer, AxumDevServerConfig};
pub use proxy::ReqwestProxyClient;
pub use request::into_core_request;
pub use response::into_axum_response;
pub use service::RecipeProxyAxumService;
