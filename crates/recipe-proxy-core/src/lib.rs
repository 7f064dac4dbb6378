//! Portable core of the recipe proxy: request plumbing, CORS policy, configuration and the
//! `/generate-recipe` handler. Network I/O lives behind [`proxy::ProxyClient`] so hosts can plug
//! in their own transport.

pub mod app;
pub mod body;
pub mod config;
pub mod context;
pub mod cors;
pub mod error;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod proxy;
pub mod recipe;
pub mod response;
pub mod router;
