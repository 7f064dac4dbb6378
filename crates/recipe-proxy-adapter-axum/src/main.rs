//! `recipe-proxy` binary: load configuration, resolve the API key from the environment, serve.

mod args;

use std::path::Path;

use anyhow::Context;
use clap::Parser;

use recipe_proxy_adapter_axum::run_proxy;
use recipe_proxy_core::config::{ConfigLoader, ProxyConfig, DEFAULT_CONFIG_FILE};

use args::Args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args)?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    run_proxy(&config, |name| std::env::var(name).ok())
}

fn load_config(args: &Args) -> anyhow::Result<ProxyConfig> {
    let path = match &args.config {
        Some(path) => path.as_path(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
        None => return Ok(ProxyConfig::default()),
    };

    let loader = ConfigLoader::from_path(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(loader.into_config())
}
