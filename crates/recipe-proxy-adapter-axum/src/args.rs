use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "recipe-proxy", about = "Recipe API proxy server")]
pub struct Args {
    /// Configuration file (default: ./recipe-proxy.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Listen address, overriding `server.addr`
    #[arg(long)]
    pub addr: Option<SocketAddr>,
}
