//! Development server configuration.

use duplex_config::RunConfig;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevConfig {
    /// Where the development server listens.
    pub addr: SocketAddr,

    /// The supervised backend requests are proxied to.
    pub upstream: SocketAddr,

    /// Frontend output directory served as static files.
    pub out_dir: PathBuf,
}

impl DevConfig {
    /// Both ports come from the run settings; everything stays on loopback.
    pub fn from_run(run: &RunConfig, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, run.ports.dev_server)),
            upstream: SocketAddr::from((Ipv4Addr::LOCALHOST, run.ports.http_server)),
            out_dir: out_dir.into(),
        }
    }

    pub fn server_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}
