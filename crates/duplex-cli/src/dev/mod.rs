//! Development server run next to frontend watch sessions.
//!
//! - `GET /__duplex__/events`: Server-Sent Events with frontend rebuild results
//! - `GET /__duplex__/client.js`: the browser side of that channel
//! - static files from the frontend output directory
//! - everything else proxied to the supervised backend

pub mod config;
pub mod proxy;
pub mod reload;
pub mod server;
pub mod state;

pub use config::DevConfig;
pub use reload::ReloadNotifier;
pub use server::DevServer;
pub use state::{DevServerState, SharedState};

use serde::{Deserialize, Serialize};

/// Path prefix of the server's own routes.
pub const ROUTE_PREFIX: &str = "/__duplex__";

/// Events pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DevEvent {
    /// The frontend bundle was rebuilt successfully.
    Built { sequence: u64, duration_ms: u64 },

    /// The frontend rebuild failed.
    Failed { sequence: u64, error: String },

    Connected { id: usize },
}
