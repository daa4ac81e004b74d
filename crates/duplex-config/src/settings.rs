//! Run-mode snapshot.
//!
//! The production/watch flags and the port pair are read from the process
//! environment exactly once, at startup, and then passed around as an
//! immutable [`RunConfig`]. Nothing downstream re-reads the environment.
//!
//! Priority: environment > `duplex.toml` `[ports]` > defaults

use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ConfigError, Result};
use crate::mode::Mode;

/// HTTP ports used by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ports {
    /// Port the backend process serves on.
    pub http_server: u16,
    /// Port the development server listens on (watch only).
    pub dev_server: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            http_server: 4000,
            dev_server: 3000,
        }
    }
}

/// Immutable per-run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub production: bool,
    pub watch: bool,
    pub ports: Ports,
}

/// Shape extracted from figment; `NODE_ENV` is folded into `production`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawRunConfig {
    #[serde(default)]
    node_env: Option<String>,
    #[serde(default)]
    production: bool,
    #[serde(default)]
    watch: bool,
    #[serde(default)]
    ports: Ports,
}

impl RunConfig {
    /// Load the snapshot from defaults, the project file and the environment.
    ///
    /// `watch_task` is true when the invoked task is a watch task; the
    /// `DUPLEX_WATCH` variable can also turn watch mode on.
    pub fn load(project_file: Option<&Path>, watch_task: bool) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(RawRunConfig::default()));

        if let Some(path) = project_file {
            // Only `[ports]` is extracted, other sections belong to the project file.
            figment = figment.merge(Toml::file(path));
        }

        figment = figment
            .merge(Env::raw().only(&["NODE_ENV"]))
            .merge(Env::prefixed("DUPLEX_").split("__"));

        Self::from_figment(figment, watch_task)
    }

    /// Extract the snapshot from an already-assembled figment.
    pub fn from_figment(figment: Figment, watch_task: bool) -> Result<Self> {
        let raw: RawRunConfig = figment.extract().map_err(Box::new)?;

        let production =
            raw.production || raw.node_env.as_deref() == Some("production");
        let config = Self {
            production,
            watch: watch_task || raw.watch,
            ports: raw.ports,
        };
        config.validate()?;

        tracing::debug!(
            production = config.production,
            watch = config.watch,
            http_server = config.ports.http_server,
            dev_server = config.ports.dev_server,
            "run settings loaded"
        );

        Ok(config)
    }

    /// A development snapshot with default ports, mostly useful for tests.
    pub fn development() -> Self {
        Self {
            production: false,
            watch: false,
            ports: Ports::default(),
        }
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn mode(&self) -> Mode {
        Mode::from_flags(self.production, self.watch)
    }

    fn validate(&self) -> Result<()> {
        if self.ports.http_server == 0 || self.ports.dev_server == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ports".to_string(),
                hint: Some("ports must be non-zero".to_string()),
            });
        }
        if self.ports.http_server == self.ports.dev_server {
            return Err(ConfigError::InvalidValue {
                field: "ports".to_string(),
                hint: Some(format!(
                    "http_server and dev_server cannot share port {}",
                    self.ports.http_server
                )),
            });
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::development()
    }
}
