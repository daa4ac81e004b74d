//! Run modes and the per-mode step table.
//!
//! Each pipeline selects an ordered list of [`Step`]s for the active [`Mode`]
//! once, when its configuration is materialized. The lists are plain data so a
//! new mode-specific step is a table edit rather than another conditional.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::descriptor::PipelineKind;

/// Mode a run was started in.
///
/// Production wins over watch: a production run never attaches hot-reload steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
    Watch,
}

impl Mode {
    pub fn from_flags(production: bool, watch: bool) -> Self {
        if production {
            Mode::Production
        } else if watch {
            Mode::Watch
        } else {
            Mode::Development
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Mode::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
            Mode::Watch => "watch",
        }
    }

    /// Value handed to the bundled code as `process.env.NODE_ENV`.
    pub fn node_env(self) -> &'static str {
        if self.is_production() {
            "production"
        } else {
            "development"
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiler plugin/step descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Inline `process.env.NODE_ENV` into the bundle.
    DefineEnv,
    /// Stable module ordering for long-term caching.
    OccurrenceOrder,
    /// Drop duplicated modules.
    Dedupe,
    /// Minify the emitted code.
    Minify,
    /// Accept hot module updates from the development server.
    HotModuleReplacement,
    /// Never emit assets from a failed compilation.
    NoEmitOnErrors,
    /// Prepend the source-map stack trace translator to the bundle.
    SourceMapBanner,
}

/// Banner installed at the top of the backend bundle so stack traces are
/// mapped back to sources before any application code runs.
pub const SOURCE_MAP_BANNER: &str = "require('source-map-support').install();";

const FRONTEND_STEPS: &[(Mode, &[Step])] = &[
    (Mode::Development, &[Step::DefineEnv]),
    (
        Mode::Watch,
        &[Step::DefineEnv, Step::HotModuleReplacement, Step::NoEmitOnErrors],
    ),
    (
        Mode::Production,
        &[
            Step::DefineEnv,
            Step::OccurrenceOrder,
            Step::Dedupe,
            Step::Minify,
        ],
    ),
];

const BACKEND_STEPS: &[(Mode, &[Step])] = &[
    (Mode::Development, &[Step::SourceMapBanner]),
    (Mode::Watch, &[Step::SourceMapBanner, Step::NoEmitOnErrors]),
    (Mode::Production, &[Step::SourceMapBanner, Step::DefineEnv]),
];

impl Step {
    /// Ordered steps for a pipeline in a given mode.
    pub fn table(pipeline: PipelineKind, mode: Mode) -> &'static [Step] {
        let table = match pipeline {
            PipelineKind::Frontend => FRONTEND_STEPS,
            PipelineKind::Backend => BACKEND_STEPS,
        };
        table
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, steps)| *steps)
            .unwrap_or(&[])
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::DefineEnv => "define",
            Step::OccurrenceOrder => "occurrence-order",
            Step::Dedupe => "dedupe",
            Step::Minify => "minify",
            Step::HotModuleReplacement => "hot-module-replacement",
            Step::NoEmitOnErrors => "no-emit-on-errors",
            Step::SourceMapBanner => "banner",
        }
    }

    /// Render the step as a plugin descriptor in the compiler configuration.
    pub fn to_value(self, mode: Mode) -> Value {
        let options = match self {
            Step::DefineEnv => json!({ "process.env.NODE_ENV": mode.node_env() }),
            Step::Minify => json!({ "compress": { "warnings": false } }),
            Step::SourceMapBanner => json!({
                "banner": SOURCE_MAP_BANNER,
                "raw": true,
                "entryOnly": false,
            }),
            Step::OccurrenceOrder
            | Step::Dedupe
            | Step::HotModuleReplacement
            | Step::NoEmitOnErrors => json!({}),
        };
        json!({ "plugin": self.name(), "options": options })
    }
}

/// Plugin descriptors for a pipeline in a given mode, in table order.
pub fn plugin_list(pipeline: PipelineKind, mode: Mode) -> Value {
    Value::Array(
        Step::table(pipeline, mode)
            .iter()
            .map(|step| step.to_value(mode))
            .collect(),
    )
}
