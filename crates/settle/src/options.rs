//! Middleware configuration.
//!
//! Every field has a default, so an empty `{}` (or an empty TOML table)
//! deserializes into a usable configuration. Field names are camelCase on the
//! wire. The output sinks and the reporter are not serializable and are
//! attached with [`MiddlewareOptions::with_sinks`] and
//! [`MiddlewareOptions::with_reporter`].

use crate::report::{LogSinks, Reporter};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\[[A-Za-z]+\\\]").expect("placeholder pattern is valid"));

fn default_public_path() -> String {
    "/".to_string()
}

fn default_aggregate_timeout() -> u64 {
    200
}

/// Which file answers a directory request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexPolicy {
    /// `true` serves `index.html`, `false` never resolves directories
    Enabled(bool),
    /// Serve this file name; an empty name disables directory requests
    File(String),
}

impl Default for IndexPolicy {
    fn default() -> Self {
        IndexPolicy::Enabled(true)
    }
}

impl IndexPolicy {
    /// The index file name, or `None` when directory requests never resolve.
    pub fn index_file(&self) -> Option<&str> {
        match self {
            IndexPolicy::Enabled(true) => Some("index.html"),
            IndexPolicy::Enabled(false) => None,
            IndexPolicy::File(name) if name.is_empty() => None,
            IndexPolicy::File(name) => Some(name),
        }
    }
}

/// Allowlist of paths that trigger a rebuild in lazy mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilenameFilter {
    /// A file name such as `bundle.js` or `[name].js`
    Name(String),
    /// A regular expression used verbatim
    Pattern { pattern: String },
}

impl FilenameFilter {
    /// Compile the filter.
    ///
    /// A name is escaped, `[placeholder]` segments match any non-empty text,
    /// and the result is anchored with an optional leading `/`.
    pub fn compile(&self) -> Result<Regex, regex::Error> {
        match self {
            FilenameFilter::Name(name) => {
                let escaped = regex::escape(name);
                let widened = PLACEHOLDER.replace_all(&escaped, ".+");
                Regex::new(&format!("^/?{widened}$"))
            }
            FilenameFilter::Pattern { pattern } => Regex::new(pattern),
        }
    }
}

/// Watcher tuning handed to [`crate::BuildEngine::watch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOptions {
    /// Quiet period after the last change before a rebuild starts
    #[serde(rename = "aggregateTimeout", default = "default_aggregate_timeout")]
    pub aggregate_timeout_ms: u64,

    /// Poll interval for polling watchers; `None` uses native events
    #[serde(rename = "poll", default, skip_serializing_if = "Option::is_none")]
    pub poll_ms: Option<u64>,

    /// Path substrings excluded from watching
    #[serde(default)]
    pub ignored: Vec<String>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            aggregate_timeout_ms: default_aggregate_timeout(),
            poll_ms: None,
            ignored: Vec::new(),
        }
    }
}

/// Amount of detail when rendering build stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatsPreset {
    /// Nothing is printed
    None,
    /// Only errors
    ErrorsOnly,
    /// Errors, warnings and a one-line summary
    Minimal,
    #[default]
    Normal,
    /// Everything the engine captured
    Verbose,
}

/// Options for [`crate::BuildStats::render`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOptions {
    #[serde(default)]
    pub preset: StatsPreset,

    /// Base directory paths are shown relative to; defaults to the working
    /// directory at setup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<PathBuf>,
}

/// Configuration of a [`crate::DevMiddleware`].
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareOptions {
    /// URL prefix artifacts are served under
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// Directory index policy
    #[serde(default)]
    pub index: IndexPolicy,

    /// Build on request instead of watching
    #[serde(default)]
    pub lazy: bool,

    /// In lazy mode, only paths matching this filter trigger a build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<FilenameFilter>,

    /// Extra response headers, applied in order
    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Prefix report lines with the wall-clock time
    #[serde(default)]
    pub report_time: bool,

    /// Suppress informational output
    #[serde(default)]
    pub no_info: bool,

    /// Suppress all reporter output
    #[serde(default)]
    pub quiet: bool,

    /// Extra MIME registrations: `{ "text/x-custom": ["custom"] }`
    #[serde(default)]
    pub mime_types: BTreeMap<String, Vec<String>>,

    /// Hold back pass-through requests until the build is valid and hand the
    /// build result to the next handler
    #[serde(default)]
    pub server_side_render: bool,

    #[serde(default)]
    pub watch_options: WatchOptions,

    #[serde(default)]
    pub stats: StatsOptions,

    #[serde(skip)]
    pub sinks: LogSinks,

    #[serde(skip)]
    pub reporter: Option<Arc<dyn Reporter>>,
}

impl Default for MiddlewareOptions {
    fn default() -> Self {
        Self {
            public_path: default_public_path(),
            index: IndexPolicy::default(),
            lazy: false,
            filename: None,
            headers: IndexMap::new(),
            report_time: false,
            no_info: false,
            quiet: false,
            mime_types: BTreeMap::new(),
            server_side_render: false,
            watch_options: WatchOptions::default(),
            stats: StatsOptions::default(),
            sinks: LogSinks::default(),
            reporter: None,
        }
    }
}

impl MiddlewareOptions {
    /// Route `log`/`warn`/`error` output to custom sinks.
    pub fn with_sinks(mut self, sinks: LogSinks) -> Self {
        self.sinks = sinks;
        self
    }

    /// Replace the default compile-status reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }
}

impl fmt::Debug for MiddlewareOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareOptions")
            .field("public_path", &self.public_path)
            .field("index", &self.index)
            .field("lazy", &self.lazy)
            .field("filename", &self.filename)
            .field("headers", &self.headers)
            .field("report_time", &self.report_time)
            .field("no_info", &self.no_info)
            .field("quiet", &self.quiet)
            .field("mime_types", &self.mime_types)
            .field("server_side_render", &self.server_side_render)
            .field("watch_options", &self.watch_options)
            .field("stats", &self.stats)
            .field("custom_reporter", &self.reporter.is_some())
            .finish_non_exhaustive()
    }
}
