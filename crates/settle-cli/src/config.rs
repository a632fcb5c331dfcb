//! Layered configuration for `settle serve`.
//!
//! Sources, lowest priority first:
//!
//! 1. built-in defaults
//! 2. `settle.toml` in the working directory, or the file given with `--config`
//! 3. `SETTLE_*` environment variables (`SETTLE_PORT=3000`,
//!    `SETTLE_OUT_DIR=public`, nested keys with `__` as in
//!    `SETTLE_MIDDLEWARE__LAZY=true`)
//! 4. command-line flags
//!
//! ```toml
//! command = "npm run build"
//! out_dir = "dist"
//! watch = ["src"]
//! port = 8080
//!
//! [middleware]
//! publicPath = "/assets/"
//! headers = { "Cache-Control" = "no-store" }
//! ```

use crate::cli::ServeArgs;
use crate::error::{ConfigError, Result};
use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use settle::{FilenameFilter, IndexPolicy, MiddlewareOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = "settle.toml";

/// Resolved configuration of the serve command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Directory the build command writes to, relative to the working directory
    pub out_dir: PathBuf,

    /// Directories to watch; empty watches the working directory
    pub watch: Vec<PathBuf>,

    /// Build command, run through the platform shell
    pub command: Option<String>,

    /// Options handed to the dev middleware
    pub middleware: MiddlewareOptions,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            out_dir: PathBuf::from("dist"),
            watch: Vec::new(),
            command: None,
            middleware: MiddlewareOptions::default(),
        }
    }
}

/// Flags that were actually given; unset ones leave lower layers alone.
#[derive(Debug, Default, Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    out_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    watch: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    middleware: MiddlewareOverrides,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct MiddlewareOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    public_path: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    lazy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<FilenameFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<IndexPolicy>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    headers: IndexMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    quiet: bool,
}

impl Overrides {
    fn from_args(args: &ServeArgs, quiet: bool) -> Self {
        Self {
            host: args.host.clone(),
            port: args.port,
            out_dir: args.out_dir.clone(),
            watch: args.watch.clone(),
            command: args.command_line(),
            middleware: MiddlewareOverrides {
                public_path: args.public_path.clone(),
                lazy: args.lazy,
                filename: args.filename.clone().map(FilenameFilter::Name),
                index: args.index.clone(),
                headers: args.headers.iter().cloned().collect(),
                quiet,
            },
        }
    }
}

impl ServeConfig {
    /// Load configuration, resolving `settle.toml` against `cwd`.
    ///
    /// Priority: CLI args > environment variables > config file > defaults.
    /// `quiet` (the global flag) also silences the middleware reporter.
    pub fn load_in(cwd: &Path, args: &ServeArgs, quiet: bool) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let config_file = match &args.config {
            Some(path) => {
                let path = cwd.join(path);
                if !path.is_file() {
                    return Err(ConfigError::NotFound(path).into());
                }
                Some(path)
            }
            None => {
                let default_path = cwd.join(CONFIG_FILE);
                default_path.is_file().then_some(default_path)
            }
        };
        if let Some(path) = config_file {
            tracing::debug!(path = %path.display(), "loading config file");
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("SETTLE_").split("__"));
        figment = figment.merge(Serialized::defaults(Overrides::from_args(args, quiet)));

        let config: Self = figment.extract().map_err(|e| ConfigError::InvalidValue {
            field: "configuration".to_string(),
            value: e.to_string(),
            hint: "Check settle.toml syntax and field types".to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match &self.command {
            Some(command) if !command.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::MissingField {
                    field: "command".to_string(),
                    hint: "Pass a build command after `--` (settle serve -- npm run build) \
                           or set `command` in settle.toml"
                        .to_string(),
                }
                .into());
            }
        }
        if self.middleware.public_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "publicPath".to_string(),
                value: String::new(),
                hint: "Use `/` to serve the output at the root".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// The build command. Present after a successful load.
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or_default()
    }

    /// Socket address to bind.
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| {
                ConfigError::InvalidValue {
                    field: "host".to_string(),
                    value: self.host.clone(),
                    hint: "Use an IP address such as 127.0.0.1 or 0.0.0.0".to_string(),
                }
                .into()
            })
    }

    /// Output directory as an absolute path.
    pub fn out_dir_in(&self, cwd: &Path) -> PathBuf {
        cwd.join(&self.out_dir)
    }

    /// Watched directories as absolute paths.
    pub fn watch_dirs_in(&self, cwd: &Path) -> Vec<PathBuf> {
        if self.watch.is_empty() {
            return vec![cwd.to_path_buf()];
        }
        self.watch.iter().map(|dir| cwd.join(dir)).collect()
    }
}
