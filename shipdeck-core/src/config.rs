//! Configuration types for the shipdeck server

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Where tool command lines are executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Ephemeral container per invocation
    #[default]
    Container,
    /// Local process on the host
    Process,
    /// Echo the command line instead of running it
    #[serde(rename = "dry-run")]
    DryRun,
}

impl std::str::FromStr for DispatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "container" | "docker" => Ok(Self::Container),
            "process" | "local" => Ok(Self::Process),
            "dry-run" | "dryrun" => Ok(Self::DryRun),
            other => Err(Error::Config(format!(
                "unknown dispatch mode '{other}' (expected container, process or dry-run)"
            ))),
        }
    }
}

/// What happens when two tools register under the same name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Reject,
    Replace,
}

/// MCP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Overrides the `shipdeck-<selection>` server name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 serves over stdio
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: None,
            host: default_host(),
            port: 0,
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

/// Command execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dispatch: DispatchMode,
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment passed to every invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Extra `host:container[:mode]` binds for container dispatch
    #[serde(default)]
    pub volumes: Vec<String>,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::default(),
            workspace: default_workspace(),
            timeout_secs: default_timeout_secs(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
        }
    }
}

/// Output and journaling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Append successful tool output here
    #[serde(default)]
    pub output_file: Option<PathBuf>,
    /// Append one line per invocation here
    #[serde(default)]
    pub execution_log: Option<PathBuf>,
    #[serde(default = "default_max_response_chars")]
    pub max_response_chars: usize,
}

/// 20k tokens at roughly 4 characters per token
fn default_max_response_chars() -> usize {
    20_000 * 4
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_file: None,
            execution_log: None,
            max_response_chars: default_max_response_chars(),
        }
    }
}

/// Complete shipdeck configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShipdeckConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Program name to container image overrides
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ShipdeckConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from default locations with cascade:
    /// 1. ./shipdeck.toml (local override)
    /// 2. ~/.shipdeck/config.toml (global defaults)
    /// 3. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(config) = Self::from_file("shipdeck.toml") {
            return config;
        }

        if let Some(global_path) = Self::global_config_path()
            && let Ok(config) = Self::from_file(&global_path)
        {
            return config;
        }

        Self::default()
    }

    /// Load an explicit file if given, otherwise fall back to the default cascade.
    /// An explicit path that cannot be read or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p).map_err(|e| {
                Error::Config(format!("failed to load {}: {}", p.display(), e))
            }),
            None => Ok(Self::load_default()),
        }
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".shipdeck").join("config.toml"))
    }

    /// Expand `${VAR}` references in execution env values from the process environment
    pub fn expand_env_vars(&mut self) {
        self.expand_env_vars_with(|name| std::env::var(name).ok());
    }

    /// Expand `${VAR}` references using the given lookup. Unresolved references are kept.
    pub fn expand_env_vars_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for value in self.execution.env.values_mut() {
            if let Some(var_name) = value
                .strip_prefix("${")
                .and_then(|rest| rest.strip_suffix('}'))
                && let Some(resolved) = lookup(var_name)
            {
                *value = resolved;
            }
        }
    }

    /// Server name reported in `initialize`
    pub fn server_name(&self, selection: &str) -> String {
        self.server
            .name
            .clone()
            .unwrap_or_else(|| format!("shipdeck-{selection}"))
    }
}

/// Split a `KEY=VALUE` assignment as used by `--var` and `--image-tag`
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(Error::Config(format!(
            "invalid assignment '{raw}', expected KEY=VALUE"
        ))),
    }
}
