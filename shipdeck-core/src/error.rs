//! Error types for shipdeck-core

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using shipdeck Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for shipdeck
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(shipdeck::config))]
    Config(String),

    #[error("Docker error: {0}")]
    #[diagnostic(code(shipdeck::docker))]
    Docker(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(shipdeck::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(shipdeck::serde))]
    Serde(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    #[diagnostic(code(shipdeck::toml))]
    Toml(#[from] toml::de::Error),

    #[error("{0} is required")]
    #[diagnostic(code(shipdeck::missing_parameter))]
    MissingParameter(String),

    #[error("Invalid value for '{name}': {reason}")]
    #[diagnostic(code(shipdeck::invalid_parameter))]
    InvalidParameter { name: String, reason: String },

    #[error("Tool with name '{0}' already exists")]
    #[diagnostic(
        code(shipdeck::duplicate_tool),
        help("set `conflict_policy = \"replace\"` under [server] to let later registrations win")
    )]
    DuplicateTool(String),

    #[error("Unknown tool selection: {0}")]
    #[diagnostic(
        code(shipdeck::unknown_tool),
        help("use `all`, a category, or a tool family name; run with --list to see them")
    )]
    UnknownTool(String),

    #[error("Dispatch error: {0}")]
    #[diagnostic(code(shipdeck::dispatch))]
    Dispatch(String),

    #[error("Protocol error: {0}")]
    #[diagnostic(code(shipdeck::protocol))]
    Protocol(String),
}

impl Error {
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
