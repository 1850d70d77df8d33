//! shipdeck-core: MCP tool catalog for security and DevOps command line tools

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod dispatch;
pub mod docker;
pub mod error;
pub mod journal;
pub mod mcp;
pub mod tools;

pub use error::{Error, Result};
