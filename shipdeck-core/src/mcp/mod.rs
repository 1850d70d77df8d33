//! MCP (Model Context Protocol) server implementation
//!
//! Exposes the tool catalog over stdio or HTTP.

pub mod http;
mod protocol;
mod server;
mod transport;

pub use http::HttpMcpServer;
pub use protocol::*;
pub use server::*;
pub use transport::*;
